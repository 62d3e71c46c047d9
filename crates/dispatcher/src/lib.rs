//! Rendezvous Dispatcher
//!
//! 在岗服务者注册表、服务者选择策略、四步会合协议以及把它们串起来的事件分派器。
//! 注册表状态由一把互斥锁独占，等待中的订单按专长先进先出，服务者可用时直接移交。

pub mod dispatcher;
pub mod registry;
pub mod rendezvous;
pub mod stats;
pub mod strategies;
mod waitlist;


pub use dispatcher::Dispatcher;
pub use registry::{Claim, PendingClaim, ProviderRegistry, Reservation};
pub use rendezvous::rendezvous;
pub use stats::{DispatchStats, DispatchStatsSnapshot};
pub use strategies::*;
