pub mod channel;
pub mod strategy;

pub use channel::*;
pub use strategy::*;
