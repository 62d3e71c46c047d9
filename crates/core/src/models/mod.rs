//! # 数据模型
//!
//! 定义会合代理的核心数据结构：入站事件、服务者条目以及会合步骤。
//!
//! ## 核心模型
//!
//! ### Event - 入站事件
//! 一个不可变的属性表加上一个通道。属性 `type` 决定事件种类：
//!
//! | type            | 必需属性                          | 通道使用        |
//! |-----------------|-----------------------------------|-----------------|
//! | `staff.onduty`  | `id: 字符串`, `specialty: 字符串列表` | 无              |
//! | `staff.offduty` | `id: 字符串`                       | 无              |
//! | `order`         | `specialty: 字符串`                | 拉取一次、推送一次 |
//!
//! 事件通过 [`Event::into_command`] 解析为 [`Command`]，解析失败时返回协议错误，
//! 此时不会发生任何注册表变更或通道读写。
//!
//! ### ProviderEntry - 服务者条目
//! 在岗服务者的注册信息：专长集合、独占的通道、可用标记以及服务计数。
//! 同一 `id` 任意时刻至多存在一个条目；`available == false` 恰好覆盖一次进行中的会合。
//!
//! ### RendezvousStep - 会合步骤
//! 四步交换的固定顺序，用于日志和错误定位：
//!
//! ```text
//! PullOrder → PushProvider → PullProvider → PushOrder
//! ```
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! use broker_core::models::{Attributes, Event};
//!
//! let attributes: Attributes = [("type", "order"), ("specialty", "dessert")]
//!     .into_iter()
//!     .collect();
//! let command = Event::new(attributes, channel).into_command()?;
//! ```

pub mod event;
pub mod provider;
pub mod step;

pub use event::*;
pub use provider::*;
pub use step::*;
