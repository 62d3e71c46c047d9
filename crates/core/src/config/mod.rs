//! 配置管理
//!
//! 配置来源按优先级从低到高：内置默认值、TOML 配置文件、`BROKER__` 前缀的环境变量。
//! 每个配置段都实现 [`ConfigValidator`]，加载完成后统一校验。
//!
//! ```toml
//! [dispatcher]
//! selection_strategy = "round_robin"
//! rendezvous_timeout_seconds = 30
//! timeout_policy = "evict"
//!
//! [logging]
//! level = "debug"
//! format = "pretty"
//! ```
//!
//! 环境变量使用双下划线分隔层级，例如 `BROKER__DISPATCHER__SELECTION_STRATEGY=least_used`。

pub mod models;
pub mod validation;

pub use models::*;
pub use validation::{ConfigValidator, ValidationUtils};
