use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::validation::{ConfigValidator, ValidationUtils};
use crate::BrokerResult;

/// 服务者选择策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategyKind {
    #[default]
    RoundRobin,
    Random,
    LeastUsed,
    Specialist,
}

impl SelectionStrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionStrategyKind::RoundRobin => "round_robin",
            SelectionStrategyKind::Random => "random",
            SelectionStrategyKind::LeastUsed => "least_used",
            SelectionStrategyKind::Specialist => "specialist",
        }
    }
}

impl std::str::FromStr for SelectionStrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "round_robin" => Ok(SelectionStrategyKind::RoundRobin),
            "random" => Ok(SelectionStrategyKind::Random),
            "least_used" => Ok(SelectionStrategyKind::LeastUsed),
            "specialist" => Ok(SelectionStrategyKind::Specialist),
            _ => Err(format!(
                "Invalid selection strategy: {s}. Valid options: round_robin, random, least_used, specialist"
            )),
        }
    }
}

/// 会合超时后如何处置服务者
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutPolicy {
    /// 释放回可用状态
    #[default]
    Release,
    /// 从注册表中移除，直到其重新上岗
    Evict,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    pub selection_strategy: SelectionStrategyKind,
    /// 单次会合的时限，未设置时无限等待
    pub rendezvous_timeout_seconds: Option<u64>,
    /// 订单等待服务者的时限，未设置时无限等待
    pub wait_timeout_seconds: Option<u64>,
    pub timeout_policy: TimeoutPolicy,
}

impl DispatcherConfig {
    pub fn with_strategy(strategy: SelectionStrategyKind) -> Self {
        Self {
            selection_strategy: strategy,
            ..Self::default()
        }
    }

    pub fn rendezvous_timeout(&self) -> Option<Duration> {
        self.rendezvous_timeout_seconds.map(Duration::from_secs)
    }

    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait_timeout_seconds.map(Duration::from_secs)
    }
}

impl ConfigValidator for DispatcherConfig {
    fn validate(&self) -> BrokerResult<()> {
        if let Some(seconds) = self.rendezvous_timeout_seconds {
            ValidationUtils::validate_timeout_seconds(
                seconds,
                "dispatcher.rendezvous_timeout_seconds",
            )?;
        }
        if let Some(seconds) = self.wait_timeout_seconds {
            ValidationUtils::validate_timeout_seconds(seconds, "dispatcher.wait_timeout_seconds")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatcher_config_validation() {
        let config = DispatcherConfig {
            selection_strategy: SelectionStrategyKind::LeastUsed,
            rendezvous_timeout_seconds: Some(30),
            wait_timeout_seconds: None,
            timeout_policy: TimeoutPolicy::Evict,
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.rendezvous_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.wait_timeout(), None);

        let mut invalid_config = config.clone();
        invalid_config.rendezvous_timeout_seconds = Some(0);
        assert!(invalid_config.validate().is_err());

        let mut invalid_config = config.clone();
        invalid_config.wait_timeout_seconds = Some(7200);
        assert!(invalid_config.validate().is_err());
    }

    #[test]
    fn test_strategy_kind_parsing() {
        assert_eq!(
            "Least_Used".parse::<SelectionStrategyKind>(),
            Ok(SelectionStrategyKind::LeastUsed)
        );
        assert!("fastest".parse::<SelectionStrategyKind>().is_err());
        assert_eq!(SelectionStrategyKind::default().as_str(), "round_robin");
    }

    #[test]
    fn test_dispatcher_config_serialization() {
        let config = DispatcherConfig::with_strategy(SelectionStrategyKind::Specialist);

        let serialized = serde_json::to_string(&config).expect("Failed to serialize");
        assert!(serialized.contains("\"specialist\""));

        let deserialized: DispatcherConfig =
            serde_json::from_str(&serialized).expect("Failed to deserialize");
        assert_eq!(config, deserialized);
    }
}
