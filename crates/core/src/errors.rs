use thiserror::Error;

use crate::models::RendezvousStep;

/// 通道实现上报的失败
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ChannelError {
    message: String,
}

impl ChannelError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// 对端已关闭
    pub fn closed() -> Self {
        Self::new("通道已关闭")
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// 代理错误类型定义
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("协议错误: {0}")]
    Protocol(String),

    #[error("通道错误 (步骤 {step}): {source}")]
    Channel {
        step: RendezvousStep,
        #[source]
        source: ChannelError,
    },

    /// 仅在内部使用，调用方会重新选择候选者
    #[error("服务者已不可用: {id}")]
    ReservationConflict { id: String },

    #[error("{stage}超时 ({seconds}秒)")]
    Timeout { stage: &'static str, seconds: u64 },

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl BrokerError {
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    pub fn channel(step: RendezvousStep, source: ChannelError) -> Self {
        Self::Channel { step, source }
    }

    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol(_))
    }

    pub fn is_channel(&self) -> bool {
        matches!(self, Self::Channel { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// 发生失败的会合步骤
    pub fn failed_step(&self) -> Option<RendezvousStep> {
        match self {
            Self::Channel { step, .. } => Some(*step),
            _ => None,
        }
    }
}

impl From<config::ConfigError> for BrokerError {
    fn from(err: config::ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}

/// 统一的Result类型
pub type BrokerResult<T> = std::result::Result<T, BrokerError>;
