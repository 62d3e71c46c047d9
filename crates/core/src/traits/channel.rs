use async_trait::async_trait;

use crate::errors::ChannelError;

/// 通道上传输的内容，代理不解释也不修改
pub type Payload = serde_json::Value;

/// 一侧连接的双向通道
///
/// 会合期间每个角色的 `pull` 与 `push` 各至多调用一次。
#[async_trait]
pub trait Channel: Send + Sync {
    /// 拉取对端提供的内容
    async fn pull(&self) -> Result<Payload, ChannelError>;

    /// 向对端推送内容
    async fn push(&self, payload: Payload) -> Result<(), ChannelError>;
}
