//! 基于 Tokio channels 的内存通道
//!
//! [`duplex`] 返回一对端点：代理侧的 [`MemoryChannel`] 实现 [`Channel`]，
//! 客户侧的 [`ClientHandle`] 负责提供代理将要拉取的内容，并接收代理推送的内容。

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use crate::errors::ChannelError;
use crate::traits::{Channel, Payload};

/// 创建一对相连的内存通道端点
pub fn duplex() -> (MemoryChannel, ClientHandle) {
    let (to_broker, inbound) = mpsc::unbounded_channel();
    let (outbound, from_broker) = mpsc::unbounded_channel();

    (
        MemoryChannel {
            inbound: Mutex::new(inbound),
            outbound,
        },
        ClientHandle {
            to_broker,
            from_broker,
        },
    )
}

/// 代理侧端点
#[derive(Debug)]
pub struct MemoryChannel {
    inbound: Mutex<mpsc::UnboundedReceiver<Payload>>,
    outbound: mpsc::UnboundedSender<Payload>,
}

#[async_trait]
impl Channel for MemoryChannel {
    async fn pull(&self) -> Result<Payload, ChannelError> {
        self.inbound
            .lock()
            .await
            .recv()
            .await
            .ok_or_else(ChannelError::closed)
    }

    async fn push(&self, payload: Payload) -> Result<(), ChannelError> {
        self.outbound
            .send(payload)
            .map_err(|_| ChannelError::closed())
    }
}

/// 客户侧端点
#[derive(Debug)]
pub struct ClientHandle {
    to_broker: mpsc::UnboundedSender<Payload>,
    from_broker: mpsc::UnboundedReceiver<Payload>,
}

impl ClientHandle {
    /// 提供一份代理将要拉取的内容
    pub fn feed(&self, payload: Payload) -> Result<(), ChannelError> {
        self.to_broker
            .send(payload)
            .map_err(|_| ChannelError::closed())
    }

    /// 等待代理推送的下一份内容；代理侧端点被释放后返回 `None`
    pub async fn recv(&mut self) -> Option<Payload> {
        self.from_broker.recv().await
    }

    /// 拆分为发送端与接收端，便于在不同任务中使用
    pub fn split(self) -> (mpsc::UnboundedSender<Payload>, mpsc::UnboundedReceiver<Payload>) {
        (self.to_broker, self.from_broker)
    }
}
