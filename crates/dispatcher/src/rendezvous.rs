//! 订单与服务者之间的四步会合协议
//!
//! ```text
//! order.pull ──payload──▶ provider.push
//!                          provider.pull ──result──▶ order.push
//! ```
//!
//! 每一步恰好执行一次，不重排、不跳过、不重试。任一通道操作失败即终止本次会合，
//! 并以 [`BrokerError::Channel`] 标明失败的步骤。内容原样转发，代理不做任何修改。

use broker_core::{BrokerError, BrokerResult, Channel, RendezvousStep};
use tracing::debug;

/// 执行一次会合
pub async fn rendezvous(order: &dyn Channel, provider: &dyn Channel) -> BrokerResult<()> {
    let payload = order
        .pull()
        .await
        .map_err(|e| BrokerError::channel(RendezvousStep::PullOrder, e))?;
    debug!(step = %RendezvousStep::PullOrder, "已取得订单内容");

    provider
        .push(payload)
        .await
        .map_err(|e| BrokerError::channel(RendezvousStep::PushProvider, e))?;
    debug!(step = %RendezvousStep::PushProvider, "订单内容已转交服务者");

    let result = provider
        .pull()
        .await
        .map_err(|e| BrokerError::channel(RendezvousStep::PullProvider, e))?;
    debug!(step = %RendezvousStep::PullProvider, "已取得服务者结果");

    order
        .push(result)
        .await
        .map_err(|e| BrokerError::channel(RendezvousStep::PushOrder, e))?;
    debug!(step = %RendezvousStep::PushOrder, "结果已送回订单");

    Ok(())
}
