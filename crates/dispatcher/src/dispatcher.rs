use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use broker_core::config::{DispatcherConfig, TimeoutPolicy};
use broker_core::{
    BrokerError, BrokerResult, Channel, Command, Event, OrderRequest, SelectionStrategy,
};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::registry::{Claim, ProviderRegistry, Reservation};
use crate::rendezvous::rendezvous;
use crate::stats::{DispatchStats, DispatchStatsSnapshot};
use crate::strategies::strategy_for;

/// 事件分派器
///
/// 上岗、下岗事件同步修改注册表后立即返回；订单事件会等待可用服务者，
/// 完成一次会合后才返回。可以克隆后在多个任务中并发调用 [`Dispatcher::handle`]。
#[derive(Clone)]
pub struct Dispatcher {
    registry: ProviderRegistry,
    strategy: Arc<dyn SelectionStrategy>,
    config: DispatcherConfig,
    stats: Arc<DispatchStats>,
}

impl Dispatcher {
    pub fn new(config: DispatcherConfig) -> Self {
        let strategy = strategy_for(config.selection_strategy);
        Self::with_strategy(config, strategy)
    }

    pub fn with_strategy(config: DispatcherConfig, strategy: Arc<dyn SelectionStrategy>) -> Self {
        info!(
            "创建分派器，选择策略: {}，会合超时: {:?}，等待超时: {:?}",
            strategy.name(),
            config.rendezvous_timeout_seconds,
            config.wait_timeout_seconds
        );
        Self {
            registry: ProviderRegistry::new(),
            strategy,
            config,
            stats: Arc::new(DispatchStats::default()),
        }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn stats(&self) -> DispatchStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn strategy_name(&self) -> &str {
        self.strategy.name()
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// 处理一个入站事件
    ///
    /// 属性校验在任何注册表修改或通道读写之前完成，校验失败时返回 `Protocol` 错误。
    pub async fn handle(&self, event: Event) -> BrokerResult<()> {
        let command = event.into_command().inspect_err(|e| {
            warn!("拒绝格式错误的事件: {}", e);
        })?;

        match command {
            Command::OnDuty {
                id,
                specialties,
                channel,
            } => {
                self.on_duty(id, specialties, channel);
                Ok(())
            }
            Command::OffDuty { id } => {
                self.off_duty(&id);
                Ok(())
            }
            Command::Order(request) => {
                let span = info_span!(
                    "order",
                    order_id = %Uuid::new_v4(),
                    specialty = %request.specialty
                );
                self.dispatch(request).instrument(span).await
            }
        }
    }

    fn on_duty(&self, id: String, specialties: BTreeSet<String>, channel: Arc<dyn Channel>) {
        let tags: Vec<&str> = specialties.iter().map(String::as_str).collect();
        info!("服务者上岗: {} 专长: {:?}", id, tags);
        let replaced = self.registry.register(id.clone(), specialties, channel);
        if replaced {
            info!("服务者 {} 重新注册，覆盖原有记录", id);
        }
        self.stats.record_registration();
    }

    fn off_duty(&self, id: &str) {
        if self.registry.unregister(id) {
            info!("服务者下岗: {}", id);
        } else {
            debug!("下岗的服务者 {} 不在注册表中", id);
        }
        self.stats.record_deregistration();
    }

    async fn dispatch(&self, request: OrderRequest) -> BrokerResult<()> {
        let result = self.serve(&request).await;
        match &result {
            Ok(()) => {
                self.stats.record_completed();
                info!("订单已完成");
            }
            Err(e) => {
                self.stats.record_failed();
                warn!("订单处理失败: {}", e);
            }
        }
        result
    }

    async fn serve(&self, request: &OrderRequest) -> BrokerResult<()> {
        let mut reservation = self.acquire(&request.specialty).await?;
        let provider_id = reservation.provider_id().to_string();
        let provider = Arc::clone(reservation.channel());
        info!(provider_id = %provider_id, "已预留服务者，开始会合");

        let exchange = rendezvous(request.channel.as_ref(), provider.as_ref());
        let outcome = match self.config.rendezvous_timeout() {
            None => exchange.await,
            Some(limit) => match tokio::time::timeout(limit, exchange).await {
                Ok(result) => result,
                Err(_) => {
                    self.stats.record_timeout();
                    self.abandon(reservation, &provider_id);
                    return Err(timeout_error("会合", limit));
                }
            },
        };

        match &outcome {
            Ok(()) => reservation.mark_completed(),
            Err(e) => warn!(provider_id = %provider_id, "会合失败，释放服务者: {}", e),
        }
        self.registry.release(reservation);
        outcome
    }

    /// 取得服务者预留；没有候选者时按到达顺序等待
    async fn acquire(&self, specialty: &str) -> BrokerResult<Reservation> {
        let pending = match self.registry.claim(specialty, self.strategy.as_ref()) {
            Claim::Ready(reservation) => return Ok(reservation),
            Claim::Waiting(pending) => pending,
        };

        self.stats.record_waited();
        info!("暂无可用的 {} 服务者，订单进入等待队列", specialty);

        match self.config.wait_timeout() {
            None => pending.wait().await,
            Some(limit) => match tokio::time::timeout(limit, pending.wait()).await {
                Ok(result) => result,
                Err(_) => {
                    self.stats.record_timeout();
                    warn!("等待 {} 服务者超时", specialty);
                    Err(timeout_error("等待服务者", limit))
                }
            },
        }
    }

    fn abandon(&self, reservation: Reservation, provider_id: &str) {
        match self.config.timeout_policy {
            TimeoutPolicy::Release => {
                warn!(provider_id = %provider_id, "会合超时，释放服务者");
                self.registry.release(reservation);
            }
            TimeoutPolicy::Evict => {
                if reservation.evict() {
                    warn!(provider_id = %provider_id, "会合超时，服务者已移出注册表");
                } else {
                    debug!(provider_id = %provider_id, "会合超时，服务者已不在注册表中");
                }
            }
        }
    }
}

fn timeout_error(stage: &'static str, limit: Duration) -> BrokerError {
    BrokerError::Timeout {
        stage,
        seconds: limit.as_secs(),
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(DispatcherConfig::default())
    }
}
