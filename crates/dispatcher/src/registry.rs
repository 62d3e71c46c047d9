use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use broker_core::{
    BrokerError, BrokerResult, Candidate, Channel, ProviderEntry, ProviderStatus,
    SelectionStrategy,
};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::waitlist::WaitList;

#[derive(Default)]
struct RegistryState {
    providers: HashMap<String, ProviderEntry>,
    waiters: WaitList,
    next_registration: u64,
}

impl RegistryState {
    /// 可用且具备该专长的服务者，按注册顺序
    fn candidates(&self, specialty: &str) -> Vec<Candidate> {
        let mut candidates: Vec<Candidate> = self
            .providers
            .values()
            .filter(|entry| entry.can_serve(specialty))
            .map(ProviderEntry::to_candidate)
            .collect();
        candidates.sort_by_key(|candidate| candidate.registration);
        candidates
    }

    fn reserve(&mut self, id: &str) -> BrokerResult<(u64, Arc<dyn Channel>)> {
        match self.providers.get_mut(id) {
            Some(entry) if entry.available => {
                entry.available = false;
                Ok((entry.registration, Arc::clone(&entry.channel)))
            }
            _ => Err(BrokerError::ReservationConflict { id: id.to_string() }),
        }
    }
}

struct Shared {
    state: Mutex<RegistryState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 服务者变为可用时，直接移交给其专长中最早等待的订单
    fn hand_off(self: &Arc<Self>, state: &mut RegistryState, id: &str) {
        loop {
            let RegistryState {
                providers, waiters, ..
            } = &mut *state;

            let Some(entry) = providers.get_mut(id) else {
                return;
            };
            if !entry.available {
                return;
            }
            let Some((specialty, waiter)) = waiters.pop_earliest(&entry.specialties) else {
                return;
            };

            entry.available = false;
            let reservation = Reservation::new(
                entry.id.clone(),
                entry.registration,
                Arc::clone(&entry.channel),
                Arc::clone(self),
            );

            match waiter.sender.send(reservation) {
                Ok(()) => {
                    debug!(provider_id = %id, specialty = %specialty, "服务者已移交给等待中的订单");
                    return;
                }
                Err(returned) => {
                    // 订单已放弃等待，不能在持锁时触发释放
                    returned.disarm();
                    entry.available = true;
                }
            }
        }
    }

    fn release(self: &Arc<Self>, id: &str, registration: u64, completed: bool) {
        let mut state = self.lock();
        match state.providers.get_mut(id) {
            Some(entry) if entry.registration == registration => {
                entry.available = true;
                if completed {
                    entry.served += 1;
                }
            }
            _ => {
                debug!(provider_id = %id, "服务者已下岗或重新注册，不再恢复可用");
                return;
            }
        }
        self.hand_off(&mut state, id);
    }

    fn evict(&self, id: &str, registration: u64) -> bool {
        let mut state = self.lock();
        let current = state
            .providers
            .get(id)
            .is_some_and(|entry| entry.registration == registration);
        if current {
            state.providers.remove(id);
        }
        current
    }
}

/// 对单个服务者的独占预留
///
/// 丢弃时自动释放服务者；若期间服务者已下岗或以同一id重新注册，则不做任何改动。
pub struct Reservation {
    id: String,
    registration: u64,
    channel: Arc<dyn Channel>,
    completed: bool,
    armed: bool,
    shared: Arc<Shared>,
}

impl Reservation {
    fn new(id: String, registration: u64, channel: Arc<dyn Channel>, shared: Arc<Shared>) -> Self {
        Self {
            id,
            registration,
            channel,
            completed: false,
            armed: true,
            shared,
        }
    }

    pub fn provider_id(&self) -> &str {
        &self.id
    }

    pub fn channel(&self) -> &Arc<dyn Channel> {
        &self.channel
    }

    /// 记为一次完成的会合，释放时计入服务次数
    pub fn mark_completed(&mut self) {
        self.completed = true;
    }

    /// 将服务者移出注册表而不是释放
    pub fn evict(mut self) -> bool {
        self.armed = false;
        self.shared.evict(&self.id, self.registration)
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if self.armed {
            self.armed = false;
            self.shared.release(&self.id, self.registration, self.completed);
        }
    }
}

impl fmt::Debug for Reservation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reservation")
            .field("id", &self.id)
            .field("registration", &self.registration)
            .field("completed", &self.completed)
            .finish_non_exhaustive()
    }
}

/// 获取服务者的结果
#[derive(Debug)]
pub enum Claim {
    Ready(Reservation),
    Waiting(PendingClaim),
}

/// 排队等待中的订单，服务者可用时会被直接移交
#[derive(Debug)]
pub struct PendingClaim {
    receiver: oneshot::Receiver<Reservation>,
}

impl PendingClaim {
    pub async fn wait(self) -> BrokerResult<Reservation> {
        self.receiver
            .await
            .map_err(|_| BrokerError::Internal("等待服务者时注册表已关闭".to_string()))
    }
}

/// 在岗服务者注册表
///
/// 所有状态由一把互斥锁保护，且锁内从不挂起：候选计算、选择与预留在同一临界区完成，
/// 因此两个订单不可能预留到同一个服务者。
#[derive(Clone)]
pub struct ProviderRegistry {
    shared: Arc<Shared>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(RegistryState::default()),
            }),
        }
    }

    /// 注册或覆盖服务者，返回是否覆盖了已有注册
    pub fn register(
        &self,
        id: impl Into<String>,
        specialties: BTreeSet<String>,
        channel: Arc<dyn Channel>,
    ) -> bool {
        let id = id.into();
        let mut state = self.shared.lock();
        state.next_registration += 1;
        let registration = state.next_registration;

        let previous = state.providers.insert(
            id.clone(),
            ProviderEntry::new(id.clone(), specialties, channel, registration),
        );
        if let Some(previous) = &previous {
            if !previous.available {
                warn!(provider_id = %id, "覆盖了正在会合中的服务者注册");
            }
        }

        self.shared.hand_off(&mut state, &id);
        previous.is_some()
    }

    /// 移除服务者，未知id视为成功
    pub fn unregister(&self, id: &str) -> bool {
        self.shared.lock().providers.remove(id).is_some()
    }

    pub fn candidates(&self, specialty: &str) -> Vec<Candidate> {
        self.shared.lock().candidates(specialty)
    }

    pub fn reserve(&self, id: &str) -> BrokerResult<Reservation> {
        let (registration, channel) = self.shared.lock().reserve(id)?;
        Ok(Reservation::new(
            id.to_string(),
            registration,
            channel,
            Arc::clone(&self.shared),
        ))
    }

    /// 释放预留，等同于丢弃它
    pub fn release(&self, reservation: Reservation) {
        drop(reservation);
    }

    /// 在一个临界区内完成候选计算、选择与预留；没有候选者时排入该专长的等待队列
    pub fn claim(&self, specialty: &str, strategy: &dyn SelectionStrategy) -> Claim {
        let mut state = self.shared.lock();
        let mut candidates = state.candidates(specialty);

        while !candidates.is_empty() {
            let id = match strategy.select(specialty, &candidates) {
                Some(id) if candidates.iter().any(|c| c.id == id) => id,
                other => {
                    warn!(
                        strategy = strategy.name(),
                        selected = ?other,
                        "选择策略返回了无效的候选者，改用第一个候选者"
                    );
                    candidates[0].id.clone()
                }
            };

            match state.reserve(&id) {
                Ok((registration, channel)) => {
                    return Claim::Ready(Reservation::new(
                        id,
                        registration,
                        channel,
                        Arc::clone(&self.shared),
                    ));
                }
                Err(err) => {
                    debug!(error = %err, "预留失败，重新选择");
                    candidates.retain(|c| c.id != id);
                }
            }
        }

        Claim::Waiting(PendingClaim {
            receiver: state.waiters.enqueue(specialty),
        })
    }

    /// 全部在岗服务者，按注册顺序
    pub fn snapshot(&self) -> Vec<ProviderStatus> {
        let state = self.shared.lock();
        let mut entries: Vec<&ProviderEntry> = state.providers.values().collect();
        entries.sort_by_key(|entry| entry.registration);
        entries.into_iter().map(ProviderEntry::to_status).collect()
    }

    pub fn len(&self) -> usize {
        self.shared.lock().providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &str) -> bool {
        self.shared.lock().providers.contains_key(id)
    }

    /// 服务者是否在岗且空闲
    pub fn is_available(&self, id: &str) -> bool {
        self.shared
            .lock()
            .providers
            .get(id)
            .is_some_and(|entry| entry.available)
    }

    pub fn waiting_orders(&self, specialty: &str) -> usize {
        self.shared.lock().waiters.waiting(specialty)
    }

    pub fn total_waiting_orders(&self) -> usize {
        self.shared.lock().waiters.total()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("ProviderRegistry")
            .field("providers", &state.providers.len())
            .field("waiting_orders", &state.waiters.total())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::RoundRobinStrategy;
    use broker_testing_utils::ScriptedChannel;

    fn tags(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn idle() -> Arc<dyn Channel> {
        ScriptedChannel::idle().shared()
    }

    #[test]
    fn test_reserve_is_exclusive() {
        let registry = ProviderRegistry::new();
        registry.register("chef", tags(&["pasta"]), idle());

        let reservation = registry.reserve("chef").unwrap();
        assert!(!registry.is_available("chef"));
        assert!(registry.candidates("pasta").is_empty());
        assert!(matches!(
            registry.reserve("chef"),
            Err(BrokerError::ReservationConflict { .. })
        ));

        registry.release(reservation);
        assert!(registry.is_available("chef"));
        assert_eq!(registry.candidates("pasta").len(), 1);
    }

    #[test]
    fn test_unknown_provider_cannot_be_reserved() {
        let registry = ProviderRegistry::new();
        assert!(registry.reserve("ghost").is_err());
        assert!(!registry.unregister("ghost"));
    }

    #[test]
    fn test_release_after_re_registration_is_ignored() {
        let registry = ProviderRegistry::new();
        registry.register("chef", tags(&["pasta"]), idle());
        let mut stale = registry.reserve("chef").unwrap();
        stale.mark_completed();

        assert!(registry.register("chef", tags(&["meat"]), idle()));
        let fresh = registry.reserve("chef").unwrap();
        drop(stale);

        assert!(!registry.is_available("chef"));
        drop(fresh);
        let status = registry.snapshot();
        assert_eq!(status[0].served, 0);
        assert_eq!(status[0].specialties, vec!["meat".to_string()]);
    }

    #[test]
    fn test_release_after_unregister_does_not_re_add() {
        let registry = ProviderRegistry::new();
        registry.register("chef", tags(&["pasta"]), idle());
        let reservation = registry.reserve("chef").unwrap();

        assert!(registry.unregister("chef"));
        drop(reservation);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_evict_removes_provider() {
        let registry = ProviderRegistry::new();
        registry.register("chef", tags(&["pasta"]), idle());
        let reservation = registry.reserve("chef").unwrap();

        assert!(reservation.evict());
        assert!(!registry.contains("chef"));
    }

    #[test]
    fn test_candidates_follow_registration_order() {
        let registry = ProviderRegistry::new();
        registry.register("second", tags(&["pasta"]), idle());
        registry.register("first", tags(&["pasta", "meat"]), idle());
        registry.register("other", tags(&["dessert"]), idle());

        let ids: Vec<String> = registry
            .candidates("pasta")
            .into_iter()
            .map(|candidate| candidate.id)
            .collect();
        assert_eq!(ids, vec!["second".to_string(), "first".to_string()]);
    }

    #[tokio::test]
    async fn test_claim_hands_released_provider_to_waiter() {
        let registry = ProviderRegistry::new();
        let strategy = RoundRobinStrategy::new();
        registry.register("chef", tags(&["pasta"]), idle());

        let Claim::Ready(first) = registry.claim("pasta", &strategy) else {
            panic!("expected an available provider");
        };
        let Claim::Waiting(pending) = registry.claim("pasta", &strategy) else {
            panic!("expected the order to wait");
        };
        assert_eq!(registry.waiting_orders("pasta"), 1);

        drop(first);
        let second = pending.wait().await.unwrap();
        assert_eq!(second.provider_id(), "chef");
        assert!(!registry.is_available("chef"));
        assert_eq!(registry.total_waiting_orders(), 0);
    }

    struct Stray;

    impl SelectionStrategy for Stray {
        fn select(&self, _: &str, _: &[Candidate]) -> Option<String> {
            Some("nobody".to_string())
        }

        fn name(&self) -> &str {
            "Stray"
        }
    }

    #[test]
    fn test_invalid_selection_falls_back_to_first_candidate() {
        let registry = ProviderRegistry::new();
        registry.register("chef", tags(&["pasta"]), idle());

        match registry.claim("pasta", &Stray) {
            Claim::Ready(reservation) => assert_eq!(reservation.provider_id(), "chef"),
            Claim::Waiting(_) => panic!("expected an available provider"),
        }
    }
}
