use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use broker_core::config::SelectionStrategyKind;
use broker_core::{Candidate, SelectionStrategy};
use rand::Rng;
use tracing::debug;

pub struct RoundRobinStrategy {
    counter: AtomicUsize,
}

pub struct RandomStrategy;

pub struct LeastUsedStrategy;

pub struct SpecialistStrategy;

/// 根据配置创建选择策略
pub fn strategy_for(kind: SelectionStrategyKind) -> Arc<dyn SelectionStrategy> {
    match kind {
        SelectionStrategyKind::RoundRobin => Arc::new(RoundRobinStrategy::new()),
        SelectionStrategyKind::Random => Arc::new(RandomStrategy::new()),
        SelectionStrategyKind::LeastUsed => Arc::new(LeastUsedStrategy::new()),
        SelectionStrategyKind::Specialist => Arc::new(SpecialistStrategy::new()),
    }
}

fn suitable<'a>(specialty: &str, candidates: &'a [Candidate]) -> Vec<&'a Candidate> {
    candidates
        .iter()
        .filter(|candidate| candidate.offers(specialty))
        .collect()
}

impl RoundRobinStrategy {
    pub fn new() -> Self {
        Self {
            counter: AtomicUsize::new(0),
        }
    }
}

impl Default for RoundRobinStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectionStrategy for RoundRobinStrategy {
    fn select(&self, specialty: &str, candidates: &[Candidate]) -> Option<String> {
        let suitable = suitable(specialty, candidates);
        if suitable.is_empty() {
            debug!("没有具备专长 {} 的可用服务者", specialty);
            return None;
        }
        let index = self.counter.fetch_add(1, Ordering::Relaxed) % suitable.len();
        let selected = suitable[index];

        debug!(
            "轮询策略选择服务者: {} (索引: {}/{})",
            selected.id,
            index,
            suitable.len()
        );

        Some(selected.id.clone())
    }

    fn name(&self) -> &str {
        "RoundRobin"
    }
}

impl RandomStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RandomStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectionStrategy for RandomStrategy {
    fn select(&self, specialty: &str, candidates: &[Candidate]) -> Option<String> {
        let suitable = suitable(specialty, candidates);
        if suitable.is_empty() {
            debug!("没有具备专长 {} 的可用服务者", specialty);
            return None;
        }
        let index = rand::rng().random_range(0..suitable.len());
        let selected = suitable[index];

        debug!("随机策略选择服务者: {}", selected.id);

        Some(selected.id.clone())
    }

    fn name(&self) -> &str {
        "Random"
    }
}

impl LeastUsedStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LeastUsedStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectionStrategy for LeastUsedStrategy {
    fn select(&self, specialty: &str, candidates: &[Candidate]) -> Option<String> {
        let selected = suitable(specialty, candidates)
            .into_iter()
            .min_by_key(|candidate| (candidate.served, candidate.registration))?;

        debug!(
            "最少使用策略选择服务者: {} (已服务: {})",
            selected.id, selected.served
        );

        Some(selected.id.clone())
    }

    fn name(&self) -> &str {
        "LeastUsed"
    }
}

impl SpecialistStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SpecialistStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectionStrategy for SpecialistStrategy {
    fn select(&self, specialty: &str, candidates: &[Candidate]) -> Option<String> {
        let suitable = suitable(specialty, candidates);
        if suitable.is_empty() {
            debug!("没有具备专长 {} 的可用服务者", specialty);
            return None;
        }
        let specialists: Vec<&Candidate> = suitable
            .iter()
            .filter(|candidate| candidate.is_specialist_for(specialty))
            .copied()
            .collect();

        let targets = if !specialists.is_empty() {
            debug!("找到专门负责 {} 的服务者", specialty);
            specialists
        } else {
            suitable
        };
        let selected = targets
            .into_iter()
            .min_by_key(|candidate| (candidate.served, candidate.registration))?;

        debug!(
            "专长亲和策略选择服务者: {} (已服务: {}, 专长: {:?})",
            selected.id, selected.served, selected.specialties
        );

        Some(selected.id.clone())
    }

    fn name(&self) -> &str {
        "Specialist"
    }
}
