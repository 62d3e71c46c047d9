use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// 分派统计，同时上报到 metrics 门面
#[derive(Debug, Default)]
pub struct DispatchStats {
    registrations: AtomicU64,
    deregistrations: AtomicU64,
    orders_completed: AtomicU64,
    orders_failed: AtomicU64,
    orders_waited: AtomicU64,
    timeouts: AtomicU64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchStatsSnapshot {
    pub registrations: u64,
    pub deregistrations: u64,
    pub orders_completed: u64,
    pub orders_failed: u64,
    pub orders_waited: u64,
    pub timeouts: u64,
}

impl DispatchStats {
    pub fn record_registration(&self) {
        self.registrations.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("broker_registrations_total").increment(1);
    }

    pub fn record_deregistration(&self) {
        self.deregistrations.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("broker_deregistrations_total").increment(1);
    }

    pub fn record_completed(&self) {
        self.orders_completed.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("broker_orders_total", "outcome" => "completed").increment(1);
    }

    pub fn record_failed(&self) {
        self.orders_failed.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("broker_orders_total", "outcome" => "failed").increment(1);
    }

    pub fn record_waited(&self) {
        self.orders_waited.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("broker_orders_waited_total").increment(1);
    }

    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("broker_timeouts_total").increment(1);
    }

    pub fn snapshot(&self) -> DispatchStatsSnapshot {
        DispatchStatsSnapshot {
            registrations: self.registrations.load(Ordering::Relaxed),
            deregistrations: self.deregistrations.load(Ordering::Relaxed),
            orders_completed: self.orders_completed.load(Ordering::Relaxed),
            orders_failed: self.orders_failed.load(Ordering::Relaxed),
            orders_waited: self.orders_waited.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
        }
    }
}

impl DispatchStatsSnapshot {
    pub fn orders_total(&self) -> u64 {
        self.orders_completed + self.orders_failed
    }
}
