//! 自检用的进程内通道
//!
//! 记录通道按脚本回复 `pull`，并记下每一次读写；门控通道在放行之前阻塞 `pull`，
//! 用来观察同一服务者是否被同时卷入多次会合。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use broker_core::{Channel, ChannelError, Payload};
use tokio::sync::Semaphore;

pub const STAFF_IDS: [&str; 5] = [
    "jmMZkSGVBbCDgKKMMSNPS",
    "HeLlOWoRlD123",
    "iKnowThatYouAreReadingThis",
    "PyTHonDIscorDCoDEJam",
    "iWAShereWRITINGthis",
];

pub const SPECIALTIES: [&str; 5] = ["pasta", "meat", "vegetables", "non-food", "dessert"];

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelCall {
    Pull,
    Push(Payload),
}

/// 多个通道共享的调用记录，按所属服务者id标记
#[derive(Debug, Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<(String, ChannelCall)>>>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, owner: &str, call: ChannelCall) {
        lock(&self.entries).push((owner.to_string(), call));
    }

    /// 按调用顺序列出 `(服务者id, 内容)`
    pub fn pushes(&self) -> Vec<(String, Payload)> {
        lock(&self.entries)
            .iter()
            .filter_map(|(owner, call)| match call {
                ChannelCall::Push(payload) => Some((owner.clone(), payload.clone())),
                ChannelCall::Pull => None,
            })
            .collect()
    }

    pub fn pulls(&self) -> Vec<String> {
        lock(&self.entries)
            .iter()
            .filter(|(_, call)| *call == ChannelCall::Pull)
            .map(|(owner, _)| owner.clone())
            .collect()
    }

    pub fn clear(&self) {
        lock(&self.entries).clear();
    }
}

#[derive(Debug)]
pub struct RecordingChannel {
    owner: String,
    reply: Payload,
    calls: Mutex<Vec<ChannelCall>>,
    journal: Option<Journal>,
}

impl RecordingChannel {
    pub fn new(reply: Payload) -> Self {
        Self {
            owner: String::new(),
            reply,
            calls: Mutex::new(Vec::new()),
            journal: None,
        }
    }

    /// 不应发生任何读写的通道
    pub fn idle() -> Self {
        Self::new(Payload::Null)
    }

    pub fn named(owner: &str, reply: Payload) -> Self {
        Self {
            owner: owner.to_string(),
            ..Self::new(reply)
        }
    }

    pub fn with_journal(mut self, journal: &Journal) -> Self {
        self.journal = Some(journal.clone());
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn is_untouched(&self) -> bool {
        lock(&self.calls).is_empty()
    }

    pub fn pull_count(&self) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|call| **call == ChannelCall::Pull)
            .count()
    }

    pub fn pushed(&self) -> Vec<Payload> {
        lock(&self.calls)
            .iter()
            .filter_map(|call| match call {
                ChannelCall::Push(payload) => Some(payload.clone()),
                ChannelCall::Pull => None,
            })
            .collect()
    }

    fn record(&self, call: ChannelCall) {
        if let Some(journal) = &self.journal {
            journal.record(&self.owner, call.clone());
        }
        lock(&self.calls).push(call);
    }
}

#[async_trait]
impl Channel for RecordingChannel {
    async fn pull(&self) -> Result<Payload, ChannelError> {
        self.record(ChannelCall::Pull);
        Ok(self.reply.clone())
    }

    async fn push(&self, payload: Payload) -> Result<(), ChannelError> {
        self.record(ChannelCall::Push(payload));
        Ok(())
    }
}

/// `pull` 在 `open` 放行前一直阻塞的服务者通道。
///
/// `active` 统计处于推送之后、拉取完成之前的会合数。
#[derive(Debug)]
pub struct GatedChannel {
    inner: RecordingChannel,
    gate: Semaphore,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl GatedChannel {
    pub fn new(inner: RecordingChannel) -> Self {
        Self {
            inner,
            gate: Semaphore::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn open(&self, n: usize) {
        self.gate.add_permits(n);
    }

    pub fn inner(&self) -> &RecordingChannel {
        &self.inner
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Channel for GatedChannel {
    async fn pull(&self) -> Result<Payload, ChannelError> {
        let result = match self.gate.acquire().await {
            Ok(permit) => {
                permit.forget();
                self.inner.pull().await
            }
            Err(_) => Err(ChannelError::closed()),
        };
        let _ = self
            .active
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| Some(v.saturating_sub(1)));
        result
    }

    async fn push(&self, payload: Payload) -> Result<(), ChannelError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        self.inner.push(payload).await
    }
}

/// 轮询直到条件成立或超时
pub async fn wait_for<F>(mut condition: F, timeout: Duration) -> bool
where
    F: FnMut() -> bool,
{
    let start = Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    condition()
}
