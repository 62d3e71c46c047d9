//! Mock channel implementations
//!
//! These channels record every call made on them so tests can assert the
//! exact sequence of pulls and pushes a rendezvous performed, and which
//! provider a payload travelled through.

use async_trait::async_trait;
use broker_core::{Channel, ChannelError, Payload};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

/// A single operation observed on a channel
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelCall {
    Pull,
    Push(Payload),
}

#[derive(Debug, Clone, PartialEq)]
pub struct JournalEntry {
    pub owner: String,
    pub call: ChannelCall,
}

/// Shared log of calls across several channels, tagged with the owning id
#[derive(Debug, Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<JournalEntry>>>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, owner: &str, call: ChannelCall) {
        self.entries.lock().unwrap().push(JournalEntry {
            owner: owner.to_string(),
            call,
        });
    }

    pub fn entries(&self) -> Vec<JournalEntry> {
        self.entries.lock().unwrap().clone()
    }

    /// Every push as `(owner, payload)`, in call order
    pub fn pushes(&self) -> Vec<(String, Payload)> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter_map(|entry| match &entry.call {
                ChannelCall::Push(payload) => Some((entry.owner.clone(), payload.clone())),
                ChannelCall::Pull => None,
            })
            .collect()
    }

    /// Owners that were pulled from, in call order
    pub fn pulls(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|entry| entry.call == ChannelCall::Pull)
            .map(|entry| entry.owner.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

/// Channel whose `pull` returns a configurable reply and whose `push` records
/// the payload
#[derive(Debug)]
pub struct ScriptedChannel {
    owner: String,
    reply: Mutex<Payload>,
    calls: Mutex<Vec<ChannelCall>>,
    fail_pull: Option<ChannelError>,
    fail_push: Option<ChannelError>,
    journal: Option<Journal>,
}

impl ScriptedChannel {
    pub fn new(reply: Payload) -> Self {
        Self {
            owner: String::new(),
            reply: Mutex::new(reply),
            calls: Mutex::new(Vec::new()),
            fail_pull: None,
            fail_push: None,
            journal: None,
        }
    }

    /// Channel for events that are not expected to perform any I/O
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

    pub fn failing_pull(mut self, message: &str) -> Self {
        self.fail_pull = Some(ChannelError::new(message));
        self
    }

    pub fn failing_push(mut self, message: &str) -> Self {
        self.fail_push = Some(ChannelError::new(message));
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn set_reply(&self, reply: Payload) {
        *self.reply.lock().unwrap() = reply;
    }

    pub fn calls(&self) -> Vec<ChannelCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn pull_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| **call == ChannelCall::Pull)
            .count()
    }

    pub fn pushed(&self) -> Vec<Payload> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|call| match call {
                ChannelCall::Push(payload) => Some(payload.clone()),
                ChannelCall::Pull => None,
            })
            .collect()
    }

    pub fn push_count(&self) -> usize {
        self.pushed().len()
    }

    pub fn reset(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn record(&self, call: ChannelCall) {
        if let Some(journal) = &self.journal {
            journal.record(&self.owner, call.clone());
        }
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Channel for ScriptedChannel {
    async fn pull(&self) -> Result<Payload, ChannelError> {
        self.record(ChannelCall::Pull);
        if let Some(err) = &self.fail_pull {
            return Err(err.clone());
        }
        Ok(self.reply.lock().unwrap().clone())
    }

    async fn push(&self, payload: Payload) -> Result<(), ChannelError> {
        self.record(ChannelCall::Push(payload));
        match &self.fail_push {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

/// Provider channel whose `pull` blocks until the test opens the gate.
///
/// Tracks how many rendezvous are between step 2 (push) and the end of step 3
/// (pull), which must never exceed one for a single provider.
#[derive(Debug)]
pub struct GatedChannel {
    inner: ScriptedChannel,
    gate: Semaphore,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl GatedChannel {
    pub fn new(inner: ScriptedChannel) -> Self {
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

    /// Allow `n` more pulls to complete
    pub fn open(&self, n: usize) {
        self.gate.add_permits(n);
    }

    /// Fail every pending and future pull
    pub fn close(&self) {
        self.gate.close();
    }

    pub fn inner(&self) -> &ScriptedChannel {
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
        let permit = self.gate.acquire().await.map_err(|_| ChannelError::closed());
        let result = match permit {
            Ok(permit) => {
                permit.forget();
                self.inner.pull().await
            }
            Err(err) => Err(err),
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
