use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::models::DedupKey;

/// Outcome of asking the registry to start a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// A new background unit was spawned for the key.
    Started,
    /// A unit for the key is still running; nothing was spawned.
    AlreadyRunning,
}

/// Process-lifetime map from dedup key to the handle of its background unit.
///
/// Entries are never purged. A finished handle stays mapped but inert; the
/// next request for that key replaces it with a fresh job.
#[derive(Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<Mutex<HashMap<DedupKey, JoinHandle<()>>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn the unit built by `spawn` unless one is already running for `key`.
    ///
    /// The lookup and the insert happen under one lock, so two concurrent
    /// requests for the same key can never both start a job.
    pub async fn admit<F>(&self, key: DedupKey, spawn: F) -> Admission
    where
        F: FnOnce() -> JoinHandle<()>,
    {
        let mut jobs = self.jobs.lock().await;
        if let Some(handle) = jobs.get(&key)
            && !handle.is_finished()
        {
            return Admission::AlreadyRunning;
        }
        jobs.insert(key, spawn());
        Admission::Started
    }

    pub async fn is_running(&self, key: &DedupKey) -> bool {
        self.jobs
            .lock()
            .await
            .get(key)
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Number of keys ever admitted (running or finished).
    pub async fn len(&self) -> usize {
        self.jobs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.lock().await.is_empty()
    }

    /// Abort every running unit. Used on shutdown.
    pub async fn abort_all(&self) {
        let jobs = self.jobs.lock().await;
        for (key, handle) in jobs.iter() {
            if !handle.is_finished() {
                tracing::warn!(key = %key, "Aborting in-flight job on shutdown");
                handle.abort();
            }
        }
    }
}
