//! Progress persistence: a synchronous local cache in front of a best-effort
//! remote store.

mod local;
mod remote;

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub use local::LocalProgressCache;
pub use remote::{HttpProgressStore, RemoteProgressStore};

use crate::error::{PlayerError, Result};
use crate::model::{CompletionSet, ProgressRecord, StepId};
use crate::retry::{RetryPolicy, retry_with_backoff};

/// Mirrors progress to the local cache and the remote store.
///
/// Remote writes are queued to a single writer task; `save` never waits on
/// the network.
#[derive(Clone)]
pub struct ProgressBridge {
    local: LocalProgressCache,
    remote: Option<Arc<dyn RemoteProgressStore>>,
    writes: Option<mpsc::UnboundedSender<ProgressRecord>>,
}

impl ProgressBridge {
    /// A bridge without a remote store.
    pub fn local_only(local: LocalProgressCache) -> Self {
        Self {
            local,
            remote: None,
            writes: None,
        }
    }

    /// Start the remote writer on the current tokio runtime.
    ///
    /// The writer drains queued records and exits once every clone of the
    /// bridge is dropped or `token` is cancelled.
    pub fn spawn(
        local: LocalProgressCache,
        remote: Arc<dyn RemoteProgressStore>,
        retry: RetryPolicy,
        token: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(remote_writer(remote.clone(), rx, retry, token));
        let bridge = Self {
            local,
            remote: Some(remote),
            writes: Some(tx),
        };
        (bridge, writer)
    }

    pub fn local(&self) -> &LocalProgressCache {
        &self.local
    }

    /// Local first, then remote. A remote hit is copied into the local cache;
    /// a remote failure counts as a miss.
    pub async fn load(&self, step_id: &StepId) -> Option<ProgressRecord> {
        if let Some(record) = self.local.get(step_id) {
            debug!(step = %step_id, "Progress loaded from local cache");
            return Some(record);
        }
        let remote = self.remote.as_ref()?;
        match remote.load(step_id).await {
            Ok(Some(record)) => {
                debug!(step = %step_id, "Progress loaded from remote store");
                if let Err(e) = self.local.store(record.clone()) {
                    warn!(step = %step_id, error = %e, "Failed to cache remote progress");
                }
                Some(record)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(step = %step_id, error = %e, "Remote progress unavailable");
                None
            }
        }
    }

    /// Write locally and queue the remote write. Returns the merged record.
    ///
    /// Only a local write failure is reported; remote failures never surface.
    pub fn save(&self, record: ProgressRecord) -> Result<ProgressRecord> {
        let stored = self.local.store(record)?;
        if let Some(writes) = &self.writes
            && writes.send(stored.clone()).is_err()
        {
            debug!(step = %stored.step_id, "Remote writer stopped; skipping remote write");
        }
        Ok(stored)
    }

    /// Local-only write for live position updates; the remote store hears
    /// about them on the next [`save`](Self::save).
    pub fn touch(&self, record: ProgressRecord) -> Result<ProgressRecord> {
        self.local.touch(record)
    }

    pub fn completed_steps(&self) -> CompletionSet {
        self.local.completed_steps()
    }
}

async fn remote_writer(
    remote: Arc<dyn RemoteProgressStore>,
    mut rx: mpsc::UnboundedReceiver<ProgressRecord>,
    retry: RetryPolicy,
    token: CancellationToken,
) {
    loop {
        let record = tokio::select! {
            _ = token.cancelled() => break,
            record = rx.recv() => match record {
                Some(record) => record,
                None => break,
            },
        };

        let store = &remote;
        let pending = &record;
        let result = retry_with_backoff(&retry, &token, "progress write", move |_| {
            store.save(pending)
        })
        .await;

        match result {
            Ok(()) => debug!(step = %record.step_id, completed = record.completed, "Remote progress saved"),
            Err(PlayerError::Cancelled) => break,
            Err(e) => {
                let failure = PlayerError::persistence(&record.step_id, e.to_string());
                warn!(error = %failure, "Dropping remote progress write");
            }
        }
    }
    debug!("Remote progress writer stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use reqwest::StatusCode;

    use super::*;

    #[derive(Default)]
    struct FakeRemote {
        records: Mutex<Vec<ProgressRecord>>,
        stored: Mutex<Option<ProgressRecord>>,
        failures_left: AtomicU32,
        attempts: AtomicU32,
    }

    #[async_trait]
    impl RemoteProgressStore for FakeRemote {
        async fn load(&self, _step_id: &StepId) -> Result<Option<ProgressRecord>> {
            Ok(self.stored.lock().clone())
        }

        async fn save(&self, record: &ProgressRecord) -> Result<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(PlayerError::http_status(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "http://remote",
                    "save progress",
                ));
            }
            self.records.lock().push(record.clone());
            Ok(())
        }
    }

    fn retry() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            jitter: false,
        }
    }

    fn record(id: &str, position: f64, completed: bool) -> ProgressRecord {
        ProgressRecord::new(StepId::from(id), position, position, completed)
    }

    #[tokio::test(start_paused = true)]
    async fn remote_failures_are_retried_then_dropped() {
        let remote = Arc::new(FakeRemote {
            failures_left: AtomicU32::new(10),
            ..FakeRemote::default()
        });
        let (bridge, writer) = ProgressBridge::spawn(
            LocalProgressCache::in_memory(),
            remote.clone(),
            retry(),
            CancellationToken::new(),
        );

        let stored = bridge.save(record("a", 12.0, false)).unwrap();
        assert_eq!(stored.position, 12.0);
        drop(bridge);
        writer.await.unwrap();

        assert_eq!(remote.attempts.load(Ordering::SeqCst), 3);
        assert!(remote.records.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_recovers() {
        let remote = Arc::new(FakeRemote {
            failures_left: AtomicU32::new(1),
            ..FakeRemote::default()
        });
        let (bridge, writer) = ProgressBridge::spawn(
            LocalProgressCache::in_memory(),
            remote.clone(),
            retry(),
            CancellationToken::new(),
        );
        bridge.save(record("a", 3.0, false)).unwrap();
        bridge.save(record("a", 95.0, true)).unwrap();
        drop(bridge);
        writer.await.unwrap();

        let saved = remote.records.lock();
        assert_eq!(saved.len(), 2);
        assert!(saved[1].completed);
    }

    #[tokio::test]
    async fn load_prefers_local_and_caches_remote_hits() {
        let remote = Arc::new(FakeRemote::default());
        *remote.stored.lock() = Some(record("b", 30.0, true));
        let local = LocalProgressCache::in_memory();
        let (bridge, _writer) = ProgressBridge::spawn(
            local.clone(),
            remote.clone(),
            retry(),
            CancellationToken::new(),
        );

        let loaded = bridge.load(&StepId::from("b")).await.unwrap();
        assert_eq!(loaded.position, 30.0);
        assert!(local.get(&StepId::from("b")).is_some());
        assert!(bridge.completed_steps().contains(&StepId::from("b")));

        local.store(record("c", 7.0, false)).unwrap();
        *remote.stored.lock() = Some(record("c", 99.0, true));
        let loaded = bridge.load(&StepId::from("c")).await.unwrap();
        assert_eq!(loaded.position, 7.0);
    }

    #[tokio::test]
    async fn miss_everywhere_is_absent() {
        let bridge = ProgressBridge::local_only(LocalProgressCache::in_memory());
        assert!(bridge.load(&StepId::from("x")).await.is_none());
    }

    #[tokio::test]
    async fn cancelled_writer_stops() {
        let token = CancellationToken::new();
        let (bridge, writer) = ProgressBridge::spawn(
            LocalProgressCache::in_memory(),
            Arc::new(FakeRemote::default()),
            retry(),
            token.clone(),
        );
        token.cancel();
        writer.await.unwrap();
        // Local writes keep working after the writer is gone.
        assert!(bridge.save(record("a", 1.0, false)).is_ok());
    }
}
