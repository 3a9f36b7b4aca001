/*
    coordinator.rs - Queued persistence of the serialized store

    Every mutation enqueues the store's serialized form. A single worker task
    drains the queue in order, so local writes and remote pushes never
    interleave. For each entry the worker:
    1. writes the local cache if the text changed since the last local write
    2. pushes to the remote, under a timeout, if the text differs from the
       last form the remote accepted

    Failures are logged and reported through the entry's ticket; they are
    never raised to the engine caller. There are no retries: the next
    mutation carries the full state anyway.

    The remote is authoritative only during `bootstrap`, before the worker
    starts.
*/

use super::error::{SyncError, SyncResult};
use super::remote::RemoteAuthority;
use crate::core_store::{RecordStore, SnapshotFile, StoreSnapshot};
use crate::telemetry::{record_sync_failure, TelemetryCollector};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Default bound on a single remote call
pub const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(3);

/// Observable state of one queued persistence step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    Pending,
    Succeeded,
    Failed(String),
}

impl SyncStatus {
    pub fn is_done(&self) -> bool {
        !matches!(self, SyncStatus::Pending)
    }
}

/// Handle on a queued persistence step
#[derive(Debug, Clone)]
pub struct SyncTicket {
    status: watch::Receiver<SyncStatus>,
}

impl SyncTicket {
    fn settled(status: SyncStatus) -> Self {
        let (_tx, rx) = watch::channel(status);
        SyncTicket { status: rx }
    }

    /// Current status without waiting
    pub fn status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    /// Wait until the step has been applied
    pub async fn wait(mut self) -> SyncStatus {
        let waited = self
            .status
            .wait_for(SyncStatus::is_done)
            .await
            .map(|status| status.clone());
        match waited {
            Ok(status) => status,
            Err(_) => {
                let last = self.status.borrow().clone();
                if last.is_done() {
                    last
                } else {
                    SyncStatus::Failed(SyncError::WorkerStopped.to_string())
                }
            }
        }
    }
}

/// What `bootstrap` found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BootstrapReport {
    pub loaded_local: bool,
    pub pulled_remote: bool,
}

enum SyncCommand {
    Persist {
        text: String,
        status: watch::Sender<SyncStatus>,
    },
    Flush(oneshot::Sender<()>),
}

/// Owns the cache file, the remote and the last-written forms
pub struct SyncWorker {
    local: Option<SnapshotFile>,
    remote: Option<Arc<dyn RemoteAuthority>>,
    timeout: Duration,
    last_local: Option<String>,
    last_remote: Option<String>,
    telemetry: Arc<TelemetryCollector>,
}

impl SyncWorker {
    pub fn new(
        local: Option<SnapshotFile>,
        remote: Option<Arc<dyn RemoteAuthority>>,
        timeout: Duration,
        telemetry: Arc<TelemetryCollector>,
    ) -> Self {
        SyncWorker {
            local,
            remote,
            timeout,
            last_local: None,
            last_remote: None,
            telemetry,
        }
    }

    /// Load the local cache, then let the remote overwrite it if it answers
    pub async fn bootstrap(&mut self, store: &mut RecordStore) -> BootstrapReport {
        let mut report = BootstrapReport::default();

        if let Some(local) = &self.local {
            match local.read().await {
                Ok(Some(text)) => match StoreSnapshot::from_serialized(&text) {
                    Ok(snapshot) => {
                        store.replace_all(snapshot);
                        self.last_local = Some(text);
                        report.loaded_local = true;
                        info!(path = %local.path().display(), records = store.stats().record_count, "Loaded local cache");
                    }
                    Err(e) => warn!(path = %local.path().display(), error = %e, "Ignoring unreadable local cache"),
                },
                Ok(None) => debug!(path = %local.path().display(), "No local cache yet"),
                Err(e) => warn!(error = %e, "Failed to read local cache"),
            }
        }

        if let Some(remote) = &self.remote {
            match self.pull(remote.as_ref()).await {
                Ok(Some(snapshot)) => {
                    store.replace_all(snapshot);
                    report.pulled_remote = true;
                    info!(records = store.stats().record_count, "Replaced store with remote snapshot");
                }
                Ok(None) => debug!("Remote has no snapshot"),
                Err(e) => {
                    record_sync_failure(&self.telemetry, "remote");
                    warn!(error = %e, "Remote pull failed, continuing with local state");
                }
            }
        }

        if report.pulled_remote {
            if let Ok(text) = store.to_serialized() {
                self.last_remote = Some(text.clone());
                self.apply(&text).await;
            }
        }

        report
    }

    async fn pull(&self, remote: &dyn RemoteAuthority) -> SyncResult<Option<StoreSnapshot>> {
        let text = tokio::time::timeout(self.timeout, remote.pull()).await??;
        match text {
            Some(text) => StoreSnapshot::from_serialized(&text)
                .map(Some)
                .map_err(|e| SyncError::InvalidPayload(e.to_string())),
            None => Ok(None),
        }
    }

    /// Persist one serialized form, returning its final status
    async fn apply(&mut self, text: &str) -> SyncStatus {
        let mut failures = Vec::new();

        if let Some(local) = &self.local {
            if self.last_local.as_deref() != Some(text) {
                match local.write(text).await {
                    Ok(()) => {
                        self.last_local = Some(text.to_string());
                        self.telemetry.inc_sync_writes();
                        debug!(bytes = text.len(), "Wrote local cache");
                    }
                    Err(e) => {
                        record_sync_failure(&self.telemetry, "local");
                        warn!(error = %e, "Local cache write failed");
                        failures.push(format!("local: {}", e));
                    }
                }
            }
        }

        if let Some(remote) = &self.remote {
            if self.last_remote.as_deref() != Some(text) {
                let pushed = tokio::time::timeout(self.timeout, remote.push(text))
                    .await
                    .map_err(SyncError::from)
                    .and_then(|r| r);
                match pushed {
                    Ok(()) => {
                        self.last_remote = Some(text.to_string());
                        debug!(bytes = text.len(), "Pushed snapshot to remote");
                    }
                    Err(e) => {
                        record_sync_failure(&self.telemetry, "remote");
                        warn!(error = %e, "Remote push failed");
                        failures.push(format!("remote: {}", e));
                    }
                }
            }
        }

        if failures.is_empty() {
            SyncStatus::Succeeded
        } else {
            SyncStatus::Failed(failures.join("; "))
        }
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<SyncCommand>) {
        while let Some(command) = rx.recv().await {
            match command {
                SyncCommand::Persist { text, status } => {
                    let result = self.apply(&text).await;
                    let _ = status.send(result);
                }
                SyncCommand::Flush(done) => {
                    let _ = done.send(());
                }
            }
        }
        debug!("Sync worker stopped");
    }

    /// Start draining the queue on a background task
    pub fn spawn(self) -> SyncCoordinator {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(self.run(rx));
        SyncCoordinator {
            tx,
            worker: Some(worker),
        }
    }
}

/// Sending side of the persistence queue
pub struct SyncCoordinator {
    tx: mpsc::UnboundedSender<SyncCommand>,
    worker: Option<JoinHandle<()>>,
}

impl SyncCoordinator {
    /// Queue a serialized form for persistence
    pub fn enqueue(&self, text: String) -> SyncTicket {
        let (status_tx, status_rx) = watch::channel(SyncStatus::Pending);
        let command = SyncCommand::Persist {
            text,
            status: status_tx,
        };
        if self.tx.send(command).is_err() {
            warn!("Sync worker stopped, dropping persistence step");
            return SyncTicket::settled(SyncStatus::Failed(SyncError::WorkerStopped.to_string()));
        }
        SyncTicket { status: status_rx }
    }

    /// Wait until everything queued so far has been applied
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(SyncCommand::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }

    /// Drain the queue and stop the worker
    pub async fn shutdown(mut self) {
        self.flush().await;
        if let Some(worker) = self.worker.take() {
            worker.abort();
            let _ = worker.await;
        }
    }
}

impl Drop for SyncCoordinator {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
    }
}
