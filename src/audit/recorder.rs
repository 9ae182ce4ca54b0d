// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Audit Recorder
//!
//! Request handlers never wait on audit persistence. Records go into a
//! bounded queue drained by a fixed pool of workers:
//!
//! - A full queue drops the record and logs it (`AuditPersistenceFailed`)
//! - Each persistence attempt is bounded by `persist_timeout`, then given up
//! - Workers are detached from the requests that produced the records, so a
//!   client disconnect does not cancel persistence
//!
//! ## Shutdown
//!
//! Cancelling the `CancellationToken` makes each worker finish what is still
//! queued and exit. [`AuditWorkers::join`] waits for that.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::record::AuditRecord;
use super::store::{AuditError, AuditStore};
use crate::config::AuditSettings;

/// Handle used by the middleware to submit records.
#[derive(Clone)]
pub struct AuditRecorder {
    sender: mpsc::Sender<AuditRecord>,
    include_reads: bool,
    dropped: Arc<AtomicU64>,
}

/// The persistence worker pool.
pub struct AuditWorkers {
    handles: Vec<JoinHandle<()>>,
}

impl AuditRecorder {
    /// Spawn the workers and return the submit handle.
    pub fn start(
        store: Arc<dyn AuditStore>,
        settings: &AuditSettings,
        shutdown: CancellationToken,
    ) -> (Self, AuditWorkers) {
        let (sender, receiver) = mpsc::channel(settings.queue_capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));

        let handles = (0..settings.workers.max(1))
            .map(|worker| {
                tokio::spawn(run_worker(
                    worker,
                    receiver.clone(),
                    store.clone(),
                    settings.persist_timeout,
                    shutdown.clone(),
                ))
            })
            .collect();

        info!(
            workers = settings.workers.max(1),
            queue_capacity = settings.queue_capacity.max(1),
            "Audit recorder starting"
        );

        (
            Self {
                sender,
                include_reads: settings.include_reads,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            AuditWorkers { handles },
        )
    }

    pub fn include_reads(&self) -> bool {
        self.include_reads
    }

    /// Queue a record without waiting.
    pub fn record(&self, record: AuditRecord) {
        info!(
            target: "audit",
            request_id = %record.request_id,
            user_id = record.user_id.as_deref().unwrap_or("anonymous"),
            action = record.action.as_str(),
            resource = %record.resource_type,
            status = record.status.as_str(),
            duration_ms = record.duration_ms,
            "audit"
        );

        if let Err(e) = self.sender.try_send(record) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            let (error, record) = match e {
                mpsc::error::TrySendError::Full(record) => (AuditError::QueueFull, record),
                mpsc::error::TrySendError::Closed(record) => (AuditError::Closed, record),
            };
            warn!(
                target: "audit",
                error = %error,
                request_id = %record.request_id,
                "AuditPersistenceFailed"
            );
        }
    }

    /// Records dropped because the queue was full or closed.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl AuditWorkers {
    /// Wait for every worker to drain and exit.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "audit worker panicked");
            }
        }
    }
}

async fn run_worker(
    worker: usize,
    receiver: Arc<Mutex<mpsc::Receiver<AuditRecord>>>,
    store: Arc<dyn AuditStore>,
    persist_timeout: Duration,
    shutdown: CancellationToken,
) {
    while let Some(record) = next_record(&receiver, &shutdown).await {
        persist(&*store, &record, persist_timeout).await;
    }
    debug!(worker, "audit worker stopped");
}

/// Next queued record; after cancellation only what is already queued.
async fn next_record(
    receiver: &Mutex<mpsc::Receiver<AuditRecord>>,
    shutdown: &CancellationToken,
) -> Option<AuditRecord> {
    let mut receiver = receiver.lock().await;
    tokio::select! {
        biased;
        record = receiver.recv() => record,
        _ = shutdown.cancelled() => receiver.try_recv().ok(),
    }
}

async fn persist(store: &dyn AuditStore, record: &AuditRecord, persist_timeout: Duration) {
    let result = match tokio::time::timeout(persist_timeout, store.persist(record)).await {
        Ok(result) => result,
        Err(_) => Err(AuditError::Timeout(persist_timeout)),
    };

    match result {
        Ok(()) => debug!(target: "audit", id = %record.id, "audit record persisted"),
        Err(e) => warn!(
            target: "audit",
            error = %e,
            request_id = %record.request_id,
            "AuditPersistenceFailed"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::record::AuditAction;
    use async_trait::async_trait;
    use axum::http::Method;

    #[derive(Default)]
    struct CollectingStore {
        records: std::sync::Mutex<Vec<AuditRecord>>,
    }

    #[async_trait]
    impl AuditStore for CollectingStore {
        async fn persist(&self, record: &AuditRecord) -> Result<(), AuditError> {
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    struct SlowStore;

    #[async_trait]
    impl AuditStore for SlowStore {
        async fn persist(&self, _record: &AuditRecord) -> Result<(), AuditError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    fn record() -> AuditRecord {
        AuditRecord::new(AuditAction::Create, &Method::POST, "/api/v1/pegawai")
    }

    fn settings(queue_capacity: usize, workers: usize) -> AuditSettings {
        AuditSettings {
            queue_capacity,
            workers,
            persist_timeout: Duration::from_secs(5),
            include_reads: false,
        }
    }

    #[tokio::test]
    async fn records_are_persisted_and_drained_on_shutdown() {
        let store = Arc::new(CollectingStore::default());
        let shutdown = CancellationToken::new();
        let (recorder, workers) = AuditRecorder::start(store.clone(), &settings(64, 2), shutdown.clone());

        for _ in 0..10 {
            recorder.record(record());
        }
        shutdown.cancel();
        workers.join().await;

        assert_eq!(store.records.lock().unwrap().len(), 10);
        assert_eq!(recorder.dropped(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_store_is_bounded_by_timeout() {
        let shutdown = CancellationToken::new();
        let (recorder, workers) = AuditRecorder::start(Arc::new(SlowStore), &settings(4, 1), shutdown.clone());

        recorder.record(record());
        shutdown.cancel();
        // Paused clock auto-advances past the 5s timeout.
        workers.join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn full_queue_drops_and_counts() {
        let shutdown = CancellationToken::new();
        let (recorder, workers) = AuditRecorder::start(Arc::new(SlowStore), &settings(1, 1), shutdown.clone());

        // One in flight (worker), one queued, the rest dropped.
        for _ in 0..5 {
            recorder.record(record());
            tokio::task::yield_now().await;
        }
        assert!(recorder.dropped() >= 3);

        shutdown.cancel();
        workers.join().await;
    }
}
