//! Asynchronous bulk soft deletion.
//!
//! A deletion request runs through four stages connected by channels:
//!
//! ```text
//! generate ──► fan_out (N ownership workers, one shared input) ──► fan_in ──► sink
//!  ids          Some(id) when owned, None otherwise               merged     batched
//!                                                                             soft_delete_batch
//! ```
//!
//! The caller gets a [`DeletionTicket`] back immediately; the pipeline runs in
//! the background. Identifiers are verified and deleted in no particular
//! order. Per-identifier lookup failures count as "not owned" and failed
//! batches are logged and counted in the [`DeletionReport`], never retried.

pub mod fan;
pub mod generator;
pub mod sink;

pub use fan::{fan_in, fan_out};
pub use generator::generate;
pub use sink::{sink, SinkOutcome};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tinylink_core::{Repository, ShortId};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn, Instrument};
use typed_builder::TypedBuilder;
use uuid::Uuid;

pub const DEFAULT_WORKERS: usize = 3;
pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_CHANNEL_CAPACITY: usize = 16;

/// Tuning knobs of the deletion pipeline.
#[derive(Debug, Clone, TypedBuilder)]
pub struct PipelineConfig {
    /// Number of concurrent ownership-verification workers.
    #[builder(default = DEFAULT_WORKERS)]
    pub workers: usize,
    /// Number of confirmed identifiers per `soft_delete_batch` call.
    #[builder(default = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,
    /// Capacity of the generator and merged channels.
    #[builder(default = DEFAULT_CHANNEL_CAPACITY)]
    pub channel_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeletionError {
    #[error("deletion pipeline is shutting down")]
    ShuttingDown,
}

/// Outcome of a single deletion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionReport {
    pub request_id: Uuid,
    /// Identifiers submitted by the caller.
    pub requested: usize,
    /// Identifiers confirmed to belong to the owner.
    pub confirmed: usize,
    /// Identifiers included in a successful `soft_delete_batch` call.
    pub deleted: usize,
    pub batches: usize,
    pub failed_batches: usize,
    /// The pipeline was stopped by shutdown before the input was exhausted.
    pub cancelled: bool,
}

/// Handle on a submitted deletion request.
///
/// Dropping the ticket does not stop the deletion.
#[derive(Debug)]
pub struct DeletionTicket {
    request_id: Uuid,
    handle: JoinHandle<DeletionReport>,
}

impl DeletionTicket {
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Waits for the pipeline to finish.
    ///
    /// Returns `None` if the pipeline task panicked or was aborted.
    pub async fn wait(self) -> Option<DeletionReport> {
        match self.handle.await {
            Ok(report) => Some(report),
            Err(err) => {
                warn!(request_id = %self.request_id, error = %err, "deletion task did not complete");
                None
            }
        }
    }
}

/// Cumulative counters over every request handled by a pipeline.
#[derive(Debug, Default)]
struct DeletionMetrics {
    submitted: AtomicU64,
    completed: AtomicU64,
    confirmed: AtomicU64,
    deleted: AtomicU64,
    failed_batches: AtomicU64,
}

impl DeletionMetrics {
    fn record(&self, report: &DeletionReport) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        self.confirmed
            .fetch_add(report.confirmed as u64, Ordering::Relaxed);
        self.deleted.fetch_add(report.deleted as u64, Ordering::Relaxed);
        self.failed_batches
            .fetch_add(report.failed_batches as u64, Ordering::Relaxed);
    }

    fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            confirmed: self.confirmed.load(Ordering::Relaxed),
            deleted: self.deleted.load(Ordering::Relaxed),
            failed_batches: self.failed_batches.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the pipeline counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub submitted: u64,
    pub completed: u64,
    pub confirmed: u64,
    pub deleted: u64,
    pub failed_batches: u64,
}

/// Launches and tracks deletion requests against one repository.
pub struct DeletionPipeline<R: ?Sized> {
    repository: Arc<R>,
    config: PipelineConfig,
    tracker: TaskTracker,
    token: CancellationToken,
    metrics: Arc<DeletionMetrics>,
}

impl<R: Repository + ?Sized> DeletionPipeline<R> {
    pub fn new(repository: Arc<R>, config: PipelineConfig) -> Self {
        Self {
            repository,
            config,
            tracker: TaskTracker::new(),
            token: CancellationToken::new(),
            metrics: Arc::new(DeletionMetrics::default()),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Starts deleting `ids` on behalf of `owner` and returns immediately.
    ///
    /// Only identifiers that exist and belong to `owner` are deleted; the
    /// rest are silently skipped.
    pub fn submit(
        &self,
        owner: impl Into<String>,
        ids: Vec<ShortId>,
    ) -> Result<DeletionTicket, DeletionError> {
        if self.tracker.is_closed() {
            return Err(DeletionError::ShuttingDown);
        }

        let owner = owner.into();
        let request_id = Uuid::new_v4();
        let repository = Arc::clone(&self.repository);
        let token = self.token.child_token();
        let metrics = Arc::clone(&self.metrics);
        let PipelineConfig {
            workers,
            batch_size,
            channel_capacity,
        } = self.config.clone();

        self.metrics.submitted.fetch_add(1, Ordering::Relaxed);

        let span = tracing::info_span!("deletion", %request_id, owner = %owner);
        let handle = self.tracker.spawn(
            async move {
                let requested = ids.len();

                let input = generate(ids, channel_capacity, token.clone());
                let verdicts = fan_out(&repository, &owner, &input, workers);
                drop(input);
                let merged = fan_in(verdicts, channel_capacity);
                let outcome = sink(repository.as_ref(), merged, batch_size, &token).await;

                let report = DeletionReport {
                    request_id,
                    requested,
                    confirmed: outcome.confirmed,
                    deleted: outcome.deleted,
                    batches: outcome.batches,
                    failed_batches: outcome.failed_batches,
                    cancelled: outcome.cancelled,
                };
                metrics.record(&report);

                if report.failed_batches > 0 {
                    warn!(
                        requested,
                        confirmed = report.confirmed,
                        deleted = report.deleted,
                        failed_batches = report.failed_batches,
                        "deletion finished with failed batches"
                    );
                } else {
                    info!(
                        requested,
                        confirmed = report.confirmed,
                        deleted = report.deleted,
                        cancelled = report.cancelled,
                        "deletion finished"
                    );
                }

                report
            }
            .instrument(span),
        );

        Ok(DeletionTicket { request_id, handle })
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Number of deletion requests still running.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Stops accepting requests and waits for in-flight ones.
    ///
    /// Requests still running after `grace` are cancelled: they flush what
    /// they have already confirmed and stop. Returns `true` if everything
    /// drained within the grace period.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.tracker.close();

        if tokio::time::timeout(grace, self.tracker.wait()).await.is_ok() {
            return true;
        }

        warn!(
            in_flight = self.tracker.len(),
            "deletion grace period elapsed, cancelling"
        );
        self.token.cancel();
        self.tracker.wait().await;
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tinylink_core::ShortUrl;
    use tinylink_storage::InMemoryRepository;

    async fn seeded(owner: &str, count: usize) -> (Arc<InMemoryRepository>, Vec<ShortId>) {
        let repo = Arc::new(InMemoryRepository::new());
        let mut ids = Vec::with_capacity(count);
        for i in 0..count {
            let record = ShortUrl::new(format!("https://{owner}.example/{i}"), owner);
            repo.store(&record).await.unwrap();
            ids.push(record.id);
        }
        (repo, ids)
    }

    #[test]
    fn default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.workers, 3);
        assert_eq!(config.batch_size, 10);
    }

    #[tokio::test]
    async fn ticket_reports_completion() {
        let (repo, ids) = seeded("u", 25).await;
        let pipeline = DeletionPipeline::new(repo.clone(), PipelineConfig::default());

        let report = pipeline
            .submit("u", ids.clone())
            .unwrap()
            .wait()
            .await
            .unwrap();

        assert_eq!(report.requested, 25);
        assert_eq!(report.confirmed, 25);
        assert_eq!(report.deleted, 25);
        assert_eq!(report.batches, 3);
        assert_eq!(report.failed_batches, 0);
        assert!(!report.cancelled);
        for id in &ids {
            assert!(repo.find_by_id(id).await.unwrap().deleted);
        }
    }

    #[tokio::test]
    async fn foreign_ids_are_skipped() {
        let (repo, mine) = seeded("u", 4).await;
        let theirs = ShortUrl::new("https://other.example", "v");
        repo.store(&theirs).await.unwrap();
        let pipeline = DeletionPipeline::new(repo.clone(), PipelineConfig::default());

        let mut ids = mine.clone();
        ids.push(theirs.id.clone());
        ids.push(ShortId::new("missing"));
        let report = pipeline.submit("u", ids).unwrap().wait().await.unwrap();

        assert_eq!(report.requested, 6);
        assert_eq!(report.confirmed, 4);
        assert!(!repo.find_by_id(&theirs.id).await.unwrap().deleted);
    }

    #[tokio::test]
    async fn metrics_accumulate_across_requests() {
        let (repo, ids) = seeded("u", 12).await;
        let pipeline = DeletionPipeline::new(repo, PipelineConfig::default());

        let first = pipeline.submit("u", ids[..6].to_vec()).unwrap();
        let second = pipeline.submit("u", ids[6..].to_vec()).unwrap();
        first.wait().await.unwrap();
        second.wait().await.unwrap();

        let metrics = pipeline.metrics();
        assert_eq!(metrics.submitted, 2);
        assert_eq!(metrics.completed, 2);
        assert_eq!(metrics.deleted, 12);
        assert_eq!(metrics.failed_batches, 0);
    }

    #[tokio::test]
    async fn submit_after_shutdown_is_rejected() {
        let (repo, ids) = seeded("u", 1).await;
        let pipeline = DeletionPipeline::new(repo, PipelineConfig::default());

        assert!(pipeline.shutdown(Duration::from_secs(1)).await);
        assert_eq!(
            pipeline.submit("u", ids).unwrap_err(),
            DeletionError::ShuttingDown
        );
    }

    #[tokio::test]
    async fn shutdown_drains_in_flight_requests() {
        let (repo, ids) = seeded("u", 30).await;
        let pipeline = DeletionPipeline::new(repo.clone(), PipelineConfig::default());

        let ticket = pipeline.submit("u", ids.clone()).unwrap();
        assert!(pipeline.shutdown(Duration::from_secs(5)).await);
        assert_eq!(pipeline.in_flight(), 0);

        let report = ticket.wait().await.unwrap();
        assert_eq!(report.deleted, 30);
    }
}
