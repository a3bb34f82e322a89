use crate::error::Result;
use crate::model::{ShortUrl, Stats};
use crate::short_id::ShortId;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

/// Capacity of the verdict channel returned by
/// [`Repository::verify_ownership_stream`]. Workers hand over one verdict at
/// a time, so a slow consumer applies back-pressure to the lookups.
pub const VERDICT_CHANNEL_CAPACITY: usize = 1;

/// Storage contract shared by every backend.
///
/// All implementations must be safe for concurrent calls: the deletion
/// pipeline verifies ownership from several tasks at once while the request
/// path keeps storing and resolving URLs against the same instance.
#[async_trait]
pub trait Repository: Send + Sync + 'static {
    /// Inserts a new record.
    ///
    /// Returns `Err(Conflict)` if a record with the same identifier already
    /// exists; the existing record is left untouched.
    async fn store(&self, record: &ShortUrl) -> Result<()>;

    /// Retrieves the full record, including its deleted flag.
    ///
    /// Returns `Err(NotFound)` when no record has this identifier. Deleted
    /// records are returned as-is and callers must check the flag.
    async fn find_by_id(&self, id: &ShortId) -> Result<ShortUrl>;

    /// Inserts many records at once, keyed by caller-chosen correlation ids.
    ///
    /// Identifiers that already exist are skipped rather than reported as
    /// conflicts. The returned map carries the identifier for every
    /// correlation id, skipped or inserted.
    async fn store_batch(
        &self,
        owner: &str,
        urls: HashMap<String, String>,
    ) -> Result<HashMap<String, ShortId>>;

    /// Lists every record of `owner`, deleted ones included.
    async fn get_all_for_owner(&self, owner: &str) -> Result<Vec<ShortUrl>>;

    /// Marks every listed identifier as deleted. Unknown and already deleted
    /// identifiers are ignored.
    async fn soft_delete_batch(&self, ids: &[ShortId]) -> Result<()>;

    /// Counts stored records and distinct owners.
    async fn stats(&self) -> Result<Stats>;

    /// Checks that the backend is reachable.
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    /// Flushes and releases the backend. Called once at shutdown.
    async fn close(&self) -> Result<()> {
        Ok(())
    }

    /// Verifies ownership for every identifier received on `input`.
    ///
    /// Spawns one task that emits exactly one verdict per received
    /// identifier: `Some(id)` when the record exists and belongs to `owner`,
    /// `None` otherwise. Lookup failures are logged and reported as `None`.
    /// Several calls may share one `input`; each identifier is then consumed
    /// by exactly one of them. The returned channel closes once `input` is
    /// closed and drained, or as soon as the receiver is dropped.
    fn verify_ownership_stream(
        self: Arc<Self>,
        owner: String,
        input: async_channel::Receiver<ShortId>,
    ) -> mpsc::Receiver<Option<ShortId>> {
        let (tx, rx) = mpsc::channel(VERDICT_CHANNEL_CAPACITY);

        tokio::spawn(async move {
            while let Ok(id) = input.recv().await {
                let verdict = match self.find_by_id(&id).await {
                    Ok(record) if record.is_owned_by(&owner) => Some(id),
                    Ok(_) => None,
                    Err(err) if err.is_not_found() => None,
                    Err(err) => {
                        warn!(%id, owner = %owner, error = %err, "ownership check failed");
                        None
                    }
                };

                if tx.send(verdict).await.is_err() {
                    break;
                }
            }
        });

        rx
    }
}
