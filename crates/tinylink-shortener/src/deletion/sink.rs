use tinylink_core::{Repository, ShortId};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Counters collected by [`sink`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkOutcome {
    /// Verdicts received, positive or not.
    pub received: usize,
    pub confirmed: usize,
    pub deleted: usize,
    pub batches: usize,
    pub failed_batches: usize,
    pub cancelled: bool,
}

/// Buffers confirmed identifiers and soft-deletes them in batches.
///
/// A batch is written as soon as `batch_size` identifiers are buffered; the
/// remainder is written when `verdicts` closes or `token` is cancelled. No
/// call is made with an empty batch. A failed batch is logged and counted,
/// and the sink carries on with the next one.
pub async fn sink<R: Repository + ?Sized>(
    repository: &R,
    mut verdicts: mpsc::Receiver<Option<ShortId>>,
    batch_size: usize,
    token: &CancellationToken,
) -> SinkOutcome {
    let batch_size = batch_size.max(1);
    let mut outcome = SinkOutcome::default();
    let mut buffer = Vec::with_capacity(batch_size);

    loop {
        let verdict = tokio::select! {
            biased;
            _ = token.cancelled() => {
                outcome.cancelled = true;
                break;
            }
            verdict = verdicts.recv() => verdict,
        };

        let Some(verdict) = verdict else {
            break;
        };
        outcome.received += 1;

        let Some(id) = verdict else {
            continue;
        };
        outcome.confirmed += 1;
        buffer.push(id);

        if buffer.len() >= batch_size {
            flush(repository, &mut buffer, &mut outcome).await;
        }
    }

    flush(repository, &mut buffer, &mut outcome).await;
    outcome
}

async fn flush<R: Repository + ?Sized>(
    repository: &R,
    buffer: &mut Vec<ShortId>,
    outcome: &mut SinkOutcome,
) {
    if buffer.is_empty() {
        return;
    }

    let batch = std::mem::take(buffer);
    outcome.batches += 1;

    match repository.soft_delete_batch(&batch).await {
        Ok(()) => {
            outcome.deleted += batch.len();
            debug!(size = batch.len(), "batch soft deleted");
        }
        Err(err) => {
            outcome.failed_batches += 1;
            error!(size = batch.len(), error = %err, "batch soft delete failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tinylink_core::ShortUrl;
    use tinylink_storage::InMemoryRepository;

    async fn seeded(count: usize) -> (InMemoryRepository, Vec<ShortId>) {
        let repo = InMemoryRepository::new();
        let mut ids = Vec::with_capacity(count);
        for i in 0..count {
            let record = ShortUrl::new(format!("https://example.com/{i}"), "me");
            repo.store(&record).await.unwrap();
            ids.push(record.id);
        }
        (repo, ids)
    }

    fn feed(verdicts: Vec<Option<ShortId>>) -> mpsc::Receiver<Option<ShortId>> {
        let (tx, rx) = mpsc::channel(verdicts.len().max(1));
        for verdict in verdicts {
            tx.try_send(verdict).unwrap();
        }
        rx
    }

    #[tokio::test]
    async fn writes_full_batches_at_threshold() {
        let (repo, ids) = seeded(20).await;

        let outcome = sink(
            &repo,
            feed(ids.iter().cloned().map(Some).collect()),
            10,
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(outcome.batches, 2);
        assert_eq!(outcome.deleted, 20);
    }

    #[tokio::test]
    async fn flushes_partial_batch_on_close() {
        let (repo, ids) = seeded(3).await;

        let outcome = sink(
            &repo,
            feed(ids.iter().cloned().map(Some).collect()),
            10,
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(outcome.batches, 1);
        assert_eq!(outcome.deleted, 3);
        for id in &ids {
            assert!(repo.find_by_id(id).await.unwrap().deleted);
        }
    }

    #[tokio::test]
    async fn negative_verdicts_are_skipped() {
        let (repo, ids) = seeded(2).await;

        let outcome = sink(
            &repo,
            feed(vec![None, Some(ids[0].clone()), None]),
            10,
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(outcome.received, 3);
        assert_eq!(outcome.confirmed, 1);
        assert!(!repo.find_by_id(&ids[1]).await.unwrap().deleted);
    }

    #[tokio::test]
    async fn no_write_without_confirmed_ids() {
        let repo = InMemoryRepository::new();

        let outcome = sink(&repo, feed(vec![None, None]), 1, &CancellationToken::new()).await;

        assert_eq!(outcome.batches, 0);
        assert_eq!(outcome.deleted, 0);
    }

    #[tokio::test]
    async fn cancellation_flushes_buffer_and_stops() {
        let (repo, ids) = seeded(1).await;
        let (tx, rx) = mpsc::channel(4);
        let token = CancellationToken::new();

        let cancel_once_received = async {
            tx.send(Some(ids[0].clone())).await.unwrap();
            while tx.capacity() < tx.max_capacity() {
                tokio::task::yield_now().await;
            }
            token.cancel();
        };
        let (outcome, ()) = tokio::join!(sink(&repo, rx, 10, &token), cancel_once_received);

        assert!(outcome.cancelled);
        assert_eq!(outcome.confirmed, 1);
        assert_eq!(outcome.batches, 1);
        assert_eq!(outcome.deleted, 1);
        assert!(repo.find_by_id(&ids[0]).await.unwrap().deleted);
    }
}
