use tinylink_core::ShortId;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Feeds `ids` into a bounded channel shared by the ownership workers.
///
/// The channel closes once every identifier has been sent, when all
/// receivers are gone, or when `token` is cancelled.
pub fn generate(
    ids: Vec<ShortId>,
    capacity: usize,
    token: CancellationToken,
) -> async_channel::Receiver<ShortId> {
    let (tx, rx) = async_channel::bounded(capacity.max(1));

    tokio::spawn(async move {
        for id in ids {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!("generator cancelled");
                    break;
                }
                sent = tx.send(id) => {
                    if sent.is_err() {
                        break;
                    }
                }
            }
        }
    });

    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(count: usize) -> Vec<ShortId> {
        (0..count).map(|i| ShortId::new(format!("{i:08x}"))).collect()
    }

    #[tokio::test]
    async fn yields_every_id_in_order_then_closes() {
        let rx = generate(ids(5), 2, CancellationToken::new());

        let mut got = Vec::new();
        while let Ok(id) = rx.recv().await {
            got.push(id);
        }

        assert_eq!(got, ids(5));
    }

    #[tokio::test]
    async fn empty_input_closes_immediately() {
        let rx = generate(Vec::new(), 4, CancellationToken::new());
        assert!(rx.recv().await.is_err());
    }

    #[tokio::test]
    async fn cancellation_stops_emission() {
        let token = CancellationToken::new();
        let rx = generate(ids(100), 1, token.clone());

        assert!(rx.recv().await.is_ok());
        token.cancel();

        let mut remaining = 0;
        while rx.recv().await.is_ok() {
            remaining += 1;
        }
        // At most the slot already buffered before cancellation is observed.
        assert!(remaining <= 1, "received {remaining} ids after cancel");
    }

    #[tokio::test]
    async fn stops_when_receiver_is_dropped() {
        let rx = generate(ids(100), 1, CancellationToken::new());
        rx.close();
        drop(rx);
        // Nothing to assert beyond the task not hanging the runtime.
        tokio::task::yield_now().await;
    }
}
