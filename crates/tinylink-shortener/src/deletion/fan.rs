use std::sync::Arc;
use tinylink_core::{Repository, ShortId};
use tokio::sync::mpsc;

/// Starts `workers` ownership verifiers that all pull from the same `input`.
///
/// Each identifier is consumed by exactly one worker. A zero worker count is
/// treated as one.
pub fn fan_out<R: Repository + ?Sized>(
    repository: &Arc<R>,
    owner: &str,
    input: &async_channel::Receiver<ShortId>,
    workers: usize,
) -> Vec<mpsc::Receiver<Option<ShortId>>> {
    (0..workers.max(1))
        .map(|_| Arc::clone(repository).verify_ownership_stream(owner.to_owned(), input.clone()))
        .collect()
}

/// Merges verdict streams into one channel.
///
/// One forwarder task runs per stream. The merged channel closes after the
/// last forwarder finishes, which happens only once every source stream is
/// closed. If the merged receiver is dropped the forwarders stop and drop
/// their sources in turn.
pub fn fan_in(
    streams: Vec<mpsc::Receiver<Option<ShortId>>>,
    capacity: usize,
) -> mpsc::Receiver<Option<ShortId>> {
    let (tx, rx) = mpsc::channel(capacity.max(1));

    for mut stream in streams {
        let tx = tx.clone();
        tokio::spawn(async move {
            while let Some(verdict) = stream.recv().await {
                if tx.send(verdict).await.is_err() {
                    break;
                }
            }
        });
    }

    rx
}
