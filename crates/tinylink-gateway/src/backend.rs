//! Storage backend selection at startup.

use std::path::Path;
use std::sync::Arc;
use tinylink_core::{Repository, Result};
use tinylink_storage::{InMemoryRepository, MySqlRepository};
use tracing::{info, warn};

/// Opens the best available backend.
///
/// A reachable database wins; otherwise the file-backed store is used when a
/// path is given, and an ephemeral in-memory store as the last resort.
pub async fn open_repository(
    database_dsn: Option<&str>,
    file_storage_path: Option<&Path>,
) -> Result<Arc<dyn Repository>> {
    if let Some(dsn) = database_dsn {
        match MySqlRepository::connect(dsn).await {
            Ok(repository) => {
                info!(backend = "mysql", "storage ready");
                return Ok(Arc::new(repository));
            }
            Err(err) => {
                warn!(error = %err, "database unavailable, falling back to local storage");
            }
        }
    }

    if let Some(path) = file_storage_path {
        let repository = InMemoryRepository::open(path).await?;
        info!(
            backend = "file",
            path = %path.display(),
            records = repository.len(),
            "storage ready"
        );
        return Ok(Arc::new(repository));
    }

    warn!(backend = "memory", "no persistent storage configured, data will be lost on exit");
    Ok(Arc::new(InMemoryRepository::new()))
}
