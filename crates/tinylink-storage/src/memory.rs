use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tinylink_core::{Repository, Result, ShortId, ShortUrl, Stats, StorageError};
use tracing::{debug, info, warn};

/// In-memory implementation of the Repository trait using DashMap.
///
/// DashMap provides better concurrency than RwLock<HashMap> because it
/// uses sharded locks, allowing concurrent reads and writes to different
/// buckets without blocking.
///
/// A repository opened with [`InMemoryRepository::open`] is backed by a
/// JSON-lines file: the file is replayed on open and rewritten as a whole by
/// [`flush`](InMemoryRepository::flush) / [`close`](Repository::close).
/// Writes in between are not durable.
#[derive(Debug)]
pub struct InMemoryRepository {
    storage: DashMap<String, ShortUrl>,
    path: Option<PathBuf>,
}

impl InMemoryRepository {
    /// Creates a new ephemeral in-memory repository.
    pub fn new() -> Self {
        Self {
            storage: DashMap::new(),
            path: None,
        }
    }

    /// Opens a file-backed repository, replaying the records stored at `path`.
    ///
    /// A missing file is created empty. Replay stops at the first record that
    /// cannot be decoded; everything before it is kept. When a record appears
    /// more than once the last one wins.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tokio::fs::File::create(&path).await?;
                Vec::new()
            }
            Err(err) => return Err(err.into()),
        };

        let storage = DashMap::new();
        let records = serde_json::Deserializer::from_slice(&bytes).into_iter::<ShortUrl>();
        for (index, record) in records.enumerate() {
            match record {
                Ok(record) => {
                    storage.insert(record.id.as_str().to_owned(), record);
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        record = index,
                        error = %err,
                        "stopping replay at undecodable record"
                    );
                    break;
                }
            }
        }

        info!(path = %path.display(), records = storage.len(), "file storage loaded");

        Ok(Self {
            storage,
            path: Some(path),
        })
    }

    /// Path of the backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Number of stored records, deleted ones included.
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Rewrites the backing file with the current contents of the map.
    ///
    /// The snapshot is written to a sibling temporary file first and then
    /// renamed over the target. No-op for ephemeral repositories.
    pub async fn flush(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let mut records: Vec<ShortUrl> = self
            .storage
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));

        let mut buffer = Vec::new();
        for record in &records {
            serde_json::to_writer(&mut buffer, record)
                .map_err(|e| StorageError::InvalidData(e.to_string()))?;
            buffer.push(b'\n');
        }

        let tmp_path = temporary_path(path);
        tokio::fs::write(&tmp_path, &buffer).await?;
        tokio::fs::rename(&tmp_path, path).await?;

        debug!(path = %path.display(), records = records.len(), "file storage flushed");
        Ok(())
    }
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

fn temporary_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn store(&self, record: &ShortUrl) -> Result<()> {
        // The entry guard holds the shard lock, so check-and-insert is atomic.
        match self.storage.entry(record.id.as_str().to_owned()) {
            Entry::Occupied(_) => Err(StorageError::Conflict(record.id.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(())
            }
        }
    }

    async fn find_by_id(&self, id: &ShortId) -> Result<ShortUrl> {
        self.storage
            .get(id.as_str())
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    async fn store_batch(
        &self,
        owner: &str,
        urls: HashMap<String, String>,
    ) -> Result<HashMap<String, ShortId>> {
        let mut ids = HashMap::with_capacity(urls.len());

        for (correlation_id, url) in urls {
            let record = ShortUrl::new(url, owner);
            let id = record.id.clone();
            self.storage
                .entry(id.as_str().to_owned())
                .or_insert(record);
            ids.insert(correlation_id, id);
        }

        Ok(ids)
    }

    async fn get_all_for_owner(&self, owner: &str) -> Result<Vec<ShortUrl>> {
        let mut records: Vec<ShortUrl> = self
            .storage
            .iter()
            .filter(|entry| entry.value().is_owned_by(owner))
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }

    async fn soft_delete_batch(&self, ids: &[ShortId]) -> Result<()> {
        for id in ids {
            if let Some(mut entry) = self.storage.get_mut(id.as_str()) {
                entry.deleted = true;
            }
        }
        Ok(())
    }

    async fn stats(&self) -> Result<Stats> {
        let mut owners = HashSet::new();
        for entry in self.storage.iter() {
            owners.insert(entry.value().owner.clone());
        }

        Ok(Stats {
            urls: self.storage.len() as u64,
            users: owners.len() as u64,
        })
    }

    async fn close(&self) -> Result<()> {
        self.flush().await
    }
}
