use async_trait::async_trait;
use sqlx::migrate::Migrator;
use sqlx::mysql::MySqlRow;
use sqlx::{MySql, MySqlPool, QueryBuilder, Row};
use std::collections::{HashMap, HashSet};
use tinylink_core::{Repository, Result, ShortId, ShortUrl, Stats, StorageError};
use tracing::{debug, info};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// MySQL implementation of the repository contract.
///
/// Soft delete is implemented with the `is_deleted` flag; rows are never
/// removed. Conflict detection relies on the unique index over `short_code`,
/// so a code is never reused, including by soft-deleted rows.
#[derive(Debug, Clone)]
pub struct MySqlRepository {
    pool: MySqlPool,
}

impl MySqlRepository {
    /// Creates a repository from an existing MySQL connection pool.
    ///
    /// The schema is expected to exist; see [`MySqlRepository::migrate`].
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Creates a repository by opening a new MySQL connection pool and
    /// applying the embedded migrations.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = MySqlPool::connect(database_url)
            .await
            .map_err(map_sqlx_error)?;
        let repository = Self::new(pool);
        repository.migrate().await?;
        Ok(repository)
    }

    /// Applies the embedded migrations. Already applied ones are skipped.
    pub async fn migrate(&self) -> Result<()> {
        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| StorageError::Operation(format!("migration failed: {e}")))?;
        info!("mysql migrations applied");
        Ok(())
    }

    /// Returns a reference to the underlying pool.
    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(sqlx::error::DatabaseError::is_unique_violation)
}

fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    let message = err.to_string();

    match err {
        sqlx::Error::PoolTimedOut => StorageError::Timeout(message),
        sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StorageError::Unavailable(message),
        sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::RowNotFound => StorageError::InvalidData(message),
        _ => StorageError::Query(message),
    }
}

fn row_to_short_url(row: &MySqlRow) -> Result<ShortUrl> {
    let short_code: String = row.try_get("short_code").map_err(map_sqlx_error)?;
    let owner: String = row.try_get("owner").map_err(map_sqlx_error)?;
    let original_url: String = row.try_get("original_url").map_err(map_sqlx_error)?;
    let deleted: bool = row.try_get("is_deleted").map_err(map_sqlx_error)?;

    Ok(ShortUrl {
        id: ShortId::new(short_code),
        owner,
        original_url,
        deleted,
    })
}

#[async_trait]
impl Repository for MySqlRepository {
    async fn store(&self, record: &ShortUrl) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO short_urls (short_code, original_url, owner)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(record.id.as_str())
        .bind(record.original_url.as_str())
        .bind(record.owner.as_str())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => {
                Err(StorageError::Conflict(record.id.to_string()))
            }
            Err(err) => Err(map_sqlx_error(err)),
        }
    }

    async fn find_by_id(&self, id: &ShortId) -> Result<ShortUrl> {
        let row = sqlx::query(
            r#"
            SELECT short_code, owner, original_url, is_deleted
            FROM short_urls
            WHERE short_code = ?
            LIMIT 1
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        match row {
            Some(row) => row_to_short_url(&row),
            None => Err(StorageError::NotFound(id.to_string())),
        }
    }

    async fn store_batch(
        &self,
        owner: &str,
        urls: HashMap<String, String>,
    ) -> Result<HashMap<String, ShortId>> {
        if urls.is_empty() {
            return Ok(HashMap::new());
        }

        let records: Vec<(String, ShortUrl)> = urls
            .into_iter()
            .map(|(correlation_id, url)| (correlation_id, ShortUrl::new(url, owner)))
            .collect();

        let mut lookup = QueryBuilder::<MySql>::new(
            "SELECT short_code FROM short_urls WHERE short_code IN (",
        );
        let mut separated = lookup.separated(", ");
        for (_, record) in &records {
            separated.push_bind(record.id.as_str().to_owned());
        }
        separated.push_unseparated(")");

        let mut present: HashSet<String> = lookup
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?
            .iter()
            .map(|row| row.try_get::<String, _>("short_code"))
            .collect::<std::result::Result<_, _>>()
            .map_err(map_sqlx_error)?;

        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        let mut ids = HashMap::with_capacity(records.len());
        let mut inserted = 0usize;

        for (correlation_id, record) in records {
            if present.insert(record.id.as_str().to_owned()) {
                let result = sqlx::query(
                    r#"
                    INSERT INTO short_urls (short_code, original_url, owner)
                    VALUES (?, ?, ?)
                    "#,
                )
                .bind(record.id.as_str())
                .bind(record.original_url.as_str())
                .bind(record.owner.as_str())
                .execute(&mut *tx)
                .await;

                if let Err(err) = result {
                    tx.rollback().await.map_err(map_sqlx_error)?;
                    return Err(map_sqlx_error(err));
                }
                inserted += 1;
            }
            ids.insert(correlation_id, record.id);
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        debug!(owner, requested = ids.len(), inserted, "batch stored");

        Ok(ids)
    }

    async fn get_all_for_owner(&self, owner: &str) -> Result<Vec<ShortUrl>> {
        let rows = sqlx::query(
            r#"
            SELECT short_code, owner, original_url, is_deleted
            FROM short_urls
            WHERE owner = ?
            ORDER BY id
            "#,
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.iter().map(row_to_short_url).collect()
    }

    async fn soft_delete_batch(&self, ids: &[ShortId]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let mut query = QueryBuilder::<MySql>::new(
            "UPDATE short_urls SET is_deleted = TRUE WHERE short_code IN (",
        );
        let mut separated = query.separated(", ");
        for id in ids {
            separated.push_bind(id.as_str().to_owned());
        }
        separated.push_unseparated(")");

        let result = query
            .build()
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        debug!(
            requested = ids.len(),
            affected = result.rows_affected(),
            "soft deleted batch"
        );
        Ok(())
    }

    async fn stats(&self) -> Result<Stats> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS urls, COUNT(DISTINCT owner) AS users
            FROM short_urls
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let urls: i64 = row.try_get("urls").map_err(map_sqlx_error)?;
        let users: i64 = row.try_get("users").map_err(map_sqlx_error)?;

        Ok(Stats {
            urls: urls.max(0) as u64,
            users: users.max(0) as u64,
        })
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}
