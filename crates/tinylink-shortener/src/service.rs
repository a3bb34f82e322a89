use crate::deletion::{DeletionPipeline, DeletionTicket, MetricsSnapshot, PipelineConfig};
use crate::error::ShortenerError;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tinylink_core::{Repository, ShortId, ShortUrl, Stats};
use tracing::{debug, info, warn};

/// The shortener use cases on top of a repository.
///
/// Holds the repository together with the deletion pipeline that runs
/// against the same instance, so request handling and background deletion
/// see one consistent store.
pub struct ShortenerService<R: ?Sized> {
    repository: Arc<R>,
    deletions: DeletionPipeline<R>,
}

impl<R: Repository + ?Sized> ShortenerService<R> {
    pub fn new(repository: Arc<R>, config: PipelineConfig) -> Self {
        let deletions = DeletionPipeline::new(Arc::clone(&repository), config);
        Self {
            repository,
            deletions,
        }
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repository
    }

    /// Validates that the URL has a scheme and a host.
    fn validate_url(url: &str) -> Result<(), ShortenerError> {
        if url.is_empty() {
            return Err(ShortenerError::InvalidUrl(
                "URL cannot be empty".to_string(),
            ));
        }

        match url.split_once("://") {
            Some((scheme, rest))
                if !scheme.is_empty()
                    && scheme
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
                    && !rest.split(['/', '?', '#']).next().unwrap_or_default().is_empty() =>
            {
                Ok(())
            }
            _ => Err(ShortenerError::InvalidUrl(format!(
                "URL must have a valid scheme and host: {url}"
            ))),
        }
    }

    /// Shortens `url` on behalf of `owner`.
    ///
    /// Shortening a URL that is already stored fails with
    /// [`ShortenerError::Conflict`] carrying the existing identifier.
    pub async fn shorten(&self, owner: &str, url: &str) -> Result<ShortId, ShortenerError> {
        Self::validate_url(url)?;

        let record = ShortUrl::new(url, owner);
        match self.repository.store(&record).await {
            Ok(()) => {
                debug!(id = %record.id, owner, "url shortened");
                Ok(record.id)
            }
            Err(err) if err.is_conflict() => Err(ShortenerError::Conflict(record.id)),
            Err(err) => Err(err.into()),
        }
    }

    /// Shortens several URLs at once, keyed by caller correlation ids.
    ///
    /// Already stored URLs are not an error here; their existing identifier
    /// is returned. Results follow the order of `items`.
    pub async fn shorten_batch(
        &self,
        owner: &str,
        items: Vec<(String, String)>,
    ) -> Result<Vec<(String, ShortId)>, ShortenerError> {
        for (_, url) in &items {
            Self::validate_url(url)?;
        }

        let correlation_ids: Vec<String> = items.iter().map(|(id, _)| id.clone()).collect();
        let urls: HashMap<String, String> = items.into_iter().collect();
        let ids = self.repository.store_batch(owner, urls).await?;

        Ok(correlation_ids
            .into_iter()
            .filter_map(|correlation_id| {
                let id = ids.get(&correlation_id)?.clone();
                Some((correlation_id, id))
            })
            .collect())
    }

    /// Resolves an identifier to its original URL.
    pub async fn expand(&self, id: &ShortId) -> Result<String, ShortenerError> {
        let record = self.repository.find_by_id(id).await?;
        if record.deleted {
            return Err(ShortenerError::Gone(record.id));
        }
        Ok(record.original_url)
    }

    /// Every record of `owner`, deleted ones included.
    pub async fn user_urls(&self, owner: &str) -> Result<Vec<ShortUrl>, ShortenerError> {
        Ok(self.repository.get_all_for_owner(owner).await?)
    }

    /// Schedules soft deletion of `ids` owned by `owner` and returns
    /// immediately.
    pub fn delete_urls(
        &self,
        owner: &str,
        ids: Vec<ShortId>,
    ) -> Result<DeletionTicket, ShortenerError> {
        let ticket = self.deletions.submit(owner, ids)?;
        debug!(request_id = %ticket.request_id(), owner, "deletion scheduled");
        Ok(ticket)
    }

    pub async fn stats(&self) -> Result<Stats, ShortenerError> {
        Ok(self.repository.stats().await?)
    }

    pub async fn ping(&self) -> Result<(), ShortenerError> {
        Ok(self.repository.ping().await?)
    }

    pub fn deletion_metrics(&self) -> MetricsSnapshot {
        self.deletions.metrics()
    }

    /// Drains pending deletions for up to `grace`, then closes the
    /// repository.
    pub async fn shutdown(&self, grace: Duration) -> Result<(), ShortenerError> {
        if !self.deletions.shutdown(grace).await {
            warn!("pending deletions were cancelled during shutdown");
        }
        self.repository.close().await?;
        info!("shortener service stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tinylink_storage::InMemoryRepository;

    fn test_service() -> ShortenerService<InMemoryRepository> {
        ShortenerService::new(
            Arc::new(InMemoryRepository::new()),
            PipelineConfig::default(),
        )
    }

    #[tokio::test]
    async fn shorten_returns_hash_identifier() {
        let service = test_service();

        let id = service
            .shorten("1", "https://practicum.yandex.ru/")
            .await
            .unwrap();
        assert_eq!(id.as_str(), "2187b119");
    }

    #[tokio::test]
    async fn shorten_twice_conflicts_with_existing_id() {
        let service = test_service();

        service.shorten("1", "https://example.com").await.unwrap();
        let err = service.shorten("2", "https://example.com").await.unwrap_err();

        assert!(matches!(err, ShortenerError::Conflict(id) if id.as_str() == "df00322f"));
    }

    #[tokio::test]
    async fn shorten_with_invalid_url_fails() {
        let service = test_service();

        for url in ["", "not-a-valid-url", "://host", "http://", "http:///path"] {
            let err = service.shorten("1", url).await.unwrap_err();
            assert!(matches!(err, ShortenerError::InvalidUrl(_)), "{url}");
        }
    }

    #[tokio::test]
    async fn expand_live_deleted_and_unknown() {
        let service = test_service();
        let id = service.shorten("1", "https://example.com").await.unwrap();

        assert_eq!(service.expand(&id).await.unwrap(), "https://example.com");

        service.repository().soft_delete_batch(&[id.clone()]).await.unwrap();
        assert!(matches!(
            service.expand(&id).await.unwrap_err(),
            ShortenerError::Gone(_)
        ));

        assert!(matches!(
            service.expand(&ShortId::new("deadbeef")).await.unwrap_err(),
            ShortenerError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn shorten_batch_maps_correlation_ids() {
        let service = test_service();
        service.shorten("other", "https://a.example").await.unwrap();

        let ids = service
            .shorten_batch(
                "1",
                vec![
                    ("x".to_string(), "https://a.example".to_string()),
                    ("y".to_string(), "https://b.example".to_string()),
                ],
            )
            .await
            .unwrap();

        assert_eq!(
            ids,
            vec![
                ("x".to_string(), ShortId::from_url("https://a.example")),
                ("y".to_string(), ShortId::from_url("https://b.example")),
            ]
        );
        assert_eq!(service.user_urls("1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn shorten_batch_rejects_any_invalid_url() {
        let service = test_service();

        let err = service
            .shorten_batch(
                "1",
                vec![
                    ("x".to_string(), "https://a.example".to_string()),
                    ("y".to_string(), "nope".to_string()),
                ],
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ShortenerError::InvalidUrl(_)));
        assert_eq!(service.stats().await.unwrap(), Stats::default());
    }

    #[tokio::test]
    async fn delete_urls_only_touches_owned_records() {
        let service = test_service();
        let mine = service.shorten("1", "https://practicum.yandex.ru/").await.unwrap();
        let theirs = service.shorten("2", "https://example.com").await.unwrap();

        let report = service
            .delete_urls("1", vec![mine.clone(), theirs.clone()])
            .unwrap()
            .wait()
            .await
            .unwrap();

        assert_eq!(report.deleted, 1);
        assert!(matches!(
            service.expand(&mine).await.unwrap_err(),
            ShortenerError::Gone(_)
        ));
        assert_eq!(service.expand(&theirs).await.unwrap(), "https://example.com");
        assert_eq!(service.deletion_metrics().deleted, 1);
    }

    #[tokio::test]
    async fn stats_and_ping() {
        let service = test_service();
        service.shorten("1", "https://a.example").await.unwrap();
        service.shorten("1", "https://b.example").await.unwrap();
        service.shorten("2", "https://c.example").await.unwrap();

        assert_eq!(service.stats().await.unwrap(), Stats { urls: 3, users: 2 });
        service.ping().await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_rejects_new_deletions() {
        let service = test_service();
        let id = service.shorten("1", "https://example.com").await.unwrap();

        service.shutdown(Duration::from_secs(1)).await.unwrap();

        assert!(matches!(
            service.delete_urls("1", vec![id]).unwrap_err(),
            ShortenerError::Deletion(_)
        ));
    }

    #[tokio::test]
    async fn works_behind_trait_object() {
        let repository: Arc<dyn Repository> = Arc::new(InMemoryRepository::new());
        let service = ShortenerService::new(repository, PipelineConfig::default());

        let id = service.shorten("1", "test").await;
        assert!(matches!(id, Err(ShortenerError::InvalidUrl(_))));

        let id = service.shorten("1", "https://example.com").await.unwrap();
        service.delete_urls("1", vec![id.clone()]).unwrap().wait().await.unwrap();
        assert!(matches!(
            service.expand(&id).await.unwrap_err(),
            ShortenerError::Gone(_)
        ));
    }
}
