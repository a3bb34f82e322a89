use crate::auth::JwtKeys;
use ipnet::IpNet;
use std::sync::Arc;
use tinylink_core::{Repository, ShortId};
use tinylink_shortener::ShortenerService;

#[derive(Clone)]
pub struct AppState {
    shortener: Arc<ShortenerService<dyn Repository>>,
    base_url: Arc<str>,
    keys: Arc<JwtKeys>,
    trusted_subnet: Option<IpNet>,
}

impl AppState {
    pub fn new(
        shortener: Arc<ShortenerService<dyn Repository>>,
        public_base_url: impl Into<String>,
        keys: JwtKeys,
        trusted_subnet: Option<IpNet>,
    ) -> Self {
        Self {
            shortener,
            base_url: Arc::from(public_base_url.into()),
            keys: Arc::new(keys),
            trusted_subnet,
        }
    }

    pub fn shortener(&self) -> &ShortenerService<dyn Repository> {
        &self.shortener
    }

    pub fn keys(&self) -> &JwtKeys {
        &self.keys
    }

    pub fn trusted_subnet(&self) -> Option<&IpNet> {
        self.trusted_subnet.as_ref()
    }

    /// Full short link for `id`.
    pub fn short_url(&self, id: &ShortId) -> String {
        id.to_url(&self.base_url)
    }
}
