use crate::short_id::ShortId;
use serde::{Deserialize, Serialize};

/// A shortened URL as persisted by every backend.
///
/// Records are never physically removed: soft deletion flips `deleted` once,
/// from `false` to `true`. The owner is fixed at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortUrl {
    #[serde(rename = "uuid")]
    pub id: ShortId,
    #[serde(rename = "user_id")]
    pub owner: String,
    #[serde(rename = "original_URL")]
    pub original_url: String,
    #[serde(rename = "is_deleted", default)]
    pub deleted: bool,
}

impl ShortUrl {
    /// Creates a live record, deriving the identifier from `original_url`.
    pub fn new(original_url: impl Into<String>, owner: impl Into<String>) -> Self {
        let original_url = original_url.into();
        Self {
            id: ShortId::from_url(&original_url),
            owner: owner.into(),
            original_url,
            deleted: false,
        }
    }

    /// Whether the record belongs to `owner`.
    pub fn is_owned_by(&self, owner: &str) -> bool {
        self.owner == owner
    }
}

/// Aggregate counters over every stored record, deleted ones included.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub urls: u64,
    pub users: u64,
}
