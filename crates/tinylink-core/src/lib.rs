//! Core types and traits for the tinylink URL shortener.
//!
//! This crate provides the identifier function, the persisted entity and the
//! storage contract shared by the storage backends, the shortener service
//! and the transports.

pub mod error;
pub mod model;
pub mod repository;
pub mod short_id;

pub use error::{Result, StorageError};
pub use model::{ShortUrl, Stats};
pub use repository::Repository;
pub use short_id::ShortId;
