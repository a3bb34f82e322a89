//! Storage backends for the tinylink URL shortener.
//!
//! Both backends implement [`tinylink_core::Repository`] and are safe for
//! concurrent calls:
//!
//! - [`InMemoryRepository`] keeps every record in a sharded map and can
//!   persist itself to a JSON-lines file at shutdown.
//! - [`MySqlRepository`] stores records in MySQL and relies on the unique
//!   index on `short_code` for conflict detection.

pub mod memory;
pub mod mysql;

pub use memory::InMemoryRepository;
pub use mysql::MySqlRepository;
pub use tinylink_core::{Repository, Result, ShortId, ShortUrl, Stats, StorageError};
