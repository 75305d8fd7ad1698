//! Durable transcript storage.
//!
//! Each guest message is appended to a single `guest_messages` table keyed by
//! guest identifier, with a server-assigned timestamp. Adapters open and
//! close one connection per operation and create the schema idempotently on
//! each connection; no transaction spans more than a single insert.

pub mod mysql;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::completion::Role;
use crate::config::DatabaseConfig;

pub use mysql::MySqlMessageStore;
pub use sqlite::SqliteMessageStore;

/// One persisted guest message.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMessage {
    pub id: i64,
    pub guest_id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Durable-storage boundary. `append` is at-most-once per message: a failed
/// write is reported and never retried.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn append(&self, guest_id: &str, role: Role, content: &str) -> Result<()>;

    /// A guest's messages in original submission order.
    async fn history(&self, guest_id: &str) -> Result<Vec<StoredMessage>>;
}

/// Select the storage backend from configuration: a `sqlite:` URL override
/// picks SQLite, anything else is MySQL.
pub fn open_store(config: &DatabaseConfig) -> Result<Arc<dyn MessageStore>> {
    match &config.url {
        Some(url) if url.starts_with("sqlite:") => {
            Ok(Arc::new(SqliteMessageStore::from_url(url)?))
        }
        Some(url) => Ok(Arc::new(MySqlMessageStore::from_url(url)?)),
        None => Ok(Arc::new(MySqlMessageStore::new(config))),
    }
}
