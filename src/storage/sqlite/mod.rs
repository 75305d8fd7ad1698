
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::{ConnectOptions, Connection, Row};
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

use super::{MessageStore, StoredMessage};
use crate::completion::Role;

const CREATE_TABLE_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS guest_messages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        guest_id VARCHAR(50) NOT NULL,
        role TEXT NOT NULL CHECK (role IN ('user', 'assistant')),
        content TEXT NOT NULL,
        timestamp TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    )
"#;

/// SQLite-backed transcript store, used for local runs and tests.
#[derive(Debug, Clone)]
pub struct SqliteMessageStore {
    options: SqliteConnectOptions,
}

impl SqliteMessageStore {
    #[inline]
    pub fn from_url(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("Invalid SQLite URL: {url}"))?
            .create_if_missing(true);
        Ok(Self { options })
    }

    #[inline]
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        Self { options }
    }

    async fn connect(&self) -> Result<SqliteConnection> {
        let mut conn = self
            .options
            .clone()
            .connect()
            .await
            .context("Failed to connect to SQLite database")?;

        sqlx::query(CREATE_TABLE_SQL)
            .execute(&mut conn)
            .await
            .context("Failed to ensure guest_messages table")?;

        Ok(conn)
    }
}

#[async_trait]
impl MessageStore for SqliteMessageStore {
    async fn append(&self, guest_id: &str, role: Role, content: &str) -> Result<()> {
        debug!("Saving {} message for guest {}", role, guest_id);

        let mut conn = self.connect().await?;

        sqlx::query("INSERT INTO guest_messages (guest_id, role, content) VALUES (?, ?, ?)")
            .bind(guest_id)
            .bind(role.as_str())
            .bind(content)
            .execute(&mut conn)
            .await
            .context("Failed to save guest message")?;

        conn.close()
            .await
            .context("Failed to close SQLite connection")?;
        Ok(())
    }

    async fn history(&self, guest_id: &str) -> Result<Vec<StoredMessage>> {
        let mut conn = self.connect().await?;

        let rows = sqlx::query(
            "SELECT id, guest_id, role, content, timestamp \
             FROM guest_messages WHERE guest_id = ? ORDER BY id",
        )
        .bind(guest_id)
        .fetch_all(&mut conn)
        .await
        .context("Failed to load guest message history")?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in rows {
            let role: String = row.try_get("role")?;
            let timestamp: NaiveDateTime = row.try_get("timestamp")?;
            messages.push(StoredMessage {
                id: row.try_get("id")?,
                guest_id: row.try_get("guest_id")?,
                role: role.parse()?,
                content: row.try_get("content")?,
                timestamp: DateTime::<Utc>::from_naive_utc_and_offset(timestamp, Utc),
            });
        }

        conn.close()
            .await
            .context("Failed to close SQLite connection")?;
        Ok(messages)
    }
}
