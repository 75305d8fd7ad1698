use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::{ConnectOptions, Connection, Row};
use std::str::FromStr;
use tracing::debug;

use super::{MessageStore, StoredMessage};
use crate::completion::Role;
use crate::config::DatabaseConfig;

const CREATE_TABLE_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS guest_messages (
        id INT AUTO_INCREMENT PRIMARY KEY,
        guest_id VARCHAR(50) NOT NULL,
        role ENUM('user', 'assistant') NOT NULL,
        content TEXT NOT NULL,
        timestamp TIMESTAMP DEFAULT CURRENT_TIMESTAMP
    )
"#;

/// MySQL-backed transcript store (the production backend).
#[derive(Debug, Clone)]
pub struct MySqlMessageStore {
    options: MySqlConnectOptions,
}

impl MySqlMessageStore {
    #[inline]
    pub fn new(config: &DatabaseConfig) -> Self {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .username(&config.user)
            .password(&config.password)
            .database(&config.name);
        Self { options }
    }

    #[inline]
    pub fn from_url(url: &str) -> Result<Self> {
        let options = MySqlConnectOptions::from_str(url)
            .with_context(|| format!("Invalid MySQL URL: {url}"))?;
        Ok(Self { options })
    }

    async fn connect(&self) -> Result<MySqlConnection> {
        let mut conn = self
            .options
            .clone()
            .connect()
            .await
            .context("Failed to connect to MySQL database")?;

        sqlx::query(CREATE_TABLE_SQL)
            .execute(&mut conn)
            .await
            .context("Failed to ensure guest_messages table")?;

        Ok(conn)
    }
}

#[async_trait]
impl MessageStore for MySqlMessageStore {
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
            .context("Failed to close MySQL connection")?;
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
            let id: i32 = row.try_get("id")?;
            let role: String = row.try_get("role")?;
            let timestamp: DateTime<Utc> = row.try_get("timestamp")?;
            messages.push(StoredMessage {
                id: i64::from(id),
                guest_id: row.try_get("guest_id")?,
                role: role.parse()?,
                content: row.try_get("content")?,
                timestamp,
            });
        }

        conn.close()
            .await
            .context("Failed to close MySQL connection")?;
        Ok(messages)
    }
}
