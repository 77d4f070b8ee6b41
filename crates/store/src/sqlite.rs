//! SQLite conversation store.
//!
//! Three tables: `contacts`, `conversations`, `messages`. Messages are
//! append-only; status updates touch single rows matched by the provider
//! message id. Schema is created on startup.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

use adpilot_core::error::StoreError;
use adpilot_core::store::{Contact, ConversationStore, DeliveryStatus, Direction, StoredMessage};

/// A production SQLite conversation store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a new SQLite store from a connection string.
    ///
    /// The database and all tables/indexes are created automatically.
    /// Pass `"sqlite::memory:"` for an in-process ephemeral database
    /// (useful for tests).
    pub async fn new(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite URL: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite conversation store initialized at {url}");
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS contacts (
                id               INTEGER PRIMARY KEY AUTOINCREMENT,
                phone            TEXT UNIQUE NOT NULL,
                name             TEXT,
                created_at       TEXT NOT NULL,
                last_interaction TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("contacts table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS conversations (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                contact_id INTEGER NOT NULL REFERENCES contacts(id),
                status     TEXT NOT NULL DEFAULT 'active',
                started_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("conversations table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id                  INTEGER PRIMARY KEY AUTOINCREMENT,
                conversation_id     INTEGER NOT NULL REFERENCES conversations(id),
                direction           TEXT NOT NULL,
                status              TEXT NOT NULL DEFAULT 'pending',
                text                TEXT NOT NULL,
                provider_message_id TEXT,
                created_at          TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("messages table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_conversation
             ON messages(conversation_id, created_at)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("messages index: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_provider_id
             ON messages(provider_message_id)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("provider id index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<StoredMessage, StoreError> {
        let id: i64 = row
            .try_get("id")
            .map_err(|e| StoreError::QueryFailed(format!("id column: {e}")))?;
        let conversation_id: i64 = row
            .try_get("conversation_id")
            .map_err(|e| StoreError::QueryFailed(format!("conversation_id column: {e}")))?;
        let direction_str: String = row
            .try_get("direction")
            .map_err(|e| StoreError::QueryFailed(format!("direction column: {e}")))?;
        let status_str: String = row
            .try_get("status")
            .map_err(|e| StoreError::QueryFailed(format!("status column: {e}")))?;
        let text: String = row
            .try_get("text")
            .map_err(|e| StoreError::QueryFailed(format!("text column: {e}")))?;
        let provider_message_id: Option<String> = row
            .try_get("provider_message_id")
            .map_err(|e| StoreError::QueryFailed(format!("provider_message_id column: {e}")))?;
        let created_at_str: String = row
            .try_get("created_at")
            .map_err(|e| StoreError::QueryFailed(format!("created_at column: {e}")))?;

        let direction = match direction_str.as_str() {
            "incoming" => Direction::Incoming,
            "outgoing" => Direction::Outgoing,
            other => {
                return Err(StoreError::QueryFailed(format!(
                    "unknown direction '{other}'"
                )));
            }
        };

        let status = DeliveryStatus::parse(&status_str)
            .ok_or_else(|| StoreError::QueryFailed(format!("unknown status '{status_str}'")))?;

        let created_at = chrono::DateTime::parse_from_rfc3339(&created_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Ok(StoredMessage {
            id,
            conversation_id,
            direction,
            status,
            text,
            provider_message_id,
            created_at,
        })
    }
}

#[async_trait]
impl ConversationStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn get_or_create_contact(
        &self,
        phone: &str,
        name: Option<&str>,
    ) -> Result<Contact, StoreError> {
        let now = Utc::now().to_rfc3339();

        let existing = sqlx::query("SELECT id, phone, name FROM contacts WHERE phone = ?1")
            .bind(phone)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("contact lookup: {e}")))?;

        if let Some(row) = existing {
            let id: i64 = row
                .try_get("id")
                .map_err(|e| StoreError::QueryFailed(format!("id column: {e}")))?;
            let stored_name: Option<String> = row
                .try_get("name")
                .map_err(|e| StoreError::QueryFailed(format!("name column: {e}")))?;

            // A contact without a stored name picks up the pushed one.
            let effective_name = match (&stored_name, name) {
                (None, Some(n)) if !n.is_empty() => Some(n.to_string()),
                _ => stored_name,
            };

            sqlx::query(
                "UPDATE contacts SET name = ?1, last_interaction = ?2 WHERE id = ?3",
            )
            .bind(&effective_name)
            .bind(&now)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("contact update: {e}")))?;

            return Ok(Contact {
                id,
                phone: phone.to_string(),
                name: effective_name,
            });
        }

        let result = sqlx::query(
            "INSERT INTO contacts (phone, name, created_at, last_interaction)
             VALUES (?1, ?2, ?3, ?3)",
        )
        .bind(phone)
        .bind(name)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("contact insert: {e}")))?;

        Ok(Contact {
            id: result.last_insert_rowid(),
            phone: phone.to_string(),
            name: name.map(String::from),
        })
    }

    async fn active_conversation(&self, contact_id: i64) -> Result<i64, StoreError> {
        let existing = sqlx::query(
            "SELECT id FROM conversations WHERE contact_id = ?1 AND status = 'active' LIMIT 1",
        )
        .bind(contact_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("conversation lookup: {e}")))?;

        if let Some(row) = existing {
            return row
                .try_get("id")
                .map_err(|e| StoreError::QueryFailed(format!("id column: {e}")));
        }

        let result = sqlx::query(
            "INSERT INTO conversations (contact_id, status, started_at)
             VALUES (?1, 'active', ?2)",
        )
        .bind(contact_id)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("conversation insert: {e}")))?;

        Ok(result.last_insert_rowid())
    }

    async fn append_message(
        &self,
        conversation_id: i64,
        text: &str,
        direction: Direction,
        status: DeliveryStatus,
        provider_message_id: Option<&str>,
    ) -> Result<i64, StoreError> {
        let result = sqlx::query(
            "INSERT INTO messages
                (conversation_id, direction, status, text, provider_message_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(conversation_id)
        .bind(direction.as_str())
        .bind(status.as_str())
        .bind(text)
        .bind(provider_message_id)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("message insert: {e}")))?;

        Ok(result.last_insert_rowid())
    }

    async fn recent_messages(
        &self,
        conversation_id: i64,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, StoreError> {
        // Newest N by insert order, then reversed to oldest-first.
        let rows = sqlx::query(
            "SELECT * FROM messages WHERE conversation_id = ?1
             ORDER BY id DESC LIMIT ?2",
        )
        .bind(conversation_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("recent messages: {e}")))?;

        let mut messages: Vec<StoredMessage> = rows
            .iter()
            .map(Self::row_to_message)
            .collect::<Result<_, _>>()?;
        messages.reverse();
        Ok(messages)
    }

    async fn last_outgoing(
        &self,
        conversation_id: i64,
    ) -> Result<Option<StoredMessage>, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM messages
             WHERE conversation_id = ?1 AND direction = 'outgoing'
             ORDER BY id DESC LIMIT 1",
        )
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("last outgoing: {e}")))?;

        match row {
            Some(ref r) => Ok(Some(Self::row_to_message(r)?)),
            None => Ok(None),
        }
    }

    async fn update_status_by_provider_id(
        &self,
        provider_message_id: &str,
        status: DeliveryStatus,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE messages SET status = ?1 WHERE provider_message_id = ?2")
            .bind(status.as_str())
            .bind(provider_message_id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("status update: {e}")))?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> SqliteStore {
        SqliteStore::new("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn contact_created_once() {
        let store = test_store().await;
        let a = store
            .get_or_create_contact("5511999999999@s.whatsapp.net", Some("Lucas"))
            .await
            .unwrap();
        let b = store
            .get_or_create_contact("5511999999999@s.whatsapp.net", None)
            .await
            .unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(b.name.as_deref(), Some("Lucas"));
    }

    #[tokio::test]
    async fn nameless_contact_picks_up_push_name() {
        let store = test_store().await;
        let a = store.get_or_create_contact("551188887777", None).await.unwrap();
        assert!(a.name.is_none());

        let b = store
            .get_or_create_contact("551188887777", Some("Maria"))
            .await
            .unwrap();
        assert_eq!(b.id, a.id);
        assert_eq!(b.name.as_deref(), Some("Maria"));
    }

    #[tokio::test]
    async fn existing_name_not_overwritten() {
        let store = test_store().await;
        store
            .get_or_create_contact("551177776666", Some("Ana"))
            .await
            .unwrap();
        let again = store
            .get_or_create_contact("551177776666", Some("Other"))
            .await
            .unwrap();
        assert_eq!(again.name.as_deref(), Some("Ana"));
    }

    #[tokio::test]
    async fn active_conversation_reused() {
        let store = test_store().await;
        let contact = store.get_or_create_contact("5511", None).await.unwrap();
        let c1 = store.active_conversation(contact.id).await.unwrap();
        let c2 = store.active_conversation(contact.id).await.unwrap();
        assert_eq!(c1, c2);
    }

    #[tokio::test]
    async fn recent_messages_oldest_first_bounded() {
        let store = test_store().await;
        let contact = store.get_or_create_contact("5511", None).await.unwrap();
        let conv = store.active_conversation(contact.id).await.unwrap();

        for i in 0..8 {
            store
                .append_message(
                    conv,
                    &format!("msg {i}"),
                    Direction::Incoming,
                    DeliveryStatus::Received,
                    None,
                )
                .await
                .unwrap();
        }

        let recent = store.recent_messages(conv, 5).await.unwrap();
        assert_eq!(recent.len(), 5);
        assert_eq!(recent[0].text, "msg 3");
        assert_eq!(recent[4].text, "msg 7");
    }

    #[tokio::test]
    async fn last_outgoing_skips_incoming() {
        let store = test_store().await;
        let contact = store.get_or_create_contact("5511", None).await.unwrap();
        let conv = store.active_conversation(contact.id).await.unwrap();

        store
            .append_message(conv, "oi", Direction::Incoming, DeliveryStatus::Received, None)
            .await
            .unwrap();
        assert!(store.last_outgoing(conv).await.unwrap().is_none());

        store
            .append_message(conv, "resposta", Direction::Outgoing, DeliveryStatus::Sent, None)
            .await
            .unwrap();
        store
            .append_message(conv, "mais uma", Direction::Incoming, DeliveryStatus::Received, None)
            .await
            .unwrap();

        let last = store.last_outgoing(conv).await.unwrap().unwrap();
        assert_eq!(last.text, "resposta");
    }

    #[tokio::test]
    async fn status_update_by_provider_id() {
        let store = test_store().await;
        let contact = store.get_or_create_contact("5511", None).await.unwrap();
        let conv = store.active_conversation(contact.id).await.unwrap();

        store
            .append_message(
                conv,
                "enviada",
                Direction::Outgoing,
                DeliveryStatus::Sent,
                Some("wamid.XYZ"),
            )
            .await
            .unwrap();

        let updated = store
            .update_status_by_provider_id("wamid.XYZ", DeliveryStatus::Read)
            .await
            .unwrap();
        assert!(updated);

        let recent = store.recent_messages(conv, 10).await.unwrap();
        assert_eq!(recent[0].status, DeliveryStatus::Read);

        let missed = store
            .update_status_by_provider_id("wamid.NOPE", DeliveryStatus::Read)
            .await
            .unwrap();
        assert!(!missed);
    }

    #[tokio::test]
    async fn conversations_are_isolated() {
        let store = test_store().await;
        let a = store.get_or_create_contact("5511", None).await.unwrap();
        let b = store.get_or_create_contact("5522", None).await.unwrap();
        let conv_a = store.active_conversation(a.id).await.unwrap();
        let conv_b = store.active_conversation(b.id).await.unwrap();
        assert_ne!(conv_a, conv_b);

        store
            .append_message(conv_a, "so para A", Direction::Incoming, DeliveryStatus::Received, None)
            .await
            .unwrap();
        assert!(store.recent_messages(conv_b, 5).await.unwrap().is_empty());
    }
}
