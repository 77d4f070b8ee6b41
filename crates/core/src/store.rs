//! Conversation persistence contract.
//!
//! The pipeline needs a minimal message/conversation store: look up or create
//! the contact and its active conversation, append message rows as they flow
//! through, and read back the recent history that seeds each orchestration
//! run. Writes are append-only per conversation and safe to interleave
//! across conversations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Whether a message came from the user or from us.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Incoming,
    Outgoing,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Incoming => "incoming",
            Self::Outgoing => "outgoing",
        }
    }
}

/// Delivery lifecycle of a message row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Received,
    Sent,
    Delivered,
    Read,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Received => "received",
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Read => "read",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "received" => Some(Self::Received),
            "sent" => Some(Self::Sent),
            "delivered" => Some(Self::Delivered),
            "read" => Some(Self::Read),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// A persisted contact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: i64,
    pub phone: String,
    pub name: Option<String>,
}

/// A persisted message row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: i64,
    pub conversation_id: i64,
    pub direction: Direction,
    pub status: DeliveryStatus,
    pub text: String,
    pub provider_message_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The conversation store contract.
///
/// Implementations: SQLite (production), in-memory (tests).
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "in_memory").
    fn name(&self) -> &str;

    /// Look up a contact by phone, creating it if absent. A known contact
    /// with no stored name picks up the provided one; last interaction is
    /// refreshed either way.
    async fn get_or_create_contact(
        &self,
        phone: &str,
        name: Option<&str>,
    ) -> std::result::Result<Contact, StoreError>;

    /// The contact's active conversation, created if none exists.
    async fn active_conversation(&self, contact_id: i64)
    -> std::result::Result<i64, StoreError>;

    /// Append a message row; returns its id.
    async fn append_message(
        &self,
        conversation_id: i64,
        text: &str,
        direction: Direction,
        status: DeliveryStatus,
        provider_message_id: Option<&str>,
    ) -> std::result::Result<i64, StoreError>;

    /// The last `limit` messages of a conversation, oldest first.
    async fn recent_messages(
        &self,
        conversation_id: i64,
        limit: usize,
    ) -> std::result::Result<Vec<StoredMessage>, StoreError>;

    /// The most recent outgoing message of a conversation, if any.
    async fn last_outgoing(
        &self,
        conversation_id: i64,
    ) -> std::result::Result<Option<StoredMessage>, StoreError>;

    /// Update the status of the row matching a provider message id.
    /// Returns false when no row matched.
    async fn update_status_by_provider_id(
        &self,
        provider_message_id: &str,
        status: DeliveryStatus,
    ) -> std::result::Result<bool, StoreError>;
}
