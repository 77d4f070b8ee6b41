//! Messaging adapter contract — the abstraction over WhatsApp providers.
//!
//! An adapter translates a provider's wire format into canonical inbound
//! events and exposes canonical outbound primitives. Every adapter implements
//! the same capability contract; a capability the provider lacks reports
//! `Delivery::NotSupported` rather than failing, and callers must treat
//! "not supported" distinctly from "error".

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ChannelError;
use crate::response::{ButtonsPayload, ListPayload};
use crate::store::DeliveryStatus;

/// Stable external identifier partitioning all per-conversation state
/// (a WhatsApp JID such as `5511999999999@s.whatsapp.net`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContactKey(pub String);

impl ContactKey {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// The bare phone number, without the JID suffix.
    pub fn digits(&self) -> &str {
        self.0.strip_suffix("@s.whatsapp.net").unwrap_or(&self.0)
    }
}

impl std::fmt::Display for ContactKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of an outbound capability call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// The provider accepted the message.
    Sent {
        /// Provider-assigned message id, when the provider returns one.
        provider_message_id: Option<String>,
    },
    /// The provider does not implement this capability.
    NotSupported,
}

impl Delivery {
    pub fn sent() -> Self {
        Self::Sent {
            provider_message_id: None,
        }
    }

    pub fn is_sent(&self) -> bool {
        matches!(self, Self::Sent { .. })
    }
}

/// Presence states, both outgoing (typing indicator) and incoming (signal).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceKind {
    Composing,
    Paused,
    Available,
}

/// A canonical inbound user message, normalized from the provider wire format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub contact: ContactKey,
    pub message_id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// True when the user tapped a button or list option rather than typing.
    pub interactive_reply: bool,
    /// True for messages sent by our own number (echoes).
    pub from_me: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

/// A delivery-receipt update for a previously sent message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub contact: ContactKey,
    pub provider_message_id: String,
    pub status: DeliveryStatus,
}

/// Everything a provider webhook can resolve to.
#[derive(Debug, Clone)]
pub enum InboundEvent {
    Message(InboundMessage),
    Status(StatusUpdate),
    Presence {
        contact: ContactKey,
        kind: PresenceKind,
    },
}

/// The messaging capability contract.
///
/// Implementations handle provider-specific connection logic, payload
/// construction, and webhook parsing.
#[async_trait]
pub trait MessagingAdapter: Send + Sync {
    /// Provider name (e.g., "cloud_api", "evolution").
    fn name(&self) -> &str;

    /// Send a plain text message.
    async fn send_text(
        &self,
        to: &ContactKey,
        body: &str,
    ) -> std::result::Result<Delivery, ChannelError>;

    /// Send an interactive button message.
    async fn send_buttons(
        &self,
        to: &ContactKey,
        payload: &ButtonsPayload,
    ) -> std::result::Result<Delivery, ChannelError>;

    /// Send an interactive list message.
    async fn send_list(
        &self,
        to: &ContactKey,
        payload: &ListPayload,
    ) -> std::result::Result<Delivery, ChannelError>;

    /// Mark an inbound message as read.
    async fn mark_read(
        &self,
        to: &ContactKey,
        message_id: &str,
    ) -> std::result::Result<Delivery, ChannelError>;

    /// Toggle a presence/typing state.
    async fn send_presence(
        &self,
        to: &ContactKey,
        kind: PresenceKind,
    ) -> std::result::Result<Delivery, ChannelError>;

    /// Translate a provider webhook body into a canonical event.
    ///
    /// Returns `None` for payloads that are not events we handle — the
    /// caller acknowledges those as ignored.
    fn parse_webhook(&self, payload: &serde_json::Value) -> Option<InboundEvent>;
}
