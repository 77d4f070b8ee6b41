//! Evolution API adapter.
//!
//! Self-hosted WhatsApp gateway. Supports plain text, presence updates, and
//! read receipts; it has no native interactive-message endpoint, so button
//! and list sends report `NotSupported` and the dispatcher falls back to
//! their text renderings.

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, warn};

use adpilot_core::channel::{
    ContactKey, Delivery, InboundEvent, InboundMessage, MessagingAdapter, PresenceKind,
};
use adpilot_core::error::ChannelError;
use adpilot_core::response::{ButtonsPayload, ListPayload};

/// Evolution adapter configuration.
#[derive(Clone)]
pub struct EvolutionConfig {
    /// Base URL of the Evolution server (without `/manager`)
    pub api_url: String,
    pub api_key: String,
    pub instance: String,
}

impl std::fmt::Debug for EvolutionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvolutionConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &"[REDACTED]")
            .field("instance", &self.instance)
            .finish()
    }
}

/// Evolution API adapter.
pub struct EvolutionAdapter {
    config: EvolutionConfig,
    client: reqwest::Client,
}

impl EvolutionAdapter {
    pub fn new(config: EvolutionConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");
        Self { config, client }
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}/{}",
            self.config.api_url.trim_end_matches("/manager").trim_end_matches('/'),
            path,
            self.config.instance
        )
    }

    async fn post(&self, url: String, payload: Value) -> Result<Delivery, ChannelError> {
        let response = self
            .client
            .post(&url)
            .header("apikey", &self.config.api_key)
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| ChannelError::Network(e.to_string()))?;

        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);

        if !status.is_success() {
            warn!(status = status.as_u16(), %body, "Evolution send failed");
            return Err(ChannelError::DeliveryFailed {
                channel: "evolution".into(),
                reason: format!("status {}: {}", status.as_u16(), body),
            });
        }

        let provider_message_id = body["key"]["id"].as_str().map(String::from);
        Ok(Delivery::Sent {
            provider_message_id,
        })
    }

    fn presence_value(kind: PresenceKind) -> &'static str {
        match kind {
            PresenceKind::Composing => "composing",
            PresenceKind::Paused => "paused",
            PresenceKind::Available => "available",
        }
    }

    fn parse_presence(kind: &str) -> Option<PresenceKind> {
        match kind {
            "composing" => Some(PresenceKind::Composing),
            "paused" => Some(PresenceKind::Paused),
            "available" => Some(PresenceKind::Available),
            _ => None,
        }
    }
}

#[async_trait]
impl MessagingAdapter for EvolutionAdapter {
    fn name(&self) -> &str {
        "evolution"
    }

    async fn send_text(&self, to: &ContactKey, body: &str) -> Result<Delivery, ChannelError> {
        let body = body.trim();
        if body.is_empty() {
            return Err(ChannelError::InvalidPayload("Message body is empty".into()));
        }
        debug!(to = %to, len = body.len(), "Evolution text send");
        let payload = json!({ "number": to.digits(), "text": body });
        self.post(self.endpoint("message/sendText"), payload).await
    }

    async fn send_buttons(
        &self,
        _to: &ContactKey,
        _payload: &ButtonsPayload,
    ) -> Result<Delivery, ChannelError> {
        Ok(Delivery::NotSupported)
    }

    async fn send_list(
        &self,
        _to: &ContactKey,
        _payload: &ListPayload,
    ) -> Result<Delivery, ChannelError> {
        Ok(Delivery::NotSupported)
    }

    async fn mark_read(
        &self,
        to: &ContactKey,
        message_id: &str,
    ) -> Result<Delivery, ChannelError> {
        let payload = json!({
            "readMessages": [{
                "remoteJid": to.0,
                "id": message_id,
                "fromMe": false
            }]
        });
        self.post(self.endpoint("chat/markMessageAsRead"), payload)
            .await
    }

    async fn send_presence(
        &self,
        to: &ContactKey,
        kind: PresenceKind,
    ) -> Result<Delivery, ChannelError> {
        let payload = json!({
            "number": to.digits(),
            "presence": Self::presence_value(kind)
        });
        self.post(self.endpoint("chat/sendPresence"), payload).await
    }

    fn parse_webhook(&self, payload: &Value) -> Option<InboundEvent> {
        match payload["event"].as_str()? {
            "messages.upsert" => {
                let data = &payload["data"];
                let key = &data["key"];
                let remote_jid = key["remoteJid"].as_str()?;
                let text = data["message"]["conversation"]
                    .as_str()
                    .or_else(|| data["message"]["extendedTextMessage"]["text"].as_str())?;

                Some(InboundEvent::Message(InboundMessage {
                    contact: ContactKey::new(remote_jid),
                    message_id: key["id"].as_str().unwrap_or_default().to_string(),
                    text: text.to_string(),
                    display_name: data["pushName"]
                        .as_str()
                        .filter(|n| !n.is_empty())
                        .map(String::from),
                    interactive_reply: false,
                    from_me: key["fromMe"].as_bool().unwrap_or(false),
                    timestamp: data["messageTimestamp"].as_i64(),
                }))
            }
            "presence.update" => {
                let data = &payload["data"];
                let jid = data["id"].as_str()?;
                let presence = data["presences"][jid]["lastKnownPresence"]
                    .as_str()
                    .or_else(|| data["presence"].as_str())?;

                Some(InboundEvent::Presence {
                    contact: ContactKey::new(jid),
                    kind: Self::parse_presence(presence)?,
                })
            }
            _ => None,
        }
    }
}
