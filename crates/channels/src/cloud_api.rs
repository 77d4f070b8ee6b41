//! WhatsApp Business Cloud API adapter.
//!
//! Talks to `graph.facebook.com` for outbound sends and parses Meta webhook
//! envelopes into canonical inbound events. Interactive button and list
//! messages are supported natively; presence is not part of the Cloud API,
//! so `send_presence` reports `NotSupported`.

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, warn};

use adpilot_core::channel::{
    ContactKey, Delivery, InboundEvent, InboundMessage, MessagingAdapter, PresenceKind,
    StatusUpdate,
};
use adpilot_core::error::ChannelError;
use adpilot_core::response::{ButtonsPayload, ListPayload};
use adpilot_core::store::DeliveryStatus;

pub const DEFAULT_BASE_URL: &str = "https://graph.facebook.com/v21.0";

const JID_SUFFIX: &str = "@s.whatsapp.net";

/// Cloud API adapter configuration.
#[derive(Clone)]
pub struct CloudApiConfig {
    pub access_token: String,
    pub phone_number_id: String,
    pub base_url: String,
}

impl std::fmt::Debug for CloudApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudApiConfig")
            .field("access_token", &"[REDACTED]")
            .field("phone_number_id", &self.phone_number_id)
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// WhatsApp Business Cloud API adapter.
pub struct CloudApiAdapter {
    config: CloudApiConfig,
    client: reqwest::Client,
}

impl CloudApiAdapter {
    pub fn new(config: CloudApiConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");
        Self { config, client }
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/{}/messages",
            self.config.base_url.trim_end_matches('/'),
            self.config.phone_number_id
        )
    }

    /// POST a payload to the messages endpoint and map the outcome.
    async fn post_message(&self, payload: Value) -> Result<Delivery, ChannelError> {
        let response = self
            .client
            .post(self.messages_url())
            .header("Authorization", format!("Bearer {}", self.config.access_token))
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| ChannelError::Network(e.to_string()))?;

        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);

        if !status.is_success() {
            warn!(status = status.as_u16(), %body, "Cloud API send failed");
            return Err(ChannelError::DeliveryFailed {
                channel: "cloud_api".into(),
                reason: format!("status {}: {}", status.as_u16(), body),
            });
        }

        let provider_message_id = body["messages"][0]["id"].as_str().map(String::from);
        Ok(Delivery::Sent {
            provider_message_id,
        })
    }

    fn text_payload(to: &ContactKey, body: &str) -> Value {
        json!({
            "messaging_product": "whatsapp",
            "to": to.digits(),
            "type": "text",
            "text": { "body": body }
        })
    }

    fn buttons_payload(to: &ContactKey, payload: &ButtonsPayload) -> Value {
        let buttons: Vec<Value> = payload
            .buttons
            .iter()
            .map(|b| {
                json!({
                    "type": "reply",
                    "reply": { "id": b.id, "title": b.title }
                })
            })
            .collect();

        let mut interactive = json!({
            "type": "button",
            "body": { "text": payload.body },
            "action": { "buttons": buttons }
        });
        if let Some(footer) = &payload.footer {
            interactive["footer"] = json!({ "text": footer });
        }

        json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": to.digits(),
            "type": "interactive",
            "interactive": interactive
        })
    }

    fn list_payload(to: &ContactKey, payload: &ListPayload) -> Value {
        let rows: Vec<Value> = payload
            .options
            .iter()
            .map(|opt| {
                let mut row = json!({ "id": opt.id, "title": opt.title });
                if let Some(desc) = &opt.description {
                    row["description"] = json!(desc);
                }
                row
            })
            .collect();

        json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": to.digits(),
            "type": "interactive",
            "interactive": {
                "type": "list",
                "body": { "text": payload.body },
                "action": {
                    "button": payload.button_label,
                    "sections": [{ "title": "Opções", "rows": rows }]
                }
            }
        })
    }

    fn parse_message(value: &Value) -> Option<InboundEvent> {
        let msg = value["messages"].as_array()?.first()?;

        // Extract text based on the message type: plain text, or the title
        // of the tapped button/list option for interactive replies.
        let msg_type = msg["type"].as_str().unwrap_or_default();
        let (text, interactive_reply) = match msg_type {
            "text" => (msg["text"]["body"].as_str().unwrap_or_default(), false),
            "interactive" => {
                let interactive = &msg["interactive"];
                let title = match interactive["type"].as_str() {
                    Some("list_reply") => interactive["list_reply"]["title"].as_str(),
                    Some("button_reply") => interactive["button_reply"]["title"].as_str(),
                    _ => None,
                };
                (title.unwrap_or_default(), true)
            }
            _ => return None,
        };

        let from = msg["from"].as_str()?;
        let display_name = value["contacts"][0]["profile"]["name"]
            .as_str()
            .filter(|n| !n.is_empty())
            .map(String::from);

        Some(InboundEvent::Message(InboundMessage {
            contact: ContactKey::new(format!("{from}{JID_SUFFIX}")),
            message_id: msg["id"].as_str().unwrap_or_default().to_string(),
            text: text.to_string(),
            display_name,
            interactive_reply,
            // Cloud API webhooks only carry messages from the user
            from_me: false,
            timestamp: msg["timestamp"]
                .as_str()
                .and_then(|t| t.parse::<i64>().ok()),
        }))
    }

    fn parse_status(value: &Value) -> Option<InboundEvent> {
        let status = value["statuses"].as_array()?.first()?;
        let delivery = match status["status"].as_str()? {
            "sent" => DeliveryStatus::Sent,
            "delivered" => DeliveryStatus::Delivered,
            "read" => DeliveryStatus::Read,
            "failed" => DeliveryStatus::Failed,
            _ => return None,
        };
        let recipient = status["recipient_id"].as_str()?;

        Some(InboundEvent::Status(StatusUpdate {
            contact: ContactKey::new(format!("{recipient}{JID_SUFFIX}")),
            provider_message_id: status["id"].as_str().unwrap_or_default().to_string(),
            status: delivery,
        }))
    }
}

#[async_trait]
impl MessagingAdapter for CloudApiAdapter {
    fn name(&self) -> &str {
        "cloud_api"
    }

    async fn send_text(&self, to: &ContactKey, body: &str) -> Result<Delivery, ChannelError> {
        let body = body.trim();
        if body.is_empty() {
            return Err(ChannelError::InvalidPayload("Message body is empty".into()));
        }
        debug!(to = %to, len = body.len(), "Cloud API text send");
        self.post_message(Self::text_payload(to, body)).await
    }

    async fn send_buttons(
        &self,
        to: &ContactKey,
        payload: &ButtonsPayload,
    ) -> Result<Delivery, ChannelError> {
        debug!(to = %to, buttons = payload.buttons.len(), "Cloud API buttons send");
        self.post_message(Self::buttons_payload(to, payload)).await
    }

    async fn send_list(
        &self,
        to: &ContactKey,
        payload: &ListPayload,
    ) -> Result<Delivery, ChannelError> {
        debug!(to = %to, options = payload.options.len(), "Cloud API list send");
        self.post_message(Self::list_payload(to, payload)).await
    }

    async fn mark_read(
        &self,
        _to: &ContactKey,
        message_id: &str,
    ) -> Result<Delivery, ChannelError> {
        let payload = json!({
            "messaging_product": "whatsapp",
            "status": "read",
            "message_id": message_id
        });
        self.post_message(payload).await
    }

    async fn send_presence(
        &self,
        _to: &ContactKey,
        _kind: PresenceKind,
    ) -> Result<Delivery, ChannelError> {
        // The Cloud API has no presence endpoint.
        Ok(Delivery::NotSupported)
    }

    fn parse_webhook(&self, payload: &Value) -> Option<InboundEvent> {
        if payload["object"].as_str() != Some("whatsapp_business_account") {
            return None;
        }

        let value = &payload["entry"].as_array()?.first()?["changes"]
            .as_array()?
            .first()?["value"];

        Self::parse_message(value).or_else(|| Self::parse_status(value))
    }
}
