//! The outbound dispatcher.
//!
//! Turns one logical response into one or more provider message units:
//! an interactive payload when one is attached (degrading to a text
//! rendering when the provider cannot or will not send it), otherwise plain
//! text split into blank-line-aware parts under a character budget. Every
//! physically sent part is persisted as its own outgoing row right after the
//! send attempt, and a short fixed delay between parts keeps the pacing
//! human. A send failure marks the row failed and never aborts the
//! remaining parts.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use adpilot_core::channel::{ContactKey, Delivery, MessagingAdapter};
use adpilot_core::event::{DomainEvent, EventBus};
use adpilot_core::response::{InteractivePayload, LogicalResponse};
use adpilot_core::store::{ConversationStore, DeliveryStatus, Direction};

use crate::format::rewrite_markdown;

/// Dispatcher tunables.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Character budget per text part
    pub part_budget: usize,

    /// Pause between consecutive parts
    pub part_delay: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            part_budget: 800,
            part_delay: Duration::from_millis(1_500),
        }
    }
}

/// Split formatted text into parts under `budget` characters.
///
/// Splits on blank-line-delimited sections and accumulates them greedily;
/// a single section longer than the budget ships whole as its own part —
/// no mid-word splitting.
pub fn split_message(text: &str, budget: usize) -> Vec<String> {
    let text = text.trim();
    if text.chars().count() <= budget {
        return vec![text.to_string()];
    }

    let mut parts = Vec::new();
    let mut current = String::new();

    for section in text.split("\n\n") {
        let section = section.trim();
        if section.is_empty() {
            continue;
        }

        let would_be = current.chars().count() + section.chars().count() + 2;
        if would_be > budget && !current.is_empty() {
            parts.push(current.trim().to_string());
            current = format!("{section}\n\n");
        } else {
            current.push_str(section);
            current.push_str("\n\n");
        }
    }

    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }

    parts
}

/// Delivers logical responses to a contact through the messaging adapter.
pub struct Dispatcher {
    adapter: Arc<dyn MessagingAdapter>,
    store: Arc<dyn ConversationStore>,
    config: DispatchConfig,
    events: Arc<EventBus>,
}

impl Dispatcher {
    pub fn new(
        adapter: Arc<dyn MessagingAdapter>,
        store: Arc<dyn ConversationStore>,
        config: DispatchConfig,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            adapter,
            store,
            config,
            events,
        }
    }

    /// Deliver one logical response, interactive payload first when present.
    pub async fn deliver(
        &self,
        contact: &ContactKey,
        conversation_id: i64,
        response: LogicalResponse,
    ) {
        match response.payload {
            Some(InteractivePayload::List(list)) => {
                match self.adapter.send_list(contact, &list).await {
                    Ok(Delivery::Sent {
                        provider_message_id,
                    }) => {
                        info!(contact = %contact, "Interactive list sent");
                        let text = if response.text.trim().is_empty() {
                            list.body.clone()
                        } else {
                            response.text
                        };
                        self.persist(conversation_id, &text, DeliveryStatus::Sent,
                            provider_message_id.as_deref())
                            .await;
                        self.publish_dispatched(contact, 1, true);
                    }
                    Ok(Delivery::NotSupported) => {
                        debug!(contact = %contact, "List not supported, sending text rendering");
                        self.send_parts(contact, conversation_id, &list.as_text())
                            .await;
                    }
                    Err(e) => {
                        warn!(contact = %contact, error = %e, "List send failed, falling back to text");
                        self.send_parts(contact, conversation_id, &list.as_text())
                            .await;
                    }
                }
            }
            Some(InteractivePayload::Buttons(buttons)) => {
                match self.adapter.send_buttons(contact, &buttons).await {
                    Ok(Delivery::Sent {
                        provider_message_id,
                    }) => {
                        info!(contact = %contact, buttons = buttons.buttons.len(), "Interactive buttons sent");
                        let text = if response.text.trim().is_empty() {
                            buttons.body.clone()
                        } else {
                            response.text
                        };
                        self.persist(conversation_id, &text, DeliveryStatus::Sent,
                            provider_message_id.as_deref())
                            .await;
                        self.publish_dispatched(contact, 1, true);
                    }
                    Ok(Delivery::NotSupported) => {
                        debug!(contact = %contact, "Buttons not supported, sending body as text");
                        let fallback = if response.text.trim().is_empty() {
                            buttons.body.clone()
                        } else {
                            response.text
                        };
                        self.send_parts(contact, conversation_id, &fallback).await;
                    }
                    Err(e) => {
                        warn!(contact = %contact, error = %e, "Buttons send failed, falling back to text");
                        let fallback = if response.text.trim().is_empty() {
                            buttons.body.clone()
                        } else {
                            response.text
                        };
                        self.send_parts(contact, conversation_id, &fallback).await;
                    }
                }
            }
            None => {
                self.send_parts(contact, conversation_id, &response.text)
                    .await;
            }
        }
    }

    /// Format raw text for the channel and send it through the text path.
    ///
    /// Entry point for manual sends that bypass the agent loop.
    pub async fn send_plain(&self, contact: &ContactKey, conversation_id: i64, text: &str) {
        let formatted = rewrite_markdown(text);
        self.send_parts(contact, conversation_id, &formatted).await;
    }

    /// Split, send, and persist each part; pace consecutive parts.
    async fn send_parts(&self, contact: &ContactKey, conversation_id: i64, text: &str) -> usize {
        let text = text.trim();
        if text.is_empty() {
            warn!(contact = %contact, "Refusing to send empty message");
            return 0;
        }

        let parts = split_message(text, self.config.part_budget);
        let total = parts.len();
        debug!(contact = %contact, parts = total, "Sending text parts");

        for (i, part) in parts.iter().enumerate() {
            let (status, provider_message_id) = match self.adapter.send_text(contact, part).await
            {
                Ok(Delivery::Sent {
                    provider_message_id,
                }) => (DeliveryStatus::Sent, provider_message_id),
                Ok(Delivery::NotSupported) => {
                    warn!(contact = %contact, "Adapter reports text send unsupported");
                    (DeliveryStatus::Failed, None)
                }
                Err(e) => {
                    warn!(contact = %contact, part = i + 1, error = %e, "Text send failed");
                    (DeliveryStatus::Failed, None)
                }
            };

            // Persisted regardless of outcome; the status records it
            self.persist(conversation_id, part, status, provider_message_id.as_deref())
                .await;

            if i + 1 < total {
                tokio::time::sleep(self.config.part_delay).await;
            }
        }

        self.publish_dispatched(contact, total, false);
        total
    }

    async fn persist(
        &self,
        conversation_id: i64,
        text: &str,
        status: DeliveryStatus,
        provider_message_id: Option<&str>,
    ) {
        if let Err(e) = self
            .store
            .append_message(
                conversation_id,
                text,
                Direction::Outgoing,
                status,
                provider_message_id,
            )
            .await
        {
            warn!(conversation_id, error = %e, "Failed to persist outgoing message");
        }
    }

    fn publish_dispatched(&self, contact: &ContactKey, parts: usize, interactive: bool) {
        self.events.publish(DomainEvent::ResponseDispatched {
            contact: contact.0.clone(),
            parts,
            interactive,
            timestamp: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockAdapter, SendMode};
    use adpilot_core::response::{ButtonSpec, ButtonsPayload, ListOption, ListPayload};
    use adpilot_store::InMemoryStore;

    fn contact() -> ContactKey {
        ContactKey::new("5511999999999@s.whatsapp.net")
    }

    fn dispatcher_with(
        adapter: Arc<MockAdapter>,
        store: Arc<InMemoryStore>,
        budget: usize,
    ) -> Dispatcher {
        Dispatcher::new(
            adapter,
            store,
            DispatchConfig {
                part_budget: budget,
                part_delay: Duration::from_millis(0),
            },
            Arc::new(EventBus::default()),
        )
    }

    fn buttons() -> ButtonsPayload {
        ButtonsPayload {
            body: "Quer ver mais?".into(),
            buttons: vec![ButtonSpec {
                id: "1".into(),
                title: "📊 Ver CTR".into(),
            }],
            footer: None,
        }
    }

    fn list() -> ListPayload {
        ListPayload {
            body: "Como posso ajudar?".into(),
            button_label: "Ver opções".into(),
            options: vec![
                ListOption {
                    id: "1".into(),
                    title: "📊 Desempenho".into(),
                    description: Some("CTR, CPC e gastos".into()),
                },
                ListOption {
                    id: "2".into(),
                    title: "💰 Saldos".into(),
                    description: None,
                },
            ],
        }
    }

    // --- split_message ---

    #[test]
    fn short_text_never_split() {
        let parts = split_message("uma resposta curta", 800);
        assert_eq!(parts, vec!["uma resposta curta"]);
    }

    #[test]
    fn text_at_budget_boundary_not_split() {
        let text = "x".repeat(800);
        assert_eq!(split_message(&text, 800).len(), 1);
    }

    #[test]
    fn sections_accumulate_greedily() {
        let text = format!(
            "{}\n\n{}\n\n{}",
            "a".repeat(300),
            "b".repeat(300),
            "c".repeat(300)
        );
        let parts = split_message(&text, 800);
        assert_eq!(parts.len(), 2);
        assert!(parts[0].contains(&"a".repeat(300)));
        assert!(parts[0].contains(&"b".repeat(300)));
        assert!(parts[1].contains(&"c".repeat(300)));
    }

    #[test]
    fn oversized_section_ships_whole() {
        let big = "palavra ".repeat(150); // ~1200 chars, no blank lines
        let text = format!("intro\n\n{}", big.trim());
        let parts = split_message(&text, 800);
        assert_eq!(parts.len(), 2);
        assert!(parts[1].chars().count() > 800, "no mid-word splitting");
    }

    #[test]
    fn long_text_without_blank_lines_passes_through() {
        let text = "y".repeat(2_000);
        let parts = split_message(&text, 800);
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].chars().count(), 2_000);
    }

    #[test]
    fn budget_counts_chars_not_bytes() {
        // 400 two-byte chars per section: fits the 900-char budget together
        let text = format!("{}\n\n{}", "é".repeat(400), "ã".repeat(400));
        assert_eq!(split_message(&text, 900).len(), 1);
    }

    // --- deliver ---

    #[tokio::test]
    async fn parts_sent_in_order_and_persisted() {
        let adapter = Arc::new(MockAdapter::new());
        let store = Arc::new(InMemoryStore::new());
        let d = dispatcher_with(adapter.clone(), store.clone(), 30);

        let text = "primeira seção\n\nsegunda seção\n\nterceira seção";
        d.deliver(&contact(), 1, LogicalResponse::text_only(text))
            .await;

        let texts = adapter.texts();
        assert_eq!(texts.len(), 3);
        assert_eq!(texts[0], "primeira seção");
        assert_eq!(texts[2], "terceira seção");

        let rows = store.all_messages();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.status == DeliveryStatus::Sent));
        assert!(rows.iter().all(|r| r.direction == Direction::Outgoing));
    }

    #[tokio::test]
    async fn send_failure_marks_failed_and_continues() {
        let adapter = Arc::new(MockAdapter {
            text_mode: SendMode::Fail,
            ..MockAdapter::new()
        });
        let store = Arc::new(InMemoryStore::new());
        let d = dispatcher_with(adapter.clone(), store.clone(), 10);

        d.deliver(
            &contact(),
            1,
            LogicalResponse::text_only("parte um\n\nparte dois"),
        )
        .await;

        // Both parts attempted despite the first failure
        assert_eq!(adapter.texts().len(), 2);
        let rows = store.all_messages();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.status == DeliveryStatus::Failed));
    }

    #[tokio::test]
    async fn empty_text_not_sent() {
        let adapter = Arc::new(MockAdapter::new());
        let store = Arc::new(InMemoryStore::new());
        let d = dispatcher_with(adapter.clone(), store.clone(), 800);

        d.deliver(&contact(), 1, LogicalResponse::text_only("   "))
            .await;
        assert!(adapter.texts().is_empty());
        assert!(store.all_messages().is_empty());
    }

    #[tokio::test]
    async fn buttons_sent_natively_and_persisted_once() {
        let adapter = Arc::new(MockAdapter::new());
        let store = Arc::new(InMemoryStore::new());
        let d = dispatcher_with(adapter.clone(), store.clone(), 800);

        d.deliver(
            &contact(),
            1,
            LogicalResponse::with_payload(
                "Análise pronta.",
                InteractivePayload::Buttons(buttons()),
            ),
        )
        .await;

        assert_eq!(adapter.sent_buttons.lock().unwrap().len(), 1);
        assert!(adapter.texts().is_empty());
        let rows = store.all_messages();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].text, "Análise pronta.");
    }

    #[tokio::test]
    async fn buttons_failure_degrades_to_text() {
        let adapter = Arc::new(MockAdapter {
            buttons_mode: SendMode::Fail,
            ..MockAdapter::new()
        });
        let store = Arc::new(InMemoryStore::new());
        let d = dispatcher_with(adapter.clone(), store.clone(), 800);

        d.deliver(
            &contact(),
            1,
            LogicalResponse::with_payload(
                "Análise pronta.",
                InteractivePayload::Buttons(buttons()),
            ),
        )
        .await;

        assert_eq!(adapter.texts(), vec!["Análise pronta."]);
        assert_eq!(store.all_messages().len(), 1);
    }

    #[tokio::test]
    async fn buttons_not_supported_uses_body_when_text_empty() {
        let adapter = Arc::new(MockAdapter {
            buttons_mode: SendMode::NotSupported,
            ..MockAdapter::new()
        });
        let store = Arc::new(InMemoryStore::new());
        let d = dispatcher_with(adapter.clone(), store.clone(), 800);

        d.deliver(
            &contact(),
            1,
            LogicalResponse::with_payload("", InteractivePayload::Buttons(buttons())),
        )
        .await;

        assert_eq!(adapter.texts(), vec!["Quer ver mais?"]);
    }

    #[tokio::test]
    async fn list_sent_natively() {
        let adapter = Arc::new(MockAdapter::new());
        let store = Arc::new(InMemoryStore::new());
        let d = dispatcher_with(adapter.clone(), store.clone(), 800);

        d.deliver(
            &contact(),
            1,
            LogicalResponse::with_payload("Escolha:", InteractivePayload::List(list())),
        )
        .await;

        assert_eq!(adapter.sent_lists.lock().unwrap().len(), 1);
        assert!(adapter.texts().is_empty());
        assert_eq!(store.all_messages()[0].text, "Escolha:");
    }

    #[tokio::test]
    async fn list_not_supported_falls_back_to_numbered_text() {
        let adapter = Arc::new(MockAdapter {
            list_mode: SendMode::NotSupported,
            ..MockAdapter::new()
        });
        let store = Arc::new(InMemoryStore::new());
        let d = dispatcher_with(adapter.clone(), store.clone(), 800);

        d.deliver(
            &contact(),
            1,
            LogicalResponse::with_payload("", InteractivePayload::List(list())),
        )
        .await;

        let texts = adapter.texts();
        assert_eq!(texts.len(), 1);
        assert!(texts[0].contains("1. 📊 Desempenho - CTR, CPC e gastos"));
        assert!(texts[0].contains("2. 💰 Saldos"));
        assert_eq!(store.all_messages().len(), 1);
    }

    #[tokio::test]
    async fn manual_send_formats_markdown() {
        let adapter = Arc::new(MockAdapter::new());
        let store = Arc::new(InMemoryStore::new());
        let d = dispatcher_with(adapter.clone(), store.clone(), 800);

        d.send_plain(&contact(), 1, "## Aviso\n**manutenção** hoje")
            .await;
        assert_eq!(adapter.texts(), vec!["*Aviso*\n*manutenção* hoje"]);
    }

    #[tokio::test(start_paused = true)]
    async fn consecutive_parts_are_paced() {
        let adapter = Arc::new(MockAdapter::new());
        let store = Arc::new(InMemoryStore::new());
        let d = Arc::new(Dispatcher::new(
            adapter.clone(),
            store,
            DispatchConfig {
                part_budget: 10,
                part_delay: Duration::from_millis(1_500),
            },
            Arc::new(EventBus::default()),
        ));

        let d2 = d.clone();
        let handle = tokio::spawn(async move {
            d2.deliver(
                &ContactKey::new("5511"),
                1,
                LogicalResponse::text_only("parte um\n\nparte dois"),
            )
            .await;
        });

        // First part goes out immediately; the second waits for the delay
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        assert_eq!(adapter.texts().len(), 1);

        tokio::time::advance(Duration::from_millis(1_600)).await;
        handle.await.unwrap();
        assert_eq!(adapter.texts().len(), 2);
    }
}
