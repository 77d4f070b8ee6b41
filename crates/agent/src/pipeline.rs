//! Pipeline wiring: inbound routing and the turn sink.
//!
//! `InboundRouter` takes canonical webhook events and routes them — messages
//! into the debounce aggregator (after persistence and context enrichment),
//! presence signals into the early-flush path, status receipts into the
//! store. `MessagePipeline` is the aggregator's sink: it serializes work per
//! contact, runs the agent loop over the flushed turn plus recent history,
//! and hands the logical response to the dispatcher.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, error, info, warn};

use adpilot_core::channel::{
    ContactKey, Delivery, InboundEvent, InboundMessage, MessagingAdapter, PresenceKind,
};
use adpilot_core::event::{DomainEvent, EventBus};
use adpilot_core::message::TurnContext;
use adpilot_core::response::LogicalResponse;
use adpilot_core::store::{ConversationStore, DeliveryStatus, Direction};

use crate::debounce::{TurnAggregator, TurnSink};
use crate::dispatch::Dispatcher;
use crate::loop_runner::{AgentLoop, FALLBACK_ERROR};

/// How long the typing indicator stays up while the agent thinks.
const TYPING_DURATION: Duration = Duration::from_secs(8);

/// Delay before marking an inbound message as read.
const READ_RECEIPT_DELAY: Duration = Duration::from_millis(1_500);

/// Structured acknowledgement returned to the webhook handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestAck {
    /// The message was buffered for debounced processing.
    Queued {
        contact: String,
        conversation_id: i64,
        queue_size: usize,
    },
    /// The event was understood but intentionally not processed.
    Ignored { reason: &'static str },
    /// A delivery-status receipt was applied.
    StatusReceived,
    /// A presence signal was forwarded to the aggregator.
    PresenceHandled,
    /// Something went wrong; the handler reports it without raising.
    Error { message: String },
}

/// The aggregator's sink: orchestrate then dispatch, one turn at a time per
/// contact.
pub struct MessagePipeline {
    store: Arc<dyn ConversationStore>,
    adapter: Arc<dyn MessagingAdapter>,
    agent: AgentLoop,
    dispatcher: Arc<Dispatcher>,
    events: Arc<EventBus>,
    history_limit: usize,
    /// Per-contact locks guaranteeing at most one flush pipeline in flight
    /// per key. Entries are created lazily and never removed; the set of
    /// active contacts is small.
    locks: Mutex<HashMap<ContactKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl MessagePipeline {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        adapter: Arc<dyn MessagingAdapter>,
        agent: AgentLoop,
        dispatcher: Arc<Dispatcher>,
        events: Arc<EventBus>,
        history_limit: usize,
    ) -> Self {
        Self {
            store,
            adapter,
            agent,
            dispatcher,
            events,
            history_limit,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn key_lock(&self, contact: &ContactKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().expect("lock map poisoned");
        locks.entry(contact.clone()).or_default().clone()
    }

    /// Best-effort typing indicator: raise `composing` now, and spawn the
    /// delayed reset. The returned task is aborted (never awaited) once the
    /// real response is ready; `NotSupported` is not an error.
    async fn start_typing(&self, contact: &ContactKey) -> Option<tokio::task::JoinHandle<()>> {
        match self
            .adapter
            .send_presence(contact, PresenceKind::Composing)
            .await
        {
            Ok(Delivery::NotSupported) => return None,
            Ok(_) => {}
            Err(e) => {
                debug!(contact = %contact, error = %e, "Typing indicator failed");
                return None;
            }
        }

        let adapter = self.adapter.clone();
        let contact = contact.clone();
        Some(tokio::spawn(async move {
            tokio::time::sleep(TYPING_DURATION).await;
            let _ = adapter.send_presence(&contact, PresenceKind::Paused).await;
        }))
    }
}

#[async_trait]
impl TurnSink for MessagePipeline {
    async fn handle_turn(&self, turn: TurnContext) {
        // Strict per-contact ordering: no overlapping flush for one key
        let lock = self.key_lock(&turn.contact);
        let _guard = lock.lock().await;

        info!(
            contact = %turn.contact,
            conversation_id = turn.conversation_id,
            "Processing flushed turn"
        );

        let history = match self
            .store
            .recent_messages(turn.conversation_id, self.history_limit)
            .await
        {
            Ok(history) => history,
            Err(e) => {
                warn!(error = %e, "Failed to load history, continuing without it");
                Vec::new()
            }
        };

        let typing = self.start_typing(&turn.contact).await;

        let response = match self.agent.run(&turn, &history).await {
            Ok(response) => response,
            Err(e) => {
                error!(contact = %turn.contact, error = %e, "Orchestration run failed");
                self.events.publish(DomainEvent::ErrorOccurred {
                    context: "orchestration".into(),
                    error_message: e.to_string(),
                    timestamp: Utc::now(),
                });
                LogicalResponse::text_only(FALLBACK_ERROR)
            }
        };

        // Cancel, don't await: the indicator must not delay the real reply
        if let Some(typing) = typing {
            typing.abort();
        }

        self.dispatcher
            .deliver(&turn.contact, turn.conversation_id, response)
            .await;
    }
}

/// Routes canonical inbound events into the pipeline.
pub struct InboundRouter {
    store: Arc<dyn ConversationStore>,
    adapter: Arc<dyn MessagingAdapter>,
    aggregator: TurnAggregator,
    dispatcher: Arc<Dispatcher>,
}

impl InboundRouter {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        adapter: Arc<dyn MessagingAdapter>,
        aggregator: TurnAggregator,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self {
            store,
            adapter,
            aggregator,
            dispatcher,
        }
    }

    /// The underlying aggregator (used by the gateway for direct flushes).
    pub fn aggregator(&self) -> &TurnAggregator {
        &self.aggregator
    }

    /// Handle one canonical event. Never raises: every outcome is a
    /// structured acknowledgement.
    pub async fn ingest(&self, event: InboundEvent) -> IngestAck {
        match event {
            InboundEvent::Message(message) => self.ingest_message(message).await,
            InboundEvent::Status(update) => {
                match self
                    .store
                    .update_status_by_provider_id(&update.provider_message_id, update.status)
                    .await
                {
                    Ok(matched) => {
                        debug!(
                            provider_message_id = %update.provider_message_id,
                            status = update.status.as_str(),
                            matched,
                            "Delivery status update"
                        );
                        IngestAck::StatusReceived
                    }
                    Err(e) => IngestAck::Error {
                        message: e.to_string(),
                    },
                }
            }
            InboundEvent::Presence { contact, kind } => {
                self.aggregator.on_presence(&contact, kind);
                IngestAck::PresenceHandled
            }
        }
    }

    async fn ingest_message(&self, message: InboundMessage) -> IngestAck {
        if message.from_me {
            return IngestAck::Ignored {
                reason: "message from me",
            };
        }
        if message.text.trim().is_empty() {
            return IngestAck::Ignored {
                reason: "empty message",
            };
        }

        let contact = match self
            .store
            .get_or_create_contact(&message.contact.0, message.display_name.as_deref())
            .await
        {
            Ok(contact) => contact,
            Err(e) => {
                return IngestAck::Error {
                    message: e.to_string(),
                };
            }
        };

        let conversation_id = match self.store.active_conversation(contact.id).await {
            Ok(id) => id,
            Err(e) => {
                return IngestAck::Error {
                    message: e.to_string(),
                };
            }
        };

        if let Err(e) = self
            .store
            .append_message(
                conversation_id,
                &message.text,
                Direction::Incoming,
                DeliveryStatus::Received,
                Some(&message.message_id),
            )
            .await
        {
            return IngestAck::Error {
                message: e.to_string(),
            };
        }

        // Button/list replies arrive as bare option titles; prepend what the
        // bot last said so the model knows what was answered.
        let enriched = if message.interactive_reply {
            match self.store.last_outgoing(conversation_id).await {
                Ok(Some(previous)) => {
                    let preview: String =
                        previous.text.chars().take(150).collect::<String>().replace('\n', " ");
                    format!(
                        "[CONTEXTO: O usuário clicou no botão/lista '{}' em resposta à \
                         mensagem: '{preview}...']\n\nUsuário selecionou: {}",
                        message.text, message.text
                    )
                }
                _ => format!(
                    "[CONTEXTO: O usuário clicou no botão/lista '{}']\n\nUsuário selecionou: {}",
                    message.text, message.text
                ),
            }
        } else {
            message.text.clone()
        };

        // Best-effort read receipt after a human-feeling delay
        {
            let adapter = self.adapter.clone();
            let contact_key = message.contact.clone();
            let message_id = message.message_id.clone();
            tokio::spawn(async move {
                tokio::time::sleep(READ_RECEIPT_DELAY).await;
                match adapter.mark_read(&contact_key, &message_id).await {
                    Ok(Delivery::NotSupported) | Ok(Delivery::Sent { .. }) => {}
                    Err(e) => debug!(error = %e, "mark_read failed"),
                }
            });
        }

        let queue_size = self.aggregator.enqueue(
            &message.contact,
            enriched,
            message.display_name,
            conversation_id,
        );

        IngestAck::Queued {
            contact: message.contact.0,
            conversation_id,
            queue_size,
        }
    }

    /// Manual-send entry point: resolve the conversation and dispatch the
    /// text directly, bypassing the agent loop.
    pub async fn manual_send(&self, phone: &str, text: &str) -> Result<i64, String> {
        let contact = self
            .store
            .get_or_create_contact(phone, None)
            .await
            .map_err(|e| e.to_string())?;
        let conversation_id = self
            .store
            .active_conversation(contact.id)
            .await
            .map_err(|e| e.to_string())?;

        let key = ContactKey::new(phone);
        self.dispatcher
            .send_plain(&key, conversation_id, text)
            .await;
        Ok(conversation_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::DispatchConfig;
    use crate::testing::{MockAdapter, ScriptedProvider};
    use adpilot_core::tool::ToolRegistry;
    use adpilot_store::InMemoryStore;

    struct Fixture {
        router: InboundRouter,
        pipeline: Arc<MessagePipeline>,
        adapter: Arc<MockAdapter>,
        store: Arc<InMemoryStore>,
    }

    fn fixture(responses: Vec<adpilot_core::provider::ProviderResponse>) -> Fixture {
        let adapter = Arc::new(MockAdapter::new());
        let store = Arc::new(InMemoryStore::new());
        let events = Arc::new(EventBus::default());

        let dispatcher = Arc::new(Dispatcher::new(
            adapter.clone(),
            store.clone(),
            DispatchConfig {
                part_budget: 800,
                part_delay: Duration::from_millis(0),
            },
            events.clone(),
        ));

        let agent = AgentLoop::new(
            Arc::new(ScriptedProvider::new(responses)),
            "mock-model",
            0.7,
            Arc::new(ToolRegistry::new()),
            events.clone(),
        );

        let pipeline = Arc::new(MessagePipeline::new(
            store.clone(),
            adapter.clone(),
            agent,
            dispatcher.clone(),
            events.clone(),
            5,
        ));

        let aggregator = TurnAggregator::new(
            Duration::from_secs(6),
            pipeline.clone(),
            events.clone(),
        );

        let router = InboundRouter::new(store.clone(), adapter.clone(), aggregator, dispatcher);

        Fixture {
            router,
            pipeline,
            adapter,
            store,
        }
    }

    fn inbound(text: &str) -> InboundMessage {
        InboundMessage {
            contact: ContactKey::new("5511999999999@s.whatsapp.net"),
            message_id: "wamid.1".into(),
            text: text.into(),
            display_name: Some("Lucas".into()),
            interactive_reply: false,
            from_me: false,
            timestamp: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn message_persisted_and_queued() {
        let f = fixture(vec![]);
        let ack = f.router.ingest(InboundEvent::Message(inbound("oi"))).await;

        match ack {
            IngestAck::Queued {
                queue_size,
                conversation_id,
                ..
            } => {
                assert_eq!(queue_size, 1);
                let rows = f.store.all_messages();
                assert_eq!(rows.len(), 1);
                assert_eq!(rows[0].conversation_id, conversation_id);
                assert_eq!(rows[0].direction, Direction::Incoming);
                assert_eq!(rows[0].status, DeliveryStatus::Received);
            }
            other => panic!("Expected queued ack, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn self_sent_message_ignored() {
        let f = fixture(vec![]);
        let mut message = inbound("echo");
        message.from_me = true;
        let ack = f.router.ingest(InboundEvent::Message(message)).await;
        assert_eq!(
            ack,
            IngestAck::Ignored {
                reason: "message from me"
            }
        );
        assert!(f.store.all_messages().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn empty_text_ignored() {
        let f = fixture(vec![]);
        let ack = f.router.ingest(InboundEvent::Message(inbound("  "))).await;
        assert!(matches!(ack, IngestAck::Ignored { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn interactive_reply_enriched_with_last_outgoing() {
        // Router whose aggregator flushes into a recorder, so the buffered
        // (enriched) text is observable
        let adapter = Arc::new(MockAdapter::new());
        let store = Arc::new(InMemoryStore::new());
        let events = Arc::new(EventBus::default());
        let dispatcher = Arc::new(Dispatcher::new(
            adapter.clone(),
            store.clone(),
            DispatchConfig::default(),
            events.clone(),
        ));
        let (sink, mut rx) = crate::testing::RecordingSink::new();
        let aggregator =
            TurnAggregator::new(Duration::from_secs(6), Arc::new(sink), events.clone());
        let router = InboundRouter::new(store.clone(), adapter, aggregator, dispatcher);

        // Seed a conversation with an outgoing message
        let contact = store
            .get_or_create_contact("5511999999999@s.whatsapp.net", None)
            .await
            .unwrap();
        let conv = store.active_conversation(contact.id).await.unwrap();
        store
            .append_message(
                conv,
                "Quer analisar algo específico?",
                Direction::Outgoing,
                DeliveryStatus::Sent,
                None,
            )
            .await
            .unwrap();

        let mut message = inbound("📊 Ver CTR");
        message.interactive_reply = true;
        router.ingest(InboundEvent::Message(message)).await;

        let contact_key = ContactKey::new("5511999999999@s.whatsapp.net");
        router.aggregator().flush(&contact_key);
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }

        let turn = rx.try_recv().expect("flush delivers the buffered turn");
        assert!(turn.text.contains("[CONTEXTO: O usuário clicou no botão/lista '📊 Ver CTR'"));
        assert!(turn.text.contains("Quer analisar algo específico?"));
        assert!(turn.text.ends_with("Usuário selecionou: 📊 Ver CTR"));

        // The raw (unenriched) text is what got persisted
        let rows = store.all_messages();
        assert!(rows.iter().any(|r| r.text == "📊 Ver CTR"));
    }

    #[tokio::test(start_paused = true)]
    async fn status_update_applied_to_row() {
        let f = fixture(vec![]);
        let contact = f.store.get_or_create_contact("5511", None).await.unwrap();
        let conv = f.store.active_conversation(contact.id).await.unwrap();
        f.store
            .append_message(conv, "x", Direction::Outgoing, DeliveryStatus::Sent, Some("wamid.9"))
            .await
            .unwrap();

        let ack = f
            .router
            .ingest(InboundEvent::Status(adpilot_core::channel::StatusUpdate {
                contact: ContactKey::new("5511"),
                provider_message_id: "wamid.9".into(),
                status: DeliveryStatus::Delivered,
            }))
            .await;
        assert_eq!(ack, IngestAck::StatusReceived);
        assert_eq!(f.store.all_messages()[0].status, DeliveryStatus::Delivered);
    }

    #[tokio::test(start_paused = true)]
    async fn turn_runs_agent_and_dispatches() {
        let f = fixture(vec![ScriptedProvider::text("Tudo certo por aqui!")]);

        let turn = TurnContext {
            contact: ContactKey::new("5511999999999@s.whatsapp.net"),
            conversation_id: 1,
            text: "como estão as campanhas?".into(),
            display_name: Some("Lucas".into()),
        };
        f.pipeline.handle_turn(turn).await;

        assert_eq!(f.adapter.texts(), vec!["Tudo certo por aqui!"]);
        let rows = f.store.all_messages();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].direction, Direction::Outgoing);
        assert_eq!(rows[0].status, DeliveryStatus::Sent);
    }

    #[tokio::test(start_paused = true)]
    async fn inference_failure_dispatches_apology() {
        // Empty script = provider error on first call
        let f = fixture(vec![]);

        let turn = TurnContext {
            contact: ContactKey::new("5511"),
            conversation_id: 1,
            text: "oi".into(),
            display_name: None,
        };
        f.pipeline.handle_turn(turn).await;

        assert_eq!(f.adapter.texts(), vec![FALLBACK_ERROR]);
        assert_eq!(f.store.all_messages()[0].text, FALLBACK_ERROR);
    }

    #[tokio::test(start_paused = true)]
    async fn typing_indicator_attempted_and_aborted() {
        let f = fixture(vec![ScriptedProvider::text("resposta")]);

        let turn = TurnContext {
            contact: ContactKey::new("5511"),
            conversation_id: 1,
            text: "oi".into(),
            display_name: None,
        };
        f.pipeline.handle_turn(turn).await;

        let calls = f.adapter.presence_calls.lock().unwrap().clone();
        assert!(calls.contains(&PresenceKind::Composing));
    }

    #[tokio::test(start_paused = true)]
    async fn manual_send_bypasses_agent() {
        let f = fixture(vec![]);
        let conv = f
            .router
            .manual_send("5511999999999", "**aviso** rápido")
            .await
            .unwrap();

        assert_eq!(f.adapter.texts(), vec!["*aviso* rápido"]);
        let rows = f.store.all_messages();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].conversation_id, conv);
    }
}
