//! The per-contact inbound-message debouncer.
//!
//! Bursty user input is buffered per `ContactKey` and flushed as one logical
//! turn after a quiet period measured from the latest message. Every new
//! message cancels the armed timer and arms a fresh full-length one, so only
//! one timer exists per key at any instant. When the provider supports
//! presence, a "stopped typing" signal flushes early.
//!
//! Flush is idempotent: draining happens under the map lock and a drain of
//! an already-emptied entry is a no-op, which makes the timer/presence race
//! harmless. There is no upper bound on the buffer other than memory — no
//! backpressure is applied.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use adpilot_core::channel::{ContactKey, PresenceKind};
use adpilot_core::event::{DomainEvent, EventBus};
use adpilot_core::message::TurnContext;

/// Receives flushed turns. Implemented by the message pipeline; tests plug
/// in recorders.
#[async_trait]
pub trait TurnSink: Send + Sync {
    async fn handle_turn(&self, turn: TurnContext);
}

#[derive(Default)]
struct PendingTurn {
    texts: Vec<String>,
    display_name: Option<String>,
    conversation_id: i64,
    timer: Option<JoinHandle<()>>,
}

struct Inner {
    pending: Mutex<HashMap<ContactKey, PendingTurn>>,
    quiet_period: Duration,
    sink: Arc<dyn TurnSink>,
    events: Arc<EventBus>,
}

impl Inner {
    /// Drain the pending turn for `key` and hand it to the sink.
    ///
    /// Fire-and-forget: the sink runs on its own task. Safe to call from the
    /// timer task itself — everything before the spawn is synchronous.
    fn flush(&self, key: &ContactKey) {
        let turn = {
            let mut map = self.pending.lock().expect("pending map poisoned");
            map.remove(key)
        };

        let Some(mut turn) = turn else {
            return; // already flushed — no-op guards the timer/presence race
        };

        if let Some(timer) = turn.timer.take() {
            timer.abort(); // aborting a completed timer is a no-op
        }

        if turn.texts.is_empty() {
            return;
        }

        let message_count = turn.texts.len();
        debug!(contact = %key, messages = message_count, "Flushing buffered turn");

        self.events.publish(DomainEvent::TurnFlushed {
            contact: key.0.clone(),
            message_count,
            timestamp: Utc::now(),
        });

        let context = TurnContext {
            contact: key.clone(),
            conversation_id: turn.conversation_id,
            text: turn.texts.join("\n"),
            display_name: turn.display_name,
        };

        let sink = self.sink.clone();
        tokio::spawn(async move {
            sink.handle_turn(context).await;
        });
    }
}

/// The debounce aggregator. Cheap to clone via its inner Arc.
pub struct TurnAggregator {
    inner: Arc<Inner>,
}

impl TurnAggregator {
    pub fn new(quiet_period: Duration, sink: Arc<dyn TurnSink>, events: Arc<EventBus>) -> Self {
        Self {
            inner: Arc::new(Inner {
                pending: Mutex::new(HashMap::new()),
                quiet_period,
                sink,
                events,
            }),
        }
    }

    /// Buffer one inbound text and (re)arm the flush timer.
    ///
    /// Returns the buffer size after the append.
    pub fn enqueue(
        &self,
        contact: &ContactKey,
        text: String,
        display_name: Option<String>,
        conversation_id: i64,
    ) -> usize {
        let mut map = self.inner.pending.lock().expect("pending map poisoned");
        let turn = map.entry(contact.clone()).or_default();

        turn.texts.push(text);
        if display_name.is_some() {
            turn.display_name = display_name;
        }
        turn.conversation_id = conversation_id;

        // Cancel-and-rearm: a new message grants the full quiet period again
        if let Some(timer) = turn.timer.take() {
            timer.abort();
            trace!(contact = %contact, "Rearming flush timer");
        }

        let inner = self.inner.clone();
        let key = contact.clone();
        let quiet_period = self.inner.quiet_period;
        turn.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(quiet_period).await;
            inner.flush(&key);
        }));

        let queue_len = turn.texts.len();
        self.inner.events.publish(DomainEvent::MessageQueued {
            contact: contact.0.clone(),
            queue_len,
            timestamp: Utc::now(),
        });
        queue_len
    }

    /// React to a presence signal from the provider.
    ///
    /// "Composing" is an observation only. "Paused"/"Available" with a
    /// non-empty buffer shortens perceived latency by flushing immediately.
    pub fn on_presence(&self, contact: &ContactKey, kind: PresenceKind) {
        match kind {
            PresenceKind::Composing => {
                trace!(contact = %contact, "Contact is composing");
            }
            PresenceKind::Paused | PresenceKind::Available => {
                let has_pending = {
                    let map = self.inner.pending.lock().expect("pending map poisoned");
                    map.get(contact).is_some_and(|t| !t.texts.is_empty())
                };
                if has_pending {
                    debug!(contact = %contact, "Stopped-typing signal, flushing early");
                    self.inner.flush(contact);
                }
            }
        }
    }

    /// Flush the pending turn for a key immediately. No-op when empty.
    pub fn flush(&self, contact: &ContactKey) {
        self.inner.flush(contact);
    }

    /// Current buffer size for a key (0 when absent).
    pub fn pending_len(&self, contact: &ContactKey) -> usize {
        let map = self.inner.pending.lock().expect("pending map poisoned");
        map.get(contact).map_or(0, |t| t.texts.len())
    }
}

impl Clone for TurnAggregator {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingSink;
    use tokio::sync::mpsc;
    use tokio::time::advance;

    const QUIET: Duration = Duration::from_secs(6);

    fn setup() -> (TurnAggregator, mpsc::UnboundedReceiver<TurnContext>) {
        let (sink, rx) = RecordingSink::new();
        let aggregator = TurnAggregator::new(QUIET, Arc::new(sink), Arc::new(EventBus::default()));
        (aggregator, rx)
    }

    fn key(s: &str) -> ContactKey {
        ContactKey::new(s)
    }

    /// Let spawned timer/sink tasks run without advancing the clock.
    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn burst_coalesces_into_single_turn() {
        let (agg, mut rx) = setup();
        let contact = key("5511999999999@s.whatsapp.net");

        agg.enqueue(&contact, "primeira".into(), Some("Lucas".into()), 7);
        agg.enqueue(&contact, "segunda".into(), None, 7);
        agg.enqueue(&contact, "terceira".into(), None, 7);

        settle().await;
        advance(QUIET + Duration::from_millis(50)).await;
        settle().await;

        let turn = rx.try_recv().expect("one flush expected");
        assert_eq!(turn.text, "primeira\nsegunda\nterceira");
        assert_eq!(turn.conversation_id, 7);
        assert_eq!(turn.display_name.as_deref(), Some("Lucas"));
        assert!(rx.try_recv().is_err(), "exactly one orchestration run");
    }

    #[tokio::test(start_paused = true)]
    async fn new_message_rearms_full_timer() {
        let (agg, mut rx) = setup();
        let contact = key("5511");

        agg.enqueue(&contact, "a".into(), None, 1);
        settle().await;
        advance(Duration::from_secs(4)).await;
        agg.enqueue(&contact, "b".into(), None, 1);

        // Original deadline (t=6s) passes without a flush: no partial credit
        settle().await;
        advance(Duration::from_secs(4)).await;
        settle().await;
        assert!(rx.try_recv().is_err(), "timer must have been rearmed");

        // Full quiet period after the second message
        advance(Duration::from_secs(2) + Duration::from_millis(50)).await;
        settle().await;
        let turn = rx.try_recv().expect("flush after full quiet period");
        assert_eq!(turn.text, "a\nb");
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_typing_flushes_early() {
        let (agg, mut rx) = setup();
        let contact = key("5511");

        agg.enqueue(&contact, "oi".into(), None, 1);
        advance(Duration::from_secs(1)).await;

        agg.on_presence(&contact, PresenceKind::Paused);
        settle().await;

        let turn = rx.try_recv().expect("presence should flush immediately");
        assert_eq!(turn.text, "oi");

        // The canceled timer must not produce a second flush
        advance(QUIET * 2).await;
        settle().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn composing_does_not_flush() {
        let (agg, mut rx) = setup();
        let contact = key("5511");

        agg.enqueue(&contact, "oi".into(), None, 1);
        agg.on_presence(&contact, PresenceKind::Composing);
        settle().await;
        assert!(rx.try_recv().is_err());
        assert_eq!(agg.pending_len(&contact), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn presence_with_empty_buffer_is_noop() {
        let (agg, mut rx) = setup();
        let contact = key("5511");

        agg.on_presence(&contact, PresenceKind::Available);
        settle().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn double_flush_is_noop() {
        let (agg, mut rx) = setup();
        let contact = key("5511");

        agg.enqueue(&contact, "só uma".into(), None, 1);
        agg.flush(&contact);
        agg.flush(&contact);
        settle().await;

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err(), "second flush must be silent");
    }

    #[tokio::test(start_paused = true)]
    async fn flush_on_unknown_key_is_noop() {
        let (agg, mut rx) = setup();
        agg.flush(&key("never-seen"));
        settle().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn contacts_are_independent() {
        let (agg, mut rx) = setup();
        let alice = key("5511@s.whatsapp.net");
        let bob = key("5522@s.whatsapp.net");

        agg.enqueue(&alice, "de alice".into(), None, 1);
        agg.enqueue(&bob, "de bob".into(), None, 2);

        settle().await;
        advance(QUIET + Duration::from_millis(50)).await;
        settle().await;

        let mut turns = vec![rx.try_recv().unwrap(), rx.try_recv().unwrap()];
        turns.sort_by_key(|t| t.conversation_id);
        assert_eq!(turns[0].text, "de alice");
        assert_eq!(turns[1].text, "de bob");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn buffer_cleared_after_flush() {
        let (agg, mut rx) = setup();
        let contact = key("5511");

        agg.enqueue(&contact, "um".into(), None, 1);
        settle().await;
        advance(QUIET + Duration::from_millis(50)).await;
        settle().await;
        rx.try_recv().unwrap();
        assert_eq!(agg.pending_len(&contact), 0);

        // The key is reusable for a fresh turn
        agg.enqueue(&contact, "dois".into(), None, 1);
        settle().await;
        advance(QUIET + Duration::from_millis(50)).await;
        settle().await;
        assert_eq!(rx.try_recv().unwrap().text, "dois");
    }
}
