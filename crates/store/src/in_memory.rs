//! In-memory conversation store for unit tests.
//!
//! Mirrors the SQLite backend's behavior without touching disk.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Mutex;

use adpilot_core::error::StoreError;
use adpilot_core::store::{Contact, ConversationStore, DeliveryStatus, Direction, StoredMessage};

#[derive(Default)]
struct Inner {
    contacts: Vec<Contact>,
    /// (conversation_id, contact_id)
    conversations: Vec<(i64, i64)>,
    messages: Vec<StoredMessage>,
    next_id: i64,
}

impl Inner {
    fn next(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// A mutex-guarded in-memory store.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored messages, in insertion order. Test helper.
    pub fn all_messages(&self) -> Vec<StoredMessage> {
        self.inner.lock().unwrap().messages.clone()
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn get_or_create_contact(
        &self,
        phone: &str,
        name: Option<&str>,
    ) -> Result<Contact, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(contact) = inner.contacts.iter_mut().find(|c| c.phone == phone) {
            if contact.name.is_none() {
                if let Some(n) = name {
                    if !n.is_empty() {
                        contact.name = Some(n.to_string());
                    }
                }
            }
            return Ok(contact.clone());
        }

        let id = inner.next();
        let contact = Contact {
            id,
            phone: phone.to_string(),
            name: name.map(String::from),
        };
        inner.contacts.push(contact.clone());
        Ok(contact)
    }

    async fn active_conversation(&self, contact_id: i64) -> Result<i64, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some((conv_id, _)) = inner
            .conversations
            .iter()
            .find(|(_, cid)| *cid == contact_id)
        {
            return Ok(*conv_id);
        }
        let id = inner.next();
        inner.conversations.push((id, contact_id));
        Ok(id)
    }

    async fn append_message(
        &self,
        conversation_id: i64,
        text: &str,
        direction: Direction,
        status: DeliveryStatus,
        provider_message_id: Option<&str>,
    ) -> Result<i64, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next();
        inner.messages.push(StoredMessage {
            id,
            conversation_id,
            direction,
            status,
            text: text.to_string(),
            provider_message_id: provider_message_id.map(String::from),
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn recent_messages(
        &self,
        conversation_id: i64,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut matching: Vec<StoredMessage> = inner
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect();
        if matching.len() > limit {
            matching = matching.split_off(matching.len() - limit);
        }
        Ok(matching)
    }

    async fn last_outgoing(
        &self,
        conversation_id: i64,
    ) -> Result<Option<StoredMessage>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .messages
            .iter()
            .rev()
            .find(|m| m.conversation_id == conversation_id && m.direction == Direction::Outgoing)
            .cloned())
    }

    async fn update_status_by_provider_id(
        &self,
        provider_message_id: &str,
        status: DeliveryStatus,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let mut updated = false;
        for msg in inner.messages.iter_mut() {
            if msg.provider_message_id.as_deref() == Some(provider_message_id) {
                msg.status = status;
                updated = true;
            }
        }
        Ok(updated)
    }
}
