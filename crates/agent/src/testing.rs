//! Shared test doubles for the pipeline crates' unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use adpilot_core::channel::{
    ContactKey, Delivery, InboundEvent, MessagingAdapter, PresenceKind,
};
use adpilot_core::error::{ChannelError, ProviderError};
use adpilot_core::message::{Message, MessageToolCall, TurnContext};
use adpilot_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use adpilot_core::response::{ButtonsPayload, ListPayload};

use crate::debounce::TurnSink;

/// A sink that forwards flushed turns into a channel for assertions.
pub struct RecordingSink {
    tx: tokio::sync::mpsc::UnboundedSender<TurnContext>,
}

impl RecordingSink {
    pub fn new() -> (Self, tokio::sync::mpsc::UnboundedReceiver<TurnContext>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl TurnSink for RecordingSink {
    async fn handle_turn(&self, turn: TurnContext) {
        let _ = self.tx.send(turn);
    }
}

/// A provider that replays a scripted sequence of responses and records
/// every request it sees.
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<ProviderResponse>>,
    pub requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn text(content: &str) -> ProviderResponse {
        ProviderResponse {
            message: Message::assistant(content),
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }),
            model: "mock-model".into(),
        }
    }

    pub fn tool_call(name: &str, arguments: &str, call_id: &str) -> ProviderResponse {
        let mut message = Message::assistant("");
        message.tool_calls.push(MessageToolCall {
            id: call_id.into(),
            name: name.into(),
            arguments: arguments.into(),
        });
        ProviderResponse {
            message,
            usage: None,
            model: "mock-model".into(),
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ProviderError::Network("script exhausted".into()))
    }
}

/// A provider that requests the same tool call forever — exercises the
/// iteration ceiling.
pub struct AlwaysToolProvider {
    pub calls: Mutex<u32>,
}

impl AlwaysToolProvider {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(0),
        }
    }
}

#[async_trait]
impl Provider for AlwaysToolProvider {
    fn name(&self) -> &str {
        "always-tool"
    }

    async fn complete(
        &self,
        _request: ProviderRequest,
    ) -> Result<ProviderResponse, ProviderError> {
        let mut calls = self.calls.lock().unwrap();
        *calls += 1;
        Ok(ScriptedProvider::tool_call(
            "echo",
            r#"{"text":"again"}"#,
            &format!("call_{calls}"),
        ))
    }
}

/// A provider that always fails — exercises the fatal-inference path.
pub struct FailingProvider;

#[async_trait]
impl Provider for FailingProvider {
    fn name(&self) -> &str {
        "failing"
    }

    async fn complete(
        &self,
        _request: ProviderRequest,
    ) -> Result<ProviderResponse, ProviderError> {
        Err(ProviderError::Network("connection refused".into()))
    }
}

/// Per-capability behavior of the mock adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SendMode {
    #[default]
    Succeed,
    NotSupported,
    Fail,
}

/// A configurable messaging adapter that records every send.
#[derive(Default)]
pub struct MockAdapter {
    pub text_mode: SendMode,
    pub buttons_mode: SendMode,
    pub list_mode: SendMode,
    pub presence_mode: SendMode,
    pub sent_texts: Mutex<Vec<String>>,
    pub sent_buttons: Mutex<Vec<ButtonsPayload>>,
    pub sent_lists: Mutex<Vec<ListPayload>>,
    pub presence_calls: Mutex<Vec<PresenceKind>>,
    pub read_marks: Mutex<Vec<String>>,
}

impl MockAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn outcome(mode: SendMode) -> Result<Delivery, ChannelError> {
        match mode {
            SendMode::Succeed => Ok(Delivery::sent()),
            SendMode::NotSupported => Ok(Delivery::NotSupported),
            SendMode::Fail => Err(ChannelError::DeliveryFailed {
                channel: "mock".into(),
                reason: "scripted failure".into(),
            }),
        }
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent_texts.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessagingAdapter for MockAdapter {
    fn name(&self) -> &str {
        "mock"
    }

    async fn send_text(&self, _to: &ContactKey, body: &str) -> Result<Delivery, ChannelError> {
        self.sent_texts.lock().unwrap().push(body.to_string());
        Self::outcome(self.text_mode)
    }

    async fn send_buttons(
        &self,
        _to: &ContactKey,
        payload: &ButtonsPayload,
    ) -> Result<Delivery, ChannelError> {
        self.sent_buttons.lock().unwrap().push(payload.clone());
        Self::outcome(self.buttons_mode)
    }

    async fn send_list(
        &self,
        _to: &ContactKey,
        payload: &ListPayload,
    ) -> Result<Delivery, ChannelError> {
        self.sent_lists.lock().unwrap().push(payload.clone());
        Self::outcome(self.list_mode)
    }

    async fn mark_read(
        &self,
        _to: &ContactKey,
        message_id: &str,
    ) -> Result<Delivery, ChannelError> {
        self.read_marks.lock().unwrap().push(message_id.to_string());
        Ok(Delivery::sent())
    }

    async fn send_presence(
        &self,
        _to: &ContactKey,
        kind: PresenceKind,
    ) -> Result<Delivery, ChannelError> {
        self.presence_calls.lock().unwrap().push(kind);
        Self::outcome(self.presence_mode)
    }

    fn parse_webhook(&self, _payload: &serde_json::Value) -> Option<InboundEvent> {
        None
    }
}

/// Convenience turn for loop/dispatch tests.
pub fn make_turn(text: &str) -> TurnContext {
    TurnContext {
        contact: ContactKey::new("5511999999999@s.whatsapp.net"),
        conversation_id: 1,
        text: text.into(),
        display_name: Some("Lucas".into()),
    }
}
