//! The agent orchestration loop.
//!
//! One run alternates between model inference (REASON) and tool execution
//! (ACT) until the model produces a tool-free response (DONE). Tool failures
//! are converted into tool-result messages so the model can recover; only
//! inference failures abort the turn. A bounded iteration ceiling guards
//! against a model that requests tools forever.

use std::sync::Arc;
use std::time::Instant;

use chrono::{Local, Utc};
use tracing::{debug, info, warn};

use adpilot_core::error::Error;
use adpilot_core::event::{DomainEvent, EventBus};
use adpilot_core::message::{Message, TurnContext};
use adpilot_core::provider::{Provider, ProviderRequest};
use adpilot_core::response::{InteractivePayload, LogicalResponse};
use adpilot_core::store::{Direction, StoredMessage};
use adpilot_core::tool::{ToolCall, ToolRegistry};

use crate::format::{FormatOptions, format_response};
use crate::prompt;

/// Substitute when the model's final content is empty or whitespace-only.
pub const FALLBACK_EMPTY: &str =
    "Desculpe, não consegui processar sua solicitação. Pode reformular a pergunta?";

/// Generic apology for turns that fail fatally (inference error, ceiling).
pub const FALLBACK_ERROR: &str =
    "Desculpe, ocorreu um erro ao processar sua mensagem. Por favor, tente novamente.";

/// The reason/act loop runner.
pub struct AgentLoop {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    tools: Arc<ToolRegistry>,
    max_iterations: u32,
    format: FormatOptions,
    event_bus: Arc<EventBus>,
}

impl AgentLoop {
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        temperature: f32,
        tools: Arc<ToolRegistry>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature,
            max_tokens: None,
            tools,
            max_iterations: 10,
            format: FormatOptions::default(),
            event_bus,
        }
    }

    /// Set the ceiling on reason/act iterations per turn.
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    /// Set the default max tokens per LLM response.
    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Override the formatting/repair thresholds.
    pub fn with_format_options(mut self, options: FormatOptions) -> Self {
        self.format = options;
        self
    }

    /// Run one turn to completion and produce a logical response.
    ///
    /// `history` is the persisted conversation window, oldest first; it seeds
    /// the message list before the combined user turn is appended.
    pub async fn run(
        &self,
        turn: &TurnContext,
        history: &[StoredMessage],
    ) -> Result<LogicalResponse, Error> {
        info!(
            conversation_id = turn.conversation_id,
            contact = %turn.contact,
            history = history.len(),
            "Starting orchestration run"
        );

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::system(prompt::system_prompt(
            Local::now(),
            turn.display_name.as_deref(),
        )));
        for stored in history {
            match stored.direction {
                Direction::Incoming => messages.push(Message::user(&stored.text)),
                Direction::Outgoing => messages.push(Message::assistant(&stored.text)),
            }
        }
        messages.push(Message::user(&turn.text));

        let tool_definitions = self.tools.definitions();

        // At most one payload survives a run; a List outranks Buttons.
        let mut payload_slot: Option<InteractivePayload> = None;
        let mut iteration = 0;

        loop {
            iteration += 1;
            if iteration > self.max_iterations {
                warn!(
                    conversation_id = turn.conversation_id,
                    iterations = iteration,
                    "Iteration ceiling reached, aborting turn"
                );
                return Ok(LogicalResponse::text_only(FALLBACK_ERROR));
            }

            debug!(
                conversation_id = turn.conversation_id,
                iteration, "Agent loop iteration"
            );

            let request = ProviderRequest {
                model: self.model.clone(),
                messages: messages.clone(),
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                tools: tool_definitions.clone(),
            };

            // Inference failure is fatal to the turn and propagates
            let response = self.provider.complete(request).await?;

            if let Some(usage) = &response.usage {
                self.event_bus.publish(DomainEvent::ResponseGenerated {
                    conversation_id: turn.conversation_id,
                    model: response.model.clone(),
                    tokens_used: usage.total_tokens,
                    timestamp: Utc::now(),
                });
            }

            if response.message.tool_calls.is_empty() {
                // DONE: tool-free response — format and return
                let content = response.message.content;
                let raw = if content.trim().is_empty() {
                    warn!(
                        conversation_id = turn.conversation_id,
                        "Model returned empty content, substituting fallback"
                    );
                    FALLBACK_EMPTY.to_string()
                } else {
                    content
                };

                let formatted = format_response(&raw, &self.format);
                let payload = match (payload_slot.take(), formatted.repaired_buttons) {
                    // An explicit tool payload always wins over the repair
                    (Some(explicit), _) => Some(explicit),
                    (None, Some(repaired)) => Some(InteractivePayload::Buttons(repaired)),
                    (None, None) => None,
                };

                return Ok(LogicalResponse {
                    text: formatted.text,
                    payload,
                });
            }

            // ACT: execute every requested call in issue order
            let tool_calls = response.message.tool_calls.clone();
            messages.push(response.message);

            for tc in &tool_calls {
                let call = ToolCall {
                    id: tc.id.clone(),
                    name: tc.name.clone(),
                    arguments: serde_json::from_str(&tc.arguments).unwrap_or_default(),
                };

                let start = Instant::now();
                let result = self.tools.execute(&call).await;
                let duration_ms = start.elapsed().as_millis() as u64;

                match result {
                    Ok(tool_result) => {
                        self.event_bus.publish(DomainEvent::ToolExecuted {
                            tool_name: tc.name.clone(),
                            success: tool_result.success,
                            duration_ms,
                            timestamp: Utc::now(),
                        });

                        if let Some(payload) = tool_result.payload {
                            payload_slot = merge_payload(payload_slot.take(), payload);
                        }
                        messages.push(Message::tool_result(&tc.id, &tool_result.output));
                    }
                    Err(e) => {
                        // Includes unknown tools — report the failure to the
                        // model instead of aborting the run
                        warn!(tool = %tc.name, error = %e, "Tool execution failed");

                        self.event_bus.publish(DomainEvent::ToolExecuted {
                            tool_name: tc.name.clone(),
                            success: false,
                            duration_ms,
                            timestamp: Utc::now(),
                        });

                        messages.push(Message::tool_result(&tc.id, format!("Error: {e}")));
                    }
                }
            }
            // Loop back to REASON with the tool results appended
        }
    }
}

/// Combine payloads requested during one run: a List replaces anything, a
/// Buttons payload replaces earlier Buttons but never a List.
fn merge_payload(
    current: Option<InteractivePayload>,
    new: InteractivePayload,
) -> Option<InteractivePayload> {
    match (&current, &new) {
        (Some(InteractivePayload::List(_)), InteractivePayload::Buttons(_)) => current,
        _ => Some(new),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{AlwaysToolProvider, FailingProvider, ScriptedProvider, make_turn};
    use adpilot_core::error::ToolError;
    use adpilot_core::message::{MessageToolCall, Role};
    use adpilot_core::response::{ButtonSpec, ButtonsPayload, ListOption, ListPayload};
    use adpilot_core::store::DeliveryStatus;
    use adpilot_core::tool::{Tool, ToolResult};
    use async_trait::async_trait;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes back the input"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
            Ok(ToolResult::ok(
                arguments["text"].as_str().unwrap_or("").to_string(),
            ))
        }
    }

    struct ExplodingTool;

    #[async_trait]
    impl Tool for ExplodingTool {
        fn name(&self) -> &str {
            "exploding"
        }
        fn description(&self) -> &str {
            "Always fails"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
            Err(ToolError::ExecutionFailed {
                tool_name: "exploding".into(),
                reason: "boom".into(),
            })
        }
    }

    struct ButtonsTool;

    #[async_trait]
    impl Tool for ButtonsTool {
        fn name(&self) -> &str {
            "send_whatsapp_buttons"
        }
        fn description(&self) -> &str {
            "Prepare buttons"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
            Ok(ToolResult::ok("buttons prepared").with_payload(
                InteractivePayload::Buttons(ButtonsPayload {
                    body: "Quer ver mais?".into(),
                    buttons: vec![ButtonSpec {
                        id: "1".into(),
                        title: "📊 Ver CTR".into(),
                    }],
                    footer: None,
                }),
            ))
        }
    }

    struct ListTool;

    #[async_trait]
    impl Tool for ListTool {
        fn name(&self) -> &str {
            "send_whatsapp_list"
        }
        fn description(&self) -> &str {
            "Prepare a list"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
            Ok(
                ToolResult::ok("list prepared").with_payload(InteractivePayload::List(
                    ListPayload {
                        body: "Como posso ajudar?".into(),
                        button_label: "Ver opções".into(),
                        options: vec![ListOption {
                            id: "1".into(),
                            title: "📊 Desempenho".into(),
                            description: None,
                        }],
                    },
                )),
            )
        }
    }

    fn registry() -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        registry.register(Box::new(ExplodingTool));
        registry.register(Box::new(ButtonsTool));
        registry.register(Box::new(ListTool));
        Arc::new(registry)
    }

    fn agent(provider: Arc<dyn Provider>) -> AgentLoop {
        AgentLoop::new(
            provider,
            "mock-model",
            0.7,
            registry(),
            Arc::new(EventBus::default()),
        )
    }

    fn history_row(id: i64, direction: Direction, text: &str) -> StoredMessage {
        StoredMessage {
            id,
            conversation_id: 1,
            direction,
            status: DeliveryStatus::Received,
            text: text.into(),
            provider_message_id: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn simple_text_response() {
        let provider = Arc::new(ScriptedProvider::new(vec![ScriptedProvider::text(
            "Tudo certo com as campanhas!",
        )]));
        let response = agent(provider.clone())
            .run(&make_turn("como estão as campanhas?"), &[])
            .await
            .unwrap();

        assert_eq!(response.text, "Tudo certo com as campanhas!");
        assert!(response.payload.is_none());
        assert_eq!(provider.request_count(), 1);
    }

    #[tokio::test]
    async fn markdown_formatted_before_returning() {
        let provider = Arc::new(ScriptedProvider::new(vec![ScriptedProvider::text(
            "## Resumo\n**CTR** em `1,8%`",
        )]));
        let response = agent(provider)
            .run(&make_turn("resumo"), &[])
            .await
            .unwrap();
        assert_eq!(response.text, "*Resumo*\n*CTR* em 1,8%");
    }

    #[tokio::test]
    async fn tool_roundtrip_feeds_result_back() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            ScriptedProvider::tool_call("echo", r#"{"text":"dados da scale"}"#, "call_1"),
            ScriptedProvider::text("A Scale gastou R$ 1.200,00."),
        ]));
        let response = agent(provider.clone())
            .run(&make_turn("como está a scale?"), &[])
            .await
            .unwrap();

        assert_eq!(response.text, "A Scale gastou R$ 1.200,00.");
        assert_eq!(provider.request_count(), 2);

        // The second REASON step saw the tool result appended in order
        let requests = provider.requests.lock().unwrap();
        let second = &requests[1].messages;
        let tool_msg = second.iter().find(|m| m.role == Role::Tool).unwrap();
        assert_eq!(tool_msg.content, "dados da scale");
        assert_eq!(tool_msg.tool_call_id.as_deref(), Some("call_1"));
    }

    #[tokio::test]
    async fn failing_tool_becomes_error_result_and_run_continues() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            ScriptedProvider::tool_call("exploding", "{}", "call_1"),
            ScriptedProvider::text("Não consegui consultar agora."),
        ]));
        let response = agent(provider.clone())
            .run(&make_turn("consulta"), &[])
            .await
            .unwrap();

        assert_eq!(response.text, "Não consegui consultar agora.");
        let requests = provider.requests.lock().unwrap();
        let tool_msg = requests[1]
            .messages
            .iter()
            .find(|m| m.role == Role::Tool)
            .unwrap();
        assert!(tool_msg.content.starts_with("Error:"));
        assert!(tool_msg.content.contains("boom"));
    }

    #[tokio::test]
    async fn unknown_tool_reported_not_fatal() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            ScriptedProvider::tool_call("no_such_tool", "{}", "call_1"),
            ScriptedProvider::text("Seguindo sem a ferramenta."),
        ]));
        let response = agent(provider.clone())
            .run(&make_turn("teste"), &[])
            .await
            .unwrap();

        assert_eq!(response.text, "Seguindo sem a ferramenta.");
        let requests = provider.requests.lock().unwrap();
        let tool_msg = requests[1]
            .messages
            .iter()
            .find(|m| m.role == Role::Tool)
            .unwrap();
        assert!(tool_msg.content.contains("Tool not found"));
    }

    #[tokio::test]
    async fn iteration_ceiling_produces_apology() {
        let provider = Arc::new(AlwaysToolProvider::new());
        let response = agent(provider.clone())
            .with_max_iterations(3)
            .run(&make_turn("loop"), &[])
            .await
            .unwrap();

        assert_eq!(response.text, FALLBACK_ERROR);
        assert_eq!(*provider.calls.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn empty_final_content_substituted() {
        let provider = Arc::new(ScriptedProvider::new(vec![ScriptedProvider::text("   ")]));
        let response = agent(provider).run(&make_turn("oi"), &[]).await.unwrap();
        assert_eq!(response.text, FALLBACK_EMPTY);
    }

    #[tokio::test]
    async fn inference_failure_is_fatal() {
        let result = agent(Arc::new(FailingProvider))
            .run(&make_turn("oi"), &[])
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn tool_payload_attached_to_response() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            ScriptedProvider::tool_call("send_whatsapp_buttons", "{}", "call_1"),
            ScriptedProvider::text("Segue a sugestão."),
        ]));
        let response = agent(provider).run(&make_turn("dados"), &[]).await.unwrap();

        match response.payload {
            Some(InteractivePayload::Buttons(b)) => {
                assert_eq!(b.buttons[0].title, "📊 Ver CTR")
            }
            other => panic!("Expected buttons payload, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn list_outranks_buttons_in_same_run() {
        let mut first = ScriptedProvider::tool_call("send_whatsapp_buttons", "{}", "call_1");
        first.message.tool_calls.push(MessageToolCall {
            id: "call_2".into(),
            name: "send_whatsapp_list".into(),
            arguments: "{}".into(),
        });
        let provider = Arc::new(ScriptedProvider::new(vec![
            first,
            ScriptedProvider::text("Escolha uma opção."),
        ]));
        let response = agent(provider).run(&make_turn("oi"), &[]).await.unwrap();
        assert!(matches!(
            response.payload,
            Some(InteractivePayload::List(_))
        ));
    }

    #[tokio::test]
    async fn buttons_cannot_displace_list() {
        let mut first = ScriptedProvider::tool_call("send_whatsapp_list", "{}", "call_1");
        first.message.tool_calls.push(MessageToolCall {
            id: "call_2".into(),
            name: "send_whatsapp_buttons".into(),
            arguments: "{}".into(),
        });
        let provider = Arc::new(ScriptedProvider::new(vec![
            first,
            ScriptedProvider::text("Escolha uma opção."),
        ]));
        let response = agent(provider).run(&make_turn("oi"), &[]).await.unwrap();
        assert!(matches!(
            response.payload,
            Some(InteractivePayload::List(_))
        ));
    }

    #[tokio::test]
    async fn bracket_repair_fires_without_tool_payload() {
        let provider = Arc::new(ScriptedProvider::new(vec![ScriptedProvider::text(
            "CTR em 1,8%.\n\n[🔍 Ver histórico] [📈 Comparar períodos]",
        )]));
        let response = agent(provider).run(&make_turn("ctr"), &[]).await.unwrap();

        match response.payload {
            Some(InteractivePayload::Buttons(b)) => {
                assert_eq!(b.buttons.len(), 2);
                assert_eq!(b.buttons[0].title, "🔍 Ver histórico");
            }
            other => panic!("Expected repaired buttons, got {other:?}"),
        }
        assert!(!response.text.contains('['));
    }

    #[tokio::test]
    async fn explicit_tool_payload_wins_over_repair() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            ScriptedProvider::tool_call("send_whatsapp_buttons", "{}", "call_1"),
            ScriptedProvider::text("Texto final [etiqueta]"),
        ]));
        let response = agent(provider).run(&make_turn("oi"), &[]).await.unwrap();
        match response.payload {
            Some(InteractivePayload::Buttons(b)) => assert_eq!(b.body, "Quer ver mais?"),
            other => panic!("Expected the tool's buttons, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn history_seeds_message_list_in_order() {
        let provider = Arc::new(ScriptedProvider::new(vec![ScriptedProvider::text("ok")]));
        let history = vec![
            history_row(1, Direction::Incoming, "oi"),
            history_row(2, Direction::Outgoing, "Olá! Como posso ajudar?"),
        ];
        agent(provider.clone())
            .run(&make_turn("saldo da scale"), &history)
            .await
            .unwrap();

        let requests = provider.requests.lock().unwrap();
        let roles: Vec<Role> = requests[0].messages.iter().map(|m| m.role.clone()).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::User]
        );
        assert_eq!(requests[0].messages[3].content, "saldo da scale");
        // The system prompt is personalized with the contact name
        assert!(requests[0].messages[0].content.contains("Lucas"));
    }
}
