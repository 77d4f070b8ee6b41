//! Prepares interactive reply buttons (max 3).
//!
//! The tool validates and builds the payload, then hands it back on the
//! tool result; the dispatcher attaches it to the outgoing response. No
//! state outlives the orchestration run.

use async_trait::async_trait;

use adpilot_core::error::ToolError;
use adpilot_core::response::{ButtonSpec, ButtonsPayload, InteractivePayload};
use adpilot_core::tool::{Tool, ToolResult};

const MAX_BUTTONS: usize = 3;
const MAX_TITLE_LEN: usize = 20;

pub struct SendButtonsTool;

#[async_trait]
impl Tool for SendButtonsTool {
    fn name(&self) -> &str {
        "send_whatsapp_buttons"
    }

    fn description(&self) -> &str {
        "Envia botões interativos no WhatsApp (máximo 3). Use para oferecer \
         1-3 opções rápidas após apresentar dados ou análise. Título do botão: \
         máximo 20 caracteres. NÃO use para menus grandes — para isso existe \
         send_whatsapp_list."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "body_text": {
                    "type": "string",
                    "description": "Texto principal da mensagem (pergunta/sugestão)"
                },
                "buttons": {
                    "type": "array",
                    "description": "Botões, cada um com id e title (máx 20 caracteres)",
                    "items": {
                        "type": "object",
                        "properties": {
                            "id": { "type": "string" },
                            "title": { "type": "string" }
                        },
                        "required": ["id", "title"]
                    },
                    "minItems": 1,
                    "maxItems": 3
                },
                "footer_text": {
                    "type": "string",
                    "description": "Texto opcional no rodapé"
                }
            },
            "required": ["body_text", "buttons"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let body_text = arguments["body_text"].as_str().unwrap_or_default();
        if body_text.is_empty() {
            return Ok(ToolResult::rejected(
                "❌ Erro: body_text não pode estar vazio",
            ));
        }

        let Some(raw_buttons) = arguments["buttons"].as_array() else {
            return Ok(ToolResult::rejected(
                "❌ Erro: Você deve fornecer de 1 a 3 botões (máximo 3)",
            ));
        };
        if raw_buttons.is_empty() || raw_buttons.len() > MAX_BUTTONS {
            return Ok(ToolResult::rejected(
                "❌ Erro: Você deve fornecer de 1 a 3 botões (máximo 3)",
            ));
        }

        let mut buttons = Vec::with_capacity(raw_buttons.len());
        for (i, raw) in raw_buttons.iter().enumerate() {
            let (Some(id), Some(title)) = (raw["id"].as_str(), raw["title"].as_str()) else {
                return Ok(ToolResult::rejected(format!(
                    "❌ Erro: Botão {} deve ter 'id' e 'title'",
                    i + 1
                )));
            };
            if title.chars().count() > MAX_TITLE_LEN {
                return Ok(ToolResult::rejected(format!(
                    "❌ Erro: Botão '{title}' tem mais de {MAX_TITLE_LEN} caracteres (máx: {MAX_TITLE_LEN})"
                )));
            }
            buttons.push(ButtonSpec {
                id: id.to_string(),
                title: title.to_string(),
            });
        }

        let count = buttons.len();
        let payload = ButtonsPayload {
            body: body_text.to_string(),
            buttons,
            footer: arguments["footer_text"].as_str().map(String::from),
        };

        Ok(ToolResult::ok(format!(
            "✅ {count} botão(ões) preparado(s) para envio. Os botões serão anexados à mensagem."
        ))
        .with_payload(InteractivePayload::Buttons(payload)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn builds_payload_on_result() {
        let result = SendButtonsTool
            .execute(json!({
                "body_text": "Quer analisar algo específico?",
                "buttons": [
                    {"id": "1", "title": "📊 Ver CTR/CPC"},
                    {"id": "2", "title": "📈 Comparar"}
                ]
            }))
            .await
            .unwrap();

        assert!(result.success);
        assert!(result.output.contains("2 botão(ões) preparado(s)"));
        match result.payload {
            Some(InteractivePayload::Buttons(payload)) => {
                assert_eq!(payload.body, "Quer analisar algo específico?");
                assert_eq!(payload.buttons.len(), 2);
                assert_eq!(payload.buttons[1].title, "📈 Comparar");
                assert!(payload.footer.is_none());
            }
            other => panic!("Expected buttons payload, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn footer_carried_through() {
        let result = SendButtonsTool
            .execute(json!({
                "body_text": "b",
                "buttons": [{"id": "1", "title": "ok"}],
                "footer_text": "adpilot"
            }))
            .await
            .unwrap();
        match result.payload {
            Some(InteractivePayload::Buttons(p)) => {
                assert_eq!(p.footer.as_deref(), Some("adpilot"))
            }
            _ => panic!("missing payload"),
        }
    }

    #[tokio::test]
    async fn four_buttons_rejected() {
        let result = SendButtonsTool
            .execute(json!({
                "body_text": "b",
                "buttons": [
                    {"id": "1", "title": "a"},
                    {"id": "2", "title": "b"},
                    {"id": "3", "title": "c"},
                    {"id": "4", "title": "d"}
                ]
            }))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.payload.is_none());
        assert!(result.output.contains("1 a 3 botões"));
    }

    #[tokio::test]
    async fn long_title_rejected() {
        let result = SendButtonsTool
            .execute(json!({
                "body_text": "b",
                "buttons": [{"id": "1", "title": "um título comprido demais para caber"}]
            }))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.output.contains("mais de 20 caracteres"));
    }

    #[tokio::test]
    async fn empty_body_rejected() {
        let result = SendButtonsTool
            .execute(json!({"body_text": "", "buttons": [{"id": "1", "title": "ok"}]}))
            .await
            .unwrap();
        assert!(!result.success);
    }

    #[tokio::test]
    async fn button_without_title_rejected() {
        let result = SendButtonsTool
            .execute(json!({"body_text": "b", "buttons": [{"id": "1"}]}))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.output.contains("deve ter 'id' e 'title'"));
    }
}
