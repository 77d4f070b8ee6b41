//! Prepares an interactive option list (max 10 options).
//!
//! Like the buttons tool, the payload rides back on the tool result. The
//! tool output includes the text rendering so the model knows what the
//! fallback will look like.

use async_trait::async_trait;

use adpilot_core::error::ToolError;
use adpilot_core::response::{InteractivePayload, ListOption, ListPayload};
use adpilot_core::tool::{Tool, ToolResult};

const MAX_OPTIONS: usize = 10;
const MAX_TITLE_LEN: usize = 24;
const MAX_DESCRIPTION_LEN: usize = 72;

pub struct SendListTool;

#[async_trait]
impl Tool for SendListTool {
    fn name(&self) -> &str {
        "send_whatsapp_list"
    }

    fn description(&self) -> &str {
        "Envia uma lista de opções interativa no WhatsApp. Use quando precisar \
         dar múltiplas escolhas ao usuário — especialmente o menu inicial após \
         um cumprimento. Máximo 10 opções; título até 24 caracteres, descrição \
         opcional até 72."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "body_text": {
                    "type": "string",
                    "description": "Texto principal explicando as opções"
                },
                "button_text": {
                    "type": "string",
                    "description": "Texto do botão que abre a lista (ex: 'Ver opções')"
                },
                "options": {
                    "type": "array",
                    "description": "Opções disponíveis",
                    "items": {
                        "type": "object",
                        "properties": {
                            "id": { "type": "string" },
                            "title": { "type": "string", "description": "Máximo 24 caracteres" },
                            "description": { "type": "string", "description": "Opcional, máximo 72 caracteres" }
                        },
                        "required": ["id", "title"]
                    },
                    "minItems": 1,
                    "maxItems": 10
                }
            },
            "required": ["body_text", "button_text", "options"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let body_text = arguments["body_text"].as_str().unwrap_or_default();
        let button_text = arguments["button_text"].as_str().unwrap_or_default();
        if body_text.is_empty() || button_text.is_empty() {
            return Ok(ToolResult::rejected(
                "❌ Erro: body_text e button_text são obrigatórios",
            ));
        }

        let Some(raw_options) = arguments["options"].as_array() else {
            return Ok(ToolResult::rejected("❌ Erro: É necessário pelo menos uma opção."));
        };
        if raw_options.is_empty() {
            return Ok(ToolResult::rejected("❌ Erro: É necessário pelo menos uma opção."));
        }
        if raw_options.len() > MAX_OPTIONS {
            return Ok(ToolResult::rejected(
                "❌ Erro: Máximo de 10 opções permitidas. Por favor, reduza o número de opções.",
            ));
        }

        let mut options = Vec::with_capacity(raw_options.len());
        for raw in raw_options {
            let (Some(id), Some(title)) = (raw["id"].as_str(), raw["title"].as_str()) else {
                return Ok(ToolResult::rejected(
                    "❌ Erro: Cada opção precisa ter id e title",
                ));
            };
            if title.chars().count() > MAX_TITLE_LEN {
                return Ok(ToolResult::rejected(format!(
                    "❌ Erro: O título '{title}' excede {MAX_TITLE_LEN} caracteres."
                )));
            }
            let description = raw["description"].as_str().map(String::from);
            if let Some(desc) = &description {
                if desc.chars().count() > MAX_DESCRIPTION_LEN {
                    return Ok(ToolResult::rejected(format!(
                        "❌ Erro: A descrição de '{title}' excede {MAX_DESCRIPTION_LEN} caracteres."
                    )));
                }
            }
            options.push(ListOption {
                id: id.to_string(),
                title: title.to_string(),
                description,
            });
        }

        let payload = ListPayload {
            body: body_text.to_string(),
            button_label: button_text.to_string(),
            options,
        };
        let text_version = payload.as_text();

        Ok(ToolResult::ok(format!(
            "✅ Lista preparada para envio. Versão texto:\n\n{text_version}"
        ))
        .with_payload(InteractivePayload::List(payload)))
    }
}
