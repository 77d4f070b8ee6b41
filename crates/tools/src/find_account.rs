//! Resolves an ad-account name or alias to its `act_` id.

use std::sync::Arc;

use async_trait::async_trait;

use adpilot_core::error::ToolError;
use adpilot_core::tool::{Tool, ToolResult};

use crate::accounts::AccountDirectory;

pub struct FindAccountTool {
    directory: Arc<AccountDirectory>,
}

impl FindAccountTool {
    pub fn new(directory: Arc<AccountDirectory>) -> Self {
        Self { directory }
    }
}

#[async_trait]
impl Tool for FindAccountTool {
    fn name(&self) -> &str {
        "find_account_by_name"
    }

    fn description(&self) -> &str {
        "Encontra o ID de uma conta de anúncio pelo nome ou apelido \
         (ex: 'Vorp Scale', 'scale'). Use ANTES de get_campaign_insights \
         quando tiver apenas o nome da conta."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "account_name": {
                    "type": "string",
                    "description": "Nome ou apelido da conta (ex: 'Vorp Scale', 'scale')"
                }
            },
            "required": ["account_name"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let query = arguments["account_name"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'account_name'".into()))?;

        match self.directory.find(query) {
            Some(account) => Ok(ToolResult::ok(format!(
                "✅ Conta encontrada: *{}*\n🆔 ID: {}",
                account.name,
                account.act_id()
            ))),
            None => {
                let available: Vec<String> = self
                    .directory
                    .all()
                    .iter()
                    .map(|a| format!("• {}", a.name))
                    .collect();
                Ok(ToolResult::rejected(format!(
                    "❌ Conta '{query}' não encontrada.\n\n📋 Contas disponíveis:\n{}",
                    available.join("\n")
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::sample_directory;

    fn tool() -> FindAccountTool {
        FindAccountTool::new(Arc::new(sample_directory()))
    }

    #[tokio::test]
    async fn resolves_alias_to_act_id() {
        let result = tool()
            .execute(serde_json::json!({"account_name": "scale"}))
            .await
            .unwrap();
        assert!(result.success);
        assert!(result.output.contains("Vorp Scale"));
        assert!(result.output.contains("act_611132268404060"));
    }

    #[tokio::test]
    async fn unknown_name_lists_available_accounts() {
        let result = tool()
            .execute(serde_json::json!({"account_name": "nada a ver"}))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.output.contains("não encontrada"));
        assert!(result.output.contains("• Vorp Tech"));
    }

    #[tokio::test]
    async fn missing_argument_is_invalid() {
        let err = tool().execute(serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
