//! Campaign budget arithmetic.

use async_trait::async_trait;

use adpilot_core::error::ToolError;
use adpilot_core::tool::{Tool, ToolResult};

pub struct BudgetCalculatorTool;

#[async_trait]
impl Tool for BudgetCalculatorTool {
    fn name(&self) -> &str {
        "calculate_ad_budget"
    }

    fn description(&self) -> &str {
        "Calcula o orçamento total de uma campanha: orçamento diário x número de dias."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "daily_budget": {
                    "type": "number",
                    "description": "Orçamento diário em reais"
                },
                "days": {
                    "type": "integer",
                    "description": "Número de dias da campanha"
                },
                "currency": {
                    "type": "string",
                    "description": "Moeda (padrão: BRL)"
                }
            },
            "required": ["daily_budget", "days"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let daily_budget = arguments["daily_budget"]
            .as_f64()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'daily_budget'".into()))?;
        let days = arguments["days"]
            .as_i64()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'days'".into()))?;
        if days <= 0 {
            return Err(ToolError::InvalidArguments(
                "'days' must be positive".into(),
            ));
        }
        let currency = arguments["currency"].as_str().unwrap_or("BRL");

        let total = daily_budget * days as f64;
        Ok(ToolResult::ok(format!(
            "Orçamento total: {currency} {total:.2} (Diário: {currency} {daily_budget:.2} x {days} dias)"
        )))
    }
}
