//! Portfolio summary: spend and results across every managed account.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Local, NaiveDate};

use adpilot_core::error::ToolError;
use adpilot_core::tool::{Tool, ToolResult};

use crate::accounts::AccountDirectory;
use crate::graph::{
    GraphClient, count_results, default_period, format_date_br, group_thousands, numeric_field,
};

pub struct AllAccountsInsightsTool {
    graph: GraphClient,
    directory: Arc<AccountDirectory>,
}

/// Per-account aggregation used by the renderer.
#[derive(Debug, Clone)]
pub struct AccountSummary {
    pub name: String,
    pub act_id: String,
    pub spend: f64,
    pub results: i64,
}

impl AccountSummary {
    fn cost_per_result(&self) -> f64 {
        if self.results > 0 {
            self.spend / self.results as f64
        } else {
            0.0
        }
    }
}

/// Render the portfolio summary. Accounts with data are sorted by spend,
/// highest first; accounts without data are listed at the end.
pub fn format_summary(
    mut with_data: Vec<AccountSummary>,
    without_data: Vec<String>,
    since: NaiveDate,
    until: NaiveDate,
    total_accounts: usize,
) -> String {
    let mut result = format!(
        "📊 *Resumo de Todas as Contas*\n📅 Período: {} a {}\n📁 Total de contas: {}\n\n",
        format_date_br(since),
        format_date_br(until),
        total_accounts
    );

    let total_spend: f64 = with_data.iter().map(|a| a.spend).sum();
    let total_results: i64 = with_data.iter().map(|a| a.results).sum();

    if !with_data.is_empty() {
        result.push_str("✅ *Contas Ativas:*\n\n");
        with_data.sort_by(|a, b| b.spend.total_cmp(&a.spend));

        for (idx, account) in with_data.iter().enumerate() {
            result.push_str(&format!("{}. *{}*\n", idx + 1, account.name));
            result.push_str(&format!("   💰 Gasto: R$ {:.2}\n", account.spend));
            result.push_str(&format!(
                "   🎯 Resultados: {}\n",
                group_thousands(account.results)
            ));
            result.push_str(&format!("   📊 CPR: R$ {:.2}\n", account.cost_per_result()));
            result.push_str(&format!("   🆔 {}\n\n", account.act_id));
        }

        result.push_str("━━━━━━━━━━━━━━━━━━━\n");
        result.push_str(&format!("💵 *Total Investido:* R$ {total_spend:.2}\n"));
        result.push_str(&format!(
            "🎯 *Total de Resultados:* {}\n",
            group_thousands(total_results)
        ));
        if total_results > 0 {
            result.push_str(&format!(
                "📊 *CPR Médio:* R$ {:.2}\n",
                total_spend / total_results as f64
            ));
        }
    }

    if !without_data.is_empty() {
        result.push_str(&format!(
            "\n⚠️ *{} conta(s) sem campanhas ativas neste período:*\n",
            without_data.len()
        ));
        for name in &without_data {
            result.push_str(&format!("• {name}\n"));
        }
    }

    result.trim_end().to_string()
}

impl AllAccountsInsightsTool {
    pub fn new(graph: GraphClient, directory: Arc<AccountDirectory>) -> Self {
        Self { graph, directory }
    }
}

#[async_trait]
impl Tool for AllAccountsInsightsTool {
    fn name(&self) -> &str {
        "get_all_accounts_insights"
    }

    fn description(&self) -> &str {
        "Resumo de desempenho de TODAS as contas de anúncio: gasto, resultados \
         e custo por resultado de cada uma, ordenados por investimento. \
         Ferramenta ideal para 'como estão as campanhas' e visão geral. \
         Sem datas, usa os últimos 7 dias completos."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "start_date": {
                    "type": "string",
                    "description": "Data inicial YYYY-MM-DD. Deixe vazio para os últimos 7 dias"
                },
                "end_date": {
                    "type": "string",
                    "description": "Data final YYYY-MM-DD. Deixe vazio para até ontem"
                }
            },
            "required": []
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        if self.directory.is_empty() {
            return Ok(ToolResult::rejected(
                "❌ Nenhuma conta de anúncio configurada.",
            ));
        }

        let today = Local::now().date_naive();
        let (default_since, default_until) = default_period(today);
        let since = arguments["start_date"]
            .as_str()
            .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
            .unwrap_or(default_since);
        let until = arguments["end_date"]
            .as_str()
            .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
            .unwrap_or(default_until);

        let mut with_data = Vec::new();
        let mut without_data = Vec::new();

        // One account failing must not hide the others
        for account in self.directory.all() {
            let response = self
                .graph
                .get(
                    &format!("{}/insights", account.act_id()),
                    &[
                        ("level", "account".into()),
                        ("time_range", GraphClient::time_range(since, until)),
                        ("fields", "spend,actions".into()),
                    ],
                )
                .await;

            match response {
                Ok(body) => match body["data"].as_array().and_then(|rows| rows.first()) {
                    Some(row) => with_data.push(AccountSummary {
                        name: account.name.clone(),
                        act_id: account.act_id(),
                        spend: numeric_field(row, "spend"),
                        results: count_results(row.get("actions")),
                    }),
                    None => without_data.push(account.name.clone()),
                },
                Err(_) => without_data.push(account.name.clone()),
            }
        }

        Ok(ToolResult::ok(format_summary(
            with_data,
            without_data,
            since,
            until,
            self.directory.all().len(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window() -> (NaiveDate, NaiveDate) {
        (
            NaiveDate::from_ymd_opt(2025, 6, 3).unwrap(),
            NaiveDate::from_ymd_opt(2025, 6, 9).unwrap(),
        )
    }

    #[test]
    fn accounts_sorted_by_spend_with_totals() {
        let (since, until) = window();
        let text = format_summary(
            vec![
                AccountSummary {
                    name: "Vorp Tech".into(),
                    act_id: "act_2".into(),
                    spend: 150.0,
                    results: 10,
                },
                AccountSummary {
                    name: "Vorp Scale".into(),
                    act_id: "act_1".into(),
                    spend: 900.0,
                    results: 30,
                },
            ],
            vec![],
            since,
            until,
            2,
        );

        let scale_pos = text.find("Vorp Scale").unwrap();
        let tech_pos = text.find("Vorp Tech").unwrap();
        assert!(scale_pos < tech_pos, "highest spend first");
        assert!(text.contains("💵 *Total Investido:* R$ 1050.00"));
        assert!(text.contains("🎯 *Total de Resultados:* 40"));
        assert!(text.contains("📊 *CPR Médio:* R$ 26.25"));
    }

    #[test]
    fn silent_accounts_listed_separately() {
        let (since, until) = window();
        let text = format_summary(
            vec![AccountSummary {
                name: "Vorp Scale".into(),
                act_id: "act_1".into(),
                spend: 100.0,
                results: 0,
            }],
            vec!["Vorp Edu (Eventos)".into()],
            since,
            until,
            2,
        );
        assert!(text.contains("1 conta(s) sem campanhas ativas"));
        assert!(text.contains("• Vorp Edu (Eventos)"));
        // Zero results: CPR line shows 0.00 and no average CPR
        assert!(text.contains("📊 CPR: R$ 0.00"));
        assert!(!text.contains("CPR Médio"));
    }
}
