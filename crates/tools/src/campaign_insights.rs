//! Campaign performance insights for one ad account.

use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use serde_json::Value;

use adpilot_core::error::ToolError;
use adpilot_core::tool::{Tool, ToolResult};

use crate::accounts::normalize_act_id;
use crate::graph::{
    GraphClient, count_results, default_period, format_date_br, group_thousands, numeric_field,
};

const VALID_LEVELS: &[&str] = &["campaign", "adset", "ad"];
const VALID_METRICS: &[&str] = &[
    "impressions",
    "reach",
    "clicks",
    "ctr",
    "cpc",
    "cpp",
    "cpm",
    "frequency",
    "video_views",
    "conversions",
    "cost_per_conversion",
];
const MAX_ITEMS: usize = 20;

pub struct CampaignInsightsTool {
    graph: GraphClient,
}

impl CampaignInsightsTool {
    pub fn new(graph: GraphClient) -> Self {
        Self { graph }
    }
}

fn parse_date(value: &Value) -> Option<NaiveDate> {
    value
        .as_str()
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
}

fn name_field(level: &str) -> &'static str {
    match level {
        "adset" => "adset_name",
        "ad" => "ad_name",
        _ => "campaign_name",
    }
}

fn level_label(level: &str) -> &'static str {
    match level {
        "adset" => "Conjuntos de Anúncios",
        "ad" => "Anúncios",
        _ => "Campanhas",
    }
}

/// Render the insights rows as WhatsApp text. Pure so it can be tested
/// without the network.
pub fn format_insights(
    items: &[Value],
    level: &str,
    metrics: &[String],
    since: NaiveDate,
    until: NaiveDate,
) -> String {
    if items.is_empty() {
        return format!(
            "📋 *Nenhuma campanha ativa encontrada*\n\n📅 Período consultado: {} a {}\n\n\
             💡 *Sugestões:*\n• Esta conta pode não ter campanhas rodando neste período\n\
             • Tente um período maior (ex: últimos 30 dias)\n\
             • Verifique se há campanhas ativas no Gerenciador de Anúncios",
            since, until
        );
    }

    let mut result = format!(
        "📊 *Insights de {}*\n📅 Período: {} a {}\n\n",
        level_label(level),
        format_date_br(since),
        format_date_br(until)
    );

    let mut total_spend = 0.0;
    let mut total_results = 0i64;
    let mut total_impressions = 0i64;
    let mut total_clicks = 0i64;

    for (idx, item) in items.iter().take(MAX_ITEMS).enumerate() {
        let name = item[name_field(level)].as_str().unwrap_or("Sem nome");
        let spend = numeric_field(item, "spend");
        total_spend += spend;

        let results = count_results(item.get("actions"));
        total_results += results;

        result.push_str(&format!("{}. *{}*\n", idx + 1, name));
        result.push_str(&format!("   💰 Gasto: R$ {spend:.2}\n"));

        if results > 0 {
            let cpl = spend / results as f64;
            result.push_str(&format!("   🎯 Leads: {results}\n"));
            result.push_str(&format!("   💵 CPL: R$ {cpl:.2}\n"));
        }

        for metric in metrics {
            match metric.as_str() {
                "impressions" => {
                    let impressions = numeric_field(item, "impressions") as i64;
                    total_impressions += impressions;
                    result.push_str(&format!(
                        "   👁️ Impressões: {}\n",
                        group_thousands(impressions)
                    ));
                }
                "reach" => {
                    let reach = numeric_field(item, "reach") as i64;
                    result.push_str(&format!("   👥 Alcance: {}\n", group_thousands(reach)));
                }
                "clicks" => {
                    let clicks = numeric_field(item, "clicks") as i64;
                    total_clicks += clicks;
                    result.push_str(&format!("   🖱️ Cliques: {clicks}\n"));
                }
                "ctr" => {
                    result.push_str(&format!("   📊 CTR: {:.2}%\n", numeric_field(item, "ctr")));
                }
                "cpc" => {
                    result.push_str(&format!("   💵 CPC: R$ {:.2}\n", numeric_field(item, "cpc")));
                }
                "cpm" => {
                    result.push_str(&format!("   💵 CPM: R$ {:.2}\n", numeric_field(item, "cpm")));
                }
                "frequency" => {
                    result.push_str(&format!(
                        "   🔄 Frequência: {:.2}\n",
                        numeric_field(item, "frequency")
                    ));
                }
                _ => {}
            }
        }

        result.push('\n');
    }

    result.push_str("*TOTAIS DO PERÍODO:*\n");
    result.push_str(&format!("💰 Investimento: R$ {total_spend:.2}\n"));
    if total_results > 0 {
        result.push_str(&format!("🎯 Total de Leads: {total_results}\n"));
        result.push_str(&format!(
            "💵 CPL médio: R$ {:.2}\n",
            total_spend / total_results as f64
        ));
    }
    if total_impressions > 0 {
        result.push_str(&format!(
            "👁️ Total impressões: {}\n",
            group_thousands(total_impressions)
        ));
    }
    if total_clicks > 0 {
        result.push_str(&format!("🖱️ Total cliques: {total_clicks}\n"));
    }

    if items.len() > MAX_ITEMS {
        result.push_str(&format!(
            "\n_Mostrando {MAX_ITEMS} de {} itens_",
            items.len()
        ));
    }

    result.trim_end().to_string()
}

#[async_trait]
impl Tool for CampaignInsightsTool {
    fn name(&self) -> &str {
        "get_campaign_insights"
    }

    fn description(&self) -> &str {
        "Busca dados de desempenho de campanhas de UMA conta do Facebook Ads: \
         gasto, leads e CPL, mais métricas opcionais (impressions, reach, clicks, \
         ctr, cpc, cpm, frequency). Sem datas, usa os últimos 7 dias completos. \
         Precisa do ID da conta — use find_account_by_name quando tiver só o nome."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "ad_account_id": {
                    "type": "string",
                    "description": "ID da conta (ex: act_123456789 ou apenas 123456789)"
                },
                "start_date": {
                    "type": "string",
                    "description": "Data inicial YYYY-MM-DD. Deixe vazio para os últimos 7 dias"
                },
                "end_date": {
                    "type": "string",
                    "description": "Data final YYYY-MM-DD. Deixe vazio para até ontem"
                },
                "level": {
                    "type": "string",
                    "enum": ["campaign", "adset", "ad"],
                    "description": "Nível de agregação (padrão: campaign)"
                },
                "metrics": {
                    "type": "string",
                    "description": "Métricas adicionais separadas por vírgula (ex: 'ctr,cpc')"
                }
            },
            "required": ["ad_account_id"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let account_id = arguments["ad_account_id"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'ad_account_id'".into()))?;
        let account_id = normalize_act_id(account_id);

        let today = Local::now().date_naive();
        let (default_since, default_until) = default_period(today);
        let since = parse_date(&arguments["start_date"]).unwrap_or(default_since);
        let until = parse_date(&arguments["end_date"]).unwrap_or(default_until);

        let level = match arguments["level"].as_str() {
            Some(level) if VALID_LEVELS.contains(&level) => level,
            _ => "campaign",
        };

        let metrics: Vec<String> = arguments["metrics"]
            .as_str()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|m| VALID_METRICS.contains(m))
            .map(String::from)
            .collect();

        let mut fields = String::from("spend,actions,cost_per_action_type");
        fields.push_str(match level {
            "adset" => ",adset_name,adset_id,campaign_name",
            "ad" => ",ad_name,ad_id,adset_name,campaign_name",
            _ => ",campaign_name,campaign_id,objective",
        });
        if !metrics.is_empty() {
            fields.push(',');
            fields.push_str(&metrics.join(","));
        }

        let data = match self
            .graph
            .get(
                &format!("{account_id}/insights"),
                &[
                    ("level", level.to_string()),
                    ("time_range", GraphClient::time_range(since, until)),
                    ("fields", fields),
                    ("limit", "100".into()),
                ],
            )
            .await
        {
            Ok(data) => data,
            Err(e) => {
                return Ok(ToolResult::rejected(format!(
                    "Erro ao buscar insights: {e}"
                )));
            }
        };

        let items = data["data"].as_array().cloned().unwrap_or_default();
        Ok(ToolResult::ok(format_insights(
            &items, level, &metrics, since, until,
        )))
    }
}
