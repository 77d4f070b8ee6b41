//! Two-window metric comparison for one ad account.

use async_trait::async_trait;
use chrono::{Datelike, Duration, Local, NaiveDate};
use serde_json::Value;

use adpilot_core::error::ToolError;
use adpilot_core::tool::{Tool, ToolResult};

use crate::accounts::normalize_act_id;
use crate::graph::{GraphClient, numeric_field};

/// One comparison window with its display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window {
    pub name: &'static str,
    pub since: NaiveDate,
    pub until: NaiveDate,
}

/// Aggregated metrics over one window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Totals {
    pub spend: f64,
    pub impressions: i64,
    pub reach: i64,
    pub clicks: i64,
    pub conversions: i64,
}

impl Totals {
    pub fn ctr(&self) -> f64 {
        if self.impressions > 0 {
            self.clicks as f64 / self.impressions as f64 * 100.0
        } else {
            0.0
        }
    }

    pub fn cpc(&self) -> f64 {
        if self.clicks > 0 {
            self.spend / self.clicks as f64
        } else {
            0.0
        }
    }

    pub fn cpm(&self) -> f64 {
        if self.impressions > 0 {
            self.spend / self.impressions as f64 * 1000.0
        } else {
            0.0
        }
    }

    pub fn frequency(&self) -> f64 {
        if self.reach > 0 {
            self.impressions as f64 / self.reach as f64
        } else {
            0.0
        }
    }

    pub fn metric(&self, name: &str) -> f64 {
        match name {
            "spend" => self.spend,
            "impressions" => self.impressions as f64,
            "reach" => self.reach as f64,
            "clicks" => self.clicks as f64,
            "conversions" => self.conversions as f64,
            "ctr" => self.ctr(),
            "cpc" => self.cpc(),
            "cpm" => self.cpm(),
            "frequency" => self.frequency(),
            _ => 0.0,
        }
    }
}

/// Resolve the two comparison windows for a period type. Returns `None` for
/// an unknown type.
pub fn period_windows(period_type: &str, today: NaiveDate) -> Option<(Window, Window)> {
    match period_type {
        "week_vs_previous" => Some((
            Window {
                name: "Última Semana",
                since: today - Duration::days(7),
                until: today - Duration::days(1),
            },
            Window {
                name: "Semana Anterior",
                since: today - Duration::days(14),
                until: today - Duration::days(8),
            },
        )),
        "month_vs_previous" => Some((
            Window {
                name: "Último Mês",
                since: today - Duration::days(30),
                until: today - Duration::days(1),
            },
            Window {
                name: "Mês Anterior",
                since: today - Duration::days(60),
                until: today - Duration::days(31),
            },
        )),
        "week_vs_month" => Some((
            Window {
                name: "Últimos 7 Dias",
                since: today - Duration::days(7),
                until: today - Duration::days(1),
            },
            Window {
                name: "30 Dias Anteriores",
                since: today - Duration::days(37),
                until: today - Duration::days(8),
            },
        )),
        "current_vs_last_month" => {
            let first_of_month = today.with_day(1)?;
            let last_month_end = first_of_month - Duration::days(1);
            let last_month_start = last_month_end.with_day(1)?;
            Some((
                Window {
                    name: "Mês Atual",
                    since: first_of_month,
                    until: today,
                },
                Window {
                    name: "Mês Passado",
                    since: last_month_start,
                    until: last_month_end,
                },
            ))
        }
        _ => None,
    }
}

/// Sum base metrics over all rows of an insights response.
pub fn aggregate(rows: &[Value]) -> Totals {
    let mut totals = Totals::default();
    for row in rows {
        totals.spend += numeric_field(row, "spend");
        totals.impressions += numeric_field(row, "impressions") as i64;
        totals.reach += numeric_field(row, "reach") as i64;
        totals.clicks += numeric_field(row, "clicks") as i64;
        if let Some(actions) = row["actions"].as_array() {
            for action in actions {
                totals.conversions += action["value"]
                    .as_str()
                    .and_then(|v| v.parse::<i64>().ok())
                    .or_else(|| action["value"].as_i64())
                    .unwrap_or(0);
            }
        }
    }
    totals
}

/// Percent variation rendered with a sign; division by zero becomes
/// "N/A" (both zero) or "+∞" (growth from nothing).
pub fn variation(current: f64, previous: f64) -> String {
    if previous == 0.0 {
        return if current == 0.0 { "N/A".into() } else { "+∞".into() };
    }
    let pct = (current - previous) / previous * 100.0;
    if pct >= 0.0 {
        format!("+{pct:.1}%")
    } else {
        format!("{pct:.1}%")
    }
}

fn metric_label(metric: &str) -> Option<&'static str> {
    Some(match metric {
        "spend" => "💰 Investimento",
        "impressions" => "👁️ Impressões",
        "reach" => "👥 Alcance",
        "clicks" => "🖱️ Cliques",
        "ctr" => "📈 CTR",
        "cpc" => "💵 CPC",
        "cpm" => "📊 CPM",
        "frequency" => "🔄 Frequência",
        "conversions" => "🎯 Conversões",
        _ => return None,
    })
}

fn format_value(value: f64, metric: &str) -> String {
    match metric {
        "ctr" | "frequency" => format!("{value:.2}"),
        "spend" | "cpc" | "cpm" => format!("R$ {value:.2}"),
        _ => crate::graph::group_thousands(value as i64),
    }
}

/// Render the comparison. Pure for tests.
pub fn format_comparison(
    current: &Window,
    previous: &Window,
    totals_current: &Totals,
    totals_previous: &Totals,
    metrics: &[String],
) -> String {
    if totals_current.spend == 0.0 && totals_previous.spend == 0.0 {
        return format!(
            "📋 *Sem dados de campanhas ativas*\n\n📅 *{}*: {} - {}\n📅 *{}*: {} - {}\n\n\
             💡 *Possíveis razões:*\n• Nenhuma campanha ativa nos períodos\n\
             • Campanhas pausadas ou sem investimento\n\n🔍 Verifique o Gerenciador de Anúncios",
            current.name,
            current.since.format("%d/%m"),
            current.until.format("%d/%m"),
            previous.name,
            previous.since.format("%d/%m"),
            previous.until.format("%d/%m"),
        );
    }

    let mut lines = vec![
        "📊 *Análise Comparativa*".to_string(),
        String::new(),
        format!(
            "📅 *{}*: {} - {}",
            current.name,
            current.since.format("%d/%m"),
            current.until.format("%d/%m")
        ),
        format!(
            "📅 *{}*: {} - {}",
            previous.name,
            previous.since.format("%d/%m"),
            previous.until.format("%d/%m")
        ),
        String::new(),
        "*Resultados:*".to_string(),
    ];

    for metric in metrics {
        let Some(label) = metric_label(metric) else {
            continue;
        };
        let val_current = totals_current.metric(metric);
        let val_previous = totals_previous.metric(metric);
        lines.push(format!(
            "{label}: {} vs {} ({})",
            format_value(val_current, metric),
            format_value(val_previous, metric),
            variation(val_current, val_previous)
        ));
    }

    lines.join("\n")
}

pub struct ComparePeriodsTool {
    graph: GraphClient,
}

impl ComparePeriodsTool {
    pub fn new(graph: GraphClient) -> Self {
        Self { graph }
    }

    async fn fetch_window(
        &self,
        account_id: &str,
        level: &str,
        window: &Window,
    ) -> Result<Totals, ToolError> {
        let body = self
            .graph
            .get(
                &format!("{account_id}/insights"),
                &[
                    ("level", level.to_string()),
                    (
                        "time_range",
                        GraphClient::time_range(window.since, window.until),
                    ),
                    ("fields", "spend,impressions,reach,clicks,actions".into()),
                    ("limit", "1000".into()),
                ],
            )
            .await?;
        let rows = body["data"].as_array().cloned().unwrap_or_default();
        Ok(aggregate(&rows))
    }
}

#[async_trait]
impl Tool for ComparePeriodsTool {
    fn name(&self) -> &str {
        "compare_campaign_periods"
    }

    fn description(&self) -> &str {
        "Compara métricas de campanhas entre dois períodos e mostra a variação \
         em %. Tipos: week_vs_previous, month_vs_previous, week_vs_month, \
         current_vs_last_month. Métricas: spend, impressions, reach, clicks, \
         ctr, cpc, cpm, frequency, conversions. Use SEMPRE que o usuário pedir \
         comparação ou 'vs' entre períodos."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "ad_account_id": {
                    "type": "string",
                    "description": "ID da conta (ex: act_123456789 ou apenas 123456789)"
                },
                "period_type": {
                    "type": "string",
                    "enum": ["week_vs_previous", "month_vs_previous", "week_vs_month", "current_vs_last_month"],
                    "description": "Tipo de comparação (padrão: week_vs_previous)"
                },
                "metrics": {
                    "type": "string",
                    "description": "Métricas separadas por vírgula (padrão: 'ctr,cpc,spend,impressions')"
                },
                "level": {
                    "type": "string",
                    "enum": ["campaign", "adset", "ad"],
                    "description": "Nível de agregação (padrão: campaign)"
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

        let period_type = arguments["period_type"].as_str().unwrap_or("week_vs_previous");
        let today = Local::now().date_naive();
        let Some((current, previous)) = period_windows(period_type, today) else {
            return Ok(ToolResult::rejected(format!(
                "❌ Tipo de período inválido: {period_type}. Use: week_vs_previous, \
                 month_vs_previous, week_vs_month, current_vs_last_month"
            )));
        };

        let metrics: Vec<String> = arguments["metrics"]
            .as_str()
            .unwrap_or("ctr,cpc,spend,impressions")
            .split(',')
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .collect();

        let level = arguments["level"].as_str().unwrap_or("campaign");

        let totals_current = match self.fetch_window(&account_id, level, &current).await {
            Ok(totals) => totals,
            Err(e) => {
                return Ok(ToolResult::rejected(format!(
                    "❌ Erro ao buscar período 1: {e}"
                )));
            }
        };
        let totals_previous = match self.fetch_window(&account_id, level, &previous).await {
            Ok(totals) => totals,
            Err(e) => {
                return Ok(ToolResult::rejected(format!(
                    "❌ Erro ao buscar período 2: {e}"
                )));
            }
        };

        Ok(ToolResult::ok(format_comparison(
            &current,
            &previous,
            &totals_current,
            &totals_previous,
            &metrics,
        )))
    }
}
