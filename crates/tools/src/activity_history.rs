//! Account activity history — who changed what, and when.
//!
//! Useful to judge whether an account is being actively managed: shows
//! optimizations, pauses, budget changes and creations, grouped by type
//! and by actor. Billing charges are skipped to keep the noise down.

use async_trait::async_trait;
use chrono::{Duration, Local};
use serde_json::Value;

use adpilot_core::error::ToolError;
use adpilot_core::tool::{Tool, ToolResult};

use crate::accounts::normalize_act_id;
use crate::graph::GraphClient;

/// Map raw event types to Portuguese descriptions.
pub fn translate_event(event_type: &str) -> String {
    let known = match event_type {
        "update_ad_bid" => "💰 Atualização de Lance",
        "update_ad_budget" => "💵 Atualização de Orçamento",
        "create_campaign" => "✨ Criação de Campanha",
        "update_campaign" => "✏️ Edição de Campanha",
        "pause_campaign" => "⏸️ Pausa de Campanha",
        "unpause_campaign" => "▶️ Ativação de Campanha",
        "create_adset" => "✨ Criação de Conjunto",
        "update_adset" => "✏️ Edição de Conjunto",
        "pause_adset" => "⏸️ Pausa de Conjunto",
        "unpause_adset" => "▶️ Ativação de Conjunto",
        "create_ad" => "✨ Criação de Anúncio",
        "update_ad" => "✏️ Edição de Anúncio",
        "pause_ad" => "⏸️ Pausa de Anúncio",
        "unpause_ad" => "▶️ Ativação de Anúncio",
        "update_ad_set_budget" => "💵 Ajuste de Orçamento",
        "ad_account_update_status" => "🔄 Atualização de Status",
        "create_audience" => "🎯 Criação de Público",
        "update_audience" => "🎯 Edição de Público",
        _ => "",
    };
    if known.is_empty() {
        let pretty = event_type
            .split('_')
            .map(|w| {
                let mut chars = w.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ");
        format!("📝 {pretty}")
    } else {
        known.to_string()
    }
}

/// The lead traffic manager goes by his short name in chat.
pub fn normalize_actor(name: &str) -> &str {
    if name == "Lucas Dantas Sa" { "Dantas" } else { name }
}

/// Summarize raw activity rows. Pure for tests.
pub fn format_activities(activities: &[Value], days: i64) -> String {
    if activities.is_empty() {
        return format!(
            "📋 *Nenhuma atividade encontrada*\n\n📅 Período: Últimos {days} dias\n\n\
             ⚠️ *Isso pode indicar:*\n• Conta sem otimizações recentes\n\
             • Campanhas no automático sem ajustes manuais\n\
             • Gestor não está acompanhando ativamente\n\n\
             💡 Recomendação: Verificar se há oportunidades de otimização"
        );
    }

    let mut by_type: Vec<(String, usize)> = Vec::new();
    let mut by_actor: Vec<(String, usize)> = Vec::new();
    let mut billing_count = 0usize;
    let mut counted = 0usize;

    for activity in activities {
        let event_type = activity["event_type"].as_str().unwrap_or("unknown");
        if event_type == "ad_account_billing_charge" {
            billing_count += 1;
            continue;
        }
        counted += 1;

        let description = translate_event(event_type);
        match by_type.iter_mut().find(|(desc, _)| *desc == description) {
            Some((_, count)) => *count += 1,
            None => by_type.push((description, 1)),
        }

        let actor = normalize_actor(activity["actor_name"].as_str().unwrap_or("Sistema"));
        if actor != "Sistema" {
            match by_actor.iter_mut().find(|(name, _)| *name == actor) {
                Some((_, count)) => *count += 1,
                None => by_actor.push((actor.to_string(), 1)),
            }
        }
    }

    let mut result = format!(
        "📋 *Histórico de Atividades*\n📅 Período: Últimos {days} dias\n\
         ✏️ Total de ações: {counted}\n\n*Por tipo:*\n"
    );
    by_type.sort_by(|a, b| b.1.cmp(&a.1));
    for (description, count) in &by_type {
        result.push_str(&format!("• {description}: {count}\n"));
    }

    if !by_actor.is_empty() {
        result.push_str("\n*Por responsável:*\n");
        by_actor.sort_by(|a, b| b.1.cmp(&a.1));
        for (actor, count) in &by_actor {
            result.push_str(&format!("• {actor}: {count} ações\n"));
        }
    }

    if billing_count > 0 {
        result.push_str(&format!("\n_{billing_count} cobrança(s) omitida(s)_"));
    }

    result.trim_end().to_string()
}

pub struct ActivityHistoryTool {
    graph: GraphClient,
}

impl ActivityHistoryTool {
    pub fn new(graph: GraphClient) -> Self {
        Self { graph }
    }
}

#[async_trait]
impl Tool for ActivityHistoryTool {
    fn name(&self) -> &str {
        "get_activity_history"
    }

    fn description(&self) -> &str {
        "Histórico de edições e atividades de uma conta de anúncio: \
         otimizações, pausas, mudanças de orçamento e criações, com quem fez \
         cada ação. Útil para avaliar se há gestão ativa da conta."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "ad_account_id": {
                    "type": "string",
                    "description": "ID da conta (ex: act_123456789 ou apenas 123456789)"
                },
                "days": {
                    "type": "integer",
                    "description": "Quantos dias para trás olhar (padrão: 7)"
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
        let days = arguments["days"].as_i64().unwrap_or(7).clamp(1, 90);

        let until = Local::now();
        let since = until - Duration::days(days);

        let data = match self
            .graph
            .get(
                &format!("{account_id}/activities"),
                &[
                    ("since", since.timestamp().to_string()),
                    ("until", until.timestamp().to_string()),
                    (
                        "fields",
                        "event_type,event_time,actor_id,actor_name,object_id,object_name,object_type"
                            .into(),
                    ),
                    ("limit", "100".into()),
                ],
            )
            .await
        {
            Ok(data) => data,
            Err(e) => {
                return Ok(ToolResult::rejected(format!(
                    "❌ Erro ao buscar histórico: {e}"
                )));
            }
        };

        let activities = data["data"].as_array().cloned().unwrap_or_default();
        Ok(ToolResult::ok(format_activities(&activities, days)))
    }
}
