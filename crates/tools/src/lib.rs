//! Tool implementations for the adpilot agent.
//!
//! Two families:
//! - **Insight tools** — stateless Graph API queries formatted as WhatsApp
//!   text (account list, lookups, campaign insights, period comparisons,
//!   activity history, budget arithmetic)
//! - **Interaction tools** — `send_whatsapp_buttons` / `send_whatsapp_list`,
//!   which validate and build interactive payloads carried back to the
//!   dispatcher on the tool result

pub mod accounts;
pub mod activity_history;
pub mod ad_accounts;
pub mod all_accounts_insights;
pub mod budget;
pub mod buttons;
pub mod campaign_insights;
pub mod compare_periods;
pub mod find_account;
pub mod graph;
pub mod list_menu;

pub use accounts::{AccountDirectory, AdAccount};
pub use graph::GraphClient;

use std::sync::Arc;

use adpilot_core::tool::ToolRegistry;

/// Create the agent's tool registry from configuration.
pub fn build_registry(config: &adpilot_config::AppConfig) -> ToolRegistry {
    let directory = Arc::new(AccountDirectory::from_entries(&config.accounts));
    let graph = GraphClient::new(
        config.facebook.access_token.clone().unwrap_or_default(),
    );

    let mut registry = ToolRegistry::new();
    registry.register(Box::new(ad_accounts::ListAdAccountsTool::new(
        directory.clone(),
    )));
    registry.register(Box::new(find_account::FindAccountTool::new(
        directory.clone(),
    )));
    registry.register(Box::new(campaign_insights::CampaignInsightsTool::new(
        graph.clone(),
    )));
    registry.register(Box::new(
        all_accounts_insights::AllAccountsInsightsTool::new(graph.clone(), directory),
    ));
    registry.register(Box::new(compare_periods::ComparePeriodsTool::new(
        graph.clone(),
    )));
    registry.register(Box::new(activity_history::ActivityHistoryTool::new(graph)));
    registry.register(Box::new(budget::BudgetCalculatorTool));
    registry.register(Box::new(buttons::SendButtonsTool));
    registry.register(Box::new(list_menu::SendListTool));
    registry
}
