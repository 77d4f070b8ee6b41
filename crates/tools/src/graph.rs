//! Thin Graph API client shared by the insight tools, plus the metric
//! helpers they all use.

use chrono::{Duration, NaiveDate};
use serde_json::Value;
use tracing::debug;

use adpilot_core::error::ToolError;

const GRAPH_BASE_URL: &str = "https://graph.facebook.com/v21.0";

/// Result action types that count as conversions, in priority order:
/// real conversions first, engagement as a fallback when none exist.
const CONVERSION_ACTIONS: &[&str] = &[
    "purchase",
    "lead",
    "complete_registration",
    "contact",
    "add_to_cart",
];
const ENGAGEMENT_ACTIONS: &[&str] = &["link_click", "post_engagement"];

/// Facebook Marketing API client.
#[derive(Clone)]
pub struct GraphClient {
    access_token: String,
    base_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for GraphClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphClient")
            .field("access_token", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl GraphClient {
    pub fn new(access_token: String) -> Self {
        Self::with_base_url(access_token, GRAPH_BASE_URL.into())
    }

    pub fn with_base_url(access_token: String, base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");
        Self {
            access_token,
            base_url,
            client,
        }
    }

    /// GET a Graph path. Graph-level errors (`{"error": ...}`) are surfaced
    /// as `ToolError::ExecutionFailed` with the API message.
    pub async fn get(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<Value, ToolError> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), path);
        debug!(%url, "Graph API request");

        let mut query: Vec<(&str, String)> = vec![("access_token", self.access_token.clone())];
        query.extend(params.iter().cloned());

        let response = self
            .client
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(|e| ToolError::Network(e.to_string()))?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| ToolError::Network(format!("invalid Graph response: {e}")))?;

        if let Some(error) = body.get("error") {
            let message = error["message"].as_str().unwrap_or("Erro desconhecido");
            return Err(ToolError::ExecutionFailed {
                tool_name: "graph_api".into(),
                reason: message.to_string(),
            });
        }

        Ok(body)
    }

    /// The `time_range` query value for an insights window.
    pub fn time_range(since: NaiveDate, until: NaiveDate) -> String {
        format!(r#"{{"since":"{since}","until":"{until}"}}"#)
    }
}

/// The default reporting window: the last 7 complete days, up to yesterday.
pub fn default_period(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    (today - Duration::days(7), today - Duration::days(1))
}

/// Count results from an insights `actions` array: conversion actions
/// first, falling back to engagement actions when no conversions exist.
pub fn count_results(actions: Option<&Value>) -> i64 {
    let Some(actions) = actions.and_then(Value::as_array) else {
        return 0;
    };

    let sum_for = |types: &[&str]| -> i64 {
        actions
            .iter()
            .filter(|a| {
                a["action_type"]
                    .as_str()
                    .is_some_and(|t| types.contains(&t))
            })
            .filter_map(|a| {
                a["value"]
                    .as_str()
                    .and_then(|v| v.parse::<i64>().ok())
                    .or_else(|| a["value"].as_i64())
            })
            .sum()
    };

    let conversions = sum_for(CONVERSION_ACTIONS);
    if conversions > 0 {
        conversions
    } else {
        sum_for(ENGAGEMENT_ACTIONS)
    }
}

/// Numeric field from an insights row; the API serializes numbers as strings.
pub fn numeric_field(row: &Value, field: &str) -> f64 {
    row[field]
        .as_str()
        .and_then(|v| v.parse::<f64>().ok())
        .or_else(|| row[field].as_f64())
        .unwrap_or(0.0)
}

/// Group digits with commas (`1234567` → `1,234,567`).
pub fn group_thousands(n: i64) -> String {
    let digits = n.abs().to_string();
    let mut grouped = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    if n < 0 {
        format!("-{grouped}")
    } else {
        grouped
    }
}

/// Brazilian date rendering for reporting headers.
pub fn format_date_br(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_period_is_last_seven_closed_days() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 10).unwrap();
        let (since, until) = default_period(today);
        assert_eq!(since, NaiveDate::from_ymd_opt(2025, 6, 3).unwrap());
        assert_eq!(until, NaiveDate::from_ymd_opt(2025, 6, 9).unwrap());
    }

    #[test]
    fn time_range_json_shape() {
        let since = NaiveDate::from_ymd_opt(2025, 6, 3).unwrap();
        let until = NaiveDate::from_ymd_opt(2025, 6, 9).unwrap();
        assert_eq!(
            GraphClient::time_range(since, until),
            r#"{"since":"2025-06-03","until":"2025-06-09"}"#
        );
    }

    #[test]
    fn conversions_counted_before_engagement() {
        let actions = json!([
            {"action_type": "lead", "value": "12"},
            {"action_type": "purchase", "value": "3"},
            {"action_type": "link_click", "value": "500"}
        ]);
        assert_eq!(count_results(Some(&actions)), 15);
    }

    #[test]
    fn engagement_used_when_no_conversions() {
        let actions = json!([
            {"action_type": "link_click", "value": "500"},
            {"action_type": "post_engagement", "value": "80"}
        ]);
        assert_eq!(count_results(Some(&actions)), 580);
    }

    #[test]
    fn missing_actions_is_zero() {
        assert_eq!(count_results(None), 0);
        assert_eq!(count_results(Some(&json!([]))), 0);
    }

    #[test]
    fn numeric_field_parses_string_numbers() {
        let row = json!({"spend": "1234.56", "ctr": 1.8});
        assert!((numeric_field(&row, "spend") - 1234.56).abs() < 1e-9);
        assert!((numeric_field(&row, "ctr") - 1.8).abs() < 1e-9);
        assert_eq!(numeric_field(&row, "missing"), 0.0);
    }

    #[test]
    fn thousands_grouping() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1_000), "1,000");
        assert_eq!(group_thousands(1_234_567), "1,234,567");
    }
}
