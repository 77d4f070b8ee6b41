//! Logical response and interactive payload types.
//!
//! One orchestration run produces exactly one `LogicalResponse`: the final
//! assistant text plus at most one interactive payload. The payload travels
//! inside the response value, scoped to the run — it is never parked in
//! shared state.

use serde::{Deserialize, Serialize};

/// One reply button. Titles are capped at 20 characters by the tools that
/// build them; the cap belongs to the WhatsApp interactive-message format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonSpec {
    pub id: String,
    pub title: String,
}

/// A button-set payload: body text plus up to three reply buttons.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonsPayload {
    pub body: String,
    pub buttons: Vec<ButtonSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footer: Option<String>,
}

/// One selectable option in a list payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListOption {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A selectable-list payload: body text, the label of the button that opens
/// the list, and up to ten options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListPayload {
    pub body: String,
    pub button_label: String,
    pub options: Vec<ListOption>,
}

impl ListPayload {
    /// Render the list as plain numbered text.
    ///
    /// Fallback for adapters that cannot send native list messages.
    pub fn as_text(&self) -> String {
        let mut text = format!("{}\n\n*Opções*\n", self.body);
        for (i, opt) in self.options.iter().enumerate() {
            text.push_str(&format!("{}. {}", i + 1, opt.title));
            if let Some(desc) = &opt.description {
                if !desc.is_empty() {
                    text.push_str(&format!(" - {desc}"));
                }
            }
            text.push('\n');
        }
        text.trim_end().to_string()
    }
}

/// A structured non-plain-text response unit understood natively by the
/// messaging client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InteractivePayload {
    Buttons(ButtonsPayload),
    List(ListPayload),
}

impl InteractivePayload {
    pub fn is_list(&self) -> bool {
        matches!(self, Self::List(_))
    }
}

/// The final product of one orchestration run.
///
/// Invariant: at most one payload, and a `List` payload takes precedence over
/// `Buttons` when both were requested during the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogicalResponse {
    /// Final assistant text, already formatted for the messaging channel
    pub text: String,

    /// Optional interactive payload attached by a tool call (or repaired
    /// from bracketed authoring text)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<InteractivePayload>,
}

impl LogicalResponse {
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            payload: None,
        }
    }

    pub fn with_payload(text: impl Into<String>, payload: InteractivePayload) -> Self {
        Self {
            text: text.into(),
            payload: Some(payload),
        }
    }
}
