//! Response formatting — normalizes model authoring markup into WhatsApp's
//! lightweight emphasis syntax.
//!
//! Also repairs a known model authoring mistake: interactive suggestions
//! written as literal bracketed text (`... [📊 Ver CTR] [📈 Comparar]`)
//! instead of a `send_whatsapp_buttons` tool call. The repair is best-effort
//! and only fires when the brackets sit at the end of the message.

use regex::Regex;

use adpilot_core::response::{ButtonSpec, ButtonsPayload};

/// Thresholds for the bracket-button repair. These are policy, not
/// guaranteed-correct intent detection, so they stay configurable.
#[derive(Debug, Clone)]
pub struct FormatOptions {
    /// Max bracket groups that can be reinterpreted as buttons
    pub repair_max_groups: usize,

    /// Max non-whitespace characters allowed after the last bracket
    pub repair_max_trailing: usize,

    /// Max characters inside a bracket group for it to count as a label
    pub max_label_len: usize,

    /// Button title cap; longer titles are truncated with an ellipsis
    pub button_title_len: usize,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            repair_max_groups: 3,
            repair_max_trailing: 10,
            max_label_len: 50,
            button_title_len: 20,
        }
    }
}

impl FormatOptions {
    pub fn from_pipeline(config: &adpilot_config::PipelineConfig) -> Self {
        Self {
            repair_max_groups: config.repair_max_groups,
            repair_max_trailing: config.repair_max_trailing,
            ..Self::default()
        }
    }
}

/// The output of the formatting pass.
#[derive(Debug, Clone)]
pub struct FormattedResponse {
    /// Channel-ready text
    pub text: String,

    /// Buttons recovered from trailing bracketed labels, if the repair fired
    pub repaired_buttons: Option<ButtonsPayload>,
}

/// Rewrite markdown authoring markup into WhatsApp formatting:
/// headings become bold lines, `**bold**` becomes `*bold*`, inline code
/// markers are stripped, links become `label (url)`, runs of blank lines
/// collapse, and trailing whitespace per line is removed.
pub fn rewrite_markdown(content: &str) -> String {
    let headers = Regex::new(r"###?\s+(.*)").expect("static regex");
    let content = headers.replace_all(content, "*$1*");

    let bold = Regex::new(r"\*\*(.*?)\*\*").expect("static regex");
    let content = bold.replace_all(&content, "*$1*");

    let code = Regex::new(r"`(.*?)`").expect("static regex");
    let content = code.replace_all(&content, "$1");

    let links = Regex::new(r"\[(.*?)\]\((.*?)\)").expect("static regex");
    let content = links.replace_all(&content, "$1 ($2)");

    let blank_runs = Regex::new(r"\n{3,}").expect("static regex");
    let content = blank_runs.replace_all(&content, "\n\n");

    content
        .split('\n')
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Full formatting pass: bracket-button repair first, then markdown
/// rewriting over whatever text remains.
pub fn format_response(content: &str, opts: &FormatOptions) -> FormattedResponse {
    if let Some((body, buttons)) = detect_trailing_buttons(content, opts) {
        let text = rewrite_markdown(&body);
        return FormattedResponse {
            repaired_buttons: Some(ButtonsPayload {
                body: text.clone(),
                buttons,
                footer: None,
            }),
            text,
        };
    }

    FormattedResponse {
        text: rewrite_markdown(content),
        repaired_buttons: None,
    }
}

/// Detect 1..=max_groups short bracketed labels at the end of the text.
///
/// Brackets elsewhere in the message (`a conta [Vorp Scale] está ativa...`)
/// are legitimate text: the repair only fires when fewer than
/// `repair_max_trailing` non-whitespace characters follow the last bracket.
fn detect_trailing_buttons(
    content: &str,
    opts: &FormatOptions,
) -> Option<(String, Vec<ButtonSpec>)> {
    let pattern = format!(r"\[([^\]\[]{{1,{}}})\]", opts.max_label_len);
    let bracket_re = Regex::new(&pattern).expect("bracket regex");

    let labels: Vec<String> = bracket_re
        .captures_iter(content)
        .map(|c| c[1].trim().to_string())
        .collect();

    if labels.is_empty() || labels.len() > opts.repair_max_groups {
        return None;
    }

    let last_bracket = content.rfind(']')?;
    let trailing: usize = content[last_bracket + 1..]
        .chars()
        .filter(|c| !c.is_whitespace())
        .count();
    if trailing >= opts.repair_max_trailing {
        return None;
    }

    let first_bracket = bracket_re.find(content)?.start();
    let body = content[..first_bracket].trim().to_string();

    let buttons = labels
        .iter()
        .take(3)
        .enumerate()
        .map(|(i, label)| ButtonSpec {
            id: (i + 1).to_string(),
            title: truncate_title(label, opts.button_title_len),
        })
        .collect();

    Some((body, buttons))
}

fn truncate_title(label: &str, max_len: usize) -> String {
    if label.chars().count() > max_len {
        let kept: String = label.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    } else {
        label.to_string()
    }
}
