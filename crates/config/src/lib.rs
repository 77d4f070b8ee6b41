//! Configuration loading, validation, and management for adpilot.
//!
//! Loads configuration from `adpilot.toml` with environment variable
//! overrides for every secret. Validates settings at startup so a
//! misconfigured gateway fails fast instead of at the first webhook.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// The root configuration structure.
///
/// Maps directly to `adpilot.toml`.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Language model provider settings
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Message pipeline tunables
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// WhatsApp messaging settings
    #[serde(default)]
    pub whatsapp: WhatsAppConfig,

    /// Facebook Marketing API settings for the insight tools
    #[serde(default)]
    pub facebook: FacebookConfig,

    /// Persistence settings
    #[serde(default)]
    pub store: StoreConfig,

    /// HTTP gateway settings
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Managed ad accounts available to the insight tools
    #[serde(default)]
    pub accounts: Vec<AdAccountEntry>,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("provider", &self.provider)
            .field("pipeline", &self.pipeline)
            .field("whatsapp", &self.whatsapp)
            .field("facebook", &self.facebook)
            .field("store", &self.store)
            .field("gateway", &self.gateway)
            .field("accounts", &self.accounts)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// OpenAI-compatible endpoint base URL
    #[serde(default = "default_provider_url")]
    pub base_url: String,

    /// API key; overridable via OPENAI_API_KEY
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_provider_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4.1-mini".into()
}
fn default_temperature() -> f32 {
    0.7
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_provider_url(),
            api_key: None,
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: None,
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .finish()
    }
}

/// Tunables of the conversational pipeline. The bracket-repair thresholds
/// are policy knobs, not guaranteed-correct intent detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Quiet period after the last inbound message before a turn flushes
    #[serde(default = "default_quiet_period_ms")]
    pub quiet_period_ms: u64,

    /// Character budget per outbound text part
    #[serde(default = "default_part_budget")]
    pub part_budget: usize,

    /// Delay between consecutive outbound parts
    #[serde(default = "default_part_delay_ms")]
    pub part_delay_ms: u64,

    /// Ceiling on reason/act iterations per turn
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// How many persisted messages seed each orchestration run
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Max bracketed groups accepted by the button repair
    #[serde(default = "default_repair_max_groups")]
    pub repair_max_groups: usize,

    /// Max non-whitespace characters allowed after the last bracket
    #[serde(default = "default_repair_max_trailing")]
    pub repair_max_trailing: usize,
}

fn default_quiet_period_ms() -> u64 {
    6_000
}
fn default_part_budget() -> usize {
    800
}
fn default_part_delay_ms() -> u64 {
    1_500
}
fn default_max_iterations() -> u32 {
    10
}
fn default_history_limit() -> usize {
    5
}
fn default_repair_max_groups() -> usize {
    3
}
fn default_repair_max_trailing() -> usize {
    10
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            quiet_period_ms: default_quiet_period_ms(),
            part_budget: default_part_budget(),
            part_delay_ms: default_part_delay_ms(),
            max_iterations: default_max_iterations(),
            history_limit: default_history_limit(),
            repair_max_groups: default_repair_max_groups(),
            repair_max_trailing: default_repair_max_trailing(),
        }
    }
}

/// Which WhatsApp backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WhatsAppProviderKind {
    /// Official WhatsApp Business Cloud API
    #[default]
    CloudApi,
    /// Self-hosted Evolution API instance
    Evolution,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct WhatsAppConfig {
    #[serde(default)]
    pub provider: WhatsAppProviderKind,

    /// Cloud API access token; overridable via WHATSAPP_ACCESS_TOKEN
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    /// Cloud API phone number id
    #[serde(default)]
    pub phone_number_id: String,

    /// Token echoed back during the Meta webhook verification handshake
    #[serde(default)]
    pub webhook_verify_token: String,

    /// Meta app secret for X-Hub-Signature-256 validation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_secret: Option<String>,

    /// Escape hatch for local testing without signatures
    #[serde(default)]
    pub disable_signature_validation: bool,

    /// Evolution API base URL
    #[serde(default)]
    pub evolution_url: String,

    /// Evolution API key; overridable via EVOLUTION_API_KEY
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evolution_api_key: Option<String>,

    /// Evolution instance name
    #[serde(default)]
    pub evolution_instance: String,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            provider: WhatsAppProviderKind::default(),
            access_token: None,
            phone_number_id: String::new(),
            webhook_verify_token: String::new(),
            app_secret: None,
            disable_signature_validation: false,
            evolution_url: String::new(),
            evolution_api_key: None,
            evolution_instance: String::new(),
        }
    }
}

impl std::fmt::Debug for WhatsAppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhatsAppConfig")
            .field("provider", &self.provider)
            .field("access_token", &redact(&self.access_token))
            .field("phone_number_id", &self.phone_number_id)
            .field("app_secret", &redact(&self.app_secret))
            .field(
                "disable_signature_validation",
                &self.disable_signature_validation,
            )
            .field("evolution_url", &self.evolution_url)
            .field("evolution_api_key", &redact(&self.evolution_api_key))
            .field("evolution_instance", &self.evolution_instance)
            .finish()
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct FacebookConfig {
    /// Marketing API token used by the insight tools;
    /// overridable via FACEBOOK_ACCESS_TOKEN
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
}

impl std::fmt::Debug for FacebookConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FacebookConfig")
            .field("access_token", &redact(&self.access_token))
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_database_url")]
    pub database_url: String,
}

fn default_database_url() -> String {
    "sqlite://adpilot.db".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// One managed ad account the insight tools can answer about.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdAccountEntry {
    /// Numeric account id (without the `act_` prefix)
    pub id: String,

    /// Human-readable account name
    pub name: String,

    /// Short names the team uses for this account
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl AppConfig {
    /// Load configuration from a TOML file, then apply env overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        let mut config: Self = toml::from_str(&raw)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load from `adpilot.toml` in the working directory if present,
    /// otherwise start from defaults. Env overrides apply either way.
    pub fn load_or_default() -> Result<Self, ConfigError> {
        let path = Path::new("adpilot.toml");
        if path.exists() {
            Self::load(path)
        } else {
            let mut config = Self::default();
            config.apply_env_overrides();
            config.validate()?;
            Ok(config)
        }
    }

    /// Environment variables win over file values for every secret.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("OPENAI_API_KEY") {
            if !v.is_empty() {
                self.provider.api_key = Some(v);
            }
        }
        if let Ok(v) = std::env::var("WHATSAPP_ACCESS_TOKEN") {
            if !v.is_empty() {
                self.whatsapp.access_token = Some(v);
            }
        }
        if let Ok(v) = std::env::var("WHATSAPP_PHONE_NUMBER_ID") {
            if !v.is_empty() {
                self.whatsapp.phone_number_id = v;
            }
        }
        if let Ok(v) = std::env::var("WHATSAPP_WEBHOOK_VERIFY_TOKEN") {
            if !v.is_empty() {
                self.whatsapp.webhook_verify_token = v;
            }
        }
        if let Ok(v) = std::env::var("WHATSAPP_APP_SECRET") {
            if !v.is_empty() {
                self.whatsapp.app_secret = Some(v);
            }
        }
        if let Ok(v) = std::env::var("WHATSAPP_DISABLE_SIGNATURE_VALIDATION") {
            self.whatsapp.disable_signature_validation = v.eq_ignore_ascii_case("true");
        }
        if let Ok(v) = std::env::var("EVOLUTION_API_URL") {
            if !v.is_empty() {
                self.whatsapp.evolution_url = v;
            }
        }
        if let Ok(v) = std::env::var("EVOLUTION_API_KEY") {
            if !v.is_empty() {
                self.whatsapp.evolution_api_key = Some(v);
            }
        }
        if let Ok(v) = std::env::var("EVOLUTION_INSTANCE") {
            if !v.is_empty() {
                self.whatsapp.evolution_instance = v;
            }
        }
        if let Ok(v) = std::env::var("FACEBOOK_ACCESS_TOKEN") {
            if !v.is_empty() {
                self.facebook.access_token = Some(v);
            }
        }
        if let Ok(v) = std::env::var("ADPILOT_DATABASE_URL") {
            if !v.is_empty() {
                self.store.database_url = v;
            }
        }
    }

    /// Sanity checks that should fail startup, not the first webhook.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pipeline.part_budget == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.part_budget must be greater than zero".into(),
            ));
        }
        if self.pipeline.max_iterations == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.max_iterations must be greater than zero".into(),
            ));
        }
        if !(0.0..=2.0).contains(&self.provider.temperature) {
            return Err(ConfigError::Invalid(format!(
                "provider.temperature {} out of range 0.0..=2.0",
                self.provider.temperature
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pipeline.quiet_period_ms, 6_000);
        assert_eq!(config.pipeline.part_budget, 800);
        assert_eq!(config.pipeline.part_delay_ms, 1_500);
        assert_eq!(config.pipeline.max_iterations, 10);
        assert_eq!(config.pipeline.history_limit, 5);
    }

    #[test]
    fn load_from_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[provider]
model = "gpt-4.1"

[pipeline]
quiet_period_ms = 3000
part_budget = 500

[whatsapp]
provider = "evolution"
evolution_url = "http://localhost:8081"
evolution_instance = "main"

[[accounts]]
id = "611132268404060"
name = "Vorp Scale"
aliases = ["scale"]
"#
        )
        .unwrap();

        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.provider.model, "gpt-4.1");
        assert_eq!(config.pipeline.quiet_period_ms, 3_000);
        assert_eq!(config.pipeline.part_budget, 500);
        assert_eq!(config.whatsapp.provider, WhatsAppProviderKind::Evolution);
        assert_eq!(config.accounts.len(), 1);
        assert_eq!(config.accounts[0].aliases, vec!["scale"]);
        // Untouched fields keep their defaults
        assert_eq!(config.pipeline.part_delay_ms, 1_500);
    }

    #[test]
    fn invalid_part_budget_rejected() {
        let mut config = AppConfig::default();
        config.pipeline.part_budget = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn invalid_temperature_rejected() {
        let mut config = AppConfig::default();
        config.provider.temperature = 3.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn debug_redacts_secrets() {
        let mut config = AppConfig::default();
        config.provider.api_key = Some("sk-secret".into());
        config.whatsapp.access_token = Some("EAAB-token".into());
        config.whatsapp.app_secret = Some("hush".into());

        let dump = format!("{config:?}");
        assert!(!dump.contains("sk-secret"));
        assert!(!dump.contains("EAAB-token"));
        assert!(!dump.contains("hush"));
        assert!(dump.contains("[REDACTED]"));
    }
}
