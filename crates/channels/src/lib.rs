//! WhatsApp messaging adapters for adpilot.
//!
//! Each adapter implements the same capability contract
//! (`adpilot_core::MessagingAdapter`); capabilities a provider lacks report
//! `Delivery::NotSupported` instead of failing.
//!
//! Available adapters:
//! - **CloudApi** — official WhatsApp Business Cloud API (interactive
//!   messages and read receipts, no presence)
//! - **Evolution** — self-hosted Evolution API (text, presence, and read
//!   receipts, no native interactive messages)

pub mod cloud_api;
pub mod evolution;
pub mod signature;

pub use cloud_api::{CloudApiAdapter, CloudApiConfig};
pub use evolution::{EvolutionAdapter, EvolutionConfig};

use std::sync::Arc;

use adpilot_config::{AppConfig, WhatsAppProviderKind};
use adpilot_core::MessagingAdapter;
use adpilot_core::error::ChannelError;

/// Build the configured messaging adapter.
pub fn build_from_config(config: &AppConfig) -> Result<Arc<dyn MessagingAdapter>, ChannelError> {
    match config.whatsapp.provider {
        WhatsAppProviderKind::CloudApi => {
            let access_token = config.whatsapp.access_token.clone().ok_or_else(|| {
                ChannelError::NotConfigured("whatsapp.access_token is not set".into())
            })?;
            if config.whatsapp.phone_number_id.is_empty() {
                return Err(ChannelError::NotConfigured(
                    "whatsapp.phone_number_id is not set".into(),
                ));
            }
            Ok(Arc::new(CloudApiAdapter::new(CloudApiConfig {
                access_token,
                phone_number_id: config.whatsapp.phone_number_id.clone(),
                base_url: cloud_api::DEFAULT_BASE_URL.into(),
            })))
        }
        WhatsAppProviderKind::Evolution => {
            let api_key = config.whatsapp.evolution_api_key.clone().ok_or_else(|| {
                ChannelError::NotConfigured("whatsapp.evolution_api_key is not set".into())
            })?;
            if config.whatsapp.evolution_url.is_empty() {
                return Err(ChannelError::NotConfigured(
                    "whatsapp.evolution_url is not set".into(),
                ));
            }
            Ok(Arc::new(EvolutionAdapter::new(EvolutionConfig {
                api_url: config.whatsapp.evolution_url.clone(),
                api_key,
                instance: config.whatsapp.evolution_instance.clone(),
            })))
        }
    }
}
