//! `adpilot doctor` — Diagnose configuration and connectivity.

use adpilot_config::{AppConfig, WhatsAppProviderKind};
use adpilot_core::Provider as _;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 adpilot Doctor — System Diagnostics");
    println!("======================================\n");

    let mut issues = 0;

    let config = match AppConfig::load_or_default() {
        Ok(config) => {
            println!("  ✅ Config valid");
            config
        }
        Err(e) => {
            println!("  ❌ Config invalid: {e}");
            return Ok(());
        }
    };

    // Language model provider
    if config.provider.api_key.is_some() {
        println!("  ✅ Provider API key configured");
        match adpilot_providers::build_from_config(&config) {
            Ok(provider) => match provider.health_check().await {
                Ok(true) => println!("  ✅ Provider reachable"),
                Ok(false) => {
                    println!("  ⚠️  Provider endpoint responded with an error");
                    issues += 1;
                }
                Err(e) => {
                    println!("  ⚠️  Provider unreachable: {e}");
                    issues += 1;
                }
            },
            Err(e) => {
                println!("  ❌ Provider misconfigured: {e}");
                issues += 1;
            }
        }
    } else {
        println!("  ⚠️  No provider API key — set OPENAI_API_KEY");
        issues += 1;
    }

    // WhatsApp adapter
    let whatsapp_ok = match config.whatsapp.provider {
        WhatsAppProviderKind::CloudApi => {
            config.whatsapp.access_token.is_some() && !config.whatsapp.phone_number_id.is_empty()
        }
        WhatsAppProviderKind::Evolution => {
            config.whatsapp.evolution_api_key.is_some() && !config.whatsapp.evolution_url.is_empty()
        }
    };
    if whatsapp_ok {
        println!("  ✅ WhatsApp adapter configured ({:?})", config.whatsapp.provider);
    } else {
        println!("  ⚠️  WhatsApp adapter incomplete — check whatsapp.* settings");
        issues += 1;
    }

    if config.whatsapp.app_secret.is_none() && !config.whatsapp.disable_signature_validation {
        println!("  ⚠️  No app secret: webhook signatures will not be validated");
        issues += 1;
    }

    // Insight tools
    if config.facebook.access_token.is_some() {
        println!("  ✅ Facebook access token configured");
    } else {
        println!("  ⚠️  No Facebook access token — insight tools will fail");
        issues += 1;
    }
    if config.accounts.is_empty() {
        println!("  ⚠️  No ad accounts configured — add [[accounts]] entries");
        issues += 1;
    } else {
        println!("  ✅ {} ad account(s) configured", config.accounts.len());
    }

    // Database
    match adpilot_store::SqliteStore::new(&config.store.database_url).await {
        Ok(_) => println!("  ✅ Database reachable ({})", config.store.database_url),
        Err(e) => {
            println!("  ❌ Database unreachable: {e}");
            issues += 1;
        }
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
