//! `adpilot gateway` — Start the webhook gateway and message pipeline.

use std::sync::Arc;

use adpilot_config::AppConfig;
use adpilot_gateway::GatewayState;

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config =
        AppConfig::load_or_default().map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    let (adapter, router) = super::build_pipeline(&config).await?;

    println!("🤖 adpilot Gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   WhatsApp provider: {:?}", config.whatsapp.provider);
    println!(
        "   Debounce: {}s quiet period",
        config.pipeline.quiet_period_ms / 1_000
    );

    let state = Arc::new(GatewayState {
        config,
        adapter,
        router,
    });

    adpilot_gateway::start(state).await?;

    Ok(())
}
