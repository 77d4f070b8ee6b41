//! `adpilot chat` — Send a single message to the agent from the terminal.
//!
//! Bypasses WhatsApp and the debouncer entirely: one turn in, the formatted
//! response (and any interactive payload, rendered as text) out.

use std::sync::Arc;

use adpilot_agent::{AgentLoop, FormatOptions};
use adpilot_config::AppConfig;
use adpilot_core::channel::ContactKey;
use adpilot_core::event::EventBus;
use adpilot_core::message::TurnContext;
use adpilot_core::response::InteractivePayload;

pub async fn run(message: String) -> Result<(), Box<dyn std::error::Error>> {
    let config =
        AppConfig::load_or_default().map_err(|e| format!("Failed to load config: {e}"))?;

    if config.provider.api_key.is_none() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set the environment variable:");
        eprintln!("    export OPENAI_API_KEY='sk-...'");
        eprintln!();
        eprintln!("  Or add provider.api_key to adpilot.toml");
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let provider = adpilot_providers::build_from_config(&config)?;
    let tools = Arc::new(adpilot_tools::build_registry(&config));
    let events = Arc::new(EventBus::default());

    let agent = AgentLoop::new(
        provider,
        config.provider.model.clone(),
        config.provider.temperature,
        tools,
        events,
    )
    .with_max_iterations(config.pipeline.max_iterations)
    .with_format_options(FormatOptions::from_pipeline(&config.pipeline));

    let turn = TurnContext {
        contact: ContactKey::new("cli"),
        conversation_id: 0,
        text: message,
        display_name: None,
    };

    let response = agent.run(&turn, &[]).await?;

    println!("{}", response.text);
    match response.payload {
        Some(InteractivePayload::Buttons(buttons)) => {
            println!();
            for button in &buttons.buttons {
                println!("  [{}] {}", button.id, button.title);
            }
        }
        Some(InteractivePayload::List(list)) => {
            println!();
            println!("{}", list.as_text());
        }
        None => {}
    }

    Ok(())
}
