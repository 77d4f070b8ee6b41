pub mod chat;
pub mod doctor;
pub mod gateway;

use std::sync::Arc;
use std::time::Duration;

use adpilot_agent::{
    AgentLoop, DispatchConfig, Dispatcher, FormatOptions, InboundRouter, MessagePipeline,
    TurnAggregator,
};
use adpilot_config::AppConfig;
use adpilot_core::event::EventBus;
use adpilot_core::store::ConversationStore;

/// Wire the full message pipeline from configuration.
///
/// Shared by `gateway` (and anything else that needs the whole stack):
/// adapter, provider, store, tools, dispatcher, agent loop, debouncer,
/// inbound router.
pub(crate) async fn build_pipeline(
    config: &AppConfig,
) -> Result<
    (
        Arc<dyn adpilot_core::MessagingAdapter>,
        Arc<InboundRouter>,
    ),
    Box<dyn std::error::Error>,
> {
    let adapter = adpilot_channels::build_from_config(config)?;
    let provider = adpilot_providers::build_from_config(config)?;
    let store: Arc<dyn ConversationStore> =
        Arc::new(adpilot_store::SqliteStore::new(&config.store.database_url).await?);
    let tools = Arc::new(adpilot_tools::build_registry(config));
    let events = Arc::new(EventBus::default());

    let dispatcher = Arc::new(Dispatcher::new(
        adapter.clone(),
        store.clone(),
        DispatchConfig {
            part_budget: config.pipeline.part_budget,
            part_delay: Duration::from_millis(config.pipeline.part_delay_ms),
        },
        events.clone(),
    ));

    let mut agent = AgentLoop::new(
        provider,
        config.provider.model.clone(),
        config.provider.temperature,
        tools,
        events.clone(),
    )
    .with_max_iterations(config.pipeline.max_iterations)
    .with_format_options(FormatOptions::from_pipeline(&config.pipeline));
    if let Some(max_tokens) = config.provider.max_tokens {
        agent = agent.with_max_tokens(max_tokens);
    }

    let pipeline = Arc::new(MessagePipeline::new(
        store.clone(),
        adapter.clone(),
        agent,
        dispatcher.clone(),
        events.clone(),
        config.pipeline.history_limit,
    ));

    let aggregator = TurnAggregator::new(
        Duration::from_millis(config.pipeline.quiet_period_ms),
        pipeline,
        events,
    );

    let router = Arc::new(InboundRouter::new(store, adapter.clone(), aggregator, dispatcher));

    Ok((adapter, router))
}
