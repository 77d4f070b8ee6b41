//! HTTP webhook gateway for adpilot.
//!
//! Exposes the Meta webhook verification handshake, the webhook receiver
//! (signature check → adapter parse → pipeline ingest), a manual-send
//! endpoint that bypasses the agent loop, and a health check.
//!
//! The webhook handler never lets an error escape as a 5xx: every outcome
//! is a structured JSON status (`queued` | `ignored` | `error`).
//!
//! Built on Axum for high performance async HTTP.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Router,
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use adpilot_agent::{InboundRouter, IngestAck};
use adpilot_channels::signature::verify_signature;
use adpilot_core::MessagingAdapter;

/// Shared application state for the gateway.
pub struct GatewayState {
    pub config: adpilot_config::AppConfig,
    pub adapter: Arc<dyn MessagingAdapter>,
    pub router: Arc<InboundRouter>,
}

type SharedState = Arc<GatewayState>;

/// Build the Axum router with all gateway routes.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route(
            "/webhook/whatsapp",
            get(webhook_verify_handler).post(webhook_handler),
        )
        .route("/send", post(send_handler))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the gateway HTTP server.
pub async fn start(state: SharedState) -> Result<(), Box<dyn std::error::Error>> {
    let host = state.config.gateway.host.clone();
    let port = state.config.gateway.port;
    let addr = format!("{host}:{port}");

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "Gateway listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Meta webhook verification handshake: echo the challenge when the mode
/// and token match.
async fn webhook_verify_handler(
    State(state): State<SharedState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let mode = params.get("hub.mode").map(String::as_str).unwrap_or_default();
    let token = params
        .get("hub.verify_token")
        .map(String::as_str)
        .unwrap_or_default();
    let challenge = params
        .get("hub.challenge")
        .cloned()
        .unwrap_or_default();

    if mode == "subscribe" && token == state.config.whatsapp.webhook_verify_token {
        info!("Webhook verified");
        (StatusCode::OK, challenge).into_response()
    } else {
        warn!("Webhook verification failed");
        (
            StatusCode::FORBIDDEN,
            Json(json!({ "error": "Verification failed" })),
        )
            .into_response()
    }
}

/// Inbound webhook receiver.
async fn webhook_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    // Signature check on the raw body, before any parsing
    let whatsapp = &state.config.whatsapp;
    if !whatsapp.disable_signature_validation {
        if let Some(secret) = whatsapp.app_secret.as_deref() {
            let signature = headers
                .get("X-Hub-Signature-256")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();

            if signature.is_empty() {
                warn!("Webhook without signature rejected");
                return (
                    StatusCode::FORBIDDEN,
                    Json(json!({ "error": "Missing signature" })),
                )
                    .into_response();
            }
            if !verify_signature(secret, &body, signature) {
                warn!("Webhook with invalid signature rejected");
                return (
                    StatusCode::FORBIDDEN,
                    Json(json!({ "error": "Invalid signature" })),
                )
                    .into_response();
            }
        }
    }

    // Malformed payloads are acknowledged as errors, never raised
    let payload: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "Malformed webhook body");
            return Json(json!({ "status": "error", "message": e.to_string() })).into_response();
        }
    };

    let Some(event) = state.adapter.parse_webhook(&payload) else {
        return Json(json!({ "status": "ignored", "reason": "not a message event" }))
            .into_response();
    };

    let ack = state.router.ingest(event).await;
    let timer_seconds = state.config.pipeline.quiet_period_ms / 1_000;

    let response = match ack {
        IngestAck::Queued {
            contact,
            conversation_id,
            queue_size,
        } => json!({
            "status": "queued",
            "from": contact,
            "saved": true,
            "conversation_id": conversation_id,
            "queue_size": queue_size,
            "timer_seconds": timer_seconds,
        }),
        IngestAck::Ignored { reason } => json!({ "status": "ignored", "reason": reason }),
        IngestAck::StatusReceived => json!({ "status": "received", "type": "status" }),
        IngestAck::PresenceHandled => json!({ "status": "received", "type": "presence" }),
        IngestAck::Error { message } => json!({ "status": "error", "message": message }),
    };

    Json(response).into_response()
}

#[derive(Debug, Deserialize)]
struct SendRequest {
    phone: String,
    message: String,
}

/// Manual-send entry point: {phone, message} straight to the dispatcher.
async fn send_handler(
    State(state): State<SharedState>,
    Json(request): Json<SendRequest>,
) -> Json<serde_json::Value> {
    match state
        .router
        .manual_send(&request.phone, &request.message)
        .await
    {
        Ok(conversation_id) => Json(json!({
            "status": "success",
            "message": "Message sent",
            "conversation_id": conversation_id,
        })),
        Err(message) => Json(json!({ "status": "error", "message": message })),
    }
}
