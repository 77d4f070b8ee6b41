//! # adpilot Core
//!
//! Domain types, traits, and error definitions for the adpilot conversational
//! pipeline. This crate has **zero framework dependencies** — it defines the
//! domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every subsystem is defined as a trait here. Implementations live in their
//! respective crates. This enables:
//! - Swapping messaging providers via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod channel;
pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod response;
pub mod store;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use channel::{
    ContactKey, Delivery, InboundEvent, InboundMessage, MessagingAdapter, PresenceKind,
    StatusUpdate,
};
pub use error::{Error, Result};
pub use message::{Message, MessageToolCall, Role, TurnContext};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition, Usage};
pub use response::{ButtonSpec, ButtonsPayload, InteractivePayload, ListOption, ListPayload, LogicalResponse};
pub use store::{Contact, ConversationStore, DeliveryStatus, Direction, StoredMessage};
pub use tool::{Tool, ToolCall, ToolRegistry, ToolResult};
pub use event::{DomainEvent, EventBus};
