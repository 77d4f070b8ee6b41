//! Conversation persistence backends for adpilot.
//!
//! The pipeline appends every inbound and outbound message as a row keyed by
//! conversation, and reads back a bounded window of recent messages to seed
//! each orchestration run.
//!
//! Backends:
//! - **SQLite** — production backend (WAL mode, auto-migrating)
//! - **InMemory** — for unit tests

pub mod in_memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use in_memory::InMemoryStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
