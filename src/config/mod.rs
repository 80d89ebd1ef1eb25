//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! watched files (token mount, server.properties)
//!     → watcher.rs (one task per file, notify events + shutdown)
//!     → parse.rs (single-value or key=value parsing)
//!     → store.rs (RwLock'd map, merged one parse pass at a time)
//!     → read on every request by the proxy handler
//!
//! At startup:
//!     cli.rs flags + store keys → schema.rs → GatewaySettings
//! ```
//!
//! # Design Decisions
//! - The store is an explicit value passed to consumers, not a global
//! - Values are never removed; a deleted file leaves stale-but-valid data
//! - Watch errors are logged and never propagate past the watch task

pub mod cli;
pub mod parse;
pub mod schema;
pub mod store;
pub mod watcher;

pub use cli::Cli;
pub use parse::{ConfigError, ParseMode};
pub use schema::{BackendSettings, GatewaySettings, SettingsError};
pub use store::ConfigStore;
