//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Parse CLI → Init logging → Register watched files
//!     → Resolve backend → Build handler → Start listeners
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop watch tasks → Drain listeners → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then backend, then listeners
//! - Any startup error is fatal; runtime errors never are
//! - Shutdown scopes config watching and listeners, not established tunnels

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{Shutdown, ShutdownSignal};
