//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! frontend address (flag or store key)
//!     → listener.rs (parse, bind)
//!     → tls.rs (optional PEM cert/key for the HTTPS frontend)
//!     → Hand off to HTTP layer
//! ```

pub mod listener;
pub mod tls;

pub use listener::ListenerError;
pub use tls::TlsError;
