//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, request ID, tracing span)
//!     → proxy.rs (authenticate, rewrite impersonation headers)
//!     → plain request:   pooled client → backend → streamed response
//!     → upgrade request: tunnel.rs (dial, 101, raw byte relay)
//! ```

pub mod proxy;
pub mod request;
pub mod server;
pub mod tunnel;

pub use proxy::{ImpersonatingProxy, UnauthenticatedPolicy};
pub use request::{MakeRequestUuid, X_REQUEST_ID};
pub use server::HttpServer;
pub use tunnel::TunnelSession;
