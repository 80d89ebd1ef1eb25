//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → authn.rs (Basic credentials or Authentication cookie → Identity)
//!     → headers.rs (Impersonate-User / Impersonate-Group / Bearer token)
//!     → Pass to forwarding
//! ```
//!
//! # Design Decisions
//! - Authentication is a pure function of the request headers
//! - Callers never choose their own impersonation headers

pub mod authn;
pub mod headers;

pub use authn::{AuthError, Authenticator, HeaderAuthenticator, Identity};
