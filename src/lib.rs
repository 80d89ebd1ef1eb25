//! Impersonation Gateway
//!
//! An authenticating reverse proxy. Callers identify themselves with HTTP
//! Basic credentials or an `Authentication` cookie; the gateway forwards
//! their requests to a backend (typically a cluster API server) as
//! `Impersonate-User` / `Impersonate-Group` headers, authenticated with a
//! bearer token the gateway holds itself.
//!
//! # Architecture Overview
//!
//! ```text
//!   Client ──▶ net::listener ──▶ http::server ──▶ http::proxy
//!                                                    │
//!                           security::authn ◀────────┤ (who is calling?)
//!                           security::headers ◀──────┤ (Impersonate-*, Bearer)
//!                                                    │
//!                          ┌─────────────────────────┴──────────────┐
//!                          ▼                                        ▼
//!                  plain: pooled client                  upgrade: http::tunnel
//!                  (backend::transport)                  (dial, 101, byte relay)
//!                          │                                        │
//!                          └──────────────▶ Backend ◀───────────────┘
//!
//!   Cross-cutting: config (watched store), backend (target resolution),
//!                  observability (logging, metrics), lifecycle (startup,
//!                  signals, shutdown)
//! ```

// Core subsystems
pub mod backend;
pub mod config;
pub mod http;
pub mod net;
pub mod security;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
