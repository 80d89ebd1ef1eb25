//! Impersonating request handler.
//!
//! # Responsibilities
//! - Authenticate the caller from its request headers
//! - Replace impersonation headers and the bearer credential
//! - Forward plain requests through the pooled backend client
//! - Hand upgrade requests to the tunnel
//!
//! # Request States
//! ```text
//! Received → Authenticating → Errored[500]
//!                           → Authenticated   → HeaderRewrite → PlainForward | TunnelForward
//!                           → Unauthenticated → HeaderRewrite → PlainForward | TunnelForward (status forced to 401)
//!                                             → Rejected[401] (reject policy only)
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderValue, Request, Response, StatusCode, Version};
use axum::response::IntoResponse;
use futures_util::{stream, StreamExt};

use crate::backend::{build_client, BackendClient, BackendError, BackendTarget};
use crate::config::ConfigStore;
use crate::http::{request::request_id, tunnel};
use crate::observability::metrics::{self, Outcome};
use crate::security::headers::{append_forwarded_for, impersonate, strip_hop_by_hop};
use crate::security::{Authenticator, HeaderAuthenticator};

const AUTH_FAILED_BODY: &str = "Failed authentication\n";
const INTERNAL_ERROR_BODY: &str = "The server encountered a problem";
const UPSTREAM_FAILED_BODY: &str = "Upstream request failed";

/// What happens to a request that carries no credentials.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnauthenticatedPolicy {
    /// Rewrite with an empty identity and forward anyway; the client still
    /// sees 401 followed by the backend body.
    #[default]
    Forward,
    /// Answer 401 without contacting the backend.
    Reject,
}

/// Authenticates, rewrites and forwards every request.
#[derive(Clone)]
pub struct ImpersonatingProxy {
    authenticator: Arc<dyn Authenticator>,
    store: ConfigStore,
    backend: BackendTarget,
    client: BackendClient,
    policy: UnauthenticatedPolicy,
}

impl ImpersonatingProxy {
    /// Proxy to `backend`, reading the bearer token from `store`.
    pub fn new(store: ConfigStore, backend: BackendTarget) -> Result<Self, BackendError> {
        let client = build_client(backend.ca_cert_path())?;
        Ok(Self {
            authenticator: Arc::new(HeaderAuthenticator),
            store,
            backend,
            client,
            policy: UnauthenticatedPolicy::default(),
        })
    }

    pub fn with_authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = authenticator;
        self
    }

    pub fn with_policy(mut self, policy: UnauthenticatedPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn backend(&self) -> &BackendTarget {
        &self.backend
    }

    /// Handle one inbound request from `client_addr`.
    pub async fn serve(&self, client_addr: SocketAddr, mut request: Request<Body>) -> Response<Body> {
        let start = Instant::now();
        let request_id = request_id(request.headers()).to_string();

        let identity = match self.authenticator.authenticate(request.headers()) {
            Ok(identity) => identity,
            Err(e) => {
                tracing::error!(request_id = %request_id, error = %e, "Error encountered while authenticating");
                metrics::record_request(Outcome::AuthError, 500, start);
                return internal_error();
            }
        };

        let authenticated = identity.is_some();
        if !authenticated {
            tracing::info!(request_id = %request_id, client = %client_addr, "Failed authentication");
            if self.policy == UnauthenticatedPolicy::Reject {
                metrics::record_request(Outcome::Rejected, 401, start);
                return unauthorized(Body::empty());
            }
        }
        let identity = identity.unwrap_or_default();

        tracing::debug!(
            request_id = %request_id,
            user = %identity.user,
            groups = ?identity.groups,
            "Impersonating user"
        );

        let token = self.backend.bearer_token(&self.store);
        if let Err(e) = impersonate(request.headers_mut(), &identity, &token) {
            tracing::error!(request_id = %request_id, error = %e, "Cannot rewrite request headers");
            metrics::record_request(Outcome::AuthError, 500, start);
            return internal_error();
        }

        if tunnel::is_upgrade(&request) {
            return self.serve_upgrade(request, authenticated, &request_id, start).await;
        }

        let response = match self.forward(client_addr, request).await {
            Ok(response) => response,
            Err(response) if authenticated => {
                metrics::record_request(Outcome::UpstreamError, response.status().as_u16(), start);
                return response;
            }
            Err(response) => response,
        };

        if authenticated {
            metrics::record_request(Outcome::Forwarded, response.status().as_u16(), start);
            response
        } else {
            metrics::record_request(Outcome::Unauthenticated, 401, start);
            unauthorized(response.into_body())
        }
    }

    /// Upgrade requests always take the raw socket path. An unauthenticated
    /// caller gets the 401 and whatever the backend answered, never a relay.
    async fn serve_upgrade(&self, request: Request<Body>, authenticated: bool, request_id: &str, start: Instant) -> Response<Body> {
        let handshake = match tunnel::open(&self.backend, request).await {
            Ok(handshake) => handshake,
            Err(response) if authenticated => {
                metrics::record_request(Outcome::UpstreamError, response.status().as_u16(), start);
                return response;
            }
            Err(response) => {
                metrics::record_request(Outcome::Unauthenticated, 401, start);
                return unauthorized(response.into_body());
            }
        };

        if authenticated {
            let response = handshake.complete();
            metrics::record_request(Outcome::Tunneled, response.status().as_u16(), start);
            return response;
        }

        if handshake.switched() {
            tracing::warn!(request_id = %request_id, "Backend accepted upgrade for unauthenticated caller, closing it");
        }
        metrics::record_request(Outcome::Unauthenticated, 401, start);
        unauthorized(handshake.abandon())
    }

    /// Send a plain request through the pooled client and stream the reply.
    async fn forward(&self, client_addr: SocketAddr, request: Request<Body>) -> Result<Response<Body>, Response<Body>> {
        let (mut parts, body) = request.into_parts();

        parts.uri = self.backend.rewrite_uri(&parts.uri).map_err(|e| {
            tracing::error!(error = %e, "Cannot build backend uri");
            internal_error()
        })?;
        parts.version = Version::HTTP_11;
        strip_hop_by_hop(&mut parts.headers);
        append_forwarded_for(&mut parts.headers, client_addr.ip());

        let uri = parts.uri.clone();
        let response = self
            .client
            .request(Request::from_parts(parts, body))
            .await
            .map_err(|e| {
                tracing::error!(uri = %uri, error = %e, "Upstream error");
                (StatusCode::BAD_GATEWAY, UPSTREAM_FAILED_BODY).into_response()
            })?;

        let (mut parts, body) = response.into_parts();
        strip_hop_by_hop(&mut parts.headers);
        Ok(Response::from_parts(parts, Body::new(body)))
    }
}

/// 401 whose body is the failure text followed by `rest`.
fn unauthorized(rest: Body) -> Response<Body> {
    let prefix = stream::once(async { Ok::<_, axum::Error>(Bytes::from_static(AUTH_FAILED_BODY.as_bytes())) });
    let body = Body::from_stream(prefix.chain(rest.into_data_stream()));

    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::UNAUTHORIZED;
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    headers.insert(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    response
}

fn internal_error() -> Response<Body> {
    (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_BODY).into_response()
}
