//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router; every method and path goes to the proxy
//! - Wire up middleware (request ID, tracing)
//! - Serve plain HTTP and HTTPS frontends with graceful shutdown

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, Response},
    routing::any,
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use tokio::net::TcpListener;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::http::proxy::ImpersonatingProxy;
use crate::http::request::{request_id, MakeRequestUuid};
use crate::lifecycle::ShutdownSignal;

/// Frontend server for the gateway.
#[derive(Clone)]
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(proxy: ImpersonatingProxy) -> Self {
        Self {
            router: Self::build_router(Arc::new(proxy)),
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(proxy: Arc<ImpersonatingProxy>) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(proxy)
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id(request.headers()),
                )
            }))
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Serve plain HTTP on `listener` until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, mut shutdown: ShutdownSignal) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.recv().await })
            .await?;

        tracing::info!(address = %addr, "HTTP server stopped");
        Ok(())
    }

    /// Serve HTTPS on `addr` until `shutdown` fires.
    pub async fn run_tls(
        self,
        addr: SocketAddr,
        tls: RustlsConfig,
        mut shutdown: ShutdownSignal,
    ) -> Result<(), std::io::Error> {
        tracing::info!(address = %addr, "HTTPS server starting");

        let handle = axum_server::Handle::new();
        let signal_handle = handle.clone();
        tokio::spawn(async move {
            shutdown.recv().await;
            signal_handle.graceful_shutdown(None);
        });

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum_server::bind_rustls(addr, tls).handle(handle).serve(app).await?;

        tracing::info!(address = %addr, "HTTPS server stopped");
        Ok(())
    }
}

async fn proxy_handler(
    State(proxy): State<Arc<ImpersonatingProxy>>,
    ConnectInfo(client_addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response<Body> {
    proxy.serve(client_addr, request).await
}
