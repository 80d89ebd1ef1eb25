//! Upgraded (websocket) connection tunnelling.
//!
//! # Data Flow
//! ```text
//! Client ←── raw bytes ──→ Gateway ←── raw bytes ──→ Backend
//!        (hyper upgrade)            (freshly dialed TCP)
//! ```
//!
//! # Design Decisions
//! - The backend socket is dialed before the client connection is touched,
//!   so a dial failure is still an ordinary 500 response
//! - The rewritten request goes out over a one-shot HTTP/1.1 client
//!   connection on the dialed socket, with `Connection`/`Upgrade` intact
//! - Bytes are not inspected; websocket framing is the endpoints' business
//! - The session ends when either direction finishes; both sockets close

use std::io;

use axum::body::Body;
use axum::http::{uri::PathAndQuery, Request, Response, StatusCode, Uri, Version};
use axum::response::IntoResponse;
use hyper::body::Incoming;
use hyper::client::conn::http1;
use hyper::upgrade::{OnUpgrade, Upgraded};
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::backend::BackendTarget;
use crate::observability::metrics;

const DIAL_FAILED: &str = "Unable to establish websocket connection: can't dial.";
const NO_HIJACKER: &str = "Unable to establish websocket connection: no hijacker.";
const HANDSHAKE_FAILED: &str = "Unable to establish websocket connection: backend handshake failed.";

/// Whether the request asks for a protocol upgrade.
pub fn is_upgrade<B>(request: &Request<B>) -> bool {
    request
        .headers()
        .get(axum::http::header::UPGRADE)
        .is_some_and(|v| !v.is_empty())
}

/// Send `request` to the backend on a dedicated socket and wait for its
/// answer. Failures come back as ready-made 500 responses.
pub async fn open(backend: &BackendTarget, mut request: Request<Body>) -> Result<Handshake, Response<Body>> {
    let (host, port) = backend.dial_addr();
    let stream = match TcpStream::connect((host.as_str(), port)).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::error!(host = %host, port, error = %e, "Error dialing websocket backend");
            return Err((StatusCode::INTERNAL_SERVER_ERROR, DIAL_FAILED).into_response());
        }
    };

    let Some(client_upgrade) = request.extensions_mut().remove::<OnUpgrade>() else {
        tracing::error!("Client connection cannot be upgraded");
        return Err((StatusCode::INTERNAL_SERVER_ERROR, NO_HIJACKER).into_response());
    };

    let (mut sender, conn) = match http1::handshake::<_, Body>(TokioIo::new(stream)).await {
        Ok(parts) => parts,
        Err(e) => {
            tracing::error!(error = %e, "Backend handshake failed");
            return Err((StatusCode::INTERNAL_SERVER_ERROR, HANDSHAKE_FAILED).into_response());
        }
    };
    tokio::spawn(async move {
        if let Err(e) = conn.with_upgrades().await {
            tracing::debug!(error = %e, "Backend tunnel connection closed with error");
        }
    });

    let (mut parts, body) = request.into_parts();
    parts.uri = origin_form(&parts.uri);
    parts.version = Version::HTTP_11;

    match sender.send_request(Request::from_parts(parts, body)).await {
        Ok(response) => Ok(Handshake { client_upgrade, response }),
        Err(e) => {
            tracing::error!(error = %e, "Error writing request to websocket backend");
            Err((StatusCode::INTERNAL_SERVER_ERROR, HANDSHAKE_FAILED).into_response())
        }
    }
}

/// The backend's answer to an upgrade request, with the client side not
/// yet taken over.
pub struct Handshake {
    client_upgrade: OnUpgrade,
    response: Response<Incoming>,
}

impl Handshake {
    /// Whether the backend agreed to switch protocols.
    pub fn switched(&self) -> bool {
        self.response.status() == StatusCode::SWITCHING_PROTOCOLS
    }

    /// Relay the backend response to the client and, on `101`, join both
    /// connections in a [`TunnelSession`] once they upgrade.
    pub fn complete(self) -> Response<Body> {
        let Handshake { client_upgrade, mut response } = self;
        if response.status() != StatusCode::SWITCHING_PROTOCOLS {
            tracing::debug!(status = %response.status(), "Backend declined upgrade");
            return response.map(Body::new);
        }

        let backend_upgrade = hyper::upgrade::on(&mut response);
        tokio::spawn(async move {
            match tokio::try_join!(client_upgrade, backend_upgrade) {
                Ok((client, backend)) => TunnelSession::new(client, backend).relay().await,
                Err(e) => tracing::warn!(error = %e, "Upgrade did not complete"),
            }
        });

        let (parts, _) = response.into_parts();
        Response::from_parts(parts, Body::empty())
    }

    /// Give up on the upgrade and keep only the backend's response body.
    /// The backend socket closes once the body is dropped.
    pub fn abandon(self) -> Body {
        Body::new(self.response.into_body())
    }
}

fn origin_form(uri: &Uri) -> Uri {
    let path = uri
        .path_and_query()
        .cloned()
        .unwrap_or_else(|| PathAndQuery::from_static("/"));
    Uri::from(path)
}

/// A client and a backend connection joined by two copy loops.
pub struct TunnelSession<C, B> {
    client: C,
    backend: B,
}

impl TunnelSession<TokioIo<Upgraded>, TokioIo<Upgraded>> {
    fn new(client: Upgraded, backend: Upgraded) -> Self {
        Self {
            client: TokioIo::new(client),
            backend: TokioIo::new(backend),
        }
    }
}

impl<C, B> TunnelSession<C, B>
where
    C: AsyncRead + AsyncWrite + Send + 'static,
    B: AsyncRead + AsyncWrite + Send + 'static,
{
    pub fn from_streams(client: C, backend: B) -> Self {
        Self { client, backend }
    }

    /// Copy bytes both ways until the first direction completes, then
    /// close both connections.
    pub async fn relay(self) {
        let (client_rd, client_wr) = tokio::io::split(self.client);
        let (backend_rd, backend_wr) = tokio::io::split(self.backend);

        let (done_tx, mut done_rx) = mpsc::channel(2);
        let _upstream = AbortOnDrop(tokio::spawn(copy_one_way(client_rd, backend_wr, "upstream", done_tx.clone())));
        let _downstream = AbortOnDrop(tokio::spawn(copy_one_way(backend_rd, client_wr, "downstream", done_tx)));

        metrics::tunnel_opened();
        tracing::debug!("Tunnel established");

        if let Some((direction, result)) = done_rx.recv().await {
            match result {
                Ok(bytes) => tracing::debug!(direction, bytes, "Tunnel closed"),
                Err(e) => tracing::debug!(direction, error = %e, "Tunnel closed with error"),
            }
        }
        metrics::tunnel_closed();
    }
}

type Completion = (&'static str, io::Result<u64>);

async fn copy_one_way<R, W>(mut from: R, mut to: W, direction: &'static str, done: mpsc::Sender<Completion>)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let result = tokio::io::copy(&mut from, &mut to).await;
    if let Ok(bytes) = result {
        metrics::record_tunnel_bytes(direction, bytes);
        let _ = to.shutdown().await;
    }
    let _ = done.send((direction, result)).await;
}

/// Aborts the copy task when the session ends, releasing its half.
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}
