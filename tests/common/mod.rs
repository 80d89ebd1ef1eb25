//! Shared utilities for gateway integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use impersonation_gateway::backend::BackendTarget;
use impersonation_gateway::config::{ConfigStore, ParseMode};
use impersonation_gateway::http::{HttpServer, ImpersonatingProxy, UnauthenticatedPolicy};
use impersonation_gateway::lifecycle::Shutdown;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

pub const BACKEND_BODY: &str = "backend-body";
pub const INITIAL_TOKEN: &str = "sa-token";

/// Request line and headers as seen by a mock backend.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub target: String,
    /// Lowercased names, in wire order.
    pub headers: Vec<(String, String)>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn all(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }
}

/// Start a backend that records each request head and answers 200 with
/// [`BACKEND_BODY`].
pub async fn start_recording_backend() -> (SocketAddr, mpsc::UnboundedReceiver<RecordedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut chunk).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => buf.extend_from_slice(&chunk[..n]),
                    }
                }

                let _ = tx.send(parse_head(&buf));

                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    BACKEND_BODY.len(),
                    BACKEND_BODY
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (addr, rx)
}

fn parse_head(raw: &[u8]) -> RecordedRequest {
    let text = String::from_utf8_lossy(raw);
    let head = text.split("\r\n\r\n").next().unwrap_or_default();
    let mut lines = head.split("\r\n");

    let mut request_line = lines.next().unwrap_or_default().split(' ');
    let method = request_line.next().unwrap_or_default().to_string();
    let target = request_line.next().unwrap_or_default().to_string();

    let headers = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(n, v)| (n.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();

    RecordedRequest { method, target, headers }
}

/// Start a websocket backend that echoes every data message and reports
/// the handshake headers it received.
pub async fn start_echo_ws_backend() -> (SocketAddr, mpsc::UnboundedReceiver<Vec<(String, String)>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let record = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                    let headers = req
                        .headers()
                        .iter()
                        .map(|(n, v)| (n.as_str().to_string(), v.to_str().unwrap_or_default().to_string()))
                        .collect();
                    let _ = tx.send(headers);
                    Ok(resp)
                };

                let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(socket, record).await else {
                    return;
                };
                while let Some(Ok(msg)) = ws.next().await {
                    if msg.is_text() || msg.is_binary() {
                        if ws.send(msg).await.is_err() {
                            break;
                        }
                    } else if msg.is_close() {
                        break;
                    }
                }
            });
        }
    });

    (addr, rx)
}

/// A closed local port.
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Gateway running on an ephemeral port, stopped on drop of `shutdown`.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub token_path: PathBuf,
    pub shutdown: Shutdown,
    _dir: TempDir,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Start a gateway in front of the plain HTTP `backend`.
pub async fn start_gateway(backend: SocketAddr, policy: UnauthenticatedPolicy) -> TestGateway {
    let dir = tempfile::tempdir().unwrap();
    let token_path = dir.path().join("token");
    std::fs::write(&token_path, format!("{}\n", INITIAL_TOKEN)).unwrap();

    let shutdown = Shutdown::new();
    let store = ConfigStore::new(shutdown.subscribe());
    store.register_file(&token_path, ParseMode::SingleValue).unwrap();

    let target = BackendTarget::new("http", &backend.to_string())
        .unwrap()
        .with_token_key("token");
    let proxy = ImpersonatingProxy::new(store, target).unwrap().with_policy(policy);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(HttpServer::new(proxy).run(listener, shutdown.subscribe()));

    TestGateway {
        addr,
        token_path,
        shutdown,
        _dir: dir,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Next recorded request, failing the test after a few seconds.
pub async fn next<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("backend saw no request")
        .expect("backend stopped")
}
