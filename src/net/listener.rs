//! Frontend address binding.

use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::TcpListener;

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("invalid listen address {addr:?}: {source}")]
    InvalidAddress {
        addr: String,
        #[source]
        source: std::net::AddrParseError,
    },

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Parse a `host:port` listen address.
pub fn parse_addr(addr: &str) -> Result<SocketAddr, ListenerError> {
    addr.parse().map_err(|source| ListenerError::InvalidAddress {
        addr: addr.to_string(),
        source,
    })
}

/// Bind a TCP listener on `addr`.
pub async fn bind(addr: &str) -> Result<TcpListener, ListenerError> {
    let addr = parse_addr(addr)?;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ListenerError::Bind { addr, source })?;

    let local_addr = listener.local_addr().unwrap_or(addr);
    tracing::info!(address = %local_addr, "Listener bound");
    Ok(listener)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn binds_ephemeral_port() {
        let listener = bind("127.0.0.1:0").await.unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);
    }

    #[test]
    fn rejects_hostnames() {
        let err = parse_addr("localhost:8080").unwrap_err();
        assert!(matches!(err, ListenerError::InvalidAddress { .. }));
    }
}
