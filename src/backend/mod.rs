//! Backend resolution.
//!
//! # Data Flow
//! ```text
//! flags / store keys ──┐
//!                      ├→ BackendTarget (scheme, authority, CA, token key)
//! in-cluster mount ────┘        → transport.rs (pooled client, plain path)
//!                               → dial_addr()  (raw socket, tunnel path)
//! ```
//!
//! # Design Decisions
//! - Resolved once when the handler is built, never per request
//! - The bearer token itself is not part of the target; only the store key
//!   it is read from, so rotation on disk is seen by the next request

pub mod incluster;
pub mod transport;

use std::path::{Path, PathBuf};

use axum::http::uri::{Authority, InvalidUri, InvalidUriParts, PathAndQuery, Scheme};
use axum::http::Uri;
use thiserror::Error;
use url::{Position, Url};

use crate::config::parse::single_value_key;
use crate::config::schema::keys;
use crate::config::{BackendSettings, ConfigError, ConfigStore, ParseMode};
use incluster::{InClusterConfig, InClusterError};

pub use transport::{build_client, BackendClient};

const DEFAULT_SCHEME: &str = "https";

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("unsupported backend scheme {0:?}, expected http or https")]
    InvalidScheme(String),

    #[error("invalid backend host {host:?}: {source}")]
    InvalidHost {
        host: String,
        #[source]
        source: InvalidUri,
    },

    #[error("problem parsing backend url {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error(transparent)]
    InCluster(#[from] InClusterError),

    #[error("unable to watch backend token file: {0}")]
    TokenFile(#[from] ConfigError),

    #[error("problem reading ca cert file {path}: {source}")]
    CaCert {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("backend TLS setup failed: {0}")]
    Tls(#[source] rustls::Error),

    #[error("cannot rewrite request uri: {0}")]
    Uri(#[from] InvalidUriParts),
}

/// Where requests are forwarded and how the bearer token is looked up.
#[derive(Debug, Clone)]
pub struct BackendTarget {
    scheme: Scheme,
    authority: Authority,
    ca_cert_path: Option<PathBuf>,
    token_key: String,
}

impl BackendTarget {
    /// Target from an explicit scheme and `host[:port]`.
    pub fn new(scheme: &str, host: &str) -> Result<Self, BackendError> {
        let scheme = match scheme.to_ascii_lowercase().as_str() {
            "http" => Scheme::HTTP,
            "https" => Scheme::HTTPS,
            _ => return Err(BackendError::InvalidScheme(scheme.to_string())),
        };
        let authority = host.parse::<Authority>().map_err(|source| BackendError::InvalidHost {
            host: host.to_string(),
            source,
        })?;

        Ok(Self {
            scheme,
            authority,
            ca_cert_path: None,
            token_key: keys::TOKEN.to_string(),
        })
    }

    pub fn with_ca_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_cert_path = Some(path.into());
        self
    }

    /// Store key holding the bearer token.
    pub fn with_token_key(mut self, key: impl Into<String>) -> Self {
        self.token_key = key.into();
        self
    }

    /// Resolve from settings, falling back to the in-cluster identity when
    /// no host is configured.
    pub fn resolve(settings: &BackendSettings, store: &ConfigStore) -> Result<Self, BackendError> {
        Self::resolve_with(settings, store, InClusterConfig::from_env)
    }

    /// As [`resolve`](Self::resolve) with a caller supplied in-cluster loader.
    pub fn resolve_with(
        settings: &BackendSettings,
        store: &ConfigStore,
        in_cluster: impl FnOnce() -> Result<InClusterConfig, InClusterError>,
    ) -> Result<Self, BackendError> {
        if let Some(host) = settings.host.as_deref() {
            let scheme = settings.scheme.as_deref().unwrap_or(DEFAULT_SCHEME);
            let mut target = Self::new(scheme, host)?.with_token_key(token_key_for(&settings.token_path));
            if let Some(ca) = &settings.ca_cert_path {
                target = target.with_ca_cert(ca);
            }
            tracing::info!(scheme = %target.scheme, host = %target.authority, "Using configured backend");
            return Ok(target);
        }

        tracing::info!("No backend host configured, assuming in-cluster configuration");
        let cluster = in_cluster()?;
        let url = Url::parse(&cluster.server_url).map_err(|source| BackendError::InvalidUrl {
            url: cluster.server_url.clone(),
            source,
        })?;

        store.register_file(&cluster.token_file, ParseMode::SingleValue)?;

        let mut target = Self::new(url.scheme(), &url[Position::BeforeHost..Position::AfterPort])?
            .with_token_key(token_key_for(&cluster.token_file));
        if let Some(ca) = settings.ca_cert_path.clone().or(cluster.ca_file) {
            target = target.with_ca_cert(ca);
        }
        tracing::info!(scheme = %target.scheme, host = %target.authority, "Using in-cluster backend");
        Ok(target)
    }

    pub fn scheme(&self) -> &Scheme {
        &self.scheme
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    pub fn ca_cert_path(&self) -> Option<&Path> {
        self.ca_cert_path.as_deref()
    }

    pub fn token_key(&self) -> &str {
        &self.token_key
    }

    /// Current bearer token, read from the store.
    pub fn bearer_token(&self, store: &ConfigStore) -> String {
        let token = store.get(&self.token_key);
        if token.trim().is_empty() && self.token_key != keys::TOKEN {
            return store.get(keys::TOKEN);
        }
        token
    }

    /// Absolute URI on the backend for an inbound request URI.
    pub fn rewrite_uri(&self, uri: &Uri) -> Result<Uri, BackendError> {
        let mut parts = uri.clone().into_parts();
        parts.scheme = Some(self.scheme.clone());
        parts.authority = Some(self.authority.clone());
        if parts.path_and_query.is_none() {
            parts.path_and_query = Some(PathAndQuery::from_static("/"));
        }
        Ok(Uri::from_parts(parts)?)
    }

    /// Host and port to open a raw connection to.
    pub fn dial_addr(&self) -> (String, u16) {
        let host = self
            .authority
            .host()
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        let port = self.authority.port_u16().unwrap_or(if self.scheme == Scheme::HTTPS { 443 } else { 80 });
        (host, port)
    }
}

/// Store key a single-value token file is loaded under.
fn token_key_for(path: &Path) -> String {
    let key = single_value_key(path);
    if key.is_empty() {
        keys::TOKEN.to_string()
    } else {
        key
    }
}
