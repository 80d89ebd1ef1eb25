//! Configuration schema definitions.
//!
//! Recognized properties keys and the settings resolved from them at
//! startup. Command line flags win over properties keys.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::cli::Cli;
use crate::config::store::ConfigStore;

/// Keys read from the watched properties file.
pub mod keys {
    pub const BACKEND_SCHEME: &str = "backend.scheme";
    pub const BACKEND_HOST: &str = "backend.host";
    pub const BACKEND_CA_CERT_PATH: &str = "backend.ca.cert.path";
    pub const TOKEN: &str = "token";
    pub const LOG_LEVEL: &str = "log.level";
    pub const FRONTEND_HTTP_HOST: &str = "frontend.http.host";
    pub const FRONTEND_HTTPS_HOST: &str = "frontend.https.host";
    pub const FRONTEND_SSL_CERT_PATH: &str = "frontend.ssl.cert.path";
    pub const FRONTEND_SSL_KEY_PATH: &str = "frontend.ssl.key.path";
}

/// Default plain HTTP bind address.
pub const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("frontend https address {addr} needs both an ssl cert path and an ssl key path")]
    MissingTlsMaterial { addr: String },
}

/// Settings for the gateway process, resolved once at startup.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub frontend: FrontendSettings,
    pub backend: BackendSettings,
    pub log_level: Option<String>,
    pub metrics_addr: Option<String>,
    pub reject_unauthenticated: bool,
}

/// Listener configuration.
#[derive(Debug, Clone)]
pub struct FrontendSettings {
    /// Plain HTTP bind address (e.g., "0.0.0.0:8080").
    pub http_addr: String,

    /// Optional HTTPS listener.
    pub https: Option<HttpsSettings>,
}

/// HTTPS listener configuration.
#[derive(Debug, Clone)]
pub struct HttpsSettings {
    pub addr: String,

    /// Path to certificate file (PEM).
    pub cert_path: PathBuf,

    /// Path to private key file (PEM).
    pub key_path: PathBuf,
}

/// Explicit backend configuration. Missing host means in-cluster.
#[derive(Debug, Clone, Default)]
pub struct BackendSettings {
    pub scheme: Option<String>,
    pub host: Option<String>,
    pub ca_cert_path: Option<PathBuf>,

    /// Registered single-value file holding the bearer token.
    pub token_path: PathBuf,
}

impl GatewaySettings {
    /// Combine command line flags with the store's current values.
    pub fn resolve(cli: &Cli, store: &ConfigStore) -> Result<Self, SettingsError> {
        let https = match pick(&cli.frontend_https_addr, store, keys::FRONTEND_HTTPS_HOST) {
            Some(addr) => {
                let cert = pick_path(&cli.frontend_ssl_cert_path, store, keys::FRONTEND_SSL_CERT_PATH);
                let key = pick_path(&cli.frontend_ssl_key_path, store, keys::FRONTEND_SSL_KEY_PATH);
                match (cert, key) {
                    (Some(cert_path), Some(key_path)) => Some(HttpsSettings {
                        addr,
                        cert_path,
                        key_path,
                    }),
                    _ => return Err(SettingsError::MissingTlsMaterial { addr }),
                }
            }
            None => None,
        };

        let frontend = FrontendSettings {
            http_addr: pick(&cli.frontend_http_addr, store, keys::FRONTEND_HTTP_HOST)
                .unwrap_or_else(|| DEFAULT_HTTP_ADDR.to_string()),
            https,
        };

        let backend = BackendSettings {
            scheme: pick(&cli.backend_scheme, store, keys::BACKEND_SCHEME),
            host: pick(&cli.backend_addr, store, keys::BACKEND_HOST),
            ca_cert_path: pick_path(&cli.ca_cert_path, store, keys::BACKEND_CA_CERT_PATH),
            token_path: cli.token_path.clone(),
        };

        Ok(Self {
            frontend,
            backend,
            log_level: pick(&cli.log_level, store, keys::LOG_LEVEL),
            metrics_addr: cli.metrics_addr.clone().filter(|a| !a.is_empty()),
            reject_unauthenticated: cli.reject_unauthenticated,
        })
    }
}

/// Non-empty flag value, else non-empty store value.
fn pick(flag: &Option<String>, store: &ConfigStore, key: &str) -> Option<String> {
    match flag {
        Some(value) if !value.trim().is_empty() => Some(value.trim().to_string()),
        _ => {
            let value = store.get(key);
            let value = value.trim();
            (!value.is_empty()).then(|| value.to_string())
        }
    }
}

fn pick_path(flag: &Option<PathBuf>, store: &ConfigStore, key: &str) -> Option<PathBuf> {
    match flag {
        Some(path) if !path.as_os_str().is_empty() => Some(path.clone()),
        _ => pick(&None, store, key).map(PathBuf::from),
    }
}
