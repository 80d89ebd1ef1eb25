//! Command line arguments.
//!
//! Every flag is optional; unset flags fall back to the matching key of the
//! watched properties file (see [`crate::config::schema`]).

use std::path::PathBuf;

use clap::Parser;

/// Default location of the platform-mounted service account token.
pub const DEFAULT_TOKEN_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

/// Default location of the gateway's properties file.
pub const DEFAULT_CONFIG_PATH: &str = "/var/run/cattle.io/config/server.properties";

#[derive(Debug, Clone, Parser)]
#[command(name = "impersonation-gateway")]
#[command(about = "Authenticating reverse proxy that forwards callers as impersonated users", long_about = None)]
pub struct Cli {
    /// Address (host:port) to listen on for plain HTTP
    #[arg(long)]
    pub frontend_http_addr: Option<String>,

    /// Address (host:port) to listen on for HTTPS
    #[arg(long)]
    pub frontend_https_addr: Option<String>,

    /// SSL cert for securing the HTTPS frontend
    #[arg(long)]
    pub frontend_ssl_cert_path: Option<PathBuf>,

    /// SSL key for securing the HTTPS frontend
    #[arg(long)]
    pub frontend_ssl_key_path: Option<PathBuf>,

    /// Address (host[:port]) of the server to proxy to
    #[arg(long)]
    pub backend_addr: Option<String>,

    /// Scheme (http or https) of the server to proxy to
    #[arg(long)]
    pub backend_scheme: Option<String>,

    /// CA certificate used to verify the backend
    #[arg(long)]
    pub ca_cert_path: Option<PathBuf>,

    /// Bearer token file presented to the backend (watched for rotation)
    #[arg(long, env = "TOKEN_PATH", default_value = DEFAULT_TOKEN_PATH)]
    pub token_path: PathBuf,

    /// Properties file with gateway settings (watched for changes)
    #[arg(long, env = "CONFIG_PATH", default_value = DEFAULT_CONFIG_PATH)]
    pub config_path: PathBuf,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long)]
    pub log_level: Option<String>,

    /// Address to expose Prometheus metrics on
    #[arg(long)]
    pub metrics_addr: Option<String>,

    /// Return 401 without contacting the backend when no credentials are sent
    #[arg(long)]
    pub reject_unauthenticated: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_platform_mounts() {
        let cli = Cli::try_parse_from(["impersonation-gateway"]).unwrap();
        // TOKEN_PATH / CONFIG_PATH may be set in the test environment.
        if std::env::var_os("TOKEN_PATH").is_none() {
            assert_eq!(cli.token_path, PathBuf::from(DEFAULT_TOKEN_PATH));
        }
        if std::env::var_os("CONFIG_PATH").is_none() {
            assert_eq!(cli.config_path, PathBuf::from(DEFAULT_CONFIG_PATH));
        }
        assert!(cli.backend_addr.is_none());
        assert!(!cli.reject_unauthenticated);
    }

    #[test]
    fn flags_parse() {
        let cli = Cli::try_parse_from([
            "impersonation-gateway",
            "--backend-addr",
            "10.0.0.1:6443",
            "--backend-scheme",
            "http",
            "--frontend-http-addr",
            "127.0.0.1:9000",
            "--token-path",
            "/tmp/token",
            "--reject-unauthenticated",
        ])
        .unwrap();

        assert_eq!(cli.backend_addr.as_deref(), Some("10.0.0.1:6443"));
        assert_eq!(cli.backend_scheme.as_deref(), Some("http"));
        assert_eq!(cli.frontend_http_addr.as_deref(), Some("127.0.0.1:9000"));
        assert_eq!(cli.token_path, PathBuf::from("/tmp/token"));
        assert!(cli.reject_unauthenticated);
    }
}
