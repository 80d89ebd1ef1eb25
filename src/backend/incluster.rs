//! In-cluster service identity.
//!
//! When no backend is configured explicitly the gateway talks to the API
//! server of the cluster it runs in, using the service account the
//! platform mounts into every pod.

use std::env;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Directory the platform mounts the service account into.
pub const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

const SERVICE_HOST_ENV: &str = "KUBERNETES_SERVICE_HOST";
const SERVICE_PORT_ENV: &str = "KUBERNETES_SERVICE_PORT";
const TOKEN_FILE: &str = "token";
const CA_FILE: &str = "ca.crt";

#[derive(Debug, Error)]
pub enum InClusterError {
    #[error("unable to load in-cluster configuration, KUBERNETES_SERVICE_HOST and KUBERNETES_SERVICE_PORT must be defined")]
    NotInCluster,

    #[error("unable to read service account token {path}: {source}")]
    Token {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Backend connection details supplied by the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InClusterConfig {
    /// `https://host:port` of the API server.
    pub server_url: String,
    pub token_file: PathBuf,
    /// Absent when the mount carries no CA bundle.
    pub ca_file: Option<PathBuf>,
}

impl InClusterConfig {
    /// Load from the process environment and the standard mount.
    pub fn from_env() -> Result<Self, InClusterError> {
        Self::load(|key| env::var(key).ok(), Path::new(SERVICE_ACCOUNT_DIR))
    }

    /// Load using `lookup` for environment variables and `mount` as the
    /// service account directory.
    pub fn load(lookup: impl Fn(&str) -> Option<String>, mount: &Path) -> Result<Self, InClusterError> {
        let host = lookup(SERVICE_HOST_ENV).filter(|h| !h.is_empty());
        let port = lookup(SERVICE_PORT_ENV).filter(|p| !p.is_empty());
        let (Some(host), Some(port)) = (host, port) else {
            return Err(InClusterError::NotInCluster);
        };

        let token_file = mount.join(TOKEN_FILE);
        std::fs::metadata(&token_file).map_err(|source| InClusterError::Token {
            path: token_file.clone(),
            source,
        })?;

        let ca_file = mount.join(CA_FILE);
        let ca_file = if ca_file.is_file() {
            Some(ca_file)
        } else {
            tracing::warn!(path = %ca_file.display(), "In-cluster CA bundle missing, using system roots");
            None
        };

        Ok(Self {
            server_url: format!("https://{}", join_host_port(&host, &port)),
            token_file,
            ca_file,
        })
    }
}

/// `host:port`, bracketing IPv6 literals.
fn join_host_port(host: &str, port: &str) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn loads_from_env_and_mount() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("token"), "sa-token").unwrap();
        fs::write(dir.path().join("ca.crt"), "pem").unwrap();

        let config = InClusterConfig::load(
            env_of(&[(SERVICE_HOST_ENV, "10.96.0.1"), (SERVICE_PORT_ENV, "443")]),
            dir.path(),
        )
        .unwrap();

        assert_eq!(config.server_url, "https://10.96.0.1:443");
        assert_eq!(config.token_file, dir.path().join("token"));
        assert_eq!(config.ca_file, Some(dir.path().join("ca.crt")));
    }

    #[test]
    fn ipv6_host_is_bracketed() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("token"), "sa-token").unwrap();

        let config = InClusterConfig::load(
            env_of(&[(SERVICE_HOST_ENV, "fd00::1"), (SERVICE_PORT_ENV, "6443")]),
            dir.path(),
        )
        .unwrap();

        assert_eq!(config.server_url, "https://[fd00::1]:6443");
        assert_eq!(config.ca_file, None);
    }

    #[test]
    fn missing_env_is_not_in_cluster() {
        let dir = tempfile::tempdir().unwrap();
        let err = InClusterConfig::load(env_of(&[(SERVICE_HOST_ENV, "10.96.0.1")]), dir.path()).unwrap_err();
        assert!(matches!(err, InClusterError::NotInCluster));
    }

    #[test]
    fn missing_token_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = InClusterConfig::load(
            env_of(&[(SERVICE_HOST_ENV, "10.96.0.1"), (SERVICE_PORT_ENV, "443")]),
            dir.path(),
        )
        .unwrap_err();
        assert!(matches!(err, InClusterError::Token { .. }));
    }
}
