//! TLS configuration and certificate loading.

use std::path::{Path, PathBuf};

use axum_server::tls_rustls::RustlsConfig;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("certificate file not found: {0}")]
    CertNotFound(PathBuf),

    #[error("private key file not found: {0}")]
    KeyNotFound(PathBuf),

    #[error("failed to load TLS material: {0}")]
    Load(#[from] std::io::Error),
}

/// Load the frontend TLS configuration from PEM certificate and key files.
pub async fn load_tls_config(cert_path: &Path, key_path: &Path) -> Result<RustlsConfig, TlsError> {
    if !cert_path.exists() {
        return Err(TlsError::CertNotFound(cert_path.to_path_buf()));
    }
    if !key_path.exists() {
        return Err(TlsError::KeyNotFound(key_path.to_path_buf()));
    }

    Ok(RustlsConfig::from_pem_file(cert_path, key_path).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_files_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("tls.crt");
        let key = dir.path().join("tls.key");

        let err = load_tls_config(&cert, &key).await.unwrap_err();
        assert!(matches!(err, TlsError::CertNotFound(_)));

        std::fs::write(&cert, "").unwrap();
        let err = load_tls_config(&cert, &key).await.unwrap_err();
        assert!(matches!(err, TlsError::KeyNotFound(ref p) if p == &key));
    }

    #[tokio::test]
    async fn unparsable_material_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("tls.crt");
        let key = dir.path().join("tls.key");
        std::fs::write(&cert, "garbage").unwrap();
        std::fs::write(&key, "garbage").unwrap();

        let err = load_tls_config(&cert, &key).await.unwrap_err();
        assert!(matches!(err, TlsError::Load(_)));
    }
}
