//! Outbound HTTP client for the buffered forwarding path.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use rustls::{ClientConfig, RootCertStore};

use crate::backend::BackendError;

/// Pooled HTTP/1.1 client able to reach `http` and `https` backends.
pub type BackendClient = Client<HttpsConnector<HttpConnector>, Body>;

const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Build the client, trusting only `ca_cert_path` when given and the
/// platform's native roots otherwise.
pub fn build_client(ca_cert_path: Option<&Path>) -> Result<BackendClient, BackendError> {
    let roots = match ca_cert_path {
        Some(path) => custom_roots(path)?,
        None => native_roots(),
    };

    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let tls = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(BackendError::Tls)?
        .with_root_certificates(roots)
        .with_no_client_auth();

    let connector = HttpsConnectorBuilder::new()
        .with_tls_config(tls)
        .https_or_http()
        .enable_http1()
        .build();

    Ok(Client::builder(TokioExecutor::new())
        .pool_idle_timeout(POOL_IDLE_TIMEOUT)
        .build(connector))
}

fn custom_roots(path: &Path) -> Result<RootCertStore, BackendError> {
    let ca_err = |source| BackendError::CaCert {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = BufReader::new(File::open(path).map_err(ca_err)?);
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(ca_err)?;

    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(certs);
    if added == 0 {
        return Err(ca_err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "no usable certificates in PEM bundle",
        )));
    }
    if ignored > 0 {
        tracing::warn!(path = %path.display(), ignored, "Skipped unparsable CA certificates");
    }
    tracing::debug!(path = %path.display(), added, "Loaded backend CA bundle");
    Ok(roots)
}

fn native_roots() -> RootCertStore {
    let loaded = rustls_native_certs::load_native_certs();
    for error in &loaded.errors {
        tracing::warn!(%error, "Problem loading native root certificates");
    }

    let mut roots = RootCertStore::empty();
    let (added, _) = roots.add_parsable_certificates(loaded.certs);
    tracing::debug!(added, "Loaded native root certificates");
    roots
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn missing_ca_file_is_reported() {
        let err = build_client(Some(Path::new("/nonexistent/ca.crt"))).unwrap_err();
        assert!(matches!(err, BackendError::CaCert { .. }));
    }

    #[test]
    fn empty_ca_bundle_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ca.crt");
        fs::write(&path, "not a certificate\n").unwrap();

        let err = build_client(Some(&path)).unwrap_err();
        assert!(matches!(err, BackendError::CaCert { ref path, .. } if path.ends_with("ca.crt")));
    }

    #[test]
    fn native_roots_client_builds() {
        assert!(build_client(None).is_ok());
    }
}
