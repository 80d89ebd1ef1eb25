//! Header manipulation.
//!
//! # Responsibilities
//! - Replace caller-supplied impersonation headers with the authenticated
//!   identity and the gateway's own bearer token
//! - Strip hop-by-hop headers on the buffered path
//! - Append the client address to X-Forwarded-For
//!
//! # Design Decisions
//! - Inbound `Impersonate-Group` values are always dropped before the
//!   identity's groups are added, so callers cannot add groups of their own
//! - The bearer header is marked sensitive so it never shows up in debug output

use std::net::IpAddr;

use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue, InvalidHeaderValue};
use thiserror::Error;

use crate::security::authn::Identity;

pub const IMPERSONATE_USER: HeaderName = HeaderName::from_static("impersonate-user");
pub const IMPERSONATE_GROUP: HeaderName = HeaderName::from_static("impersonate-group");
pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Connection-scoped headers that must not travel past a proxy.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "proxy-connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

#[derive(Debug, Error)]
pub enum HeaderError {
    #[error("cannot represent value of {name} header: {source}")]
    InvalidValue {
        name: HeaderName,
        #[source]
        source: InvalidHeaderValue,
    },
}

/// Rewrite `headers` so the backend acts as `identity`, authenticated by `token`.
pub fn impersonate(headers: &mut HeaderMap, identity: &Identity, token: &str) -> Result<(), HeaderError> {
    headers.insert(IMPERSONATE_USER, value(&IMPERSONATE_USER, &identity.user)?);

    headers.remove(IMPERSONATE_GROUP);
    for group in &identity.groups {
        headers.append(IMPERSONATE_GROUP, value(&IMPERSONATE_GROUP, group)?);
    }

    let mut bearer = value(&header::AUTHORIZATION, &format!("Bearer {}", token.trim()))?;
    bearer.set_sensitive(true);
    headers.insert(header::AUTHORIZATION, bearer);
    Ok(())
}

/// Remove hop-by-hop headers, including any named in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(*name);
    }
}

/// Append `client` to any X-Forwarded-For chain already present.
pub fn append_forwarded_for(headers: &mut HeaderMap, client: IpAddr) {
    let prior: Vec<&str> = headers
        .get_all(&X_FORWARDED_FOR)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();

    let chain = if prior.is_empty() {
        client.to_string()
    } else {
        format!("{}, {}", prior.join(", "), client)
    };

    if let Ok(v) = HeaderValue::from_str(&chain) {
        headers.insert(X_FORWARDED_FOR, v);
    }
}

fn value(name: &HeaderName, raw: &str) -> Result<HeaderValue, HeaderError> {
    HeaderValue::from_str(raw).map_err(|source| HeaderError::InvalidValue {
        name: name.clone(),
        source,
    })
}
