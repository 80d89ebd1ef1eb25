//! Caller authentication.
//!
//! Identity comes from one of two places, first match wins:
//! 1. HTTP Basic credentials: the username is the user, the password is a
//!    comma separated list of groups.
//! 2. An `Authentication` cookie holding base64 of `user[:group,group...]`.
//!
//! No credentials at all is not an error, it yields `Ok(None)`.

use axum::http::{header, HeaderMap};
use axum_extra::extract::cookie::CookieJar;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

/// Name of the cookie carrying encoded credentials.
pub const AUTH_COOKIE: &str = "Authentication";

const GROUP_DELIMITER: char = ',';

/// Identity the backend is asked to impersonate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub user: String,
    /// Order is kept when reproduced as headers.
    pub groups: Vec<String>,
}

/// Credentials were present but could not be read.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("malformed Authentication cookie: {0}")]
    MalformedCookie(#[from] base64::DecodeError),

    #[error("Authentication cookie is not valid UTF-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

/// Extracts the caller identity from request headers.
pub trait Authenticator: Send + Sync {
    /// `Ok(None)` when the request carries no credentials.
    fn authenticate(&self, headers: &HeaderMap) -> Result<Option<Identity>, AuthError>;
}

/// Basic-auth or cookie authenticator.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderAuthenticator;

impl Authenticator for HeaderAuthenticator {
    fn authenticate(&self, headers: &HeaderMap) -> Result<Option<Identity>, AuthError> {
        if let Some((user, password)) = basic_credentials(headers) {
            return Ok(Some(Identity {
                user,
                groups: split_groups(&password),
            }));
        }

        let jar = CookieJar::from_headers(headers);
        let Some(cookie) = jar.get(AUTH_COOKIE) else {
            return Ok(None);
        };

        let decoded = String::from_utf8(STANDARD.decode(cookie.value_trimmed())?)?;
        let identity = match decoded.split_once(':') {
            Some((user, groups)) => Identity {
                user: user.to_string(),
                groups: split_groups(groups),
            },
            None => Identity {
                user: decoded,
                groups: Vec::new(),
            },
        };
        Ok(Some(identity))
    }
}

/// Username and password from `Authorization: Basic`, if well formed.
///
/// Anything unreadable is treated as absent so the cookie still gets a
/// chance.
fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.split_at_checked(6)?;
    if !scheme.eq_ignore_ascii_case("Basic ") {
        return None;
    }

    let decoded = String::from_utf8(STANDARD.decode(encoded).ok()?).ok()?;
    let (user, password) = decoded.split_once(':')?;
    Some((user.to_string(), password.to_string()))
}

/// An empty input yields one empty group.
fn split_groups(raw: &str) -> Vec<String> {
    raw.split(GROUP_DELIMITER).map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn basic(user: &str, password: &str) -> HeaderValue {
        let encoded = STANDARD.encode(format!("{}:{}", user, password));
        HeaderValue::from_str(&format!("Basic {}", encoded)).unwrap()
    }

    fn cookie(raw: &str) -> HeaderValue {
        HeaderValue::from_str(&format!("{}={}", AUTH_COOKIE, raw)).unwrap()
    }

    fn authenticate(headers: &HeaderMap) -> Result<Option<Identity>, AuthError> {
        HeaderAuthenticator.authenticate(headers)
    }

    #[test]
    fn basic_auth_splits_password_into_groups() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, basic("bob", "ops,dev"));

        let identity = authenticate(&headers).unwrap().unwrap();
        assert_eq!(identity.user, "bob");
        assert_eq!(identity.groups, vec!["ops", "dev"]);
    }

    #[test]
    fn basic_auth_empty_password_is_one_empty_group() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, basic("bob", ""));

        let identity = authenticate(&headers).unwrap().unwrap();
        assert_eq!(identity.groups, vec![""]);
    }

    #[test]
    fn basic_scheme_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        let encoded = STANDARD.encode("carol:admins");
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("bAsIc {}", encoded)).unwrap(),
        );

        let identity = authenticate(&headers).unwrap().unwrap();
        assert_eq!(identity.user, "carol");
    }

    #[test]
    fn cookie_with_groups() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, cookie(&STANDARD.encode("alice:readers,writers")));

        let identity = authenticate(&headers).unwrap().unwrap();
        assert_eq!(
            identity,
            Identity {
                user: "alice".into(),
                groups: vec!["readers".into(), "writers".into()],
            }
        );
    }

    #[test]
    fn cookie_without_colon_has_no_groups() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, cookie(&STANDARD.encode("alice")));

        let identity = authenticate(&headers).unwrap().unwrap();
        assert_eq!(identity.user, "alice");
        assert!(identity.groups.is_empty());
    }

    #[test]
    fn cookie_splits_on_first_colon() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, cookie(&STANDARD.encode("svc:a:b")));

        let identity = authenticate(&headers).unwrap().unwrap();
        assert_eq!(identity.user, "svc");
        assert_eq!(identity.groups, vec!["a:b"]);
    }

    #[test]
    fn cookie_found_among_others() {
        let mut headers = HeaderMap::new();
        let raw = format!("theme=dark; {}={}; lang=en", AUTH_COOKIE, STANDARD.encode("dave:x"));
        headers.insert(header::COOKIE, HeaderValue::from_str(&raw).unwrap());

        let identity = authenticate(&headers).unwrap().unwrap();
        assert_eq!(identity.user, "dave");
    }

    #[test]
    fn invalid_base64_cookie_is_an_error() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, cookie("not*base64"));

        let err = authenticate(&headers).unwrap_err();
        assert!(matches!(err, AuthError::MalformedCookie(_)));
    }

    #[test]
    fn no_credentials_is_not_an_error() {
        assert_eq!(authenticate(&HeaderMap::new()).unwrap(), None);

        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("session=abc"));
        assert_eq!(authenticate(&headers).unwrap(), None);
    }

    #[test]
    fn basic_auth_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, basic("bob", "ops"));
        headers.insert(header::COOKIE, cookie(&STANDARD.encode("alice:readers")));

        let identity = authenticate(&headers).unwrap().unwrap();
        assert_eq!(identity.user, "bob");
    }

    #[test]
    fn malformed_basic_falls_through_to_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic %%%"));
        headers.insert(header::COOKIE, cookie(&STANDARD.encode("alice:readers")));

        let identity = authenticate(&headers).unwrap().unwrap();
        assert_eq!(identity.user, "alice");
    }

    #[test]
    fn bearer_authorization_is_not_basic() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));

        assert_eq!(authenticate(&headers).unwrap(), None);
    }
}
