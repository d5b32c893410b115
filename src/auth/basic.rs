//! HTTP Basic credentials carried in `Proxy-Authorization`.

use axum::http::header::{HeaderValue, PROXY_AUTHORIZATION};
use axum::http::HeaderMap;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Username and password presented by a proxy client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Decode Basic credentials from the `Proxy-Authorization` header.
///
/// Returns `None` when the header is absent or malformed.
pub fn basic_credentials(headers: &HeaderMap) -> Option<Credentials> {
    let value = headers.get(PROXY_AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some(Credentials::new(username, password))
}

/// Set `Proxy-Authorization` to Basic credentials for `username`/`password`.
pub fn set_basic_auth(headers: &mut HeaderMap, username: &str, password: &str) {
    let encoded = STANDARD.encode(format!("{}:{}", username, password));
    if let Ok(value) = HeaderValue::from_str(&format!("Basic {}", encoded)) {
        headers.insert(PROXY_AUTHORIZATION, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_what_it_encodes() {
        let mut headers = HeaderMap::new();
        set_basic_auth(&mut headers, "alice", "s3cr:et");
        assert_eq!(
            basic_credentials(&headers),
            Some(Credentials::new("alice", "s3cr:et"))
        );
    }

    #[test]
    fn scheme_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        // "user:pass"
        headers.insert(PROXY_AUTHORIZATION, HeaderValue::from_static("bAsIc dXNlcjpwYXNz"));
        assert_eq!(
            basic_credentials(&headers),
            Some(Credentials::new("user", "pass"))
        );
    }

    #[test]
    fn malformed_header_is_none() {
        let mut headers = HeaderMap::new();
        assert_eq!(basic_credentials(&headers), None);

        headers.insert(PROXY_AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(basic_credentials(&headers), None);

        headers.insert(PROXY_AUTHORIZATION, HeaderValue::from_static("Basic !!!"));
        assert_eq!(basic_credentials(&headers), None);

        // "nocolon"
        headers.insert(PROXY_AUTHORIZATION, HeaderValue::from_static("Basic bm9jb2xvbg=="));
        assert_eq!(basic_credentials(&headers), None);
    }
}
