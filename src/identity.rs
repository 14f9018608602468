//! Who is asking for progress.
//!
//! Browsers trigger the download through a plain navigation, so the progress
//! poll and the download have to meet on a shared key. A caller-chosen
//! `token` query parameter makes that key per-download; without one the peer
//! address is used, which lumps together every download behind the same NAT.

use axum::{
    extract::{ConnectInfo, FromRequestParts, Query},
    http::request::Parts,
};
use serde::Deserialize;
use std::net::SocketAddr;

use crate::error::AppError;

const MAX_TOKEN_LEN: usize = 128;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientIdentity {
    key: String,
    token: Option<String>,
}

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

impl ClientIdentity {
    pub fn from_token(token: &str) -> Result<Self, AppError> {
        if !is_valid_token(token) {
            return Err(AppError::InvalidToken);
        }
        Ok(Self {
            key: format!("token:{}", token),
            token: Some(token.to_string()),
        })
    }

    pub fn from_address(address: &str) -> Self {
        Self {
            key: format!("addr:{}", address),
            token: None,
        }
    }

    /// Registry key.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }
}

pub fn is_valid_token(token: &str) -> bool {
    !token.is_empty()
        && token.len() <= MAX_TOKEN_LEN
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

impl<S> FromRequestParts<S> for ClientIdentity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Ok(Query(TokenQuery { token: Some(token) })) = Query::<TokenQuery>::try_from_uri(&parts.uri) {
            return Self::from_token(&token);
        }

        if let Some(ConnectInfo(addr)) = parts.extensions.get::<ConnectInfo<SocketAddr>>() {
            return Ok(Self::from_address(&addr.ip().to_string()));
        }

        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.split(',').next())
            .map(str::trim)
            .filter(|h| !h.is_empty());

        Ok(Self::from_address(forwarded.unwrap_or("unknown")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn identify(request: Request<()>) -> Result<ClientIdentity, AppError> {
        let (mut parts, _) = request.into_parts();
        ClientIdentity::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_token_wins() {
        let mut request = Request::builder()
            .uri("/api/download-progress?token=abc-123")
            .body(())
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([10, 0, 0, 1], 4000))));

        let identity = identify(request).await.unwrap();
        assert_eq!(identity.key(), "token:abc-123");
        assert_eq!(identity.token(), Some("abc-123"));
    }

    #[tokio::test]
    async fn test_peer_address_ignores_port() {
        let mut request = Request::builder().uri("/api/download-progress").body(()).unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([10, 0, 0, 1], 4000))));

        let identity = identify(request).await.unwrap();
        assert_eq!(identity.key(), "addr:10.0.0.1");
        assert_eq!(identity.token(), None);
    }

    #[tokio::test]
    async fn test_forwarded_for_fallback() {
        let request = Request::builder()
            .uri("/api/download-progress")
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.2")
            .body(())
            .unwrap();
        assert_eq!(identify(request).await.unwrap().key(), "addr:203.0.113.7");

        let request = Request::builder().uri("/").body(()).unwrap();
        assert_eq!(identify(request).await.unwrap().key(), "addr:unknown");
    }

    #[tokio::test]
    async fn test_invalid_token_rejected() {
        let request = Request::builder()
            .uri("/api/download-progress?token=%2E%2E%2Fetc")
            .body(())
            .unwrap();
        assert!(matches!(identify(request).await, Err(AppError::InvalidToken)));
    }

    #[test]
    fn test_token_rules() {
        assert!(is_valid_token("0f8fad5b-d9cb-469f-a165-70867728950e"));
        assert!(!is_valid_token(""));
        assert!(!is_valid_token("has space"));
        assert!(!is_valid_token(&"a".repeat(MAX_TOKEN_LEN + 1)));
    }
}
