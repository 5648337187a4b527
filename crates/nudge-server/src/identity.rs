//! Who is on the other end of a request.
//!
//! Authentication lives outside this crate. The server only asks an
//! [`IdentityResolver`] for an [`Identity`] and falls back to anonymous.

use async_trait::async_trait;
use axum::http::HeaderMap;
use nudge_core::Identity;

/// Header carrying the authenticated user id.
pub const USER_ID_HEADER: &str = "x-user-id";
/// Header carrying the user's display name.
pub const USER_NAME_HEADER: &str = "x-user-name";

/// Resolves the caller's identity from request headers.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Identity for the request, anonymous when unauthenticated.
    async fn resolve(&self, headers: &HeaderMap) -> Identity;
}

/// Trusts identity headers set by an authenticating proxy in front of the
/// server.
#[derive(Clone, Copy, Debug, Default)]
pub struct HeaderIdentityResolver;

#[async_trait]
impl IdentityResolver for HeaderIdentityResolver {
    async fn resolve(&self, headers: &HeaderMap) -> Identity {
        let Some(user_id) = header_str(headers, USER_ID_HEADER) else {
            return Identity::anonymous();
        };
        let display_name = header_str(headers, USER_NAME_HEADER).map(str::to_owned);
        Identity::new(user_id, display_name)
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[tokio::test]
    async fn no_headers_is_anonymous() {
        let identity = HeaderIdentityResolver.resolve(&HeaderMap::new()).await;
        assert!(identity.is_anonymous());
    }

    #[tokio::test]
    async fn reads_user_and_name() {
        let mut headers = HeaderMap::new();
        let _ = headers.insert(USER_ID_HEADER, HeaderValue::from_static("u_42"));
        let _ = headers.insert(USER_NAME_HEADER, HeaderValue::from_static("Grace"));
        let identity = HeaderIdentityResolver.resolve(&headers).await;
        assert_eq!(identity.user_id, "u_42");
        assert_eq!(identity.display_name.as_deref(), Some("Grace"));
    }

    #[tokio::test]
    async fn blank_user_id_is_anonymous() {
        let mut headers = HeaderMap::new();
        let _ = headers.insert(USER_ID_HEADER, HeaderValue::from_static("  "));
        let _ = headers.insert(USER_NAME_HEADER, HeaderValue::from_static("Nobody"));
        assert!(HeaderIdentityResolver.resolve(&headers).await.is_anonymous());
    }

    #[tokio::test]
    async fn name_is_optional() {
        let mut headers = HeaderMap::new();
        let _ = headers.insert(USER_ID_HEADER, HeaderValue::from_static("u_1"));
        let identity = HeaderIdentityResolver.resolve(&headers).await;
        assert_eq!(identity.user_id, "u_1");
        assert!(identity.display_name.is_none());
    }
}
