//! Request authentication extractor.
//!
//! Token validation happens upstream; the authenticator forwards the
//! verified user id in the [`USER_ID_HEADER`] header.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::domain::UserId;
use crate::error::GatewayError;

/// Header carrying the authenticated user id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The caller's user id, taken from [`USER_ID_HEADER`].
///
/// Rejects with [`GatewayError::Unauthorized`] when the header is missing
/// or not a UUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser(pub UserId);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = GatewayError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| GatewayError::Unauthorized("missing user id".to_string()))?;
        let user_id = value
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse::<UserId>().ok())
            .ok_or_else(|| GatewayError::Unauthorized("malformed user id".to_string()))?;
        Ok(Self(user_id))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(header: Option<&str>) -> Result<AuthenticatedUser, GatewayError> {
        let mut builder = Request::builder().uri("/");
        if let Some(h) = header {
            builder = builder.header(USER_ID_HEADER, h);
        }
        let Ok(request) = builder.body(()) else {
            panic!("request builds");
        };
        let (mut parts, ()) = request.into_parts();
        AuthenticatedUser::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn valid_header_is_accepted() {
        let user = UserId::new();
        let Ok(AuthenticatedUser(extracted)) = extract(Some(&user.to_string())).await else {
            panic!("valid user id");
        };
        assert_eq!(extracted, user);
    }

    #[tokio::test]
    async fn missing_or_malformed_header_is_unauthorized() {
        assert!(matches!(extract(None).await, Err(GatewayError::Unauthorized(_))));
        assert!(matches!(
            extract(Some("not-a-uuid")).await,
            Err(GatewayError::Unauthorized(_))
        ));
    }
}
