use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use tracing::warn;

use super::jwt::JwtKeys;
use crate::error::ApiError;

/// Authenticated caller, resolved from `Authorization: Bearer <token>`.
///
/// Handlers that take this extractor never run for unauthenticated requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser(pub i64);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or_else(|| ApiError::Unauthorized("Missing Authorization header".into()))?
            .to_str()
            .map_err(|_| ApiError::Unauthorized("Invalid Authorization header".into()))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::Unauthorized("Invalid Authorization header".into()))?;

        let keys = JwtKeys::from_ref(state);
        let user_id = keys.verify(token).map_err(|e| {
            warn!(error = %e, "rejected bearer token");
            ApiError::from(e)
        })?;

        Ok(AuthUser(user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JwtConfig;
    use axum::http::{HeaderValue, Request, StatusCode};

    #[derive(Clone)]
    struct KeysOnly(JwtKeys);

    impl FromRef<KeysOnly> for JwtKeys {
        fn from_ref(state: &KeysOnly) -> Self {
            state.0.clone()
        }
    }

    fn state() -> KeysOnly {
        KeysOnly(JwtKeys::new(&JwtConfig {
            secret: "extractor-secret".into(),
            ttl_hours: 24,
        }))
    }

    async fn extract(header: Option<&str>) -> Result<AuthUser, ApiError> {
        let mut builder = Request::builder().uri("/");
        if let Some(h) = header {
            builder = builder.header(AUTHORIZATION, h);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        AuthUser::from_request_parts(&mut parts, &state()).await
    }

    #[tokio::test]
    async fn accepts_valid_bearer_token() {
        let token = state().0.issue(9).unwrap();
        let user = extract(Some(&format!("Bearer {}", token))).await.unwrap();
        assert_eq!(user, AuthUser(9));
    }

    #[tokio::test]
    async fn rejects_missing_header() {
        let err = extract(None).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.to_string(), "Missing Authorization header");
    }

    #[tokio::test]
    async fn non_ascii_header_is_invalid_not_missing() {
        let mut parts = Request::builder().uri("/").body(()).unwrap().into_parts().0;
        parts.headers.insert(
            AUTHORIZATION,
            HeaderValue::from_bytes("Bearer tök".as_bytes()).unwrap(),
        );
        let err = AuthUser::from_request_parts(&mut parts, &state())
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.to_string(), "Invalid Authorization header");
    }

    #[tokio::test]
    async fn rejects_other_schemes() {
        let token = state().0.issue(9).unwrap();
        let err = extract(Some(&format!("Token {}", token))).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn rejects_tampered_token() {
        let mut token = state().0.issue(9).unwrap();
        token.push('x');
        let err = extract(Some(&format!("Bearer {}", token))).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }
}
