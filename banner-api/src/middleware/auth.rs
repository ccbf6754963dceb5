//! Role-token middleware
//!
//! Resolves the `token` header to a [`Role`] and gates each router on the
//! lowest role it accepts:
//! - no token: 401
//! - token unknown, or known but below the required role: 403
//!
//! On success the resolved role is inserted into the request extensions,
//! where handlers pick it up with [`RoleExtractor`].

use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Response},
};
use banner_core::Role;

use crate::config::RoleTokens;
use crate::error::ApiError;

/// Header carrying the caller's role token.
pub const TOKEN_HEADER: &str = "token";

// ============================================================================
// MIDDLEWARE STATE
// ============================================================================

/// Shared state for the role middleware.
#[derive(Debug, Clone)]
pub struct AuthMiddlewareState {
    pub tokens: Arc<RoleTokens>,
    /// Lowest role allowed through.
    pub required: Role,
}

impl AuthMiddlewareState {
    pub fn new(tokens: Arc<RoleTokens>, required: Role) -> Self {
        Self { tokens, required }
    }

    /// Role held by `token`, admin taking precedence.
    pub fn resolve(&self, token: &str) -> Option<Role> {
        if self.tokens.is_admin(token) {
            Some(Role::Admin)
        } else if self.tokens.is_user(token) {
            Some(Role::User)
        } else {
            None
        }
    }

    fn admits(&self, role: Role) -> bool {
        match self.required {
            Role::User => true,
            Role::Admin => role == Role::Admin,
        }
    }
}

// ============================================================================
// MIDDLEWARE FUNCTION
// ============================================================================

/// Axum middleware enforcing the role gate.
///
/// # Example
///
/// ```ignore
/// let admin = AuthMiddlewareState::new(tokens, Role::Admin);
/// let app = Router::new()
///     .route("/banner", get(list_banners))
///     .layer(middleware::from_fn_with_state(admin, auth_middleware));
/// ```
pub async fn auth_middleware(
    State(state): State<AuthMiddlewareState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthMiddlewareError> {
    let token = request
        .headers()
        .get(TOKEN_HEADER)
        .and_then(|h| h.to_str().ok())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            AuthMiddlewareError(ApiError::unauthorized(
                "Authentication required: provide a token header",
            ))
        })?;

    let role = state
        .resolve(token)
        .filter(|role| state.admits(*role))
        .ok_or_else(|| {
            AuthMiddlewareError(ApiError::forbidden(
                "Token is not allowed to access this endpoint",
            ))
        })?;

    tracing::debug!(role = ?role, path = %request.uri().path(), "request authorized");
    request.extensions_mut().insert(role);

    Ok(next.run(request).await)
}

// ============================================================================
// ERROR HANDLING
// ============================================================================

/// Error wrapper for middleware that implements IntoResponse.
#[derive(Debug)]
pub struct AuthMiddlewareError(pub ApiError);

impl IntoResponse for AuthMiddlewareError {
    fn into_response(self) -> Response {
        self.0.into_response()
    }
}

// ============================================================================
// TYPED EXTRACTOR
// ============================================================================

/// Typed extractor for the role resolved by [`auth_middleware`].
///
/// Rejects with 500 when the middleware is missing from the route.
#[derive(Debug, Clone, Copy)]
pub struct RoleExtractor(pub Role);

#[axum::async_trait]
impl<S> FromRequestParts<S> for RoleExtractor
where
    S: Send + Sync,
{
    type Rejection = AuthMiddlewareError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Role>()
            .copied()
            .map(RoleExtractor)
            .ok_or_else(|| {
                AuthMiddlewareError(ApiError::internal_error(
                    "Role not found in request extensions. \
                     Ensure auth_middleware is applied to this route.",
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode, middleware, routing::get, Router};
    use tower::ServiceExt;

    fn app(required: Role) -> Router {
        let tokens = Arc::new(RoleTokens::new(["u1"], ["a1"]));
        let state = AuthMiddlewareState::new(tokens, required);

        async fn handler(RoleExtractor(role): RoleExtractor) -> String {
            format!("{:?}", role)
        }

        Router::new()
            .route("/", get(handler))
            .layer(middleware::from_fn_with_state(state, auth_middleware))
    }

    async fn call(app: Router, token: Option<&str>) -> Result<(StatusCode, String), String> {
        let mut builder = axum::http::Request::builder().uri("/");
        if let Some(token) = token {
            builder = builder.header(TOKEN_HEADER, token);
        }
        let request = builder.body(Body::empty()).map_err(|e| e.to_string())?;
        let response = app
            .oneshot(request)
            .await
            .map_err(|e| format!("Request failed: {:?}", e))?;
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .map_err(|e| format!("Failed to read body: {:?}", e))?;
        let body = String::from_utf8(body.to_vec()).map_err(|e| e.to_string())?;
        Ok((status, body))
    }

    #[tokio::test]
    async fn test_missing_token_is_unauthorized() -> Result<(), String> {
        let (status, body) = call(app(Role::User), None).await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("UNAUTHORIZED"));
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_token_is_forbidden() -> Result<(), String> {
        let (status, _) = call(app(Role::User), Some("nope")).await?;
        assert_eq!(status, StatusCode::FORBIDDEN);
        Ok(())
    }

    #[tokio::test]
    async fn test_user_token_rejected_on_admin_route() -> Result<(), String> {
        let (status, _) = call(app(Role::Admin), Some("u1")).await?;
        assert_eq!(status, StatusCode::FORBIDDEN);
        Ok(())
    }

    #[tokio::test]
    async fn test_roles_reach_handler() -> Result<(), String> {
        let (status, body) = call(app(Role::User), Some("u1")).await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "User");

        let (status, body) = call(app(Role::User), Some("a1")).await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Admin");
        Ok(())
    }
}
