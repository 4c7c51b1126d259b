// Authentication middleware for protected routes

use axum::{
    async_trait,
    extract::{FromRequestParts, Request},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use tracing::warn;
use uuid::Uuid;

use crate::auth::{
    error::AuthError,
    guard::{AuthorizationGuard, RequiredRoles, RoleCheck},
    models::Role,
    token::AccessClaims,
};

/// Authenticated subject extractor for protected routes
///
/// Reads the claims that [`RequireRole`] placed in the request extensions, so
/// it only succeeds behind that middleware.
#[derive(Debug, Clone)]
pub struct AuthenticatedSubject {
    pub subject_id: Uuid,
    pub email: String,
    pub role: Role,
}

impl From<AccessClaims> for AuthenticatedSubject {
    fn from(claims: AccessClaims) -> Self {
        Self {
            subject_id: claims.sub,
            email: claims.email,
            role: claims.role,
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedSubject
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AccessClaims>()
            .cloned()
            .map(AuthenticatedSubject::from)
            .ok_or(AuthError::Unauthenticated)
    }
}

/// Authorization middleware that requires one of a set of roles
///
/// Wraps an [`AuthorizationGuard`] check for use as an axum layer:
///
/// ```ignore
/// let admin = RequireRole::new(&guard, RequiredRoles::admin());
/// router.route_layer(axum::middleware::from_fn(move |req: Request, next: Next| {
///     admin.clone().middleware(req, next)
/// }))
/// ```
#[derive(Clone)]
pub struct RequireRole {
    check: RoleCheck,
}

impl RequireRole {
    pub fn new(guard: &AuthorizationGuard, required: RequiredRoles) -> Self {
        Self {
            check: guard.require_role(required),
        }
    }

    /// Any authenticated subject
    pub fn authenticated(guard: &AuthorizationGuard) -> Self {
        Self::new(guard, RequiredRoles::any())
    }

    pub fn admin(guard: &AuthorizationGuard) -> Self {
        Self::new(guard, RequiredRoles::admin())
    }

    /// Middleware function that validates the bearer token and role
    pub async fn middleware(self, mut request: Request, next: Next) -> Result<Response, AuthError> {
        let authorization = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok());

        let claims = self.check.check(authorization).map_err(|e| {
            if matches!(e, AuthError::Unauthenticated) {
                warn!("Unauthenticated request to protected endpoint: {}", request.uri().path());
            }
            e
        })?;

        request.extensions_mut().insert(claims);
        Ok(next.run(request).await)
    }
}
