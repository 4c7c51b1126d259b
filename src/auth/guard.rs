// Bearer-token authorization check, independent of any routing mechanism

use crate::auth::{error::AuthError, models::Role, token::{AccessClaims, TokenService}};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Set of roles a caller must hold; empty means any authenticated subject
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequiredRoles {
    roles: Vec<Role>,
}

impl RequiredRoles {
    /// Any authenticated subject is accepted
    pub fn any() -> Self {
        Self::default()
    }

    pub fn of(roles: impl IntoIterator<Item = Role>) -> Self {
        let mut set = Vec::new();
        for role in roles {
            if !set.contains(&role) {
                set.push(role);
            }
        }
        Self { roles: set }
    }

    pub fn admin() -> Self {
        Self::of([Role::Admin])
    }

    pub fn is_any(&self) -> bool {
        self.roles.is_empty()
    }

    pub fn permits(&self, role: Role) -> bool {
        self.roles.is_empty() || self.roles.contains(&role)
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }
}

/// Extract the token from an `Authorization` header value
///
/// Only the `Bearer` scheme is accepted; the token itself must be non-empty.
pub fn extract_bearer(header_value: &str) -> Option<&str> {
    let (scheme, token) = header_value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

/// Accepts or rejects a request's bearer credential against a role set
///
/// Every verification failure (missing header, bad scheme, expired,
/// malformed, wrong kind) is reported as `Unauthenticated`; the specific
/// cause is only logged.
#[derive(Clone)]
pub struct AuthorizationGuard {
    tokens: Arc<TokenService>,
}

impl AuthorizationGuard {
    pub fn new(tokens: Arc<TokenService>) -> Self {
        Self { tokens }
    }

    /// Verify the bearer credential and check its role
    ///
    /// On success the verified claims are returned for the caller to attach
    /// to its request context.
    pub fn authorize(
        &self,
        authorization: Option<&str>,
        required: &RequiredRoles,
    ) -> Result<AccessClaims, AuthError> {
        let token = authorization
            .and_then(extract_bearer)
            .ok_or_else(|| {
                debug!("Missing or malformed bearer credential");
                AuthError::Unauthenticated
            })?;

        let claims = self.tokens.verify_access(token).map_err(|e| {
            debug!("Access token rejected: {}", e);
            AuthError::Unauthenticated
        })?;

        if !required.permits(claims.role) {
            warn!(
                "Authorization failed: subject={}, role={}, required={:?}",
                claims.sub,
                claims.role,
                required.roles()
            );
            return Err(AuthError::Forbidden {
                required: required.roles().to_vec(),
            });
        }

        debug!("Authorization successful: subject={}, role={}", claims.sub, claims.role);
        Ok(claims)
    }

    /// Build a reusable check bound to one role set
    pub fn require_role(&self, required: RequiredRoles) -> RoleCheck {
        RoleCheck {
            guard: self.clone(),
            required,
        }
    }

    /// Subject id of a valid access token, if any; never fails
    pub fn peek_subject(&self, authorization: Option<&str>) -> Option<Uuid> {
        let token = authorization.and_then(extract_bearer)?;
        self.tokens.verify_access(token).ok().map(|claims| claims.sub)
    }
}

/// An [`AuthorizationGuard`] paired with the roles one endpoint requires
#[derive(Clone)]
pub struct RoleCheck {
    guard: AuthorizationGuard,
    required: RequiredRoles,
}

impl RoleCheck {
    pub fn check(&self, authorization: Option<&str>) -> Result<AccessClaims, AuthError> {
        self.guard.authorize(authorization, &self.required)
    }

    pub fn required(&self) -> &RequiredRoles {
        &self.required
    }
}
