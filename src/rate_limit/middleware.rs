// Rate limiting middleware for the HTTP layer

use axum::{
    extract::{ConnectInfo, MatchedPath, Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use tracing::debug;

use crate::auth::{error::AuthError, guard::AuthorizationGuard};
use crate::rate_limit::limiter::RateDecision;
use crate::routes::AppState;

/// Resolve who a request is counted against
///
/// A verified access token wins over the network address, so users behind a
/// shared address get separate budgets while anonymous callers behind it
/// share one.
pub fn caller_identifier(guard: &AuthorizationGuard, request: &Request) -> String {
    let authorization = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    if let Some(subject) = guard.peek_subject(authorization) {
        return format!("subject:{}", subject);
    }

    match request.extensions().get::<ConnectInfo<SocketAddr>>() {
        Some(ConnectInfo(addr)) => format!("ip:{}", addr.ip()),
        None => "ip:unknown".to_string(),
    }
}

/// Reject requests over their route's budget with `RateLimited`
pub async fn rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let route_key = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let identifier = caller_identifier(&state.guard, &request);

    match state.limiter.check(&identifier, &route_key) {
        RateDecision::Allowed => {
            debug!("Rate limit passed: {} on {}", identifier, route_key);
            Ok(next.run(request).await)
        }
        RateDecision::Denied { retry_after_secs } => {
            Err(AuthError::RateLimited { retry_after_secs })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{clock::SystemClock, models::Role, token::TokenService};
    use axum::body::Body;
    use std::sync::Arc;
    use std::time::Duration;
    use uuid::Uuid;

    fn test_guard() -> (AuthorizationGuard, Arc<TokenService>) {
        let tokens = Arc::new(
            TokenService::new(
                "limit_access_secret",
                "limit_refresh_secret",
                Duration::from_secs(900),
                Duration::from_secs(604800),
                Arc::new(SystemClock),
            )
            .unwrap(),
        );
        (AuthorizationGuard::new(tokens.clone()), tokens)
    }

    fn request_from(addr: &str, authorization: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder().uri("/api/auth/login");
        if let Some(value) = authorization {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        let mut request = builder.body(Body::empty()).unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(addr.parse::<SocketAddr>().unwrap()));
        request
    }

    #[test]
    fn test_authenticated_subject_preferred_over_address() {
        let (guard, tokens) = test_guard();
        let subject = Uuid::new_v4();
        let token = tokens.issue_access_token(subject, "p@clinic.test", Role::User).unwrap();

        let request = request_from("10.1.2.3:5555", Some(&format!("Bearer {}", token)));
        assert_eq!(caller_identifier(&guard, &request), format!("subject:{}", subject));
    }

    #[test]
    fn test_anonymous_callers_share_address_budget() {
        let (guard, _) = test_guard();

        let first = request_from("10.1.2.3:5555", None);
        let second = request_from("10.1.2.3:6666", Some("Bearer forged.token.value"));
        assert_eq!(caller_identifier(&guard, &first), "ip:10.1.2.3");
        assert_eq!(caller_identifier(&guard, &second), "ip:10.1.2.3");
    }

    #[test]
    fn test_missing_connect_info_falls_back_to_unknown() {
        let (guard, _) = test_guard();
        let request = axum::http::Request::builder()
            .uri("/")
            .body(Body::empty())
            .unwrap();
        assert_eq!(caller_identifier(&guard, &request), "ip:unknown");
    }
}
