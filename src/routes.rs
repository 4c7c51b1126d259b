// Router assembly and OpenAPI documentation

use axum::{
    extract::Request,
    middleware::{self, Next},
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::{
    guard::AuthorizationGuard,
    handlers::{
        self, change_password_handler, login_handler, logout_handler, me_handler,
        refresh_handler, register_handler, set_subject_status_handler,
    },
    middleware::RequireRole,
    models::{
        AuthResponse, ChangePasswordRequest, LoginRequest, RefreshRequest, RefreshResponse,
        RegisterRequest, Role, SubjectProfile, SubjectStatusRequest,
    },
    service::SessionService,
};
use crate::rate_limit::{rate_limit, RateLimiter};

/// OpenAPI documentation structure
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::register_handler,
        handlers::login_handler,
        handlers::refresh_handler,
        handlers::change_password_handler,
        handlers::logout_handler,
        handlers::me_handler,
        handlers::set_subject_status_handler,
    ),
    components(
        schemas(
            Role,
            SubjectProfile,
            RegisterRequest,
            LoginRequest,
            RefreshRequest,
            ChangePasswordRequest,
            SubjectStatusRequest,
            AuthResponse,
            RefreshResponse,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "auth", description = "Registration, login, token refresh and password management"),
        (name = "admin", description = "Account administration")
    ),
    info(
        title = "Clinic Auth API",
        version = "1.0.0",
        description = "Credential and session service for the clinic booking backend"
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionService>,
    pub guard: AuthorizationGuard,
    pub limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(sessions: Arc<SessionService>, limiter: Arc<RateLimiter>) -> Self {
        let guard = AuthorizationGuard::new(sessions.tokens().clone());
        Self {
            sessions,
            guard,
            limiter,
        }
    }
}

/// Creates and configures the application router
///
/// Every API route passes the rate limiter first; protected routes then pass
/// their role check before the handler runs.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let public = Router::new()
        .route("/api/auth/register", post(register_handler))
        .route("/api/auth/login", post(login_handler))
        .route("/api/auth/refresh", post(refresh_handler));

    let authenticated = RequireRole::authenticated(&state.guard);
    let session = Router::new()
        .route("/api/auth/change-password", post(change_password_handler))
        .route("/api/auth/logout", post(logout_handler))
        .route("/api/auth/me", get(me_handler))
        .route_layer(middleware::from_fn(move |req: Request, next: Next| {
            authenticated.clone().middleware(req, next)
        }));

    let admin_only = RequireRole::admin(&state.guard);
    let admin = Router::new()
        .route(
            "/api/admin/subjects/:id/status",
            patch(set_subject_status_handler),
        )
        .route_layer(middleware::from_fn(move |req: Request, next: Next| {
            admin_only.clone().middleware(req, next)
        }));

    let api = public
        .merge(session)
        .merge(admin)
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit));

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
