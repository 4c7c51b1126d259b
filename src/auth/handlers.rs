// HTTP handlers for authentication endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::auth::{
    error::AuthError,
    middleware::AuthenticatedSubject,
    models::{
        AuthResponse, ChangePasswordRequest, LoginRequest, RefreshRequest, RefreshResponse,
        RegisterRequest, Registration, Role, SubjectProfile, SubjectStatusRequest,
    },
};
use crate::routes::AppState;

/// Register a new subject
/// POST /api/auth/register
#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Subject registered", body = AuthResponse),
        (status = 400, description = "Invalid input or password policy violation", body = String, example = json!({"error": "Password must be at least 8 characters"})),
        (status = 409, description = "Email already registered", body = String, example = json!({"error": "Email already exists"})),
        (status = 429, description = "Too many registration attempts", body = String, example = json!({"error": "Too many requests", "retry_after": 3600}))
    ),
    tag = "auth"
)]
pub async fn register_handler(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), AuthError> {
    request.validate()?;

    let role = request.role.unwrap_or_default();
    if role == Role::Admin {
        tracing::warn!("Rejected self-registration with admin role");
        return Err(AuthError::Policy(
            "Admin accounts cannot be self-registered".to_string(),
        ));
    }

    let response = state
        .sessions
        .register(Registration {
            email: request.email,
            password: request.password,
            name: request.name,
            phone: request.phone,
            role,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(response)))
}

/// Log a subject in
/// POST /api/auth/login
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials", body = String, example = json!({"error": "Invalid email or password"})),
        (status = 403, description = "Account disabled", body = String, example = json!({"error": "Account is disabled"})),
        (status = 429, description = "Too many login attempts", body = String, example = json!({"error": "Too many requests", "retry_after": 60}))
    ),
    tag = "auth"
)]
pub async fn login_handler(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AuthError> {
    let response = state.sessions.login(&request.email, &request.password).await?;
    Ok(Json(response))
}

/// Exchange a refresh token for a new access token
/// POST /api/auth/refresh
#[utoipa::path(
    post,
    path = "/api/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New access token issued", body = RefreshResponse),
        (status = 401, description = "Refresh token invalid, expired or for a disabled subject", body = String, example = json!({"error": "Invalid refresh token"}))
    ),
    tag = "auth"
)]
pub async fn refresh_handler(
    State(state): State<AppState>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<RefreshResponse>, AuthError> {
    let response = state.sessions.refresh(&request.refresh_token).await?;
    Ok(Json(response))
}

/// Change the caller's password
/// POST /api/auth/change-password
#[utoipa::path(
    post,
    path = "/api/auth/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 204, description = "Password changed"),
        (status = 400, description = "New password violates policy", body = String),
        (status = 401, description = "Not authenticated or current password wrong", body = String)
    ),
    security(("bearer_auth" = [])),
    tag = "auth"
)]
pub async fn change_password_handler(
    State(state): State<AppState>,
    subject: AuthenticatedSubject,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<StatusCode, AuthError> {
    state
        .sessions
        .change_password(
            subject.subject_id,
            &request.current_password,
            &request.new_password,
        )
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Log the caller out
/// POST /api/auth/logout
///
/// Tokens are not revoked; the client discards them. Only the event is recorded.
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    responses(
        (status = 204, description = "Logged out"),
        (status = 401, description = "Not authenticated", body = String)
    ),
    security(("bearer_auth" = [])),
    tag = "auth"
)]
pub async fn logout_handler(subject: AuthenticatedSubject) -> StatusCode {
    tracing::info!("Subject logged out: id={}", subject.subject_id);
    StatusCode::NO_CONTENT
}

/// Current subject's profile
/// GET /api/auth/me
#[utoipa::path(
    get,
    path = "/api/auth/me",
    responses(
        (status = 200, description = "Profile of the authenticated subject", body = SubjectProfile),
        (status = 401, description = "Not authenticated", body = String)
    ),
    security(("bearer_auth" = [])),
    tag = "auth"
)]
pub async fn me_handler(
    State(state): State<AppState>,
    subject: AuthenticatedSubject,
) -> Result<Json<SubjectProfile>, AuthError> {
    let profile = state.sessions.current_subject(subject.subject_id).await?;
    Ok(Json(profile))
}

/// Enable or disable a subject (admin only)
/// PATCH /api/admin/subjects/:id/status
#[utoipa::path(
    patch,
    path = "/api/admin/subjects/{id}/status",
    params(
        ("id" = Uuid, Path, description = "Subject ID")
    ),
    request_body = SubjectStatusRequest,
    responses(
        (status = 200, description = "Subject updated", body = SubjectProfile),
        (status = 401, description = "Not authenticated", body = String),
        (status = 403, description = "Caller is not an admin", body = String),
        (status = 404, description = "Subject not found", body = String)
    ),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
pub async fn set_subject_status_handler(
    State(state): State<AppState>,
    admin: AuthenticatedSubject,
    Path(id): Path<Uuid>,
    Json(request): Json<SubjectStatusRequest>,
) -> Result<Json<SubjectProfile>, AuthError> {
    tracing::info!(
        "Admin {} setting subject {} active={}",
        admin.subject_id,
        id,
        request.is_active
    );

    let profile = state.sessions.set_active(id, request.is_active).await?;
    Ok(Json(profile))
}
