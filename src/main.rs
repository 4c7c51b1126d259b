use std::net::SocketAddr;
use std::sync::Arc;

use clinic_auth::auth::{
    clock::{Clock, SystemClock},
    error::AuthError,
    memory_store::InMemoryCredentialStore,
    models::{Registration, Role},
    repository::{CredentialStore, PgCredentialStore},
    service::SessionService,
};
use clinic_auth::config::{AuthConfig, ServerConfig};
use clinic_auth::db;
use clinic_auth::routes::{create_router, AppState};
use tracing_subscriber::EnvFilter;

/// Seed an admin account from `BOOTSTRAP_ADMIN_EMAIL` / `BOOTSTRAP_ADMIN_PASSWORD`
///
/// Admins cannot self-register over HTTP, so this is how the first one exists.
async fn bootstrap_admin(sessions: &SessionService) {
    let (Ok(email), Ok(password)) = (
        std::env::var("BOOTSTRAP_ADMIN_EMAIL"),
        std::env::var("BOOTSTRAP_ADMIN_PASSWORD"),
    ) else {
        return;
    };

    let registration = Registration {
        email,
        password,
        name: std::env::var("BOOTSTRAP_ADMIN_NAME").unwrap_or_else(|_| "Administrator".to_string()),
        phone: None,
        role: Role::Admin,
    };

    match sessions.register(registration).await {
        Ok(response) => tracing::info!("Bootstrap admin created: id={}", response.subject.id),
        Err(AuthError::DuplicateEmail) => tracing::info!("Bootstrap admin already exists"),
        Err(e) => tracing::error!("Failed to create bootstrap admin: {}", e),
    }
}

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_level(true)
        .init();

    tracing::info!("Clinic Auth - Starting...");

    let server_config = ServerConfig::from_env().expect("Invalid server configuration");
    let auth_config = AuthConfig::from_env().expect("Invalid auth configuration");
    tracing::debug!("Auth configuration: {:?}", auth_config);

    let store: Arc<dyn CredentialStore> = match &server_config.database_url {
        Some(database_url) => {
            tracing::info!("Connecting to database...");
            let pool = db::connect_and_migrate(database_url)
                .await
                .expect("Failed to prepare database");
            Arc::new(PgCredentialStore::new(pool))
        }
        None => {
            tracing::warn!(
                "DATABASE_URL not set, credentials are kept in memory and lost on restart"
            );
            Arc::new(InMemoryCredentialStore::new())
        }
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let hasher = auth_config
        .password_hasher()
        .expect("Invalid password hashing parameters");
    let tokens = Arc::new(
        auth_config
            .token_service(clock.clone())
            .expect("Invalid token settings"),
    );
    let limiter = auth_config.rate_limiter(clock);

    let sessions = Arc::new(SessionService::new(
        store,
        hasher,
        tokens,
        auth_config.rotate_refresh_tokens,
    ));
    bootstrap_admin(&sessions).await;

    let app = create_router(AppState::new(sessions, limiter));

    let addr = server_config.address();
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Swagger UI available at http://{}/swagger-ui", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Server error");
}
