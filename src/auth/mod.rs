// Authentication module
// Credential hashing, JWT issuance, role checks and the session operations built on them

pub mod clock;
pub mod error;
pub mod guard;
pub mod handlers;
pub mod memory_store;
pub mod middleware;
pub mod models;
pub mod password;
pub mod repository;
pub mod service;
pub mod token;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{AuthError, StoreError};
pub use guard::{AuthorizationGuard, RequiredRoles};
pub use memory_store::InMemoryCredentialStore;
pub use middleware::{AuthenticatedSubject, RequireRole};
pub use models::{AuthResponse, RefreshResponse, Registration, Role, SubjectProfile};
pub use password::PasswordHasher;
pub use repository::{CredentialStore, PgCredentialStore};
pub use service::SessionService;
pub use token::{AccessClaims, RefreshClaims, TokenKind, TokenService};
