// Session service - register, login, refresh and password change

use crate::auth::{
    error::AuthError,
    models::{
        AuthResponse, CredentialUpdate, NewCredential, RefreshResponse, Registration,
        SubjectProfile,
    },
    password::PasswordHasher,
    repository::CredentialStore,
    token::TokenService,
};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Verified against when the email is unknown, so both login failure paths cost one hash
const TIMING_DUMMY_PASSWORD: &str = "timing-equalization-dummy-password";

/// Session service coordinating all credential operations
pub struct SessionService {
    store: Arc<dyn CredentialStore>,
    hasher: PasswordHasher,
    tokens: Arc<TokenService>,
    rotate_refresh_tokens: bool,
    dummy_hash: Option<String>,
}

/// Hash the timing dummy once, padded so it always satisfies the configured policy
fn timing_dummy_hash(hasher: &PasswordHasher) -> Option<String> {
    let padding = "x".repeat(hasher.min_length());
    match hasher.hash(&format!("{TIMING_DUMMY_PASSWORD}{padding}")) {
        Ok(hash) => Some(hash),
        Err(e) => {
            warn!("Could not prepare timing dummy hash: {}", e);
            None
        }
    }
}

/// Trim and lower-case an email, rejecting anything that is not an address
pub fn normalize_email(email: &str) -> Result<String, AuthError> {
    let normalized = email.trim().to_lowercase();
    if !validator::validate_email(&normalized) {
        return Err(AuthError::Policy("invalid email address".to_string()));
    }
    Ok(normalized)
}

fn normalize_name(name: &str) -> Result<String, AuthError> {
    let name = name.trim();
    let length = name.chars().count();
    if !(2..=50).contains(&length) {
        return Err(AuthError::Policy("name must be between 2 and 50 characters".to_string()));
    }
    Ok(name.to_string())
}

impl SessionService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        hasher: PasswordHasher,
        tokens: Arc<TokenService>,
        rotate_refresh_tokens: bool,
    ) -> Self {
        // Built up front so the first unknown-email login costs one verification, like the rest
        let dummy_hash = timing_dummy_hash(&hasher);
        Self {
            store,
            hasher,
            tokens,
            rotate_refresh_tokens,
            dummy_hash,
        }
    }

    pub fn tokens(&self) -> &Arc<TokenService> {
        &self.tokens
    }

    /// Hash on the blocking pool so argon2 never stalls the reactor
    async fn hash_password(&self, password: &str) -> Result<String, AuthError> {
        let hasher = self.hasher.clone();
        let password = password.to_string();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| AuthError::PasswordHash(format!("hashing task failed: {e}")))?
    }

    async fn verify_password(&self, password: &str, stored_hash: &str) -> Result<bool, AuthError> {
        let hasher = self.hasher.clone();
        let password = password.to_string();
        let stored_hash = stored_hash.to_string();
        tokio::task::spawn_blocking(move || hasher.verify(&password, &stored_hash))
            .await
            .map_err(|e| AuthError::PasswordHash(format!("verification task failed: {e}")))?
    }

    async fn burn_dummy_verification(&self, password: &str) {
        if let Some(dummy) = &self.dummy_hash {
            let _ = self.verify_password(password, dummy).await;
        }
    }

    fn issue_pair(&self, profile: SubjectProfile) -> Result<AuthResponse, AuthError> {
        let (access_token, refresh_token) =
            self.tokens
                .issue_token_pair(profile.id, &profile.email, profile.role)?;

        Ok(AuthResponse {
            access_token,
            refresh_token,
            subject: profile,
        })
    }

    /// Register a new subject
    ///
    /// Input is validated before the store is touched. A duplicate reported by
    /// the store at insert time is the same `DuplicateEmail` as the pre-check.
    pub async fn register(&self, registration: Registration) -> Result<AuthResponse, AuthError> {
        let email = normalize_email(&registration.email)?;
        let name = normalize_name(&registration.name)?;
        self.hasher.check_policy(&registration.password)?;

        if let Some(existing) = self.store.find_by_email(&email).await? {
            if existing.is_active {
                debug!("Registration rejected, email already in use");
                return Err(AuthError::DuplicateEmail);
            }
        }

        let password_hash = self.hash_password(&registration.password).await?;
        let record = self
            .store
            .create(NewCredential {
                email,
                password_hash,
                name,
                phone: registration.phone,
                role: registration.role,
            })
            .await?;

        info!("New subject registered: id={}, role={}", record.id, record.role);
        self.issue_pair(record.into())
    }

    /// Login with email and password
    ///
    /// Unknown email and wrong password produce the same `InvalidCredentials`.
    /// The active flag is only consulted once the password has verified.
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, AuthError> {
        let email = match normalize_email(email) {
            Ok(email) => email,
            Err(_) => {
                self.burn_dummy_verification(password).await;
                return Err(AuthError::InvalidCredentials);
            }
        };

        let record = match self.store.find_by_email(&email).await? {
            Some(record) => record,
            None => {
                self.burn_dummy_verification(password).await;
                warn!("Failed login attempt");
                return Err(AuthError::InvalidCredentials);
            }
        };

        if !self.verify_password(password, &record.password_hash).await? {
            warn!("Failed login attempt for subject {}", record.id);
            return Err(AuthError::InvalidCredentials);
        }

        if !record.is_active {
            warn!("Login attempt on disabled account {}", record.id);
            return Err(AuthError::AccountDisabled);
        }

        info!("Subject logged in: id={}", record.id);
        self.issue_pair(record.into())
    }

    /// Exchange a refresh token for a new access token
    ///
    /// Role and email come from the store, not the old token. With rotation
    /// enabled a new refresh token is issued as well.
    pub async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse, AuthError> {
        let claims = self.tokens.verify_refresh(refresh_token).map_err(|e| {
            debug!("Refresh token rejected: {}", e);
            AuthError::InvalidRefreshToken
        })?;

        let record = match self.store.find_by_id(claims.sub).await? {
            Some(record) if record.is_active => record,
            Some(_) => {
                warn!("Refresh attempt for disabled subject {}", claims.sub);
                return Err(AuthError::InvalidRefreshToken);
            }
            None => {
                warn!("Refresh attempt for unknown subject {}", claims.sub);
                return Err(AuthError::InvalidRefreshToken);
            }
        };

        let access_token = self
            .tokens
            .issue_access_token(record.id, &record.email, record.role)?;
        let refresh_token = if self.rotate_refresh_tokens {
            Some(self.tokens.issue_refresh_token(record.id)?)
        } else {
            None
        };

        debug!("Tokens refreshed for subject {}", record.id);
        Ok(RefreshResponse {
            access_token,
            refresh_token,
        })
    }

    /// Replace a subject's password after checking the current one
    pub async fn change_password(
        &self,
        subject_id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        self.hasher.check_policy(new_password)?;

        let record = self
            .store
            .find_by_id(subject_id)
            .await?
            .ok_or(AuthError::SubjectNotFound)?;

        if !self.verify_password(current_password, &record.password_hash).await? {
            warn!("Password change rejected for subject {}: current password mismatch", subject_id);
            return Err(AuthError::InvalidCredentials);
        }

        if !record.is_active {
            return Err(AuthError::AccountDisabled);
        }

        let password_hash = self.hash_password(new_password).await?;
        self.store
            .update(
                subject_id,
                CredentialUpdate {
                    password_hash: Some(password_hash),
                    ..Default::default()
                },
            )
            .await?;

        info!("Password changed for subject {}", subject_id);
        Ok(())
    }

    /// Get the profile of a subject
    pub async fn current_subject(&self, subject_id: Uuid) -> Result<SubjectProfile, AuthError> {
        self.store
            .find_by_id(subject_id)
            .await?
            .map(SubjectProfile::from)
            .ok_or(AuthError::SubjectNotFound)
    }

    /// Enable or disable an account
    ///
    /// Tokens already issued stay valid until they expire; a disabled subject
    /// can no longer log in or refresh.
    pub async fn set_active(
        &self,
        subject_id: Uuid,
        active: bool,
    ) -> Result<SubjectProfile, AuthError> {
        let record = self
            .store
            .update(
                subject_id,
                CredentialUpdate {
                    is_active: Some(active),
                    ..Default::default()
                },
            )
            .await?;

        info!("Subject {} active={}", subject_id, active);
        Ok(record.into())
    }
}
