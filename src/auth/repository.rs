// Credential store contract and its Postgres implementation

use crate::auth::{
    error::StoreError,
    models::{CredentialRecord, CredentialUpdate, NewCredential, Role},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// External credential store
///
/// Implementations must enforce email uniqueness (case-insensitive) at write
/// time and report a violation as [`StoreError::DuplicateKey`]. Emails are
/// passed in already normalized (trimmed, lower-cased).
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<CredentialRecord>, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<CredentialRecord>, StoreError>;

    async fn create(&self, credential: NewCredential) -> Result<CredentialRecord, StoreError>;

    async fn update(
        &self,
        id: Uuid,
        changes: CredentialUpdate,
    ) -> Result<CredentialRecord, StoreError>;
}

#[derive(Debug, FromRow)]
struct CredentialRow {
    id: Uuid,
    email: String,
    password_hash: String,
    name: String,
    phone: Option<String>,
    role: String,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CredentialRow> for CredentialRecord {
    type Error = StoreError;

    fn try_from(row: CredentialRow) -> Result<Self, Self::Error> {
        let role = row
            .role
            .parse::<Role>()
            .map_err(|e| StoreError::Backend(format!("credential {}: {}", row.id, e)))?;

        Ok(CredentialRecord {
            id: row.id,
            email: row.email,
            password_hash: row.password_hash,
            name: row.name,
            phone: row.phone,
            role,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const COLUMNS: &str = "id, email, password_hash, name, phone, role, is_active, created_at, updated_at";

/// Postgres-backed credential store
///
/// Uniqueness is enforced by the `credentials_email_lower_idx` unique index.
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<CredentialRecord>, StoreError> {
        let row = sqlx::query_as::<_, CredentialRow>(&format!(
            "SELECT {COLUMNS} FROM credentials WHERE LOWER(email) = LOWER($1)"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.map(CredentialRecord::try_from).transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<CredentialRecord>, StoreError> {
        let row = sqlx::query_as::<_, CredentialRow>(&format!(
            "SELECT {COLUMNS} FROM credentials WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(CredentialRecord::try_from).transpose()
    }

    async fn create(&self, credential: NewCredential) -> Result<CredentialRecord, StoreError> {
        let row = sqlx::query_as::<_, CredentialRow>(&format!(
            "INSERT INTO credentials (id, email, password_hash, name, phone, role) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&credential.email)
        .bind(&credential.password_hash)
        .bind(&credential.name)
        .bind(&credential.phone)
        .bind(credential.role.as_str())
        .fetch_one(&self.pool)
        .await?;

        CredentialRecord::try_from(row)
    }

    async fn update(
        &self,
        id: Uuid,
        changes: CredentialUpdate,
    ) -> Result<CredentialRecord, StoreError> {
        let row = sqlx::query_as::<_, CredentialRow>(&format!(
            "UPDATE credentials SET \
                password_hash = COALESCE($2, password_hash), \
                is_active = COALESCE($3, is_active), \
                role = COALESCE($4, role), \
                updated_at = NOW() \
             WHERE id = $1 RETURNING {COLUMNS}"
        ))
        .bind(id)
        .bind(changes.password_hash)
        .bind(changes.is_active)
        .bind(changes.role.map(|role| role.as_str()))
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)?;

        CredentialRecord::try_from(row)
    }
}
