// In-memory credential store, used by tests and when no database is configured

use crate::auth::{
    error::StoreError,
    models::{CredentialRecord, CredentialUpdate, NewCredential},
    repository::CredentialStore,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Records {
    by_id: HashMap<Uuid, CredentialRecord>,
    // lower-cased email -> id
    by_email: HashMap<String, Uuid>,
}

/// Credential store held in process memory
///
/// Both indexes live behind one lock, so the uniqueness check and the insert
/// in `create` are a single atomic step.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    records: RwLock<Records>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.by_id.len()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<CredentialRecord>, StoreError> {
        let records = self.records.read().await;
        Ok(records
            .by_email
            .get(&email.to_lowercase())
            .and_then(|id| records.by_id.get(id))
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<CredentialRecord>, StoreError> {
        Ok(self.records.read().await.by_id.get(&id).cloned())
    }

    async fn create(&self, credential: NewCredential) -> Result<CredentialRecord, StoreError> {
        let mut records = self.records.write().await;

        let key = credential.email.to_lowercase();
        if records.by_email.contains_key(&key) {
            return Err(StoreError::DuplicateKey);
        }

        let now = Utc::now();
        let record = CredentialRecord {
            id: Uuid::new_v4(),
            email: credential.email,
            password_hash: credential.password_hash,
            name: credential.name,
            phone: credential.phone,
            role: credential.role,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        records.by_email.insert(key, record.id);
        records.by_id.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        id: Uuid,
        changes: CredentialUpdate,
    ) -> Result<CredentialRecord, StoreError> {
        let mut records = self.records.write().await;
        let record = records.by_id.get_mut(&id).ok_or(StoreError::NotFound)?;

        if let Some(hash) = changes.password_hash {
            record.password_hash = hash;
        }
        if let Some(active) = changes.is_active {
            record.is_active = active;
        }
        if let Some(role) = changes.role {
            record.role = role;
        }
        record.updated_at = Utc::now();

        Ok(record.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::models::Role;

    fn new_credential(email: &str) -> NewCredential {
        NewCredential {
            email: email.to_string(),
            password_hash: "$argon2id$placeholder".to_string(),
            name: "Test Patient".to_string(),
            phone: None,
            role: Role::User,
        }
    }

    #[tokio::test]
    async fn test_create_and_find() {
        let store = InMemoryCredentialStore::new();
        let created = store.create(new_credential("pat@clinic.test")).await.unwrap();

        assert!(created.is_active);
        let by_email = store.find_by_email("PAT@clinic.test").await.unwrap().unwrap();
        assert_eq!(by_email.id, created.id);
        let by_id = store.find_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(by_id.email, "pat@clinic.test");
    }

    #[tokio::test]
    async fn test_duplicate_email_is_rejected_case_insensitively() {
        let store = InMemoryCredentialStore::new();
        store.create(new_credential("pat@clinic.test")).await.unwrap();

        let result = store.create(new_credential("Pat@Clinic.Test")).await;
        assert!(matches!(result, Err(StoreError::DuplicateKey)));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_update_applies_only_given_fields() {
        let store = InMemoryCredentialStore::new();
        let created = store.create(new_credential("pat@clinic.test")).await.unwrap();

        let updated = store
            .update(
                created.id,
                CredentialUpdate {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(!updated.is_active);
        assert_eq!(updated.password_hash, created.password_hash);
        assert_eq!(updated.name, created.name);
    }

    #[tokio::test]
    async fn test_update_role_only() {
        let store = InMemoryCredentialStore::new();
        let created = store.create(new_credential("reassign@clinic.test")).await.unwrap();

        let updated = store
            .update(
                created.id,
                CredentialUpdate {
                    role: Some(Role::Doctor),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.role, Role::Doctor);
        assert!(updated.is_active);
        assert_eq!(updated.password_hash, created.password_hash);
        assert_eq!(updated.name, created.name);
    }

    #[tokio::test]
    async fn test_update_unknown_id_is_not_found() {
        let store = InMemoryCredentialStore::new();
        let result = store.update(Uuid::new_v4(), CredentialUpdate::default()).await;
        assert!(matches!(result, Err(StoreError::NotFound)));
    }
}
