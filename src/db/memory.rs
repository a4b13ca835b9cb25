/// In-memory collaborator implementations
///
/// Backed by DashMap so per-key operations are atomic under the shard lock.
/// Used by the test suite and by single-process deployments.
use crate::db::{LoginEventStore, ResetTokenStore, UserDirectory};
use crate::error::Result;
use crate::models::{LoginEvent, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryUserDirectory {
    users: DashMap<Uuid, User>,
    by_email: DashMap<String, Uuid>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a credential record
    pub fn insert(&self, user: User) {
        self.by_email.insert(user.email.clone(), user.id);
        self.users.insert(user.id, user);
    }

    /// Flip the active flag (admin deactivation)
    pub fn set_active(&self, user_id: Uuid, active: bool) {
        if let Some(mut user) = self.users.get_mut(&user_id) {
            user.is_active = active;
        }
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let Some(id) = self.by_email.get(email).map(|e| *e.value()) else {
            return Ok(None);
        };
        Ok(self.users.get(&id).map(|u| u.value().clone()))
    }

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>> {
        Ok(self.users.get(&user_id).map(|u| u.value().clone()))
    }

    async fn update_last_login(&self, user_id: Uuid) -> Result<()> {
        if let Some(mut user) = self.users.get_mut(&user_id) {
            user.last_login_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn increment_token_version(&self, user_id: Uuid) -> Result<i64> {
        // get_mut holds the shard lock for the whole read-modify-write
        let mut user = self
            .users
            .get_mut(&user_id)
            .ok_or_else(|| crate::error::AuthError::Database("user not found".to_string()))?;
        user.token_version += 1;
        user.updated_at = Utc::now();
        Ok(user.token_version)
    }

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> Result<()> {
        if let Some(mut user) = self.users.get_mut(&user_id) {
            user.password_hash = password_hash.to_string();
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn set_pending_totp_secret(&self, user_id: Uuid, secret: &str) -> Result<()> {
        if let Some(mut user) = self.users.get_mut(&user_id) {
            user.totp_secret = Some(secret.to_string());
            user.totp_enabled = false;
        }
        Ok(())
    }

    async fn enable_totp(&self, user_id: Uuid) -> Result<()> {
        if let Some(mut user) = self.users.get_mut(&user_id) {
            user.totp_enabled = true;
        }
        Ok(())
    }

    async fn disable_totp(&self, user_id: Uuid) -> Result<()> {
        if let Some(mut user) = self.users.get_mut(&user_id) {
            user.totp_enabled = false;
            user.totp_secret = None;
            user.backup_code_hashes.clear();
        }
        Ok(())
    }

    async fn store_backup_codes(&self, user_id: Uuid, hashes: &[String]) -> Result<()> {
        if let Some(mut user) = self.users.get_mut(&user_id) {
            user.backup_code_hashes = hashes.to_vec();
        }
        Ok(())
    }

    async fn consume_backup_code(&self, user_id: Uuid, hash: &str) -> Result<bool> {
        let Some(mut user) = self.users.get_mut(&user_id) else {
            return Ok(false);
        };
        match user.backup_code_hashes.iter().position(|h| h == hash) {
            Some(idx) => {
                user.backup_code_hashes.remove(idx);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[derive(Default)]
pub struct InMemoryLoginEventStore {
    events: DashMap<Uuid, Vec<LoginEvent>>,
}

impl InMemoryLoginEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LoginEventStore for InMemoryLoginEventStore {
    async fn record(&self, event: &LoginEvent) -> Result<()> {
        self.events
            .entry(event.user_id)
            .or_default()
            .push(event.clone());
        Ok(())
    }

    async fn recent(&self, user_id: Uuid, since: DateTime<Utc>) -> Result<Vec<LoginEvent>> {
        let mut events: Vec<LoginEvent> = self
            .events
            .get(&user_id)
            .map(|entry| {
                entry
                    .value()
                    .iter()
                    .filter(|e| e.created_at >= since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        events.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(events)
    }

    async fn prune(&self, before: DateTime<Utc>) -> Result<u64> {
        let mut removed = 0;
        for mut entry in self.events.iter_mut() {
            let len_before = entry.value().len();
            entry.value_mut().retain(|e| e.created_at >= before);
            removed += (len_before - entry.value().len()) as u64;
        }
        Ok(removed)
    }
}

struct ResetEntry {
    user_id: Uuid,
    expires_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct InMemoryResetTokenStore {
    tokens: DashMap<String, ResetEntry>,
}

impl InMemoryResetTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResetTokenStore for InMemoryResetTokenStore {
    async fn create(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        self.tokens.retain(|_, entry| entry.user_id != user_id);
        self.tokens.insert(
            token_hash.to_string(),
            ResetEntry {
                user_id,
                expires_at,
            },
        );
        Ok(())
    }

    async fn consume(&self, token_hash: &str) -> Result<Option<Uuid>> {
        // remove() makes consumption single-use even under concurrency
        let Some((_, entry)) = self.tokens.remove(token_hash) else {
            return Ok(None);
        };
        if entry.expires_at <= Utc::now() {
            return Ok(None);
        }
        Ok(Some(entry.user_id))
    }
}
