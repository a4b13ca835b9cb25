/// Collaborator interfaces consumed by the auth core
///
/// The core never assumes in-process state: the user directory owns the
/// durable credential records (including the atomic `token_version` counter),
/// the login-event store feeds the anomaly detector, and the reset-token
/// store holds single-use password reset secrets. Postgres implementations
/// live in `postgres`, DashMap-backed ones in `memory`.
use crate::error::Result;
use crate::models::LoginEvent;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub mod memory;
pub mod postgres;

pub use memory::{InMemoryLoginEventStore, InMemoryResetTokenStore, InMemoryUserDirectory};
pub use postgres::{PostgresLoginEventStore, PostgresResetTokenStore, PostgresUserDirectory};

/// Durable per-account credential records
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<crate::models::User>>;

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<crate::models::User>>;

    async fn update_last_login(&self, user_id: Uuid) -> Result<()>;

    /// Atomically bump the account's token version and return the new value.
    /// The counter is monotonic; every previously issued token becomes invalid
    /// on its next verification.
    async fn increment_token_version(&self, user_id: Uuid) -> Result<i64>;

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> Result<()>;

    /// Store a generated-but-unconfirmed TOTP secret
    async fn set_pending_totp_secret(&self, user_id: Uuid, secret: &str) -> Result<()>;

    /// Mark the pending secret as confirmed
    async fn enable_totp(&self, user_id: Uuid) -> Result<()>;

    /// Clear secret, enabled flag, and backup codes
    async fn disable_totp(&self, user_id: Uuid) -> Result<()>;

    /// Replace the stored backup-code hashes wholesale
    async fn store_backup_codes(&self, user_id: Uuid, hashes: &[String]) -> Result<()>;

    /// Remove a single backup-code hash. Returns false when the hash was not
    /// present (already spent or never issued); removal is atomic so a code
    /// cannot be consumed twice by concurrent requests.
    async fn consume_backup_code(&self, user_id: Uuid, hash: &str) -> Result<bool>;
}

/// Append-only login events with bounded retention
#[async_trait]
pub trait LoginEventStore: Send + Sync {
    async fn record(&self, event: &LoginEvent) -> Result<()>;

    /// Events for the user at or after `since`, most recent first
    async fn recent(&self, user_id: Uuid, since: DateTime<Utc>) -> Result<Vec<LoginEvent>>;

    /// Drop events older than `before`; returns how many were removed
    async fn prune(&self, before: DateTime<Utc>) -> Result<u64>;
}

/// Single-use, time-boxed password reset tokens (stored hashed)
#[async_trait]
pub trait ResetTokenStore: Send + Sync {
    /// Store a new token hash, invalidating any outstanding tokens for the
    /// same user.
    async fn create(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Atomically consume an unused, unexpired token. Returns the owning user
    /// id, or None when the token is unknown, spent, or expired.
    async fn consume(&self, token_hash: &str) -> Result<Option<Uuid>>;
}
