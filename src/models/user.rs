use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use uuid::Uuid;

/// Admin-backend role matching the database user_role type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "user_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Staff,
    Viewer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Staff => "staff",
            Role::Viewer => "viewer",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "staff" => Some(Role::Staff),
            "viewer" => Some(Role::Viewer),
            _ => None,
        }
    }
}

/// Credential record - the durable per-account state the auth core reads and
/// writes through the user directory.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
    pub password_hash: String,
    pub is_active: bool,
    /// Monotonic counter embedded in issued tokens; a bump invalidates every
    /// outstanding token without enumerating them. Never decreases.
    pub token_version: i64,
    pub totp_enabled: bool,
    pub totp_secret: Option<String>,
    /// SHA-256 hashes of unused backup codes. Strictly shrinking between
    /// regenerations; each entry is removed on first successful use.
    pub backup_code_hashes: Vec<String>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Two-factor is in force only once the pending secret was confirmed
    pub fn is_two_fa_enabled(&self) -> bool {
        self.totp_enabled && self.totp_secret.is_some()
    }

    /// A secret was generated but enrollment has not been confirmed yet
    pub fn has_pending_totp(&self) -> bool {
        !self.totp_enabled && self.totp_secret.is_some()
    }
}

/// Verified caller identity returned by `AuthService::verify_request`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: Uuid,
    pub email: String,
    pub role: Role,
    pub token_version: i64,
}
