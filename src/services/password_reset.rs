/// Password reset flow
///
/// Reset tokens live for one hour, stored only as sha256 hashes, and each
/// request invalidates whatever token came before it. `request_reset` never
/// tells the caller whether the email exists; the token comes back for
/// delivery by an external mailer and is simply absent for unknown accounts.
use crate::db::{ResetTokenStore, UserDirectory};
use crate::error::{AuthError, Result};
use crate::security::password::hash_password;
use crate::security::token_revocation::hash_token;
use crate::services::lockout::LockoutGuard;
use chrono::{Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::sync::Arc;

const RESET_TOKEN_LEN: usize = 32;
const RESET_TTL_SECS: i64 = 3600;

pub struct PasswordResetService {
    users: Arc<dyn UserDirectory>,
    tokens: Arc<dyn ResetTokenStore>,
    lockout: Arc<dyn LockoutGuard>,
    bcrypt_cost: u32,
}

impl PasswordResetService {
    pub fn new(
        users: Arc<dyn UserDirectory>,
        tokens: Arc<dyn ResetTokenStore>,
        lockout: Arc<dyn LockoutGuard>,
        bcrypt_cost: u32,
    ) -> Self {
        Self {
            users,
            tokens,
            lockout,
            bcrypt_cost,
        }
    }

    /// Mints a reset token for the account, replacing any outstanding one.
    /// Returns None for unknown or inactive accounts instead of an error so
    /// callers can answer uniformly and avoid an existence oracle.
    pub async fn request_reset(&self, email: &str) -> Result<Option<String>> {
        let user = match self.users.find_by_email(email).await? {
            Some(user) if user.is_active => user,
            _ => {
                tracing::debug!(email, "Reset requested for unknown or inactive account");
                return Ok(None);
            }
        };

        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(RESET_TOKEN_LEN)
            .map(char::from)
            .collect();

        let expires_at = Utc::now() + Duration::seconds(RESET_TTL_SECS);
        self.tokens
            .create(user.id, &hash_token(&token), expires_at)
            .await?;

        tracing::info!(user_id = %user.id, "Password reset token issued");
        Ok(Some(token))
    }

    /// Consumes the token and sets the new password. The consume is
    /// single-use at the storage layer, so two racing resets with the same
    /// token can only succeed once.
    pub async fn reset(&self, token: &str, new_password: &str) -> Result<()> {
        let user_id = self
            .tokens
            .consume(&hash_token(token))
            .await?
            .ok_or(AuthError::InvalidResetToken)?;

        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::InvalidResetToken)?;

        let new_hash = hash_password(new_password, self.bcrypt_cost)?;
        self.users.update_password(user_id, &new_hash).await?;
        self.users.increment_token_version(user_id).await?;

        // The owner proved control of the mailbox; prior failed attempts
        // (theirs or an attacker's) should not keep them locked out
        self.lockout.record(&user.email, true).await?;

        tracing::info!(user_id = %user_id, "Password reset completed");
        Ok(())
    }
}
