/// Two-factor enrollment and verification
///
/// Enrollment is a two-step handshake: `generate_secret` stores a pending
/// secret without enabling anything, and `confirm_enable` proves the
/// authenticator app is wired up before the account starts requiring codes.
/// Backup codes exist only as sha256 hashes at rest; plaintext is returned
/// exactly once at generation time.
use crate::db::UserDirectory;
use crate::error::{AuthError, Result};
use crate::models::User;
use crate::security::password::verify_password;
use crate::security::totp::{constant_time_eq, TotpGenerator};
use std::sync::Arc;

/// Material handed to the user at enrollment start. Shown once.
#[derive(Debug, Clone)]
pub struct TwoFaSetup {
    pub secret: String,
    pub provisioning_uri: String,
}

pub struct TwoFaService {
    users: Arc<dyn UserDirectory>,
    issuer: String,
}

impl TwoFaService {
    pub fn new(users: Arc<dyn UserDirectory>, issuer: String) -> Self {
        Self { users, issuer }
    }

    /// Begins enrollment: stores a fresh pending secret and returns it with
    /// the otpauth URI. The account stays in its current state until
    /// `confirm_enable` proves a code from the authenticator.
    pub async fn generate_secret(&self, user: &User) -> Result<TwoFaSetup> {
        if user.is_two_fa_enabled() {
            return Err(AuthError::AlreadyEnabled);
        }

        let secret = TotpGenerator::generate_secret();
        self.users
            .set_pending_totp_secret(user.id, &secret)
            .await?;

        tracing::info!(user_id = %user.id, "Two-factor enrollment started");
        Ok(TwoFaSetup {
            provisioning_uri: TotpGenerator::provisioning_uri(&user.email, &secret, &self.issuer),
            secret,
        })
    }

    /// Completes enrollment. On a valid code the account flips to enabled
    /// and a fresh set of backup codes is returned, plaintext, exactly once.
    pub async fn confirm_enable(&self, user: &User, code: &str) -> Result<Vec<String>> {
        if user.is_two_fa_enabled() {
            return Err(AuthError::AlreadyEnabled);
        }
        let secret = user
            .totp_secret
            .as_deref()
            .ok_or(AuthError::NotEnabled)?;

        if !TotpGenerator::verify_code(secret, code)? {
            return Err(AuthError::InvalidCode);
        }

        let codes = TotpGenerator::generate_backup_codes();
        let hashes: Vec<String> = codes
            .iter()
            .map(|c| TotpGenerator::hash_backup_code(c))
            .collect();

        self.users.enable_totp(user.id).await?;
        self.users.store_backup_codes(user.id, &hashes).await?;

        tracing::info!(user_id = %user.id, "Two-factor enabled");
        Ok(codes)
    }

    /// Verifies a code during login. Backup codes are strictly one-time:
    /// a successful match removes the stored hash before returning.
    pub async fn verify(&self, user: &User, code: &str, is_backup_code: bool) -> Result<()> {
        let secret = match (&user.totp_secret, user.totp_enabled) {
            (Some(secret), true) => secret,
            _ => return Err(AuthError::NotEnabled),
        };

        if is_backup_code {
            return self.consume_backup_code(user, code).await;
        }

        if TotpGenerator::verify_code(secret, code)? {
            Ok(())
        } else {
            Err(AuthError::InvalidCode)
        }
    }

    async fn consume_backup_code(&self, user: &User, code: &str) -> Result<()> {
        let hash = TotpGenerator::hash_backup_code(code);

        // Compare in constant time against every stored hash before touching
        // storage, so timing does not reveal which entries exist
        let mut matched = false;
        for stored in &user.backup_code_hashes {
            if constant_time_eq(stored.as_bytes(), hash.as_bytes()) {
                matched = true;
            }
        }
        if !matched {
            return Err(AuthError::InvalidBackupCode);
        }

        // The storage layer removes the hash atomically; a concurrent reuse
        // of the same code loses here even though both passed the scan above
        if self.users.consume_backup_code(user.id, &hash).await? {
            tracing::info!(user_id = %user.id, "Backup code consumed");
            Ok(())
        } else {
            Err(AuthError::InvalidBackupCode)
        }
    }

    /// Turns 2FA off. Requires a fresh password proof so a hijacked session
    /// cannot silently strip the second factor.
    pub async fn disable(&self, user: &User, password: &str) -> Result<()> {
        if !user.is_two_fa_enabled() {
            return Err(AuthError::NotEnabled);
        }
        if !verify_password(password, &user.password_hash)? {
            return Err(AuthError::InvalidPassword);
        }

        self.users.disable_totp(user.id).await?;
        tracing::info!(user_id = %user.id, "Two-factor disabled");
        Ok(())
    }

    /// Replaces the whole backup code set. Old codes stop working the moment
    /// the new hashes land.
    pub async fn regenerate_backup_codes(
        &self,
        user: &User,
        password: &str,
    ) -> Result<Vec<String>> {
        if !user.is_two_fa_enabled() {
            return Err(AuthError::NotEnabled);
        }
        if !verify_password(password, &user.password_hash)? {
            return Err(AuthError::InvalidPassword);
        }

        let codes = TotpGenerator::generate_backup_codes();
        let hashes: Vec<String> = codes
            .iter()
            .map(|c| TotpGenerator::hash_backup_code(c))
            .collect();
        self.users.store_backup_codes(user.id, &hashes).await?;

        tracing::info!(user_id = %user.id, "Backup codes regenerated");
        Ok(codes)
    }
}
