/// Authentication orchestrator
///
/// Ties the collaborators together into the login, refresh, verification and
/// logout flows. Ordering inside `login` is deliberate: the lockout gate runs
/// before the directory fetch so locked identifiers never cost a query or a
/// bcrypt round, and absent accounts take the same failure path as wrong
/// passwords so responses do not leak which emails exist.
use crate::db::UserDirectory;
use crate::error::{AuthError, Result};
use crate::models::Principal;
use crate::security::jwt::{TokenCodec, TokenPair};
use crate::security::password::{hash_password, verify_password};
use crate::security::token_revocation::{hash_token, RevocationStore};
use crate::services::anomaly::AnomalyDetector;
use crate::services::lockout::LockoutGuard;
use crate::services::two_fa::TwoFaService;
use std::sync::Arc;
use uuid::Uuid;

/// Second-factor material presented at login
#[derive(Debug, Clone)]
pub enum TwoFaCode {
    Totp(String),
    Backup(String),
}

#[derive(Debug, Clone)]
pub struct AuthResponse {
    pub principal: Principal,
    pub tokens: TokenPair,
}

pub struct AuthService {
    users: Arc<dyn UserDirectory>,
    codec: TokenCodec,
    revocation: Arc<dyn RevocationStore>,
    lockout: Arc<dyn LockoutGuard>,
    two_fa: Arc<TwoFaService>,
    anomaly: Arc<AnomalyDetector>,
    bcrypt_cost: u32,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserDirectory>,
        codec: TokenCodec,
        revocation: Arc<dyn RevocationStore>,
        lockout: Arc<dyn LockoutGuard>,
        two_fa: Arc<TwoFaService>,
        anomaly: Arc<AnomalyDetector>,
        bcrypt_cost: u32,
    ) -> Self {
        Self {
            users,
            codec,
            revocation,
            lockout,
            two_fa,
            anomaly,
            bcrypt_cost,
        }
    }

    /// Full login flow. 2FA-enabled accounts must present a code; callers
    /// seeing `TwoFaRequired` should re-submit the same credentials with one.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        ip: &str,
        two_fa_code: Option<TwoFaCode>,
    ) -> Result<AuthResponse> {
        let status = self.lockout.check(email).await?;
        if status.locked {
            let unlock_at = status
                .unlock_at
                .ok_or_else(|| AuthError::Internal("locked status without unlock time".into()))?;
            return Err(AuthError::AccountLocked(unlock_at));
        }

        // Absent and inactive accounts take the wrong-password path so the
        // response does not reveal which emails exist
        let user = match self.users.find_by_email(email).await? {
            Some(user) if user.is_active => user,
            _ => {
                self.lockout.record(email, false).await?;
                return Err(AuthError::InvalidCredentials);
            }
        };

        if !verify_password(password, &user.password_hash)? {
            self.lockout.record(email, false).await?;
            return Err(AuthError::InvalidCredentials);
        }

        if user.is_two_fa_enabled() {
            let code = two_fa_code.ok_or(AuthError::TwoFaRequired)?;
            let outcome = match &code {
                TwoFaCode::Totp(code) => self.two_fa.verify(&user, code, false).await,
                TwoFaCode::Backup(code) => self.two_fa.verify(&user, code, true).await,
            };
            if let Err(err) = outcome {
                self.lockout.record(email, false).await?;
                return Err(err);
            }
        }

        self.lockout.record(email, true).await?;
        self.users.update_last_login(user.id).await?;

        let tokens = self.codec.issue_pair(&user)?;
        tracing::info!(user_id = %user.id, ip, "User logged in");

        // Detection is advisory; a resolver outage must not block the login
        let anomaly = self.anomaly.clone();
        let user_id = user.id;
        let ip = ip.to_string();
        tokio::spawn(async move {
            if let Err(error) = anomaly.observe_login(user_id, &ip).await {
                tracing::warn!(user_id = %user_id, %error, "Login anomaly check failed");
            }
        });

        Ok(AuthResponse {
            principal: Principal {
                user_id: user.id,
                email: user.email.clone(),
                role: user.role,
                token_version: user.token_version,
            },
            tokens,
        })
    }

    /// Rotates a refresh token: the presented token is blacklisted for its
    /// remaining lifetime, so each one mints at most one new pair.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        let claims = self.codec.verify_refresh(refresh_token)?;

        let key = hash_token(refresh_token);
        if self.revocation.exists(&key).await? {
            return Err(AuthError::Revoked);
        }

        let user = self
            .users
            .find_by_id(claims.user_id()?)
            .await?
            .filter(|u| u.is_active)
            .ok_or(AuthError::InvalidCredentials)?;

        // Revoke before issuing so a crash between the two steps leaves the
        // old token dead rather than two live ones
        self.revocation.put(&key, claims.remaining_secs()).await?;
        let tokens = self.codec.issue_pair(&user)?;

        tracing::debug!(user_id = %user.id, "Refresh token rotated");
        Ok(tokens)
    }

    /// Per-request verification: signature, revocation, account state and
    /// token_version all have to line up before a `Principal` comes back.
    pub async fn verify_request(&self, access_token: &str) -> Result<Principal> {
        let claims = self.codec.verify_access(access_token)?;

        // Fails closed: if the revocation store is unreachable the request
        // is rejected rather than trusted
        if self.revocation.exists(&hash_token(access_token)).await? {
            return Err(AuthError::Revoked);
        }

        let user = self
            .users
            .find_by_id(claims.user_id()?)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if claims.token_version != user.token_version {
            // Stale generation. Blacklisting makes later presentations cheap
            // to reject without the directory round trip
            self.revocation
                .put(&hash_token(access_token), claims.remaining_secs())
                .await?;
            return Err(AuthError::InvalidCredentials);
        }

        if !user.is_active {
            return Err(AuthError::AccountInactive);
        }

        Ok(Principal {
            user_id: user.id,
            email: user.email,
            role: user.role,
            token_version: user.token_version,
        })
    }

    /// Blacklists the token for whatever lifetime it has left. Expired or
    /// garbage tokens are treated as already logged out, and a store outage
    /// only logs a warning; logout never errors visibly.
    pub async fn logout(&self, access_token: &str) -> Result<()> {
        let Some(exp) = self.codec.decode_expiry_unverified(access_token) else {
            return Ok(());
        };
        let remaining = exp - chrono::Utc::now().timestamp();
        if remaining > 0 {
            if let Err(error) = self
                .revocation
                .put(&hash_token(access_token), remaining)
                .await
            {
                tracing::warn!(%error, "Logout could not blacklist token");
            }
        }
        Ok(())
    }

    /// Changing the password bumps token_version, which kills every
    /// outstanding access token at its next verification.
    pub async fn change_password(
        &self,
        user_id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> Result<()> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !verify_password(current_password, &user.password_hash)? {
            return Err(AuthError::InvalidPassword);
        }

        let new_hash = hash_password(new_password, self.bcrypt_cost)?;
        self.users.update_password(user_id, &new_hash).await?;
        self.users.increment_token_version(user_id).await?;

        tracing::info!(user_id = %user_id, "Password changed, sessions invalidated");
        Ok(())
    }

    /// Invalidates every session for the user without touching credentials
    pub async fn logout_everywhere(&self, user_id: Uuid) -> Result<()> {
        let version = self.users.increment_token_version(user_id).await?;
        tracing::info!(user_id = %user_id, version, "All sessions invalidated");
        Ok(())
    }
}
