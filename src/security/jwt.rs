/// JWT issuance and verification
///
/// Access and refresh tokens are signed with distinct HS256 keys so a
/// compromised refresh key cannot mint access tokens and vice versa. The
/// codec is pure and stateless: it checks signature, expiry, and structural
/// shape only. Token-version and revocation checks belong to the
/// orchestrator.
use crate::config::JwtSettings;
use crate::error::{AuthError, Result};
use crate::models::{Role, User};
use chrono::Utc;
use jsonwebtoken::{
    decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const TOKEN_TYPE_ACCESS: &str = "access";
const TOKEN_TYPE_REFRESH: &str = "refresh";

/// Fixed, versioned access-token claims schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject (user ID as UUID string)
    pub sub: String,
    /// Unique token id; keeps tokens minted in the same second distinct so
    /// revoking one by hash cannot touch a sibling.
    pub jti: Uuid,
    pub email: String,
    pub role: Role,
    /// Credential-record version at issuance; a mismatch with the current
    /// record invalidates the token regardless of signature or expiry.
    pub token_version: i64,
    pub token_type: String,
    pub iat: i64,
    pub exp: i64,
}

impl AccessClaims {
    pub fn user_id(&self) -> Result<Uuid> {
        Uuid::parse_str(&self.sub).map_err(|_| AuthError::TokenMalformed)
    }

    /// Remaining validity in whole seconds; non-positive when expired
    pub fn remaining_secs(&self) -> i64 {
        self.exp - Utc::now().timestamp()
    }
}

/// Refresh tokens carry only the subject id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: String,
    pub jti: Uuid,
    pub token_type: String,
    pub iat: i64,
    pub exp: i64,
}

impl RefreshClaims {
    pub fn user_id(&self) -> Result<Uuid> {
        Uuid::parse_str(&self.sub).map_err(|_| AuthError::TokenMalformed)
    }

    pub fn remaining_secs(&self) -> i64 {
        self.exp - Utc::now().timestamp()
    }
}

/// Token pair handed to a freshly authenticated caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// Signs and verifies bearer tokens. No I/O, trivially testable.
pub struct TokenCodec {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
}

impl TokenCodec {
    pub fn new(settings: &JwtSettings) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(settings.access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(settings.access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(settings.refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(settings.refresh_secret.as_bytes()),
            access_ttl_secs: settings.access_ttl_secs,
            refresh_ttl_secs: settings.refresh_ttl_secs,
        }
    }

    /// Issue an access + refresh pair embedding the user's current
    /// token_version.
    pub fn issue_pair(&self, user: &User) -> Result<TokenPair> {
        let now = Utc::now().timestamp();

        let access_claims = AccessClaims {
            sub: user.id.to_string(),
            jti: Uuid::new_v4(),
            email: user.email.clone(),
            role: user.role,
            token_version: user.token_version,
            token_type: TOKEN_TYPE_ACCESS.to_string(),
            iat: now,
            exp: now + self.access_ttl_secs,
        };
        let access_token = encode(&Header::default(), &access_claims, &self.access_encoding)?;

        let refresh_claims = RefreshClaims {
            sub: user.id.to_string(),
            jti: Uuid::new_v4(),
            token_type: TOKEN_TYPE_REFRESH.to_string(),
            iat: now,
            exp: now + self.refresh_ttl_secs,
        };
        let refresh_token = encode(&Header::default(), &refresh_claims, &self.refresh_encoding)?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.access_ttl_secs,
        })
    }

    /// Verify signature, expiry, and shape of an access token
    pub fn verify_access(&self, token: &str) -> Result<AccessClaims> {
        let claims = decode::<AccessClaims>(token, &self.access_decoding, &validation())?.claims;
        if claims.token_type != TOKEN_TYPE_ACCESS {
            return Err(AuthError::TokenMalformed);
        }
        Ok(claims)
    }

    /// Verify signature, expiry, and shape of a refresh token
    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims> {
        let claims = decode::<RefreshClaims>(token, &self.refresh_decoding, &validation())?.claims;
        if claims.token_type != TOKEN_TYPE_REFRESH {
            return Err(AuthError::TokenMalformed);
        }
        Ok(claims)
    }

    /// Best-effort expiry extraction without signature verification.
    ///
    /// Used only by logout, which blacklists whatever the caller presented
    /// for its claimed remaining lifetime and must never error visibly.
    pub fn decode_expiry_unverified(&self, token: &str) -> Option<i64> {
        #[derive(Deserialize)]
        struct ExpOnly {
            exp: i64,
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        decode::<ExpOnly>(token, &DecodingKey::from_secret(&[]), &validation)
            .ok()
            .map(|data| data.claims.exp)
    }
}

fn validation() -> Validation {
    let mut validation = Validation::new(Algorithm::HS256);
    // Expiry boundaries must be exact for revocation TTL math
    validation.leeway = 0;
    validation
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn test_settings() -> JwtSettings {
        JwtSettings {
            access_secret: "access-secret-for-tests-only".to_string(),
            refresh_secret: "refresh-secret-for-tests-only".to_string(),
            access_ttl_secs: 900,
            refresh_ttl_secs: 604_800,
            issuer: "Boxoffice".to_string(),
        }
    }

    fn test_user(token_version: i64) -> User {
        User {
            id: Uuid::new_v4(),
            email: "ops@example.com".to_string(),
            role: Role::Admin,
            password_hash: String::new(),
            is_active: true,
            token_version,
            totp_enabled: false,
            totp_secret: None,
            backup_code_hashes: Vec::new(),
            last_login_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_issue_and_verify_round_trip() {
        let codec = TokenCodec::new(&test_settings());
        let user = test_user(7);

        let pair = codec.issue_pair(&user).expect("should issue tokens");
        let claims = codec
            .verify_access(&pair.access_token)
            .expect("access token should verify");

        assert_eq!(claims.sub, user.id.to_string());
        assert_eq!(claims.email, user.email);
        assert_eq!(claims.role, user.role);
        assert_eq!(claims.token_version, 7);
        assert_eq!(claims.exp - claims.iat, 900);

        let refresh = codec
            .verify_refresh(&pair.refresh_token)
            .expect("refresh token should verify");
        assert_eq!(refresh.sub, user.id.to_string());
    }

    #[test]
    fn test_same_second_pairs_are_distinct() {
        let codec = TokenCodec::new(&test_settings());
        let user = test_user(1);

        // Back-to-back issuance lands in the same second; jti keeps the
        // tokens distinct so revoking one by hash cannot hit the other
        let first = codec.issue_pair(&user).expect("should issue");
        let second = codec.issue_pair(&user).expect("should issue");
        assert_ne!(first.access_token, second.access_token);
        assert_ne!(first.refresh_token, second.refresh_token);

        let a = codec.verify_access(&first.access_token).expect("verify");
        let b = codec.verify_access(&second.access_token).expect("verify");
        assert_ne!(a.jti, b.jti);
    }

    #[test]
    fn test_access_token_rejected_as_refresh() {
        let codec = TokenCodec::new(&test_settings());
        let pair = codec.issue_pair(&test_user(1)).expect("should issue");

        // Different signing keys: verification fails before the shape check
        let result = codec.verify_refresh(&pair.access_token);
        assert!(result.is_err());
    }

    #[test]
    fn test_expired_token_fails_with_token_expired() {
        let mut settings = test_settings();
        settings.access_ttl_secs = -60;
        let codec = TokenCodec::new(&settings);
        let pair = codec.issue_pair(&test_user(1)).expect("should issue");

        let result = codec.verify_access(&pair.access_token);
        assert!(matches!(result, Err(AuthError::TokenExpired)));
    }

    #[test]
    fn test_tampered_token_fails() {
        let codec = TokenCodec::new(&test_settings());
        let pair = codec.issue_pair(&test_user(1)).expect("should issue");

        let mut tampered = pair.access_token.clone();
        tampered.pop();
        tampered.push('A');
        assert!(codec.verify_access(&tampered).is_err());
    }

    #[test]
    fn test_garbage_is_malformed() {
        let codec = TokenCodec::new(&test_settings());
        let result = codec.verify_access("not-a-jwt");
        assert!(matches!(result, Err(AuthError::TokenMalformed)));
    }

    #[test]
    fn test_unverified_expiry_decode() {
        let codec = TokenCodec::new(&test_settings());
        let pair = codec.issue_pair(&test_user(1)).expect("should issue");

        let exp = codec
            .decode_expiry_unverified(&pair.access_token)
            .expect("exp should decode");
        assert!(exp > Utc::now().timestamp());
        assert!(codec.decode_expiry_unverified("garbage").is_none());
    }
}
