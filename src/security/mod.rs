/// Security primitives for the auth core
///
/// - JWT issuance and verification (distinct access/refresh keys)
/// - Password hashing and verification (bcrypt)
/// - TOTP secret lifecycle and backup codes
/// - Token revocation (TTL-bounded blacklist)
pub mod jwt;
pub mod password;
pub mod token_revocation;
pub mod totp;

pub use jwt::{AccessClaims, RefreshClaims, TokenCodec, TokenPair};
pub use password::{hash_password, verify_password};
pub use token_revocation::{
    hash_token, InMemoryRevocationStore, RedisRevocationStore, RevocationStore,
};
pub use totp::TotpGenerator;
