//! Authentication & session security for the Boxoffice admin backend.
//!
//! Provides bearer-token issuance and verification, instantaneous token
//! revocation, brute-force lockout, two-factor authentication (TOTP + backup
//! codes), and impossible-travel anomaly detection on login geolocation.
//!
//! ## Modules
//!
//! - `config`: environment-driven settings
//! - `db`: collaborator interfaces (user directory, login events, reset
//!   tokens) with Postgres and in-memory backends
//! - `error`: error taxonomy
//! - `models`: credential records, claims, login events
//! - `redis_pool`: shared Redis connection manager
//! - `security`: JWT codec, password hashing, TOTP, token revocation
//! - `services`: auth orchestrator, two-factor, lockout guard, anomaly
//!   detector, password reset

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod redis_pool;
pub mod security;
pub mod services;

// Re-export commonly used types
pub use error::{AuthError, Result};
pub use models::{LoginEvent, Principal, Role, User};
pub use security::jwt::{TokenCodec, TokenPair};
pub use security::token_revocation::RevocationStore;
pub use services::auth::AuthService;
pub use services::lockout::LockoutGuard;
pub use services::two_fa::TwoFaService;
