//! Configuration for the auth subsystem
//!
//! Loads settings from:
//! 1. Environment variables
//! 2. .env file (local development)
//!
//! # Example
//!
//! ```no_run
//! use boxoffice_auth::config::Settings;
//!
//! fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     println!("access token TTL: {}s", settings.jwt.access_ttl_secs);
//!     Ok(())
//! }
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use tracing::info;

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub redis: RedisSettings,
    pub jwt: JwtSettings,
    pub password: PasswordSettings,
    pub lockout: LockoutSettings,
    pub anomaly: AnomalySettings,
}

impl Settings {
    /// Load settings from environment variables
    pub fn load() -> Result<Self> {
        // Load .env file in development
        if cfg!(debug_assertions) {
            dotenvy::dotenv().ok();
            info!("Loaded .env file for development");
        }

        Ok(Settings {
            database: DatabaseSettings::from_env()?,
            redis: RedisSettings::from_env()?,
            jwt: JwtSettings::from_env()?,
            password: PasswordSettings::from_env()?,
            lockout: LockoutSettings::from_env()?,
            anomaly: AnomalySettings::from_env()?,
        })
    }
}

/// Database connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout: u64,
}

impl DatabaseSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .context("Invalid DATABASE_MAX_CONNECTIONS")?,
            acquire_timeout: env::var("DATABASE_ACQUIRE_TIMEOUT")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .context("Invalid DATABASE_ACQUIRE_TIMEOUT")?,
        })
    }
}

/// Redis settings (revocation store, lockout counters)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisSettings {
    pub url: String,
}

impl RedisSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            url: env::var("REDIS_URL").context("REDIS_URL must be set")?,
        })
    }
}

/// JWT signing settings. Access and refresh tokens use distinct secrets so a
/// leaked refresh key cannot mint access tokens and vice versa.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtSettings {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_ttl_secs: i64,
    pub refresh_ttl_secs: i64,
    pub issuer: String,
}

impl JwtSettings {
    fn from_env() -> Result<Self> {
        let access_secret =
            env::var("JWT_ACCESS_SECRET").context("JWT_ACCESS_SECRET must be set")?;
        let refresh_secret =
            env::var("JWT_REFRESH_SECRET").context("JWT_REFRESH_SECRET must be set")?;
        if access_secret == refresh_secret {
            anyhow::bail!("JWT_ACCESS_SECRET and JWT_REFRESH_SECRET must differ");
        }

        Ok(Self {
            access_secret,
            refresh_secret,
            access_ttl_secs: env::var("JWT_ACCESS_TTL_SECS")
                .unwrap_or_else(|_| "900".to_string())
                .parse()
                .context("Invalid JWT_ACCESS_TTL_SECS")?,
            refresh_ttl_secs: env::var("JWT_REFRESH_TTL_SECS")
                .unwrap_or_else(|_| "604800".to_string())
                .parse()
                .context("Invalid JWT_REFRESH_TTL_SECS")?,
            issuer: env::var("JWT_ISSUER").unwrap_or_else(|_| "Boxoffice".to_string()),
        })
    }
}

/// Password hashing settings (bcrypt cost factor)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordSettings {
    pub bcrypt_cost: u32,
}

impl PasswordSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            bcrypt_cost: env::var("BCRYPT_COST")
                .unwrap_or_else(|_| "12".to_string())
                .parse()
                .context("Invalid BCRYPT_COST")?,
        })
    }
}

/// Brute-force lockout policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockoutSettings {
    /// Failures within the window before the identifier locks
    pub max_attempts: u32,
    /// Rolling failure window in seconds
    pub window_secs: u64,
    /// Lock duration once the threshold is reached
    pub lock_secs: u64,
}

impl LockoutSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            max_attempts: env::var("LOCKOUT_MAX_ATTEMPTS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .context("Invalid LOCKOUT_MAX_ATTEMPTS")?,
            window_secs: env::var("LOCKOUT_WINDOW_SECS")
                .unwrap_or_else(|_| "900".to_string())
                .parse()
                .context("Invalid LOCKOUT_WINDOW_SECS")?,
            lock_secs: env::var("LOCKOUT_LOCK_SECS")
                .unwrap_or_else(|_| "900".to_string())
                .parse()
                .context("Invalid LOCKOUT_LOCK_SECS")?,
        })
    }
}

/// Impossible-travel detection tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalySettings {
    /// How far back to compare login events, in seconds
    pub window_secs: i64,
    /// Implied travel speed above this flags the login, in km/h
    pub max_speed_kmh: f64,
}

impl AnomalySettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            window_secs: env::var("ANOMALY_WINDOW_SECS")
                .unwrap_or_else(|_| "3600".to_string())
                .parse()
                .context("Invalid ANOMALY_WINDOW_SECS")?,
            max_speed_kmh: env::var("ANOMALY_MAX_SPEED_KMH")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .context("Invalid ANOMALY_MAX_SPEED_KMH")?,
        })
    }
}

impl Default for LockoutSettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window_secs: 900,
            lock_secs: 900,
        }
    }
}

impl Default for AnomalySettings {
    fn default() -> Self {
        Self {
            window_secs: 3600,
            max_speed_kmh: 1000.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lockout_defaults() {
        let lockout = LockoutSettings::default();
        assert_eq!(lockout.max_attempts, 5);
        assert_eq!(lockout.window_secs, 900);
        assert_eq!(lockout.lock_secs, 900);
    }

    #[test]
    fn test_anomaly_defaults() {
        let anomaly = AnomalySettings::default();
        assert_eq!(anomaly.window_secs, 3600);
        assert!(anomaly.max_speed_kmh > 900.0);
    }
}
