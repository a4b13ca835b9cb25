/// Postgres-backed collaborator implementations
use crate::db::{LoginEventStore, ResetTokenStore, UserDirectory};
use crate::error::Result;
use crate::models::{GeoPoint, LoginEvent, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

/// Credential records in the `users` table
#[derive(Clone)]
pub struct PostgresUserDirectory {
    pool: PgPool,
}

impl PostgresUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PostgresUserDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    async fn update_last_login(&self, user_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE users SET last_login_at = CURRENT_TIMESTAMP WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn increment_token_version(&self, user_id: Uuid) -> Result<i64> {
        // In-database arithmetic keeps the bump atomic across instances
        let version = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE users
            SET token_version = token_version + 1,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $1
            RETURNING token_version
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(version)
    }

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $2,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(password_hash)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_pending_totp_secret(&self, user_id: Uuid, secret: &str) -> Result<()> {
        sqlx::query(
            "UPDATE users SET totp_secret = $2, totp_enabled = false, updated_at = CURRENT_TIMESTAMP WHERE id = $1",
        )
        .bind(user_id)
        .bind(secret)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn enable_totp(&self, user_id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE users SET totp_enabled = true, updated_at = CURRENT_TIMESTAMP WHERE id = $1",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn disable_totp(&self, user_id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET totp_enabled = false,
                totp_secret = NULL,
                backup_code_hashes = '{}',
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn store_backup_codes(&self, user_id: Uuid, hashes: &[String]) -> Result<()> {
        sqlx::query(
            "UPDATE users SET backup_code_hashes = $2, updated_at = CURRENT_TIMESTAMP WHERE id = $1",
        )
        .bind(user_id)
        .bind(hashes)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn consume_backup_code(&self, user_id: Uuid, hash: &str) -> Result<bool> {
        // Guarded single-statement removal: concurrent presentations of the
        // same code race on the row update and only one sees it present
        let result = sqlx::query(
            r#"
            UPDATE users
            SET backup_code_hashes = array_remove(backup_code_hashes, $2),
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $1 AND $2 = ANY(backup_code_hashes)
            "#,
        )
        .bind(user_id)
        .bind(hash)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LoginEventRow {
    user_id: Uuid,
    ip: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
    created_at: DateTime<Utc>,
}

impl From<LoginEventRow> for LoginEvent {
    fn from(row: LoginEventRow) -> Self {
        // Malformed stored coordinates degrade to "no location"
        let location = match (row.latitude, row.longitude) {
            (Some(lat), Some(lon)) => GeoPoint::new(lat, lon),
            _ => None,
        };
        LoginEvent {
            user_id: row.user_id,
            ip: row.ip,
            location,
            created_at: row.created_at,
        }
    }
}

/// Login events in the `login_events` table
#[derive(Clone)]
pub struct PostgresLoginEventStore {
    pool: PgPool,
}

impl PostgresLoginEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LoginEventStore for PostgresLoginEventStore {
    async fn record(&self, event: &LoginEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO login_events (user_id, ip, latitude, longitude, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(event.user_id)
        .bind(&event.ip)
        .bind(event.location.map(|l| l.latitude))
        .bind(event.location.map(|l| l.longitude))
        .bind(event.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn recent(&self, user_id: Uuid, since: DateTime<Utc>) -> Result<Vec<LoginEvent>> {
        let rows = sqlx::query_as::<_, LoginEventRow>(
            r#"
            SELECT user_id, ip, latitude, longitude, created_at
            FROM login_events
            WHERE user_id = $1 AND created_at >= $2
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(LoginEvent::from).collect())
    }

    async fn prune(&self, before: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM login_events WHERE created_at < $1")
            .bind(before)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

/// Password reset tokens in the `password_resets` table
#[derive(Clone)]
pub struct PostgresResetTokenStore {
    pool: PgPool,
}

impl PostgresResetTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResetTokenStore for PostgresResetTokenStore {
    async fn create(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        // Invalidate existing unused tokens for this user
        sqlx::query(
            r#"
            UPDATE password_resets
            SET is_used = TRUE, used_at = NOW()
            WHERE user_id = $1 AND is_used = FALSE
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO password_resets (id, user_id, token_hash, expires_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(token_hash)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn consume(&self, token_hash: &str) -> Result<Option<Uuid>> {
        // Single statement so a token can be spent exactly once
        let user_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            UPDATE password_resets
            SET is_used = TRUE, used_at = NOW()
            WHERE token_hash = $1
              AND is_used = FALSE
              AND expires_at > NOW()
            RETURNING user_id
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user_id)
    }
}
