//! End-to-end authentication flows over the in-memory backends.
//!
//! Wires the orchestrator exactly as production does, swapping Postgres and
//! Redis for the in-memory implementations so every scenario runs hermetic.

use async_trait::async_trait;
use boxoffice_auth::config::{AnomalySettings, JwtSettings, LockoutSettings};
use boxoffice_auth::db::memory::{
    InMemoryLoginEventStore, InMemoryResetTokenStore, InMemoryUserDirectory,
};
use boxoffice_auth::db::LoginEventStore;
use boxoffice_auth::error::AuthError;
use boxoffice_auth::models::{GeoPoint, LoginEvent, Role, User};
use boxoffice_auth::security::password::hash_password;
use boxoffice_auth::security::token_revocation::InMemoryRevocationStore;
use boxoffice_auth::security::totp::TotpGenerator;
use boxoffice_auth::services::anomaly::{AnomalyDetector, GeoResolver, NotificationSink};
use boxoffice_auth::services::auth::{AuthService, TwoFaCode};
use boxoffice_auth::services::lockout::InMemoryLockoutGuard;
use boxoffice_auth::services::password_reset::PasswordResetService;
use boxoffice_auth::services::two_fa::TwoFaService;
use boxoffice_auth::TokenCodec;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

const TEST_COST: u32 = 4;
const PASSWORD: &str = "C0rrect!horse";

struct MapResolver {
    map: HashMap<String, GeoPoint>,
}

#[async_trait]
impl GeoResolver for MapResolver {
    async fn resolve(&self, ip: &str) -> Option<GeoPoint> {
        self.map.get(ip).copied()
    }
}

#[derive(Default)]
struct RecordingSink {
    alerts: Mutex<Vec<(Uuid, f64)>>,
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn notify_suspicious_login(&self, user_id: Uuid, _event: &LoginEvent, speed_kmh: f64) {
        self.alerts
            .lock()
            .expect("sink lock")
            .push((user_id, speed_kmh));
    }
}

struct Harness {
    auth: AuthService,
    reset: PasswordResetService,
    users: Arc<InMemoryUserDirectory>,
    events: Arc<InMemoryLoginEventStore>,
    sink: Arc<RecordingSink>,
}

fn harness_with_geo(geo: HashMap<String, GeoPoint>) -> Harness {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let users = Arc::new(InMemoryUserDirectory::new());
    let events = Arc::new(InMemoryLoginEventStore::new());
    let sink = Arc::new(RecordingSink::default());
    let lockout = Arc::new(InMemoryLockoutGuard::new(LockoutSettings::default()));

    let jwt = JwtSettings {
        access_secret: "integration-access-secret-0123456789".to_string(),
        refresh_secret: "integration-refresh-secret-0123456789".to_string(),
        access_ttl_secs: 900,
        refresh_ttl_secs: 604_800,
        issuer: "BoxOffice".to_string(),
    };

    let anomaly = Arc::new(AnomalyDetector::new(
        events.clone(),
        Arc::new(MapResolver { map: geo }),
        sink.clone(),
        AnomalySettings::default(),
    ));
    let two_fa = Arc::new(TwoFaService::new(users.clone(), "BoxOffice".to_string()));
    let auth = AuthService::new(
        users.clone(),
        TokenCodec::new(&jwt),
        Arc::new(InMemoryRevocationStore::new()),
        lockout.clone(),
        two_fa,
        anomaly,
        TEST_COST,
    );
    let reset = PasswordResetService::new(
        users.clone(),
        Arc::new(InMemoryResetTokenStore::new()),
        lockout,
        TEST_COST,
    );

    Harness {
        auth,
        reset,
        users,
        events,
        sink,
    }
}

fn harness() -> Harness {
    harness_with_geo(HashMap::new())
}

fn seed_user(users: &InMemoryUserDirectory, email: &str) -> User {
    let now = Utc::now();
    let user = User {
        id: Uuid::new_v4(),
        email: email.to_string(),
        role: Role::Admin,
        password_hash: hash_password(PASSWORD, TEST_COST).expect("hash"),
        is_active: true,
        token_version: 0,
        totp_enabled: false,
        totp_secret: None,
        backup_code_hashes: Vec::new(),
        last_login_at: None,
        created_at: now,
        updated_at: now,
    };
    users.insert(user.clone());
    user
}

#[tokio::test]
async fn issued_tokens_carry_identity_and_verify() {
    let h = harness();
    let user = seed_user(&h.users, "admin@boxoffice.test");

    let response = h
        .auth
        .login("admin@boxoffice.test", PASSWORD, "1.1.1.1", None)
        .await
        .expect("login");

    let principal = h
        .auth
        .verify_request(&response.tokens.access_token)
        .await
        .expect("verify");
    assert_eq!(principal.user_id, user.id);
    assert_eq!(principal.email, "admin@boxoffice.test");
    assert_eq!(principal.role, Role::Admin);
    assert_eq!(principal.token_version, 0);
}

#[tokio::test]
async fn password_change_invalidates_earlier_tokens() {
    let h = harness();
    let user = seed_user(&h.users, "admin@boxoffice.test");

    let before = h
        .auth
        .login("admin@boxoffice.test", PASSWORD, "1.1.1.1", None)
        .await
        .expect("login");

    h.auth
        .change_password(user.id, PASSWORD, "Fresh!passw0rd")
        .await
        .expect("change");

    let err = h
        .auth
        .verify_request(&before.tokens.access_token)
        .await
        .expect_err("pre-change token");
    assert!(matches!(err, AuthError::InvalidCredentials));

    // A fresh login picks up the bumped version and verifies again
    let after = h
        .auth
        .login("admin@boxoffice.test", "Fresh!passw0rd", "1.1.1.1", None)
        .await
        .expect("re-login");
    let principal = h
        .auth
        .verify_request(&after.tokens.access_token)
        .await
        .expect("verify");
    assert_eq!(principal.token_version, 1);
}

#[tokio::test]
async fn repeated_failures_lock_the_account() {
    let h = harness();
    seed_user(&h.users, "admin@boxoffice.test");

    for _ in 0..5 {
        let err = h
            .auth
            .login("admin@boxoffice.test", "wrong", "1.1.1.1", None)
            .await
            .expect_err("bad password");
        assert!(matches!(
            err,
            AuthError::InvalidCredentials | AuthError::AccountLocked(_)
        ));
    }

    let err = h
        .auth
        .login("admin@boxoffice.test", PASSWORD, "1.1.1.1", None)
        .await
        .expect_err("locked despite correct password");
    match err {
        AuthError::AccountLocked(unlock_at) => assert!(unlock_at > Utc::now()),
        other => panic!("expected lockout, got {other:?}"),
    }
}

#[tokio::test]
async fn concurrent_failure_burst_locks_exactly_once() {
    let h = Arc::new(harness());
    seed_user(&h.users, "admin@boxoffice.test");

    let mut handles = Vec::new();
    for _ in 0..10 {
        let h = h.clone();
        handles.push(tokio::spawn(async move {
            let _ = h
                .auth
                .login("admin@boxoffice.test", "wrong", "1.1.1.1", None)
                .await;
        }));
    }
    for handle in handles {
        handle.await.expect("task");
    }

    let err = h
        .auth
        .login("admin@boxoffice.test", PASSWORD, "1.1.1.1", None)
        .await
        .expect_err("locked");
    assert!(matches!(err, AuthError::AccountLocked(_)));
}

#[tokio::test]
async fn backup_codes_work_exactly_once() {
    let h = harness();
    let mut user = seed_user(&h.users, "admin@boxoffice.test");
    user.totp_enabled = true;
    user.totp_secret = Some(TotpGenerator::generate_secret());
    user.backup_code_hashes = vec![
        TotpGenerator::hash_backup_code("0a1b2c3d"),
        TotpGenerator::hash_backup_code("4e5f6071"),
    ];
    h.users.insert(user);

    h.auth
        .login(
            "admin@boxoffice.test",
            PASSWORD,
            "1.1.1.1",
            Some(TwoFaCode::Backup("0a1b2c3d".to_string())),
        )
        .await
        .expect("first use");

    let err = h
        .auth
        .login(
            "admin@boxoffice.test",
            PASSWORD,
            "1.1.1.1",
            Some(TwoFaCode::Backup("0a1b2c3d".to_string())),
        )
        .await
        .expect_err("replayed backup code");
    assert!(matches!(err, AuthError::InvalidBackupCode));

    // The untouched code is still live
    h.auth
        .login(
            "admin@boxoffice.test",
            PASSWORD,
            "1.1.1.1",
            Some(TwoFaCode::Backup("4e5f6071".to_string())),
        )
        .await
        .expect("sibling code");
}

#[tokio::test]
async fn refresh_tokens_rotate_and_refuse_replay() {
    let h = harness();
    seed_user(&h.users, "admin@boxoffice.test");

    let login = h
        .auth
        .login("admin@boxoffice.test", PASSWORD, "1.1.1.1", None)
        .await
        .expect("login");

    let rotated = h
        .auth
        .refresh(&login.tokens.refresh_token)
        .await
        .expect("rotation");

    let err = h
        .auth
        .refresh(&login.tokens.refresh_token)
        .await
        .expect_err("replay of consumed token");
    assert!(matches!(err, AuthError::Revoked));

    h.auth
        .refresh(&rotated.refresh_token)
        .await
        .expect("new token rotates in turn");
}

#[tokio::test]
async fn logout_is_idempotent() {
    let h = harness();
    seed_user(&h.users, "admin@boxoffice.test");

    let login = h
        .auth
        .login("admin@boxoffice.test", PASSWORD, "1.1.1.1", None)
        .await
        .expect("login");

    h.auth
        .logout(&login.tokens.access_token)
        .await
        .expect("logout");
    h.auth
        .logout(&login.tokens.access_token)
        .await
        .expect("second logout");
    h.auth.logout("garbage").await.expect("garbage input");

    let err = h
        .auth
        .verify_request(&login.tokens.access_token)
        .await
        .expect_err("revoked token");
    assert!(matches!(err, AuthError::Revoked));
}

#[tokio::test]
async fn impossible_travel_is_flagged_and_plausible_travel_is_not() {
    let paris = GeoPoint::new(48.8566, 2.3522).expect("point");
    let tokyo = GeoPoint::new(35.6762, 139.6503).expect("point");

    let h = harness_with_geo(HashMap::from([
        ("81.0.0.1".to_string(), paris),
        ("81.0.0.2".to_string(), paris),
        ("126.0.0.1".to_string(), tokyo),
    ]));
    let user = seed_user(&h.users, "admin@boxoffice.test");

    // Paris login 50 minutes ago, seeded directly to control the timestamp
    let mut prior = LoginEvent::new(user.id, "81.0.0.1", Some(paris));
    prior.created_at = Utc::now() - Duration::minutes(50);
    h.events.record(&prior).await.expect("seed event");

    // ~9700 km in 50 minutes cannot be genuine
    h.auth
        .login("admin@boxoffice.test", PASSWORD, "126.0.0.1", None)
        .await
        .expect("login still succeeds");

    // The anomaly check runs detached from the login path
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    {
        let alerts = h.sink.alerts.lock().expect("sink lock");
        assert_eq!(alerts.len(), 1, "transcontinental hop should alert");
        assert_eq!(alerts[0].0, user.id);
        assert!(alerts[0].1 > 1000.0);
    }

    // Same city a couple of minutes apart raises nothing for another user
    let other = seed_user(&h.users, "staff@boxoffice.test");
    let mut recent = LoginEvent::new(other.id, "81.0.0.1", Some(paris));
    recent.created_at = Utc::now() - Duration::minutes(2);
    h.events.record(&recent).await.expect("seed event");

    h.auth
        .login("staff@boxoffice.test", PASSWORD, "81.0.0.2", None)
        .await
        .expect("login");
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    assert_eq!(h.sink.alerts.lock().expect("sink lock").len(), 1);
}

#[tokio::test]
async fn password_reset_end_to_end() {
    let h = harness();
    let user = seed_user(&h.users, "admin@boxoffice.test");

    let login = h
        .auth
        .login("admin@boxoffice.test", PASSWORD, "1.1.1.1", None)
        .await
        .expect("login");

    assert!(h
        .reset
        .request_reset("ghost@boxoffice.test")
        .await
        .expect("request")
        .is_none());

    let token = h
        .reset
        .request_reset("admin@boxoffice.test")
        .await
        .expect("request")
        .expect("token");
    h.reset
        .reset(&token, "Brand!new1pw")
        .await
        .expect("reset");

    // Old password dead, old sessions dead, new password works
    let err = h
        .auth
        .login("admin@boxoffice.test", PASSWORD, "1.1.1.1", None)
        .await
        .expect_err("old password");
    assert!(matches!(err, AuthError::InvalidCredentials));

    let err = h
        .auth
        .verify_request(&login.tokens.access_token)
        .await
        .expect_err("stale session");
    assert!(matches!(err, AuthError::InvalidCredentials));

    let fresh = h
        .auth
        .login("admin@boxoffice.test", "Brand!new1pw", "1.1.1.1", None)
        .await
        .expect("login with new password");
    assert_eq!(fresh.principal.user_id, user.id);
}
