/// Business logic composing the security primitives and collaborator stores
pub mod anomaly;
pub mod auth;
pub mod lockout;
pub mod password_reset;
pub mod two_fa;

pub use anomaly::{AnomalyDetector, AnomalyVerdict, GeoResolver, NotificationSink};
pub use auth::{AuthResponse, AuthService, TwoFaCode};
pub use lockout::{InMemoryLockoutGuard, LockoutGuard, LockoutStatus, RedisLockoutGuard};
pub use password_reset::PasswordResetService;
pub use two_fa::{TwoFaService, TwoFaSetup};
