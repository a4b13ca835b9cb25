/// Impossible-travel detection
///
/// After every successful login we compare the new event's geolocation with
/// the most recent prior login inside the observation window. If the implied
/// travel speed between the two points exceeds the configured maximum, the
/// login is flagged and a notification goes out. Detection is advisory: the
/// login itself always succeeds, and resolver or sink failures are logged
/// rather than surfaced to the caller.
use crate::config::AnomalySettings;
use crate::db::LoginEventStore;
use crate::error::Result;
use crate::models::{GeoPoint, LoginEvent};
use async_trait::async_trait;
use chrono::Duration;
use std::sync::Arc;
use uuid::Uuid;

/// Resolves an IP address to coordinates. Returns None for addresses the
/// provider cannot place (private ranges, exhausted quota, unknown IP).
#[async_trait]
pub trait GeoResolver: Send + Sync {
    async fn resolve(&self, ip: &str) -> Option<GeoPoint>;
}

/// Receives security notifications for flagged logins
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify_suspicious_login(&self, user_id: Uuid, event: &LoginEvent, speed_kmh: f64);
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AnomalyVerdict {
    Normal,
    /// Implied speed between the two most recent located logins, km/h
    ImpossibleTravel { speed_kmh: f64 },
}

pub struct AnomalyDetector {
    events: Arc<dyn LoginEventStore>,
    resolver: Arc<dyn GeoResolver>,
    sink: Arc<dyn NotificationSink>,
    policy: AnomalySettings,
}

impl AnomalyDetector {
    pub fn new(
        events: Arc<dyn LoginEventStore>,
        resolver: Arc<dyn GeoResolver>,
        sink: Arc<dyn NotificationSink>,
        policy: AnomalySettings,
    ) -> Self {
        Self {
            events,
            resolver,
            sink,
            policy,
        }
    }

    /// Records the login event and flags impossible travel against the most
    /// recent prior located login in the window. Never fails the login:
    /// storage errors propagate only because a lost event would blind future
    /// checks, while resolver gaps simply skip the comparison.
    pub async fn observe_login(&self, user_id: Uuid, ip: &str) -> Result<AnomalyVerdict> {
        let location = self.resolver.resolve(ip).await;
        if location.is_none() {
            tracing::debug!(user_id = %user_id, ip, "No geolocation for login IP");
        }
        let event = LoginEvent::new(user_id, ip, location);

        let since = event.created_at - Duration::seconds(self.policy.window_secs);
        let previous = self.events.recent(user_id, since).await?;

        let verdict = self.judge(&event, &previous);
        if let AnomalyVerdict::ImpossibleTravel { speed_kmh } = verdict {
            tracing::warn!(
                user_id = %user_id,
                ip,
                speed_kmh,
                "Impossible travel detected between consecutive logins"
            );
            self.sink
                .notify_suspicious_login(user_id, &event, speed_kmh)
                .await;
        }

        self.events.record(&event).await?;

        // Events older than the window can never influence a verdict again;
        // dropping them here bounds retention without a scheduled job
        if let Err(error) = self.events.prune(since).await {
            tracing::warn!(%error, "Failed to prune stale login events");
        }

        Ok(verdict)
    }

    /// Compares against every prior event in the window that has a location
    /// and flags when any of them implies an implausible speed. Events
    /// without coordinates are skipped rather than treated as travel.
    fn judge(&self, event: &LoginEvent, previous: &[LoginEvent]) -> AnomalyVerdict {
        let Some(here) = event.location else {
            return AnomalyVerdict::Normal;
        };

        let mut worst: Option<f64> = None;
        for prior in previous {
            let Some(there) = prior.location else {
                continue;
            };

            let distance_km = here.distance_km(&there);
            let elapsed_secs = (event.created_at - prior.created_at).num_seconds();

            // Same-instant logins from distant points are the degenerate case
            // of infinite speed; a small floor keeps the division meaningful
            let elapsed_hours = (elapsed_secs.max(1) as f64) / 3600.0;
            let speed_kmh = distance_km / elapsed_hours;

            if speed_kmh > self.policy.max_speed_kmh && worst.map_or(true, |w| speed_kmh > w) {
                worst = Some(speed_kmh);
            }
        }

        match worst {
            Some(speed_kmh) => AnomalyVerdict::ImpossibleTravel { speed_kmh },
            None => AnomalyVerdict::Normal,
        }
    }
}
