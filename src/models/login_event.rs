/// Login event records for impossible-travel detection
///
/// Append-only with bounded retention; never required for primary auth
/// correctness. Coordinates use WGS84.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Geographic point (WGS84)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude (-90 to 90)
    pub latitude: f64,
    /// Longitude (-180 to 180)
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return None;
        }
        Some(Self {
            latitude,
            longitude,
        })
    }

    /// Great-circle distance to another point using the Haversine formula,
    /// in kilometers.
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        const EARTH_RADIUS_KM: f64 = 6371.0;

        let lat1_rad = self.latitude.to_radians();
        let lat2_rad = other.latitude.to_radians();
        let delta_lat = (other.latitude - self.latitude).to_radians();
        let delta_lon = (other.longitude - self.longitude).to_radians();

        let a = (delta_lat / 2.0).sin().powi(2)
            + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

        EARTH_RADIUS_KM * c
    }
}

/// A single observed login
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginEvent {
    pub user_id: Uuid,
    pub ip: String,
    /// None when geolocation resolution failed; such events are skipped by
    /// the detector, never treated as errors.
    pub location: Option<GeoPoint>,
    pub created_at: DateTime<Utc>,
}

impl LoginEvent {
    pub fn new(user_id: Uuid, ip: &str, location: Option<GeoPoint>) -> Self {
        Self {
            user_id,
            ip: ip.to_string(),
            location,
            created_at: Utc::now(),
        }
    }
}
