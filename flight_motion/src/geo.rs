use serde::{Deserialize, Serialize};
use thiserror::Error;

const EARTH_RADIUS_KM: f64 = 6371.0;

/// A single position sample of an aircraft.
///
/// Longitude and latitude are in degrees, heading in degrees clockwise from
/// north. Altitude is in feet and speed in knots as reported by the feed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPosition {
    pub longitude: f64,
    pub latitude: f64,
    #[serde(default)]
    pub altitude: f64,
    #[serde(default)]
    pub speed: f64,
    #[serde(default)]
    pub heading: f64,
    #[serde(default)]
    pub vertical_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum PositionError {
    #[error("Latitude must be between -90 and 90, got {0}")]
    LatitudeOutOfRange(f64),
    #[error("Longitude must be between -180 and 180, got {0}")]
    LongitudeOutOfRange(f64),
    #[error("Position contains a non finite value")]
    NotFinite,
}

impl GeoPosition {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
            altitude: 0.0,
            speed: 0.0,
            heading: 0.0,
            vertical_rate: 0.0,
        }
    }

    pub fn with_heading(mut self, heading: f64) -> Self {
        self.heading = heading;
        self
    }

    pub fn validate(&self) -> Result<(), PositionError> {
        let values = [
            self.longitude,
            self.latitude,
            self.altitude,
            self.speed,
            self.heading,
            self.vertical_rate,
        ];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(PositionError::NotFinite);
        }
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(PositionError::LatitudeOutOfRange(self.latitude));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(PositionError::LongitudeOutOfRange(self.longitude));
        }
        Ok(())
    }

    /// Same horizontal location, ignoring altitude, speed and heading.
    pub fn same_location(&self, other: &Self) -> bool {
        self.longitude == other.longitude && self.latitude == other.latitude
    }
}

pub fn lerp(from: f64, to: f64, t: f64) -> f64 {
    from + (to - from) * t
}

/// Wraps any angle into `[0, 360)`.
pub fn normalize_degrees(degrees: f64) -> f64 {
    let wrapped = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if wrapped >= 360.0 || wrapped == 0.0 {
        0.0
    } else {
        wrapped
    }
}

/// Initial great circle bearing from `from` to `to`, in degrees `[0, 360)`.
///
/// Identical points give 0, as `atan2(0, 0)` does.
pub fn bearing(from: &GeoPosition, to: &GeoPosition) -> f64 {
    let lat1 = from.latitude.to_radians();
    let lat2 = to.latitude.to_radians();
    let delta_lon = (to.longitude - from.longitude).to_radians();

    let y = delta_lon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * delta_lon.cos();
    normalize_degrees(y.atan2(x).to_degrees())
}

/// Haversine distance in kilometers on a spherical earth.
pub fn distance_km(from: &GeoPosition, to: &GeoPosition) -> f64 {
    let lat1 = from.latitude.to_radians();
    let lat2 = to.latitude.to_radians();
    let d_lat = lat2 - lat1;
    let d_lon = (to.longitude - from.longitude).to_radians();

    let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}
