use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geo::GeoPosition;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Airport {
    pub code: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aircraft {
    #[serde(default)]
    pub registration: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

/// One flight as reported by a single poll of the feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightSnapshot {
    #[serde(rename = "flight_id", alias = "id")]
    pub id: String,
    #[serde(default, rename = "current_position", alias = "position")]
    pub position: Option<GeoPosition>,
    #[serde(default)]
    pub airline: Option<String>,
    #[serde(default)]
    pub flight_number: Option<String>,
    #[serde(default)]
    pub origin: Option<Airport>,
    #[serde(default)]
    pub destination: Option<Airport>,
    #[serde(default)]
    pub aircraft: Option<Aircraft>,
    #[serde(default)]
    pub status: Option<String>,
}

impl FlightSnapshot {
    pub fn new(id: impl Into<String>, position: Option<GeoPosition>) -> Self {
        Self {
            id: id.into(),
            position,
            airline: None,
            flight_number: None,
            origin: None,
            destination: None,
            aircraft: None,
            status: None,
        }
    }
}

fn airport_code(airport: &Option<Airport>) -> &str {
    airport.as_ref().map_or("Unknown", |a| a.code.as_str())
}

impl fmt::Display for FlightSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | Airline: {} | From: {} To: {}",
            self.id,
            self.airline.as_deref().unwrap_or("Unknown"),
            airport_code(&self.origin),
            airport_code(&self.destination),
        )?;
        if let Some(pos) = &self.position {
            write!(
                f,
                " | Altitude: {} ft | Speed: {} kts | Heading: {}°",
                pos.altitude, pos.speed, pos.heading
            )?;
        }
        Ok(())
    }
}
