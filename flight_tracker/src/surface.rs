use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use flight_motion::{FlightRegistry, GeoPosition, MarkerSurface};
use indexmap::IndexMap;
use serde_json::{Value, json};
use tracing::{debug, info, trace};

use crate::error::ApplicationResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct MarkerId(u64);

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Marker {
    pub flight_id: String,
    pub longitude: f64,
    pub latitude: f64,
    pub heading: f64,
}

/// In-memory marker table standing in for a map widget.
#[derive(Debug, Default)]
pub(crate) struct MarkerBoard {
    markers: IndexMap<MarkerId, Marker>,
    next_id: u64,
}

impl MarkerSurface for MarkerBoard {
    type Handle = MarkerId;

    fn create(&mut self, id: &str, at: &GeoPosition, heading: f64) -> MarkerId {
        self.next_id += 1;
        let marker_id = MarkerId(self.next_id);
        self.markers.insert(
            marker_id,
            Marker {
                flight_id: id.to_string(),
                longitude: at.longitude,
                latitude: at.latitude,
                heading,
            },
        );
        debug!(id, lng = at.longitude, lat = at.latitude, heading, "Created marker");
        marker_id
    }

    fn set_position(&mut self, handle: &MarkerId, longitude: f64, latitude: f64) {
        if let Some(marker) = self.markers.get_mut(handle) {
            marker.longitude = longitude;
            marker.latitude = latitude;
            trace!(id = marker.flight_id, lng = longitude, lat = latitude, "Moved marker");
        }
    }

    fn set_heading(&mut self, handle: &MarkerId, degrees: f64) {
        if let Some(marker) = self.markers.get_mut(handle) {
            marker.heading = degrees;
        }
    }

    fn remove(&mut self, handle: MarkerId) {
        if let Some(marker) = self.markers.swap_remove(&handle) {
            info!(id = marker.flight_id, "Removed marker");
        }
    }
}

impl MarkerBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, handle: &MarkerId) -> Option<&Marker> {
        self.markers.get(handle)
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    /// All markers as a GeoJSON feature collection, described from `registry`.
    pub fn to_geojson(&self, registry: &FlightRegistry<MarkerId>) -> Value {
        let features: Vec<Value> = registry
            .iter()
            .filter_map(|(id, tracked)| {
                let marker = self.markers.get(&tracked.marker)?;
                Some(json!({
                    "type": "Feature",
                    "geometry": {
                        "type": "Point",
                        "coordinates": [marker.longitude, marker.latitude],
                    },
                    "properties": {
                        "flight_id": id,
                        "heading": marker.heading,
                        "altitude": tracked.position.altitude,
                        "speed": tracked.position.speed,
                        "description": tracked.snapshot.to_string(),
                    },
                }))
            })
            .collect();
        json!({
            "type": "FeatureCollection",
            "features": features,
        })
    }

    pub fn write_geojson(
        &self,
        path: &Path,
        registry: &FlightRegistry<MarkerId>,
    ) -> ApplicationResult<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, &self.to_geojson(registry))?;
        writer.flush()?;
        Ok(())
    }
}
