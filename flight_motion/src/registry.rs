use std::collections::VecDeque;

use indexmap::{IndexMap, IndexSet, map::Entry};
use tracing::{debug, info, warn};

use crate::{
    geo::{GeoPosition, normalize_degrees},
    marker::MarkerSurface,
    snapshot::FlightSnapshot,
};

pub const DEFAULT_RECENT_PATH_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    Create {
        id: String,
        position: GeoPosition,
    },
    Move {
        id: String,
        from: GeoPosition,
        to: GeoPosition,
    },
}

impl Signal {
    pub fn id(&self) -> &str {
        match self {
            Signal::Create { id, .. } | Signal::Move { id, .. } => id,
        }
    }
}

#[derive(Debug, Default)]
pub struct ReconcileResult {
    pub signals: Vec<Signal>,
    /// Every id present in the snapshot, with or without a usable position.
    pub seen: IndexSet<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct RegistryOptions {
    /// Consecutive polls a flight may be missing before it is removed.
    /// Zero keeps flights until they are removed explicitly.
    pub stale_after_polls: u32,
    pub recent_path_limit: usize,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            stale_after_polls: 3,
            recent_path_limit: DEFAULT_RECENT_PATH_LIMIT,
        }
    }
}

#[derive(Debug)]
pub struct TrackedFlight<H> {
    pub snapshot: FlightSnapshot,
    pub position: GeoPosition,
    pub marker: H,
    pub missed_polls: u32,
    pub recent_path: VecDeque<GeoPosition>,
}

impl<H> TrackedFlight<H> {
    fn push_path(&mut self, position: GeoPosition, limit: usize) {
        if limit == 0 {
            return;
        }
        while self.recent_path.len() >= limit {
            self.recent_path.pop_front();
        }
        self.recent_path.push_back(position);
    }
}

/// Owner of every flight currently shown, keyed by flight id.
#[derive(Debug)]
pub struct FlightRegistry<H> {
    flights: IndexMap<String, TrackedFlight<H>>,
    options: RegistryOptions,
}

impl<H> Default for FlightRegistry<H> {
    fn default() -> Self {
        Self::new(RegistryOptions::default())
    }
}

impl<H> FlightRegistry<H> {
    pub fn new(options: RegistryOptions) -> Self {
        Self {
            flights: IndexMap::new(),
            options,
        }
    }

    pub fn options(&self) -> &RegistryOptions {
        &self.options
    }

    /// Applies one snapshot batch.
    ///
    /// New ids get a marker on `surface` and a [`Signal::Create`]; known ids
    /// whose location changed get a [`Signal::Move`]. Entries without a usable
    /// position are skipped. Nothing is ever removed here, see
    /// [`FlightRegistry::sweep_absent`].
    pub fn reconcile<S>(
        &mut self,
        snapshot: &[FlightSnapshot],
        surface: &mut S,
    ) -> ReconcileResult
    where
        S: MarkerSurface<Handle = H>,
    {
        let mut result = ReconcileResult::default();
        let limit = self.options.recent_path_limit;

        for flight in snapshot {
            result.seen.insert(flight.id.clone());

            let Some(position) = flight.position else {
                debug!(id = flight.id, "Skipping flight without position");
                continue;
            };
            if let Err(e) = position.validate() {
                warn!(id = flight.id, "Skipping flight with invalid position: {}", e);
                continue;
            }

            match self.flights.entry(flight.id.clone()) {
                Entry::Occupied(mut entry) => {
                    let tracked = entry.get_mut();
                    tracked.snapshot = flight.clone();
                    let from = tracked.position;
                    tracked.position = position;
                    if from.same_location(&position) {
                        continue;
                    }
                    tracked.push_path(position, limit);
                    result.signals.push(Signal::Move {
                        id: flight.id.clone(),
                        from,
                        to: position,
                    });
                }
                Entry::Vacant(entry) => {
                    let marker =
                        surface.create(&flight.id, &position, normalize_degrees(position.heading));
                    let mut tracked = TrackedFlight {
                        snapshot: flight.clone(),
                        position,
                        marker,
                        missed_polls: 0,
                        recent_path: VecDeque::new(),
                    };
                    tracked.push_path(position, limit);
                    entry.insert(tracked);
                    result.signals.push(Signal::Create {
                        id: flight.id.clone(),
                        position,
                    });
                }
            }
        }

        result
    }

    /// Removes a flight and releases its marker. Returns whether it was tracked.
    pub fn remove<S>(&mut self, id: &str, surface: &mut S) -> bool
    where
        S: MarkerSurface<Handle = H>,
    {
        match self.flights.swap_remove(id) {
            Some(tracked) => {
                surface.remove(tracked.marker);
                true
            }
            None => false,
        }
    }

    /// Counts one more missed poll for every flight absent from `seen` and
    /// removes the ones that reached `stale_after_polls`. Returns the removed ids.
    pub fn sweep_absent<S>(&mut self, seen: &IndexSet<String>, surface: &mut S) -> Vec<String>
    where
        S: MarkerSurface<Handle = H>,
    {
        let stale_after = self.options.stale_after_polls;
        let mut stale = Vec::new();
        for (id, tracked) in self.flights.iter_mut() {
            if seen.contains(id) {
                tracked.missed_polls = 0;
                continue;
            }
            tracked.missed_polls += 1;
            if stale_after > 0 && tracked.missed_polls >= stale_after {
                stale.push(id.clone());
            }
        }

        for id in &stale {
            self.remove(id, surface);
            info!(id, missed_polls = stale_after, "Removed stale flight");
        }
        stale
    }

    pub fn get(&self, id: &str) -> Option<&TrackedFlight<H>> {
        self.flights.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.flights.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.flights.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TrackedFlight<H>)> {
        self.flights.iter().map(|(id, flight)| (id.as_str(), flight))
    }

    pub fn len(&self) -> usize {
        self.flights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flights.is_empty()
    }
}
