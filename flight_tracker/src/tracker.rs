use std::{ops::ControlFlow, path::PathBuf, time::Duration};

use flight_motion::{
    Animator, FlightRegistry, MarkerSurface, Signal, bearing,
    geo::{distance_km, normalize_degrees},
};
use itertools::Itertools;
use jiff::Timestamp;
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, interval},
};
use tracing::{debug, info, warn};
use tracing_unwrap::ResultExt;

use crate::{
    command::{Command, read_commands},
    config::TrackerConfig,
    error::ApplicationResult,
    feed::{Batch, FlightFeed, poll_feed},
    surface::{MarkerBoard, MarkerId},
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BatchSummary {
    pub created: usize,
    pub moved: usize,
    pub removed: usize,
}

/// Owns the registry, the animator and the marker board. Everything here is
/// mutated from the single event loop in [`run`].
#[derive(Debug)]
pub(crate) struct Tracker {
    registry: FlightRegistry<MarkerId>,
    animator: Animator,
    board: MarkerBoard,
    animation_duration: Duration,
    geojson_output: Option<PathBuf>,
    last_poll: Option<Timestamp>,
}

impl Tracker {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            registry: FlightRegistry::new(config.registry_options()),
            animator: Animator::new(),
            board: MarkerBoard::new(),
            animation_duration: config.animation_duration(),
            geojson_output: config.geojson_output.clone(),
            last_poll: None,
        }
    }

    pub fn apply_batch(&mut self, batch: &Batch, now: std::time::Instant) -> BatchSummary {
        let mut summary = BatchSummary::default();
        let result = self.registry.reconcile(&batch.flights, &mut self.board);

        for signal in &result.signals {
            match signal {
                Signal::Create { id, .. } => {
                    summary.created += 1;
                    if let Some(tracked) = self.registry.get(id) {
                        info!("New flight: {}", tracked.snapshot);
                    }
                }
                Signal::Move { id, from, to } => {
                    summary.moved += 1;
                    debug!(id, km = distance_km(from, to), "Flight moved");
                    let started =
                        self.animator
                            .animate(id, vec![*from, *to], self.animation_duration, now);
                    if started.is_none() {
                        // no animation configured, jump straight to the new position
                        self.animator.cancel_id(id);
                        if let Some(tracked) = self.registry.get(id) {
                            self.board
                                .set_position(&tracked.marker, to.longitude, to.latitude);
                            self.board.set_heading(&tracked.marker, bearing(from, to));
                        }
                    }
                }
            }
        }

        for id in self.registry.sweep_absent(&result.seen, &mut self.board) {
            self.animator.cancel_id(&id);
            summary.removed += 1;
        }

        self.last_poll = Some(batch.fetched_at);
        info!(
            fetched_at = %batch.fetched_at,
            created = summary.created,
            moved = summary.moved,
            removed = summary.removed,
            markers = self.board.len(),
            "Active Flights: {}",
            self.registry.len()
        );

        if let Some(path) = &self.geojson_output
            && let Err(e) = self.board.write_geojson(path, &self.registry)
        {
            warn!(path = ?path, "Failed to write GeoJSON: {}", e);
        }
        summary
    }

    /// Advances the animations and pushes the frames to the markers.
    pub fn render_frame(&mut self, now: std::time::Instant) -> usize {
        let frames = self.animator.tick(now);
        for frame in &frames {
            let Some(tracked) = self.registry.get(&frame.id) else {
                continue;
            };
            self.board
                .set_position(&tracked.marker, frame.longitude, frame.latitude);
            self.board.set_heading(&tracked.marker, frame.heading);
        }
        frames.len()
    }

    pub fn is_animating(&self) -> bool {
        !self.animator.is_empty()
    }

    pub fn remove(&mut self, id: &str) -> bool {
        self.animator.cancel_id(id);
        self.registry.remove(id, &mut self.board)
    }

    pub fn describe(&self, id: &str) -> Option<String> {
        let tracked = self.registry.get(id)?;
        let path = tracked
            .recent_path
            .iter()
            .map(|p| format!("({:.4}, {:.4})", p.latitude, p.longitude))
            .join(" -> ");
        let heading = self
            .board
            .get(&tracked.marker)
            .map_or(normalize_degrees(tracked.position.heading), |m| m.heading);
        Some(format!(
            "{}\nMarker heading: {:.1}°\nRecent path: {}",
            tracked.snapshot, heading, path
        ))
    }

    pub fn list(&self) -> String {
        let last_poll = self
            .last_poll
            .map_or_else(|| "never".to_string(), |ts| ts.to_string());
        let flights = self.registry.ids().sorted().join(", ");
        format!(
            "Active Flights: {} (last poll: {})\n{}",
            self.registry.len(),
            last_poll,
            flights
        )
    }

    pub fn handle_command(
        &mut self,
        command: Command,
        refresh: &mpsc::Sender<()>,
    ) -> ControlFlow<()> {
        match command {
            Command::Refresh => {
                // a full channel means a refresh is already pending
                let _ = refresh.try_send(());
            }
            Command::Remove(id) => {
                if self.remove(&id) {
                    info!(id, "Removed flight on request");
                } else {
                    warn!(id, "Unknown flight");
                }
            }
            Command::Track(id) => match self.describe(&id) {
                Some(description) => println!("{description}"),
                None => warn!(id, "Unknown flight"),
            },
            Command::List => println!("{}", self.list()),
            Command::Quit => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }
}

/// Channels feeding the event loop.
pub(crate) struct Inputs {
    pub batches: mpsc::Receiver<Batch>,
    pub commands: mpsc::Receiver<Command>,
    pub refresh: mpsc::Sender<()>,
    pub frame_interval: Duration,
}

/// Runs until quit, until `shutdown` resolves or until the poll task ends.
/// `shutdown` is created once by the caller and polled across iterations.
pub(crate) async fn event_loop<F>(
    tracker: &mut Tracker,
    inputs: Inputs,
    poller: &mut JoinHandle<()>,
    shutdown: F,
) -> ApplicationResult<()>
where
    F: Future<Output = ()>,
{
    let Inputs {
        mut batches,
        mut commands,
        refresh,
        frame_interval,
    } = inputs;
    let mut frames = interval(frame_interval);
    frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            Some(batch) = batches.recv() => {
                tracker.apply_batch(&batch, Instant::now().into_std());
            }
            _ = frames.tick(), if tracker.is_animating() => {
                tracker.render_frame(Instant::now().into_std());
            }
            Some(command) = commands.recv() => {
                if tracker.handle_command(command, &refresh).is_break() {
                    info!("Quit requested");
                    return Ok(());
                }
            }
            joined = &mut *poller => {
                warn!("Poll task stopped");
                return joined.map_err(Into::into);
            }
            () = &mut shutdown => {
                info!("Shutting down");
                return Ok(());
            }
        }
    }
}

pub(crate) async fn run(config: TrackerConfig) -> ApplicationResult<()> {
    let feed = FlightFeed::new(&config)?;
    let (batch_tx, batch_rx) = mpsc::channel(4);
    let (refresh_tx, refresh_rx) = mpsc::channel(1);
    let (command_tx, command_rx) = mpsc::channel(8);

    let mut poller = tokio::spawn(poll_feed(feed, config.poll_interval(), refresh_rx, batch_tx));
    let reader = tokio::spawn(read_commands(command_tx));

    let mut tracker = Tracker::new(&config);
    info!(
        endpoint = config.endpoint,
        poll_interval_ms = config.poll_interval_ms,
        "Tracking flights"
    );

    let inputs = Inputs {
        batches: batch_rx,
        commands: command_rx,
        refresh: refresh_tx,
        frame_interval: config.frame_interval(),
    };
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect_or_log("Failed to listen for Ctrl-C");
    };
    let result = event_loop(&mut tracker, inputs, &mut poller, ctrl_c).await;

    poller.abort();
    reader.abort();
    result
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use flight_motion::{FlightSnapshot, GeoPosition};
    use tracing_test::traced_test;

    use super::*;

    fn batch(flights: Vec<FlightSnapshot>) -> Batch {
        Batch {
            flights,
            fetched_at: Timestamp::now(),
        }
    }

    fn flight(id: &str, lng: f64, lat: f64) -> FlightSnapshot {
        FlightSnapshot::new(id, Some(GeoPosition::new(lng, lat)))
    }

    fn marker_of(tracker: &Tracker, id: &str) -> (f64, f64, f64) {
        let tracked = tracker.registry.get(id).unwrap();
        let marker = tracker.board.get(&tracked.marker).unwrap();
        (marker.longitude, marker.latitude, marker.heading)
    }

    #[test]
    fn test_move_glides_marker() {
        let mut tracker = Tracker::new(&TrackerConfig::new_for_test());
        let start = Instant::now();
        let summary = tracker.apply_batch(&batch(vec![flight("A", 0.0, 0.0)]), start);
        assert_eq!(summary.created, 1);
        assert_eq!(marker_of(&tracker, "A"), (0.0, 0.0, 0.0));

        let summary = tracker.apply_batch(&batch(vec![flight("A", 10.0, 0.0)]), start);
        assert_eq!(summary.moved, 1);
        assert!(tracker.is_animating());

        // default animation lasts 5 seconds
        assert_eq!(tracker.render_frame(start + Duration::from_millis(2500)), 1);
        assert_eq!(marker_of(&tracker, "A"), (5.0, 0.0, 90.0));

        tracker.render_frame(start + Duration::from_secs(6));
        assert_eq!(marker_of(&tracker, "A").0, 10.0);
        assert!(!tracker.is_animating());
    }

    #[test]
    fn test_zero_animation_duration_jumps() {
        let mut config = TrackerConfig::new_for_test();
        config.animation_duration_ms = 0;
        let mut tracker = Tracker::new(&config);
        let now = Instant::now();
        tracker.apply_batch(&batch(vec![flight("A", 0.0, 0.0)]), now);
        tracker.apply_batch(&batch(vec![flight("A", 0.0, 1.0)]), now);
        assert!(!tracker.is_animating());
        assert_eq!(marker_of(&tracker, "A"), (0.0, 1.0, 0.0));
    }

    #[test]
    fn test_stale_flight_removed_and_animation_cancelled() {
        let mut config = TrackerConfig::new_for_test();
        config.stale_after_polls = 1;
        let mut tracker = Tracker::new(&config);
        let now = Instant::now();
        tracker.apply_batch(&batch(vec![flight("A", 0.0, 0.0)]), now);
        tracker.apply_batch(&batch(vec![flight("A", 1.0, 0.0)]), now);
        assert!(tracker.is_animating());

        let summary = tracker.apply_batch(&batch(vec![]), now);
        assert_eq!(summary.removed, 1);
        assert!(!tracker.is_animating());
        assert_eq!(tracker.board.len(), 0);
    }

    #[test]
    #[traced_test]
    fn test_commands() {
        let mut tracker = Tracker::new(&TrackerConfig::new_for_test());
        tracker.apply_batch(
            &batch(vec![flight("B", 1.0, 1.0), flight("A", 2.0, 2.0)]),
            Instant::now(),
        );
        assert!(logs_contain("Active Flights: 2"));
        assert!(tracker.list().ends_with("A, B"));
        assert!(tracker.describe("A").unwrap().starts_with("A | Airline: Unknown"));

        let (refresh_tx, mut refresh_rx) = mpsc::channel(1);
        assert!(tracker.handle_command(Command::Refresh, &refresh_tx).is_continue());
        assert!(tracker.handle_command(Command::Refresh, &refresh_tx).is_continue());
        assert_eq!(refresh_rx.try_recv(), Ok(()));
        assert!(refresh_rx.try_recv().is_err());

        tracker.handle_command(Command::Remove("A".into()), &refresh_tx);
        assert!(tracker.describe("A").is_none());
        tracker.handle_command(Command::Remove("A".into()), &refresh_tx);
        assert!(logs_contain("Unknown flight"));

        assert!(tracker.handle_command(Command::Quit, &refresh_tx).is_break());
    }

    #[test]
    fn test_geojson_written_after_poll() {
        let path = std::env::temp_dir()
            .join(format!("flight_tracker_{}.geojson", std::process::id()));
        let mut config = TrackerConfig::new_for_test();
        config.geojson_output = Some(path.clone());
        let mut tracker = Tracker::new(&config);
        tracker.apply_batch(&batch(vec![flight("A", 2.0, 2.0)]), Instant::now());

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["features"][0]["properties"]["flight_id"], "A");
        std::fs::remove_file(path).unwrap();
    }

    #[tokio::test]
    async fn test_event_loop_keeps_one_shutdown_listener() {
        let mut tracker = Tracker::new(&TrackerConfig::new_for_test());
        let (batch_tx, batch_rx) = mpsc::channel(4);
        let (_command_tx, command_rx) = mpsc::channel(1);
        let (refresh_tx, _refresh_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        let mut poller = tokio::spawn(std::future::pending::<()>());

        let inputs = Inputs {
            batches: batch_rx,
            commands: command_rx,
            refresh: refresh_tx,
            frame_interval: Duration::from_millis(5),
        };
        let shutdown = async {
            let _ = shutdown_rx.await;
        };
        let driver = async move {
            batch_tx.send(batch(vec![flight("A", 0.0, 0.0)])).await.unwrap();
            tokio::time::sleep(Duration::from_millis(30)).await;
            batch_tx.send(batch(vec![flight("A", 1.0, 0.0)])).await.unwrap();
            tokio::time::sleep(Duration::from_millis(30)).await;
            // fired after the loop went round several times
            shutdown_tx.send(()).unwrap();
        };
        let (result, ()) = tokio::join!(
            event_loop(&mut tracker, inputs, &mut poller, shutdown),
            driver
        );

        assert!(result.is_ok());
        assert!(tracker.is_animating());
        assert_eq!(tracker.registry.len(), 1);
        poller.abort();
    }
}
