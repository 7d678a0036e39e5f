use std::time::{Duration, Instant};

use indexmap::IndexMap;
use tracing::{debug, trace};

use crate::geo::{GeoPosition, bearing, lerp};

/// Position and heading a marker should show for one animation tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub id: String,
    pub longitude: f64,
    pub latitude: f64,
    pub heading: f64,
    /// Last frame of the animation, snapped to the final path point.
    pub finished: bool,
}

/// Refers to one specific `animate` call. Once a newer animation for the same
/// id has started, the handle no longer cancels anything.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AnimationHandle {
    id: String,
    generation: u64,
}

impl AnimationHandle {
    pub fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug)]
struct Animation {
    path: Vec<GeoPosition>,
    duration: Duration,
    started: Instant,
    generation: u64,
}

/// Interpolated `(longitude, latitude, heading)` at `progress` in `[0, 1]`.
///
/// The duration is split evenly over the segments by index, so a short
/// segment takes as long as a long one. Progress at or beyond 1 snaps to the
/// last point. Returns `None` when `path` holds fewer than two points.
pub fn sample_path(path: &[GeoPosition], progress: f64) -> Option<(f64, f64, f64)> {
    if path.len() < 2 {
        return None;
    }
    let segments = path.len() - 1;
    let progress = progress.clamp(0.0, 1.0);
    let scaled = progress * segments as f64;
    let index = (scaled.floor() as usize).min(segments);

    if index >= segments {
        let from = &path[segments - 1];
        let to = &path[segments];
        return Some((to.longitude, to.latitude, bearing(from, to)));
    }

    let from = &path[index];
    let to = &path[index + 1];
    let t = scaled - index as f64;
    Some((
        lerp(from.longitude, to.longitude, t),
        lerp(from.latitude, to.latitude, t),
        bearing(from, to),
    ))
}

/// Drives marker animations from an external tick, at most one per flight id.
#[derive(Debug, Default)]
pub struct Animator {
    active: IndexMap<String, Animation>,
    next_generation: u64,
}

impl Animator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts gliding `id` along `path` over `duration`, replacing any
    /// animation already running for that id.
    ///
    /// Paths shorter than two points and a zero duration are ignored and
    /// leave a running animation untouched.
    pub fn animate(
        &mut self,
        id: &str,
        path: Vec<GeoPosition>,
        duration: Duration,
        now: Instant,
    ) -> Option<AnimationHandle> {
        if path.len() < 2 || duration.is_zero() {
            debug!(
                id,
                points = path.len(),
                ?duration,
                "Ignoring animation request"
            );
            return None;
        }

        self.next_generation += 1;
        let generation = self.next_generation;
        let replaced = self.active.insert(
            id.to_string(),
            Animation {
                path,
                duration,
                started: now,
                generation,
            },
        );
        if replaced.is_some() {
            trace!(id, "Superseded running animation");
        }

        Some(AnimationHandle {
            id: id.to_string(),
            generation,
        })
    }

    /// Cancels the animation behind `handle` if it is still the current one.
    pub fn cancel(&mut self, handle: &AnimationHandle) -> bool {
        match self.active.get(&handle.id) {
            Some(animation) if animation.generation == handle.generation => {
                self.active.swap_remove(&handle.id);
                true
            }
            _ => false,
        }
    }

    /// Cancels whatever animation is running for `id`.
    pub fn cancel_id(&mut self, id: &str) -> bool {
        self.active.swap_remove(id).is_some()
    }

    /// Advances every running animation to `now`. Finished animations emit
    /// their final frame and are dropped.
    pub fn tick(&mut self, now: Instant) -> Vec<Frame> {
        let mut frames = Vec::with_capacity(self.active.len());
        self.active.retain(|id, animation| {
            let elapsed = now.saturating_duration_since(animation.started);
            let finished = elapsed >= animation.duration;
            let progress = if finished {
                1.0
            } else {
                elapsed.as_secs_f64() / animation.duration.as_secs_f64()
            };
            let Some((longitude, latitude, heading)) = sample_path(&animation.path, progress)
            else {
                return false;
            };
            frames.push(Frame {
                id: id.clone(),
                longitude,
                latitude,
                heading,
                finished,
            });
            !finished
        });
        frames
    }

    pub fn is_animating(&self, id: &str) -> bool {
        self.active.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}
