pub mod animator;
pub mod geo;
pub mod marker;
pub mod registry;
pub mod snapshot;

pub use animator::{AnimationHandle, Animator, Frame};
pub use geo::{GeoPosition, bearing};
pub use marker::MarkerSurface;
pub use registry::{FlightRegistry, ReconcileResult, RegistryOptions, Signal, TrackedFlight};
pub use snapshot::FlightSnapshot;
