use crate::geo::GeoPosition;

/// Rendering surface that owns the on-screen markers.
///
/// The registry and animator only ever talk to markers through this trait, so
/// the handle type is whatever the surface needs to find its marker again.
pub trait MarkerSurface {
    type Handle;

    fn create(&mut self, id: &str, at: &GeoPosition, heading: f64) -> Self::Handle;

    fn set_position(&mut self, handle: &Self::Handle, longitude: f64, latitude: f64);

    fn set_heading(&mut self, handle: &Self::Handle, degrees: f64);

    fn remove(&mut self, handle: Self::Handle);
}
