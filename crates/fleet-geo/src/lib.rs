pub mod doctor;
pub mod fence;
pub mod geometry;
pub mod index;

pub use fence::{FenceType, Geofence, GeofenceRecord};
pub use geometry::{BoundingBox, LatLng, Ring};
pub use index::{build_index, FenceLookup, FenceSet, IndexKind, Rejected};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeometryError {
    #[error("polygon has {0} distinct vertices, need at least 3")]
    TooFewVertices(usize),
    #[error("vertex {index} out of range (lat={lat}, lng={lng})")]
    CoordinateOutOfRange { index: usize, lat: f64, lng: f64 },
    #[error("vertex {0} is not a finite coordinate")]
    NonFinite(usize),
    #[error("invalid speed limit {0}")]
    InvalidSpeedLimit(f64),
    #[error("duplicate geofence id {0}")]
    DuplicateFence(String),
}
