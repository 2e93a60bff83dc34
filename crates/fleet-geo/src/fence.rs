use serde::{Deserialize, Serialize};

use crate::geometry::{LatLng, Ring};
use crate::GeometryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FenceType {
    Restricted,
    SlowZone,
    NoEntry,
    Hazard,
    Parking,
}

impl FenceType {
    /// Zones a cart must never be inside.
    pub fn is_forbidden(&self) -> bool {
        matches!(self, FenceType::NoEntry | FenceType::Hazard)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FenceType::Restricted => "RESTRICTED",
            FenceType::SlowZone => "SLOW_ZONE",
            FenceType::NoEntry => "NO_ENTRY",
            FenceType::Hazard => "HAZARD",
            FenceType::Parking => "PARKING",
        }
    }
}

fn default_active() -> bool { true }

/// Geofence row as it comes out of the course store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeofenceRecord {
    pub id: String,
    pub golf_course_id: String,
    #[serde(default)]
    pub name: String,
    pub fence_type: FenceType,
    pub polygon: Vec<LatLng>,
    /// km/h
    #[serde(default)]
    pub speed_limit: Option<f64>,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub alert_on_entry: bool,
    #[serde(default)]
    pub alert_on_exit: bool,
}

#[derive(Debug, Clone)]
pub struct Geofence {
    pub id: String,
    pub golf_course_id: String,
    pub name: String,
    pub fence_type: FenceType,
    pub ring: Ring,
    pub speed_limit: Option<f64>,
    pub alert_on_entry: bool,
    pub alert_on_exit: bool,
}

impl Geofence {
    pub fn from_record(rec: GeofenceRecord) -> Result<Self, GeometryError> {
        if let Some(limit) = rec.speed_limit {
            if !limit.is_finite() || limit < 0.0 {
                return Err(GeometryError::InvalidSpeedLimit(limit));
            }
        }
        let ring = Ring::new(rec.polygon)?;
        Ok(Self {
            id: rec.id,
            golf_course_id: rec.golf_course_id,
            name: rec.name,
            fence_type: rec.fence_type,
            ring,
            speed_limit: rec.speed_limit,
            alert_on_entry: rec.alert_on_entry,
            alert_on_exit: rec.alert_on_exit,
        })
    }

    pub fn contains(&self, p: LatLng) -> bool {
        self.ring.contains(p)
    }
}
