use fleet_geo::LatLng;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CartStatus {
    #[default]
    Idle,
    Running,
    Charging,
    Maintenance,
    Offline,
}

impl CartStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CartStatus::Idle => "IDLE",
            CartStatus::Running => "RUNNING",
            CartStatus::Charging => "CHARGING",
            CartStatus::Maintenance => "MAINTENANCE",
            CartStatus::Offline => "OFFLINE",
        }
    }
}

impl std::fmt::Display for CartStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CartMode {
    #[default]
    Manual,
    Autonomous,
}

fn default_active() -> bool { true }

/// Cart row as read from the fleet store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartRecord {
    pub id: String,
    pub golf_course_id: String,
    #[serde(default)]
    pub status: CartStatus,
    #[serde(default)]
    pub mode: CartMode,
    #[serde(default = "default_active")]
    pub active: bool,
}

/// Live state of one cart. Only the state machine and the sweep mutate it.
#[derive(Debug, Clone)]
pub struct Cart {
    pub id: String,
    pub golf_course_id: String,
    pub mode: CartMode,
    pub active: bool,
    pub status: CartStatus,
    pub last_ping: Option<OffsetDateTime>,
    pub position: Option<LatLng>,
    pub speed: f64,
    pub battery_level: Option<f64>,
    /// Timestamp of the sample `position` and `speed` came from.
    pub sample_ts: Option<OffsetDateTime>,
    pub stationary_since: Option<OffsetDateTime>,
    /// Status held before the sweep marked the cart OFFLINE.
    pub resume_status: Option<CartStatus>,
    pub offline_reported: bool,
}

impl Cart {
    /// A stored OFFLINE is not carried over: liveness starts from the first
    /// ping, so a restore is only published after a reported loss.
    pub fn from_record(rec: CartRecord) -> Self {
        let status = match rec.status {
            CartStatus::Offline => CartStatus::Idle,
            s => s,
        };
        Self {
            id: rec.id,
            golf_course_id: rec.golf_course_id,
            mode: rec.mode,
            active: rec.active,
            status,
            last_ping: None,
            position: None,
            speed: 0.0,
            battery_level: None,
            sample_ts: None,
            stationary_since: None,
            resume_status: None,
            offline_reported: false,
        }
    }

    pub fn new(id: &str, golf_course_id: &str) -> Self {
        Self::from_record(CartRecord {
            id: id.to_string(),
            golf_course_id: golf_course_id.to_string(),
            status: CartStatus::Idle,
            mode: CartMode::Manual,
            active: true,
        })
    }
}
