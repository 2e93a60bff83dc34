use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::telemetry::WirePosition;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    GeofenceEntry,
    GeofenceExit,
    SpeedViolation,
    ConnectionLost,
    ConnectionRestored,
    LowBattery,
    CriticalBattery,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::GeofenceEntry => "GEOFENCE_ENTRY",
            EventType::GeofenceExit => "GEOFENCE_EXIT",
            EventType::SpeedViolation => "SPEED_VIOLATION",
            EventType::ConnectionLost => "CONNECTION_LOST",
            EventType::ConnectionRestored => "CONNECTION_RESTORED",
            EventType::LowBattery => "LOW_BATTERY",
            EventType::CriticalBattery => "CRITICAL_BATTERY",
        }
    }

    pub fn category(&self) -> EventCategory {
        match self {
            EventType::GeofenceEntry | EventType::GeofenceExit | EventType::SpeedViolation => EventCategory::Safety,
            EventType::ConnectionLost | EventType::ConnectionRestored => EventCategory::System,
            EventType::LowBattery | EventType::CriticalBattery => EventCategory::Operational,
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventCategory {
    Safety,
    System,
    Operational,
}

/// Outbound row/message shape for one detected event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: Uuid,
    pub cart_id: String,
    pub event_type: EventType,
    pub event_category: EventCategory,
    pub severity: Severity,
    pub title: String,
    pub event_data: serde_json::Value,
    /// Last known position; absent when the cart never reported one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<WirePosition>,
    /// Epoch seconds.
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_geofence_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_are_screaming_snake() {
        let s = serde_json::to_string(&EventType::SpeedViolation).unwrap();
        assert_eq!(s, "\"SPEED_VIOLATION\"");
        let s = serde_json::to_string(&Severity::Critical).unwrap();
        assert_eq!(s, "\"CRITICAL\"");
        assert_eq!(EventType::ConnectionLost.as_str(), "CONNECTION_LOST");
    }

    #[test]
    fn severity_orders_by_urgency() {
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Error < Severity::Critical);
    }

    #[test]
    fn record_omits_empty_geofence() {
        let rec = EventRecord {
            id: Uuid::nil(),
            cart_id: "c1".into(),
            event_type: EventType::ConnectionLost,
            event_category: EventType::ConnectionLost.category(),
            severity: Severity::Warning,
            title: "Connection lost".into(),
            event_data: serde_json::json!({"offline_seconds": 125}),
            position: Some(WirePosition { lat: 1.0, lng: 2.0 }),
            timestamp: 100,
            related_geofence_id: None,
        };
        let v = serde_json::to_value(&rec).unwrap();
        assert!(v.get("related_geofence_id").is_none());
        assert_eq!(v["event_category"], "SYSTEM");
        assert_eq!(v["event_data"]["offline_seconds"], 125);
    }
}
