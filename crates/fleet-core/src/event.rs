use fleet_geo::LatLng;
use fleet_proto::event::{EventRecord, EventType, Severity};
use fleet_proto::telemetry::WirePosition;
use time::OffsetDateTime;
use uuid::Uuid;

const EVENT_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2b3e_8d4a_5e7f_9a0b_1c2d_3e4f_5a6b);

/// Immutable once built. The id is derived from the event's identity so
/// re-evaluating the same sample produces the same id.
#[derive(Debug, Clone, PartialEq)]
pub struct ViolationEvent {
    pub id: Uuid,
    pub cart_id: String,
    pub event_type: EventType,
    pub severity: Severity,
    pub position: Option<LatLng>,
    pub timestamp: OffsetDateTime,
    pub geofence_id: Option<String>,
    pub payload: serde_json::Value,
}

impl ViolationEvent {
    pub fn new(
        cart_id: &str,
        event_type: EventType,
        severity: Severity,
        position: Option<LatLng>,
        timestamp: OffsetDateTime,
        geofence_id: Option<&str>,
        payload: serde_json::Value,
    ) -> Self {
        let key = format!(
            "{}|{}|{}|{}",
            cart_id,
            event_type.as_str(),
            geofence_id.unwrap_or("-"),
            timestamp.unix_timestamp_nanos()
        );
        Self {
            id: Uuid::new_v5(&EVENT_NAMESPACE, key.as_bytes()),
            cart_id: cart_id.to_string(),
            event_type,
            severity,
            position,
            timestamp,
            geofence_id: geofence_id.map(str::to_string),
            payload,
        }
    }

    pub fn title(&self) -> String {
        let fence = self.geofence_id.as_deref().unwrap_or("");
        match self.event_type {
            EventType::GeofenceEntry => format!("Cart {} entered geofence {}", self.cart_id, fence),
            EventType::GeofenceExit => format!("Cart {} left geofence {}", self.cart_id, fence),
            EventType::SpeedViolation => format!("Cart {} over speed limit in {}", self.cart_id, fence),
            EventType::ConnectionLost => format!("Cart {} connection lost", self.cart_id),
            EventType::ConnectionRestored => format!("Cart {} connection restored", self.cart_id),
            EventType::LowBattery => format!("Cart {} battery low", self.cart_id),
            EventType::CriticalBattery => format!("Cart {} battery critical", self.cart_id),
        }
    }

    pub fn to_record(&self) -> EventRecord {
        EventRecord {
            id: self.id,
            cart_id: self.cart_id.clone(),
            event_type: self.event_type,
            event_category: self.event_type.category(),
            severity: self.severity,
            title: self.title(),
            event_data: self.payload.clone(),
            position: self.position.map(|p| WirePosition { lat: p.lat, lng: p.lng }),
            timestamp: self.timestamp.unix_timestamp(),
            related_geofence_id: self.geofence_id.clone(),
        }
    }
}
