use std::collections::BTreeSet;

use fleet_geo::{FenceLookup, Geofence};
use fleet_proto::event::{EventType, Severity};
use serde_json::json;

use crate::cart::Cart;
use crate::event::ViolationEvent;
use crate::normalize::Sample;

/// Ids of the fences a cart is currently inside. Sorted, so events come out
/// in a stable order regardless of how the index iterates.
pub type Membership = BTreeSet<String>;

#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// Entries, then exits, then speed violations.
    pub events: Vec<ViolationEvent>,
    pub membership: Membership,
    /// Fences in the previous membership that the index no longer knows.
    pub unknown_fences: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ViolationDetector {
    critical_multiplier: f64,
}

impl ViolationDetector {
    pub fn new(critical_multiplier: f64) -> Self {
        Self { critical_multiplier }
    }

    /// Pure: same inputs give the same events and membership.
    pub fn evaluate(&self, index: &dyn FenceLookup, cart: &Cart, sample: &Sample, previous: &Membership) -> Evaluation {
        let mut inside: Vec<&Geofence> = index.containing(&cart.golf_course_id, sample.position);
        inside.sort_by(|a, b| a.id.cmp(&b.id));
        let membership: Membership = inside.iter().map(|f| f.id.clone()).collect();

        let mut events = Vec::new();
        let mut unknown_fences = Vec::new();

        for fence in inside.iter().filter(|f| !previous.contains(&f.id)) {
            let severity = if fence.fence_type.is_forbidden() { Severity::Critical } else { Severity::Info };
            events.push(self.event(cart, sample, EventType::GeofenceEntry, severity, fence, json!({
                "geofence_id": fence.id,
                "geofence_name": fence.name,
                "fence_type": fence.fence_type.as_str(),
                "alert": fence.alert_on_entry,
                "speed": sample.speed,
            })));
        }

        for fence_id in previous.difference(&membership) {
            let Some(fence) = index.get(fence_id) else {
                unknown_fences.push(fence_id.clone());
                continue;
            };
            events.push(self.event(cart, sample, EventType::GeofenceExit, Severity::Info, fence, json!({
                "geofence_id": fence.id,
                "geofence_name": fence.name,
                "fence_type": fence.fence_type.as_str(),
                "alert": fence.alert_on_exit,
            })));
        }

        for fence in &inside {
            let Some(limit) = fence.speed_limit else { continue };
            if sample.speed <= limit { continue; }
            // Severity is graded on whole km/h, the unit shown to operators.
            let severity = if sample.speed.trunc() > limit * self.critical_multiplier { Severity::Critical } else { Severity::Warning };
            events.push(self.event(cart, sample, EventType::SpeedViolation, severity, fence, json!({
                "geofence_id": fence.id,
                "geofence_name": fence.name,
                "speed": sample.speed,
                "speed_limit": limit,
                "excess": sample.speed - limit,
            })));
        }

        Evaluation { events, membership, unknown_fences }
    }

    fn event(&self, cart: &Cart, sample: &Sample, event_type: EventType, severity: Severity, fence: &Geofence, payload: serde_json::Value) -> ViolationEvent {
        ViolationEvent::new(&cart.id, event_type, severity, Some(sample.position), sample.timestamp, Some(&fence.id), payload)
    }
}
