use crate::event::EventType;

pub const DEFAULT_PREFIX: &str = "dy/golfcart";

pub fn telemetry_topic(prefix: &str, cart_id: &str) -> String {
    format!("{}/cart/{}/telemetry", prefix, cart_id)
}

pub fn event_topic(prefix: &str, event_type: EventType) -> String {
    format!("{}/events/{}", prefix, event_type.as_str())
}

/// Extracts the cart id from `{prefix}/cart/{cart_id}/telemetry`.
pub fn cart_id_from_topic<'a>(prefix: &str, topic: &'a str) -> Option<&'a str> {
    let rest = topic.strip_prefix(prefix)?.strip_prefix("/cart/")?;
    let id = rest.strip_suffix("/telemetry")?;
    if id.is_empty() || id.contains('/') { return None; }
    Some(id)
}
