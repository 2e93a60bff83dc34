use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WirePosition {
    pub lat: f64,
    pub lng: f64,
}

/// Body of one telemetry publish. The cart id travels in the topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryPayload {
    pub position: WirePosition,
    #[serde(default)]
    pub heading: f64,
    pub speed: f64,
    pub battery_level: f64,
    /// Epoch seconds; fractional part allowed.
    pub timestamp: f64,
    /// Charger plugged in, when the cart reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charging: Option<bool>,
}

/// Payload plus the cart id it was keyed by. This is also the NDJSON line
/// format accepted by `fleetd run`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryMessage {
    pub cart_id: String,
    #[serde(flatten)]
    pub payload: TelemetryPayload,
}

impl TelemetryMessage {
    pub fn new(cart_id: impl Into<String>, payload: TelemetryPayload) -> Self {
        Self { cart_id: cart_id.into(), payload }
    }

    pub fn from_json_line(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line)
    }
}
