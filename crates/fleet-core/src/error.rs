use fleet_geo::GeometryError;

/// Why a telemetry sample was refused.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TelemetryFault {
    #[error("empty cart id")]
    EmptyCartId,
    #[error("{0} is not a finite number")]
    NonFinite(&'static str),
    #[error("latitude {0} outside [-90, 90]")]
    LatitudeOutOfRange(f64),
    #[error("longitude {0} outside [-180, 180]")]
    LongitudeOutOfRange(f64),
    #[error("negative speed {0}")]
    NegativeSpeed(f64),
    #[error("speed {speed} above plausible maximum {max}")]
    SpeedAboveMax { speed: f64, max: f64 },
    #[error("battery level {0} outside [0, 100]")]
    BatteryOutOfRange(f64),
    #[error("timestamp {ahead_s}s ahead of server clock")]
    TimestampInFuture { ahead_s: i64 },
    #[error("timestamp {0} not representable")]
    BadTimestamp(f64),
}

#[derive(Debug, thiserror::Error)]
pub enum FleetError {
    #[error("invalid telemetry for cart {cart_id}: {fault}")]
    InvalidTelemetry { cart_id: String, fault: TelemetryFault },
    #[error("unknown cart {0}")]
    UnknownCart(String),
    #[error("cart {0} is deactivated")]
    InactiveCart(String),
    #[error("unknown geofence {0}")]
    UnknownGeofence(String),
    #[error("geofence {fence_id}: {source}")]
    Geometry { fence_id: String, #[source] source: GeometryError },
    #[error("event sink: {0}")]
    Sink(String),
    #[error("fleet is shutting down")]
    Shutdown,
}

impl FleetError {
    pub fn invalid(cart_id: &str, fault: TelemetryFault) -> Self {
        FleetError::InvalidTelemetry { cart_id: cart_id.to_string(), fault }
    }

    /// Bad input from a cart; the sample is dropped.
    pub fn is_validation(&self) -> bool {
        matches!(self, FleetError::InvalidTelemetry { .. })
    }

    /// Referential miss; a warning for the caller, never fatal to a lane.
    pub fn is_lookup_miss(&self) -> bool {
        matches!(self, FleetError::UnknownCart(_) | FleetError::InactiveCart(_) | FleetError::UnknownGeofence(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds() {
        let e = FleetError::invalid("c1", TelemetryFault::LatitudeOutOfRange(200.0));
        assert!(e.is_validation());
        assert!(!e.is_lookup_miss());
        assert_eq!(e.to_string(), "invalid telemetry for cart c1: latitude 200 outside [-90, 90]");
        assert!(FleetError::UnknownCart("x".into()).is_lookup_miss());
        assert!(!FleetError::Shutdown.is_validation());
    }
}
