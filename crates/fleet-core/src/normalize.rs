use fleet_geo::LatLng;
use fleet_proto::telemetry::TelemetryMessage;
use time::OffsetDateTime;

use crate::config::EngineConfig;
use crate::error::{FleetError, TelemetryFault};

/// A telemetry reading that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub cart_id: String,
    pub timestamp: OffsetDateTime,
    pub position: LatLng,
    /// Degrees in [0, 360).
    pub heading: f64,
    /// km/h
    pub speed: f64,
    pub battery_level: f64,
    pub charging: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct Normalizer {
    max_skew: time::Duration,
    resolution_ms: i128,
    max_speed: f64,
}

impl Normalizer {
    pub fn new(cfg: &EngineConfig) -> Self {
        Self {
            max_skew: cfg.max_clock_skew(),
            resolution_ms: cfg.sample_resolution_ms.max(1) as i128,
            max_speed: cfg.max_speed_kmh,
        }
    }

    pub fn normalize(&self, msg: &TelemetryMessage, now: OffsetDateTime) -> Result<Sample, FleetError> {
        let id = msg.cart_id.as_str();
        let p = &msg.payload;
        let fail = |fault| Err(FleetError::invalid(id, fault));

        if id.trim().is_empty() { return fail(TelemetryFault::EmptyCartId); }

        for (name, v) in [
            ("lat", p.position.lat),
            ("lng", p.position.lng),
            ("heading", p.heading),
            ("speed", p.speed),
            ("battery_level", p.battery_level),
            ("timestamp", p.timestamp),
        ] {
            if !v.is_finite() { return fail(TelemetryFault::NonFinite(name)); }
        }

        if !(-90.0..=90.0).contains(&p.position.lat) {
            return fail(TelemetryFault::LatitudeOutOfRange(p.position.lat));
        }
        if !(-180.0..=180.0).contains(&p.position.lng) {
            return fail(TelemetryFault::LongitudeOutOfRange(p.position.lng));
        }
        if p.speed < 0.0 { return fail(TelemetryFault::NegativeSpeed(p.speed)); }
        if p.speed > self.max_speed {
            return fail(TelemetryFault::SpeedAboveMax { speed: p.speed, max: self.max_speed });
        }
        if !(0.0..=100.0).contains(&p.battery_level) {
            return fail(TelemetryFault::BatteryOutOfRange(p.battery_level));
        }

        let timestamp = match self.truncate(p.timestamp) {
            Some(ts) => ts,
            None => return fail(TelemetryFault::BadTimestamp(p.timestamp)),
        };
        if timestamp - now > self.max_skew {
            return fail(TelemetryFault::TimestampInFuture { ahead_s: (timestamp - now).whole_seconds() });
        }

        Ok(Sample {
            cart_id: msg.cart_id.clone(),
            timestamp,
            position: LatLng::new(p.position.lat, p.position.lng),
            heading: p.heading.rem_euclid(360.0),
            speed: p.speed,
            battery_level: p.battery_level,
            charging: p.charging,
        })
    }

    // Epoch seconds -> timestamp floored to the configured resolution.
    fn truncate(&self, epoch_s: f64) -> Option<OffsetDateTime> {
        if epoch_s < 0.0 || epoch_s > 1e12 { return None; }
        let ms = (epoch_s * 1000.0).floor() as i128;
        let ms = ms - ms.rem_euclid(self.resolution_ms);
        OffsetDateTime::from_unix_timestamp_nanos(ms * 1_000_000).ok()
    }
}
