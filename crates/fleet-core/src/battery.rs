use fleet_proto::event::{EventType, Severity};
use serde_json::json;

use crate::cart::Cart;
use crate::config::EngineConfig;
use crate::event::ViolationEvent;
use crate::normalize::Sample;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum BatteryBand {
    #[default]
    Normal,
    Low,
    Critical,
}

/// Alerts once per low-battery episode. An episode ends when the level is
/// back at or above the low threshold.
#[derive(Debug, Clone)]
pub struct BatteryMonitor {
    low_pct: f64,
    critical_pct: f64,
}

impl BatteryMonitor {
    pub fn new(cfg: &EngineConfig) -> Self {
        Self { low_pct: cfg.battery_low_pct, critical_pct: cfg.battery_critical_pct }
    }

    pub fn band(&self, level: f64) -> BatteryBand {
        if level < self.critical_pct {
            BatteryBand::Critical
        } else if level < self.low_pct {
            BatteryBand::Low
        } else {
            BatteryBand::Normal
        }
    }

    pub fn check(&self, reported: &mut BatteryBand, cart: &Cart, sample: &Sample) -> Option<ViolationEvent> {
        let band = self.band(sample.battery_level);
        if band == BatteryBand::Normal {
            *reported = BatteryBand::Normal;
            return None;
        }
        if band <= *reported {
            return None;
        }
        *reported = band;
        let (event_type, severity, threshold) = match band {
            BatteryBand::Critical => (EventType::CriticalBattery, Severity::Critical, self.critical_pct),
            _ => (EventType::LowBattery, Severity::Warning, self.low_pct),
        };
        Some(ViolationEvent::new(
            &cart.id,
            event_type,
            severity,
            Some(sample.position),
            sample.timestamp,
            None,
            json!({ "battery_level": sample.battery_level, "threshold": threshold }),
        ))
    }
}
