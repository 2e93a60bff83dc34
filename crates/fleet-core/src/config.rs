use fleet_geo::IndexKind;
use serde::Deserialize;

/// `[engine]` section. Every key is optional.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// No telemetry for longer than this marks a cart OFFLINE.
    pub offline_threshold_s: u64,
    /// RUNNING carts reporting zero speed for this long become IDLE.
    pub running_dwell_s: u64,
    /// Speed above `limit * multiplier` is a CRITICAL violation.
    pub speed_violation_critical_multiplier: f64,
    /// How far a sample timestamp may be ahead of the server clock.
    pub max_clock_skew_s: u64,
    /// Sample timestamps are truncated to this resolution.
    pub sample_resolution_ms: u64,
    pub max_speed_kmh: f64,
    pub battery_low_pct: f64,
    pub battery_critical_pct: f64,
    pub sweep_interval_s: u64,
    pub lanes: usize,
    pub lane_queue: usize,
    pub index: IndexKind,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            offline_threshold_s: 120,
            running_dwell_s: 60,
            speed_violation_critical_multiplier: 1.5,
            max_clock_skew_s: 30,
            sample_resolution_ms: 1000,
            max_speed_kmh: 30.0,
            battery_low_pct: 20.0,
            battery_critical_pct: 10.0,
            sweep_interval_s: 15,
            lanes: 8,
            lane_queue: 256,
            index: IndexKind::Bbox,
        }
    }
}

impl EngineConfig {
    pub fn offline_threshold(&self) -> time::Duration {
        time::Duration::seconds(self.offline_threshold_s as i64)
    }

    pub fn running_dwell(&self) -> time::Duration {
        time::Duration::seconds(self.running_dwell_s as i64)
    }

    pub fn max_clock_skew(&self) -> time::Duration {
        time::Duration::seconds(self.max_clock_skew_s as i64)
    }

    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_s.max(1))
    }

    pub fn check(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.offline_threshold_s >= 10, "engine.offline_threshold_s too low (< 10s)");
        anyhow::ensure!(self.sweep_interval_s >= 1 && self.sweep_interval_s <= self.offline_threshold_s,
            "engine.sweep_interval_s should be 1..=offline_threshold_s");
        anyhow::ensure!(self.sample_resolution_ms >= 1 && self.sample_resolution_ms <= 60_000,
            "engine.sample_resolution_ms should be 1..60000");
        anyhow::ensure!(self.battery_critical_pct < self.battery_low_pct, "engine.battery_critical_pct must be below battery_low_pct");
        anyhow::ensure!((0.0..=100.0).contains(&self.battery_low_pct), "engine.battery_low_pct out of range");
        anyhow::ensure!(self.lanes >= 1 && self.lanes <= 1024, "engine.lanes should be 1..1024");
        anyhow::ensure!(self.lane_queue >= 1, "engine.lane_queue must be >= 1");
        fleet_geo::doctor::check_speed_thresholds(self.speed_violation_critical_multiplier, self.max_speed_kmh)?;
        Ok(())
    }
}
