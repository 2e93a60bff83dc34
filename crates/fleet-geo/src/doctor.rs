use anyhow::Result;

use crate::fence::{Geofence, GeofenceRecord};

/// Rings shorter than this are almost certainly a data entry mistake.
const MIN_PERIMETER_M: f64 = 5.0;

/// Strict variant of the load-time checks: any fence the index would skip
/// fails the check. Returns the number of active fences.
pub fn check_geofences(records: &[GeofenceRecord]) -> Result<usize> {
    let mut active = 0;
    let mut seen = std::collections::HashSet::new();
    for rec in records {
        anyhow::ensure!(seen.insert(rec.id.as_str()), "geofence {}: duplicate id", rec.id);
        if !rec.active { continue; }
        let fence = Geofence::from_record(rec.clone())
            .map_err(|e| anyhow::anyhow!("geofence {}: {}", rec.id, e))?;
        let perimeter = fence.ring.perimeter_m();
        anyhow::ensure!(perimeter >= MIN_PERIMETER_M, "geofence {}: ring too small ({:.1}m)", rec.id, perimeter);
        active += 1;
    }
    Ok(active)
}

pub fn check_speed_thresholds(critical_multiplier: f64, max_speed_kmh: f64) -> Result<()> {
    anyhow::ensure!(critical_multiplier > 1.0, "engine.speed_violation_critical_multiplier must be > 1");
    anyhow::ensure!(max_speed_kmh > 0.0 && max_speed_kmh <= 60.0, "engine.max_speed_kmh should be in (0, 60]");
    Ok(())
}
