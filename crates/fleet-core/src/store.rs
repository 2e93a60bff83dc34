use anyhow::{Context, Result};
use fleet_geo::GeofenceRecord;
use serde::Deserialize;

use crate::cart::CartRecord;

/// Read model of the course/cart tables. Persistence lives elsewhere; this
/// is a snapshot loaded at startup.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FleetStore {
    #[serde(default)]
    pub carts: Vec<CartRecord>,
    #[serde(default)]
    pub geofences: Vec<GeofenceRecord>,
}

impl FleetStore {
    pub fn load(path: &str) -> Result<Self> {
        let s = std::fs::read_to_string(path).with_context(|| format!("read store {}", path))?;
        Self::parse(&s).with_context(|| format!("parse store {}", path))
    }

    pub fn parse(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn check(&self) -> Result<usize> {
        let mut seen = std::collections::HashSet::new();
        for c in &self.carts {
            anyhow::ensure!(!c.id.trim().is_empty(), "cart with empty id");
            anyhow::ensure!(seen.insert(c.id.as_str()), "cart {}: duplicate id", c.id);
        }
        fleet_geo::doctor::check_geofences(&self.geofences)
    }
}
