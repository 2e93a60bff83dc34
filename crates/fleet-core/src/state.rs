use time::OffsetDateTime;
use tracing::info;

use crate::cart::{Cart, CartStatus};
use crate::config::EngineConfig;
use crate::normalize::Sample;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Applied {
    pub status: CartStatus,
    pub transitioned: bool,
    /// Sample was not older than the stored position and was applied to it.
    pub fresh: bool,
    /// Cart came back from OFFLINE with this sample.
    pub recovered: bool,
}

/// Folds one validated sample into the cart.
///
/// `last_ping` only moves forward. Position, speed and status only change
/// for samples at least as new as the stored position; older samples are
/// accepted but leave everything except `last_ping` alone. An OFFLINE cart
/// only recovers on a sample that is itself within the offline threshold
/// of `now`.
pub fn apply_telemetry(cart: &mut Cart, sample: &Sample, now: OffsetDateTime, cfg: &EngineConfig) -> Applied {
    let prev = cart.status;
    let ts = sample.timestamp;

    cart.last_ping = Some(cart.last_ping.map_or(ts, |lp| lp.max(ts)));

    let fresh = cart.sample_ts.map_or(true, |t| ts >= t);
    if !fresh {
        return Applied { status: prev, transitioned: false, fresh, recovered: false };
    }

    cart.position = Some(sample.position);
    cart.speed = sample.speed;
    cart.battery_level = Some(sample.battery_level);
    cart.sample_ts = Some(ts);

    let moving = sample.speed > 0.0;
    if moving {
        cart.stationary_since = None;
    } else if cart.stationary_since.is_none() {
        cart.stationary_since = Some(ts);
    }

    let mut recovered = false;
    let mut status = prev;
    if status == CartStatus::Offline && now - ts <= cfg.offline_threshold() {
        recovered = true;
        cart.offline_reported = false;
        status = match cart.resume_status.take() {
            Some(CartStatus::Maintenance) => CartStatus::Maintenance,
            Some(CartStatus::Charging) if !moving => CartStatus::Charging,
            _ => CartStatus::Idle,
        };
    }

    let dwell_elapsed = cart.stationary_since.map_or(false, |since| ts - since >= cfg.running_dwell());

    status = match status {
        CartStatus::Maintenance | CartStatus::Offline => status,
        CartStatus::Idle | CartStatus::Charging if moving => CartStatus::Running,
        CartStatus::Idle if sample.charging == Some(true) => CartStatus::Charging,
        CartStatus::Charging if sample.charging == Some(false) => CartStatus::Idle,
        CartStatus::Running if !moving && dwell_elapsed => CartStatus::Idle,
        s => s,
    };

    cart.status = status;
    let transitioned = status != prev;
    if transitioned {
        info!("cart {}: {} -> {}", cart.id, prev, status);
    }
    Applied { status, transitioned, fresh, recovered }
}

pub fn is_online(cart: &Cart, now: OffsetDateTime, cfg: &EngineConfig) -> bool {
    match cart.last_ping {
        Some(lp) => now - lp <= cfg.offline_threshold(),
        None => false,
    }
}

/// Status as seen by readers: a stale cart reads as OFFLINE even before the
/// sweep has flipped it.
pub fn effective_status(cart: &Cart, now: OffsetDateTime, cfg: &EngineConfig) -> CartStatus {
    if cart.last_ping.is_some() && !is_online(cart, now, cfg) {
        CartStatus::Offline
    } else {
        cart.status
    }
}

/// Sweep step for one cart. Returns true exactly once per offline episode.
pub fn mark_offline(cart: &mut Cart, now: OffsetDateTime, cfg: &EngineConfig) -> bool {
    if !cart.active || cart.last_ping.is_none() || is_online(cart, now, cfg) {
        return false;
    }
    if cart.status == CartStatus::Offline || cart.offline_reported {
        return false;
    }
    info!("cart {}: {} -> OFFLINE (no telemetry since {:?})", cart.id, cart.status, cart.last_ping);
    cart.resume_status = Some(cart.status);
    cart.status = CartStatus::Offline;
    cart.offline_reported = true;
    true
}

/// Operator action. Returns false when the cart already was in maintenance.
pub fn set_maintenance(cart: &mut Cart) -> bool {
    match cart.status {
        CartStatus::Maintenance => false,
        CartStatus::Offline => {
            let changed = cart.resume_status != Some(CartStatus::Maintenance);
            cart.resume_status = Some(CartStatus::Maintenance);
            changed
        }
        _ => {
            cart.status = CartStatus::Maintenance;
            cart.stationary_since = None;
            true
        }
    }
}

/// Operator action. Maintenance ends in IDLE; telemetry takes it from there.
pub fn clear_maintenance(cart: &mut Cart) -> bool {
    match cart.status {
        CartStatus::Maintenance => {
            cart.status = CartStatus::Idle;
            true
        }
        CartStatus::Offline if cart.resume_status == Some(CartStatus::Maintenance) => {
            cart.resume_status = Some(CartStatus::Idle);
            true
        }
        _ => false,
    }
}
