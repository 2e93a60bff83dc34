use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use fleet_geo::{build_index, FenceLookup, GeofenceRecord};
use fleet_proto::event::{EventType, Severity};
use fleet_proto::telemetry::TelemetryMessage;
use parking_lot::{Mutex, RwLock};
use serde_json::json;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::battery::BatteryMonitor;
use crate::cart::{Cart, CartRecord, CartStatus};
use crate::config::EngineConfig;
use crate::detector::ViolationDetector;
use crate::error::FleetError;
use crate::event::ViolationEvent;
use crate::lane::LaneState;
use crate::normalize::Normalizer;
use crate::sink::EventSink;
use crate::state;

/// Result of feeding one telemetry message through the pipeline.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub status: CartStatus,
    pub transitioned: bool,
    /// False for out-of-order samples; those only touch `last_ping`.
    pub fresh: bool,
    pub events: Vec<ViolationEvent>,
    pub unknown_fences: Vec<String>,
}

/// Shared fleet state: cart registry, geometry index and the event sink.
///
/// Each cart sits behind its own mutex so a lane and the liveness sweep
/// serialize on that cart only. The index is swapped wholesale.
pub struct Fleet {
    config: EngineConfig,
    carts: RwLock<HashMap<String, Arc<Mutex<Cart>>>>,
    index: RwLock<Arc<dyn FenceLookup>>,
    sink: Arc<dyn EventSink>,
    normalizer: Normalizer,
    detector: ViolationDetector,
    battery: BatteryMonitor,
    closed: AtomicBool,
}

impl Fleet {
    pub fn new(config: EngineConfig, sink: Arc<dyn EventSink>) -> Self {
        let (empty, _) = build_index(config.index, Vec::new());
        Self {
            normalizer: Normalizer::new(&config),
            detector: ViolationDetector::new(config.speed_violation_critical_multiplier),
            battery: BatteryMonitor::new(&config),
            carts: RwLock::new(HashMap::new()),
            index: RwLock::new(Arc::from(empty)),
            sink,
            closed: AtomicBool::new(false),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Registers carts. Known carts keep their live state; only the
    /// registration fields are refreshed.
    pub fn load_carts(&self, records: impl IntoIterator<Item = CartRecord>) -> usize {
        let mut carts = self.carts.write();
        let mut n = 0;
        for rec in records {
            match carts.get(&rec.id) {
                Some(existing) => {
                    let mut cart = existing.lock();
                    cart.golf_course_id = rec.golf_course_id;
                    cart.mode = rec.mode;
                    cart.active = rec.active;
                }
                None => {
                    carts.insert(rec.id.clone(), Arc::new(Mutex::new(Cart::from_record(rec))));
                }
            }
            n += 1;
        }
        info!("fleet: {} carts registered ({} total)", n, carts.len());
        n
    }

    /// Rebuilds the geometry index from scratch. Fences that fail validation
    /// are left out and returned as configuration errors.
    pub fn replace_geofences(&self, records: Vec<GeofenceRecord>) -> Vec<FleetError> {
        let (index, rejected) = build_index(self.config.index, records);
        info!("fleet: geometry index rebuilt with {} fences ({} rejected)", index.len(), rejected.len());
        *self.index.write() = Arc::from(index);
        rejected.into_iter()
            .map(|r| FleetError::Geometry { fence_id: r.fence_id, source: r.error })
            .collect()
    }

    pub fn index(&self) -> Arc<dyn FenceLookup> {
        self.index.read().clone()
    }

    pub fn cart(&self, cart_id: &str) -> Option<Cart> {
        self.carts.read().get(cart_id).map(|c| c.lock().clone())
    }

    pub fn cart_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.carts.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    fn handle(&self, cart_id: &str) -> Result<Arc<Mutex<Cart>>, FleetError> {
        self.carts.read().get(cart_id).cloned().ok_or_else(|| FleetError::UnknownCart(cart_id.to_string()))
    }

    pub fn set_maintenance(&self, cart_id: &str) -> Result<bool, FleetError> {
        let handle = self.handle(cart_id)?;
        let changed = state::set_maintenance(&mut handle.lock());
        if changed { info!("cart {}: maintenance set by operator", cart_id); }
        Ok(changed)
    }

    pub fn clear_maintenance(&self, cart_id: &str) -> Result<bool, FleetError> {
        let handle = self.handle(cart_id)?;
        let changed = state::clear_maintenance(&mut handle.lock());
        if changed { info!("cart {}: maintenance cleared by operator", cart_id); }
        Ok(changed)
    }

    pub fn is_online(&self, cart_id: &str, now: OffsetDateTime) -> Result<bool, FleetError> {
        let handle = self.handle(cart_id)?;
        let cart = handle.lock();
        Ok(state::is_online(&cart, now, &self.config))
    }

    /// Status with liveness applied lazily.
    pub fn status(&self, cart_id: &str, now: OffsetDateTime) -> Result<CartStatus, FleetError> {
        let handle = self.handle(cart_id)?;
        let cart = handle.lock();
        Ok(state::effective_status(&cart, now, &self.config))
    }

    /// Validate, update cart state, detect, publish. Errors leave the cart
    /// untouched.
    pub fn process(&self, lane: &mut LaneState, msg: &TelemetryMessage, now: OffsetDateTime) -> Result<Outcome, FleetError> {
        if self.is_closed() {
            return Err(FleetError::Shutdown);
        }
        let sample = self.normalizer.normalize(msg, now)?;
        let handle = self.handle(&sample.cart_id)?;

        let (applied, snapshot) = {
            let mut cart = handle.lock();
            if !cart.active {
                return Err(FleetError::InactiveCart(cart.id.clone()));
            }
            let applied = state::apply_telemetry(&mut cart, &sample, now, &self.config);
            (applied, cart.clone())
        };

        let mut events = Vec::new();
        let mut unknown_fences = Vec::new();

        if applied.recovered {
            events.push(ViolationEvent::new(
                &snapshot.id,
                EventType::ConnectionRestored,
                Severity::Info,
                Some(sample.position),
                sample.timestamp,
                None,
                json!({ "status": applied.status.as_str() }),
            ));
        }

        if applied.fresh {
            let slot = lane.entry(&snapshot.id);
            let index = self.index();
            let eval = self.detector.evaluate(index.as_ref(), &snapshot, &sample, &slot.membership);
            slot.membership = eval.membership;
            for fence_id in &eval.unknown_fences {
                warn!("cart {}: {}", snapshot.id, FleetError::UnknownGeofence(fence_id.clone()));
            }
            unknown_fences = eval.unknown_fences;
            events.extend(eval.events);
            if let Some(ev) = self.battery.check(&mut slot.battery, &snapshot, &sample) {
                events.push(ev);
            }
        } else {
            debug!("cart {}: out-of-order sample at {} kept for liveness only", snapshot.id, sample.timestamp);
        }

        self.emit(&events);
        Ok(Outcome {
            status: applied.status,
            transitioned: applied.transitioned,
            fresh: applied.fresh,
            events,
            unknown_fences,
        })
    }

    /// One liveness pass over every cart. Safe to run concurrently with
    /// telemetry processing and idempotent between reports.
    pub fn sweep(&self, now: OffsetDateTime) -> Vec<ViolationEvent> {
        if self.is_closed() {
            return Vec::new();
        }
        let handles: Vec<Arc<Mutex<Cart>>> = self.carts.read().values().cloned().collect();
        let mut events = Vec::new();
        for handle in handles {
            let mut cart = handle.lock();
            let previous = cart.status;
            if !state::mark_offline(&mut cart, now, &self.config) {
                continue;
            }
            let last_ping = cart.last_ping.unwrap_or(now);
            let ev = ViolationEvent::new(
                &cart.id,
                EventType::ConnectionLost,
                Severity::Warning,
                cart.position,
                now,
                None,
                json!({
                    "last_ping": last_ping.unix_timestamp(),
                    "offline_seconds": (now - last_ping).whole_seconds(),
                    "previous_status": previous.as_str(),
                }),
            );
            // Published under the cart lock so a racing recovery is
            // always reported after the loss.
            self.emit(std::slice::from_ref(&ev));
            events.push(ev);
        }
        events
    }

    /// After this no event reaches the sink.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            info!("fleet: closed, event publishing stopped");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn emit(&self, events: &[ViolationEvent]) {
        for ev in events {
            if self.is_closed() {
                debug!("fleet: closed, dropping {} for cart {}", ev.event_type, ev.cart_id);
                return;
            }
            debug!("event {} cart={} severity={:?} fence={:?}", ev.event_type, ev.cart_id, ev.severity, ev.geofence_id);
            if let Err(e) = self.sink.publish(ev) {
                warn!("cart {}: publish {} failed: {}", ev.cart_id, ev.event_type, e);
            }
        }
    }
}
