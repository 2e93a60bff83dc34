use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::ops::AddAssign;
use std::sync::Arc;

use fleet_proto::telemetry::TelemetryMessage;
use time::OffsetDateTime;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::battery::BatteryBand;
use crate::detector::Membership;
use crate::error::FleetError;
use crate::fleet::Fleet;

/// Per-cart detector state owned by the lane the cart hashes to.
#[derive(Debug, Clone, Default)]
pub struct CartLane {
    pub membership: Membership,
    pub battery: BatteryBand,
}

#[derive(Debug, Default)]
pub struct LaneState {
    carts: HashMap<String, CartLane>,
}

impl LaneState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(&mut self, cart_id: &str) -> &mut CartLane {
        self.carts.entry(cart_id.to_string()).or_default()
    }

    pub fn membership(&self, cart_id: &str) -> Option<&Membership> {
        self.carts.get(cart_id).map(|c| &c.membership)
    }

    pub fn len(&self) -> usize {
        self.carts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.carts.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LaneStats {
    pub processed: u64,
    pub rejected: u64,
    pub skipped: u64,
    pub events: u64,
    /// Still queued when the lane was stopped.
    pub dropped: u64,
}

impl AddAssign for LaneStats {
    fn add_assign(&mut self, o: Self) {
        self.processed += o.processed;
        self.rejected += o.rejected;
        self.skipped += o.skipped;
        self.events += o.events;
        self.dropped += o.dropped;
    }
}

/// Telemetry lanes. A cart always maps to the same lane, so its samples are
/// processed in arrival order while different carts run in parallel.
pub struct Lanes {
    senders: Vec<mpsc::Sender<TelemetryMessage>>,
    handles: Vec<JoinHandle<LaneStats>>,
    stop: watch::Sender<bool>,
}

impl Lanes {
    pub fn spawn(fleet: Arc<Fleet>) -> Self {
        let n = fleet.config().lanes.max(1);
        let depth = fleet.config().lane_queue.max(1);
        let (stop, stop_rx) = watch::channel(false);
        let mut senders = Vec::with_capacity(n);
        let mut handles = Vec::with_capacity(n);
        for lane in 0..n {
            let (tx, rx) = mpsc::channel(depth);
            senders.push(tx);
            handles.push(tokio::spawn(run_lane(lane, fleet.clone(), rx, stop_rx.clone())));
        }
        info!("lanes: {} started (queue {})", n, depth);
        Self { senders, handles, stop }
    }

    pub fn len(&self) -> usize {
        self.senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }

    pub fn lane_of(&self, cart_id: &str) -> usize {
        let mut h = DefaultHasher::new();
        cart_id.hash(&mut h);
        (h.finish() % self.senders.len() as u64) as usize
    }

    /// Waits for queue space.
    pub async fn submit(&self, msg: TelemetryMessage) -> Result<(), FleetError> {
        let lane = self.lane_of(&msg.cart_id);
        self.senders[lane].send(msg).await.map_err(|_| FleetError::Shutdown)
    }

    /// Never waits. A full lane hands the sample back so the caller can
    /// count the backpressure and fall back to `submit`.
    pub fn try_submit(&self, msg: TelemetryMessage) -> Result<Option<TelemetryMessage>, FleetError> {
        let lane = self.lane_of(&msg.cart_id);
        match self.senders[lane].try_send(msg) {
            Ok(()) => Ok(None),
            Err(mpsc::error::TrySendError::Full(msg)) => Ok(Some(msg)),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(FleetError::Shutdown),
        }
    }

    /// Processes everything already queued, then stops.
    pub async fn drain(self) -> LaneStats {
        let Lanes { senders, handles, stop } = self;
        drop(senders);
        let total = join(handles).await;
        drop(stop);
        total
    }

    /// Finishes in-flight samples; whatever is still queued is dropped.
    pub async fn shutdown(self) -> LaneStats {
        let Lanes { senders, handles, stop } = self;
        let _ = stop.send(true);
        drop(senders);
        join(handles).await
    }
}

async fn join(handles: Vec<JoinHandle<LaneStats>>) -> LaneStats {
    let mut total = LaneStats::default();
    for h in handles {
        match h.await {
            Ok(s) => total += s,
            Err(e) => warn!("lanes: lane task failed: {}", e),
        }
    }
    info!(
        "lanes: stopped processed={} rejected={} skipped={} events={} dropped={}",
        total.processed, total.rejected, total.skipped, total.events, total.dropped
    );
    total
}

async fn run_lane(
    lane: usize,
    fleet: Arc<Fleet>,
    mut rx: mpsc::Receiver<TelemetryMessage>,
    mut stop: watch::Receiver<bool>,
) -> LaneStats {
    let mut state = LaneState::new();
    let mut stats = LaneStats::default();
    loop {
        let msg = tokio::select! {
            biased;
            _ = stop.changed() => {
                if *stop.borrow() { break; }
                continue;
            }
            m = rx.recv() => match m {
                Some(m) => m,
                None => break,
            },
        };
        match fleet.process(&mut state, &msg, OffsetDateTime::now_utc()) {
            Ok(out) => {
                stats.processed += 1;
                stats.events += out.events.len() as u64;
            }
            Err(FleetError::Shutdown) => break,
            Err(e) if e.is_validation() => {
                stats.rejected += 1;
                warn!("lane {}: {}", lane, e);
            }
            Err(e) => {
                stats.skipped += 1;
                warn!("lane {}: {}", lane, e);
            }
        }
    }
    rx.close();
    while rx.try_recv().is_ok() {
        stats.dropped += 1;
    }
    debug!("lane {}: exit with {} carts tracked", lane, state.len());
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::CartRecord;
    use crate::config::EngineConfig;
    use crate::sink::MemorySink;
    use crate::sweep::Sweeper;
    use fleet_proto::event::EventType;
    use fleet_proto::telemetry::{TelemetryPayload, WirePosition};

    fn msg(cart: &str, ts: f64, speed: f64) -> TelemetryMessage {
        TelemetryMessage::new(cart, TelemetryPayload {
            position: WirePosition { lat: 37.0, lng: 127.0 },
            heading: 90.0,
            speed,
            battery_level: 15.0,
            timestamp: ts,
            charging: None,
        })
    }

    fn fleet(lanes: usize) -> (Arc<Fleet>, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let cfg = EngineConfig { lanes, lane_queue: 64, ..EngineConfig::default() };
        let fleet = Arc::new(Fleet::new(cfg, sink.clone()));
        fleet.load_carts((0..6).map(|i| CartRecord {
            id: format!("cart-{}", i),
            golf_course_id: "course".into(),
            status: Default::default(),
            mode: Default::default(),
            active: true,
        }));
        (fleet, sink)
    }

    #[test]
    fn stats_add_up() {
        let mut a = LaneStats { processed: 2, rejected: 1, ..Default::default() };
        a += LaneStats { processed: 3, dropped: 4, ..Default::default() };
        assert_eq!(a, LaneStats { processed: 5, rejected: 1, skipped: 0, events: 0, dropped: 4 });
    }

    #[tokio::test]
    async fn same_cart_same_lane() {
        let (fleet, _) = fleet(4);
        let lanes = Lanes::spawn(fleet);
        assert_eq!(lanes.len(), 4);
        for i in 0..20 {
            let id = format!("cart-{}", i);
            assert_eq!(lanes.lane_of(&id), lanes.lane_of(&id));
            assert!(lanes.lane_of(&id) < 4);
        }
        lanes.drain().await;
    }

    #[tokio::test]
    async fn drain_processes_everything_in_order() {
        let (fleet, sink) = fleet(3);
        let lanes = Lanes::spawn(fleet.clone());
        let base = OffsetDateTime::now_utc().unix_timestamp() as f64 - 10.0;
        for step in 0..4 {
            for i in 0..6 {
                lanes.submit(msg(&format!("cart-{}", i), base + step as f64, 5.0)).await.unwrap();
            }
        }
        lanes.submit(msg("ghost", base, 5.0)).await.unwrap();
        let stats = lanes.drain().await;
        assert_eq!(stats.processed, 24);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.dropped, 0);
        for i in 0..6 {
            let cart = fleet.cart(&format!("cart-{}", i)).unwrap();
            assert_eq!(cart.sample_ts.map(|t| t.unix_timestamp() as f64), Some(base + 3.0));
        }
        // one low-battery alert per cart for the whole episode
        let low = sink.events().iter().filter(|e| e.event_type == EventType::LowBattery).count();
        assert_eq!(low, 6);
        assert_eq!(stats.events, 6);
    }

    #[tokio::test]
    async fn rejected_samples_are_counted() {
        let (fleet, _) = fleet(1);
        let lanes = Lanes::spawn(fleet);
        let now = OffsetDateTime::now_utc().unix_timestamp() as f64;
        let mut bad = msg("cart-0", now, 5.0);
        bad.payload.position.lat = 200.0;
        lanes.submit(bad).await.unwrap();
        lanes.submit(msg("cart-0", now, -1.0)).await.unwrap();
        let stats = lanes.drain().await;
        assert_eq!(stats.rejected, 2);
        assert_eq!(stats.processed, 0);
    }

    #[tokio::test]
    async fn closed_fleet_processes_nothing() {
        let (fleet, _) = fleet(2);
        let lanes = Lanes::spawn(fleet.clone());
        fleet.close();
        let now = OffsetDateTime::now_utc().unix_timestamp() as f64;
        lanes.submit(msg("cart-1", now, 1.0)).await.unwrap();
        let stats = lanes.shutdown().await;
        assert_eq!(stats.processed, 0);
    }

    #[tokio::test]
    async fn full_lane_hands_the_sample_back() {
        let sink = Arc::new(MemorySink::new());
        let cfg = EngineConfig { lanes: 1, lane_queue: 1, ..EngineConfig::default() };
        let fleet = Arc::new(Fleet::new(cfg, sink));
        fleet.load_carts(vec![CartRecord {
            id: "cart-0".into(),
            golf_course_id: "course".into(),
            status: Default::default(),
            mode: Default::default(),
            active: true,
        }]);
        let lanes = Lanes::spawn(fleet);
        let now = OffsetDateTime::now_utc().unix_timestamp() as f64;
        assert!(lanes.try_submit(msg("cart-0", now - 2.0, 1.0)).unwrap().is_none());
        let back = lanes.try_submit(msg("cart-0", now - 1.0, 1.0)).unwrap();
        assert_eq!(back.map(|m| m.payload.timestamp), Some(now - 1.0));
        let stats = lanes.drain().await;
        assert_eq!(stats.processed, 1);
    }

    #[tokio::test]
    async fn shutdown_drops_queued_and_close_silences_the_fleet() {
        let (fleet, sink) = fleet(1);
        let lanes = Lanes::spawn(fleet.clone());
        let now = OffsetDateTime::now_utc();
        let base = now.unix_timestamp() as f64 - 10.0;
        // lanes have not been polled yet on this runtime, so all of it is queued
        for i in 0..10 {
            lanes.submit(msg("cart-0", base + i as f64, 5.0)).await.unwrap();
        }
        let stats = lanes.shutdown().await;
        assert!(stats.dropped > 0);
        assert_eq!(stats.processed + stats.dropped, 10);

        let published = sink.len();
        fleet.close();
        assert!(fleet.sweep(now + time::Duration::hours(1)).is_empty());
        let err = fleet.process(&mut LaneState::new(), &msg("cart-1", base, 5.0), now).unwrap_err();
        assert!(matches!(err, FleetError::Shutdown));
        assert_eq!(sink.len(), published);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn sweep_runs_beside_telemetry_for_the_same_cart() {
        let sink = Arc::new(MemorySink::new());
        let cfg = EngineConfig { lanes: 2, lane_queue: 8, offline_threshold_s: 10, sweep_interval_s: 1, ..EngineConfig::default() };
        let fleet = Arc::new(Fleet::new(cfg, sink.clone()));
        fleet.load_carts(vec![CartRecord {
            id: "cart-0".into(),
            golf_course_id: "course".into(),
            status: Default::default(),
            mode: Default::default(),
            active: true,
        }]);
        let lanes = Lanes::spawn(fleet.clone());
        let sweeper = Sweeper::spawn(fleet.clone());

        // starts stale, ends fresh
        let start = OffsetDateTime::now_utc().unix_timestamp() as f64 - 20.0;
        for i in 0..20 {
            lanes.submit(msg("cart-0", start + i as f64, 0.0)).await.unwrap();
            if i % 4 == 0 {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        }
        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
        sweeper.stop().await;
        lanes.drain().await;

        let conn: Vec<EventType> = sink.events().iter()
            .map(|e| e.event_type)
            .filter(|t| matches!(t, EventType::ConnectionLost | EventType::ConnectionRestored))
            .collect();
        assert!(conn.len() <= 2, "{:?}", conn);
        for (i, t) in conn.iter().enumerate() {
            let expected = if i % 2 == 0 { EventType::ConnectionLost } else { EventType::ConnectionRestored };
            assert_eq!(*t, expected, "{:?}", conn);
        }
        assert_eq!(conn.len() % 2, 0, "{:?}", conn);
        let cart = fleet.cart("cart-0").unwrap();
        assert_ne!(cart.status, crate::cart::CartStatus::Offline);
        assert!(!cart.offline_reported);
    }
}
