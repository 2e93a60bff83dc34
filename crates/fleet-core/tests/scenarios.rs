use std::sync::Arc;

use fleet_core::{CartRecord, CartStatus, EngineConfig, Fleet, FleetError, LaneState, MemorySink, TelemetryFault};
use fleet_geo::{FenceType, GeofenceRecord, LatLng};
use fleet_proto::event::{EventType, Severity};
use fleet_proto::telemetry::{TelemetryMessage, TelemetryPayload, WirePosition};
use time::OffsetDateTime;

const T0: i64 = 1_717_200_000;

fn at(s: i64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(T0 + s).unwrap()
}

fn ping(cart: &str, s: i64, lat: f64, lng: f64, speed: f64) -> TelemetryMessage {
    TelemetryMessage::new(cart, TelemetryPayload {
        position: WirePosition { lat, lng },
        heading: 45.0,
        speed,
        battery_level: 76.0,
        timestamp: (T0 + s) as f64,
        charging: None,
    })
}

fn course() -> (Fleet, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let fleet = Fleet::new(EngineConfig { offline_threshold_s: 120, running_dwell_s: 60, ..EngineConfig::default() }, sink.clone());
    fleet.load_carts(vec![CartRecord {
        id: "cart-07".into(),
        golf_course_id: "dy-cc".into(),
        status: CartStatus::Idle,
        mode: Default::default(),
        active: true,
    }]);
    let rejected = fleet.replace_geofences(vec![GeofenceRecord {
        id: "slow-9".into(),
        golf_course_id: "dy-cc".into(),
        name: "Bridge on 9".into(),
        fence_type: FenceType::SlowZone,
        polygon: vec![
            LatLng::new(37.4000, 127.1000),
            LatLng::new(37.4000, 127.1010),
            LatLng::new(37.4010, 127.1010),
            LatLng::new(37.4010, 127.1000),
        ],
        speed_limit: Some(10.0),
        active: true,
        alert_on_entry: true,
        alert_on_exit: true,
    }]);
    assert!(rejected.is_empty());
    (fleet, sink)
}

#[test]
fn entering_slow_zone_too_fast() {
    let (fleet, sink) = course();
    let mut lane = LaneState::new();
    fleet.process(&mut lane, &ping("cart-07", 0, 37.3990, 127.1005, 12.0), at(0)).unwrap();
    assert!(sink.is_empty());

    let out = fleet.process(&mut lane, &ping("cart-07", 1, 37.4005, 127.1005, 15.5), at(1)).unwrap();
    let got: Vec<_> = out.events.iter().map(|e| (e.event_type, e.severity)).collect();
    assert_eq!(got, vec![(EventType::GeofenceEntry, Severity::Info), (EventType::SpeedViolation, Severity::Warning)]);
    assert_eq!(sink.len(), 2);

    let record = out.events[1].to_record();
    assert_eq!(record.related_geofence_id.as_deref(), Some("slow-9"));
    assert_eq!(record.timestamp, T0 + 1);

    // leaving at walking pace
    let out = fleet.process(&mut lane, &ping("cart-07", 2, 37.4020, 127.1005, 3.0), at(2)).unwrap();
    let got: Vec<_> = out.events.iter().map(|e| e.event_type).collect();
    assert_eq!(got, vec![EventType::GeofenceExit]);
}

#[test]
fn stationary_running_cart_goes_idle_after_dwell() {
    let (fleet, _) = course();
    let mut lane = LaneState::new();
    let out = fleet.process(&mut lane, &ping("cart-07", 0, 37.39, 127.09, 8.0), at(0)).unwrap();
    assert_eq!(out.status, CartStatus::Running);
    for s in [10, 30, 69] {
        let out = fleet.process(&mut lane, &ping("cart-07", s, 37.39, 127.09, 0.0), at(s)).unwrap();
        assert_eq!(out.status, CartStatus::Running, "still within dwell at {}s", s);
    }
    let out = fleet.process(&mut lane, &ping("cart-07", 70, 37.39, 127.09, 0.0), at(70)).unwrap();
    assert!(out.transitioned);
    assert_eq!(out.status, CartStatus::Idle);
}

#[test]
fn silent_cart_is_reported_offline_once() {
    let (fleet, sink) = course();
    let mut lane = LaneState::new();
    fleet.process(&mut lane, &ping("cart-07", 0, 37.39, 127.09, 0.0), at(0)).unwrap();

    let lost = fleet.sweep(at(125));
    assert_eq!(lost.len(), 1);
    assert_eq!(lost[0].event_type, EventType::ConnectionLost);
    assert_eq!(fleet.cart("cart-07").unwrap().status, CartStatus::Offline);
    assert!(fleet.sweep(at(126)).is_empty());
    assert!(fleet.sweep(at(600)).is_empty());
    assert_eq!(sink.len(), 1);
}

#[test]
fn garbage_coordinates_are_rejected() {
    let (fleet, sink) = course();
    let mut lane = LaneState::new();
    fleet.process(&mut lane, &ping("cart-07", 0, 37.39, 127.09, 4.0), at(0)).unwrap();
    let before = fleet.cart("cart-07").unwrap();

    let err = fleet.process(&mut lane, &ping("cart-07", 5, 200.0, -500.0, 4.0), at(5)).unwrap_err();
    match err {
        FleetError::InvalidTelemetry { cart_id, fault } => {
            assert_eq!(cart_id, "cart-07");
            assert_eq!(fault, TelemetryFault::LatitudeOutOfRange(200.0));
        }
        other => panic!("unexpected {other}"),
    }
    let after = fleet.cart("cart-07").unwrap();
    assert_eq!(after.last_ping, before.last_ping);
    assert_eq!(after.position, before.position);
    assert_eq!(after.status, before.status);
    assert!(sink.is_empty());
}

#[test]
fn liveness_never_moves_backwards() {
    let (fleet, _) = course();
    let mut lane = LaneState::new();
    fleet.process(&mut lane, &ping("cart-07", 100, 37.39, 127.09, 4.0), at(100)).unwrap();
    let out = fleet.process(&mut lane, &ping("cart-07", 40, 37.4005, 127.1005, 25.0), at(101)).unwrap();
    assert!(!out.fresh);
    assert!(out.events.is_empty());
    let cart = fleet.cart("cart-07").unwrap();
    assert_eq!(cart.last_ping, Some(at(100)));
    assert_eq!(cart.position, Some(LatLng::new(37.39, 127.09)));
    assert!(fleet.is_online("cart-07", at(219)).unwrap());
    assert!(!fleet.is_online("cart-07", at(221)).unwrap());
    assert_eq!(fleet.status("cart-07", at(221)).unwrap(), CartStatus::Offline);
}

#[test]
fn maintenance_survives_telemetry_and_outage() {
    let (fleet, sink) = course();
    let mut lane = LaneState::new();
    fleet.process(&mut lane, &ping("cart-07", 0, 37.39, 127.09, 0.0), at(0)).unwrap();
    assert!(fleet.set_maintenance("cart-07").unwrap());
    let out = fleet.process(&mut lane, &ping("cart-07", 1, 37.39, 127.09, 6.0), at(1)).unwrap();
    assert_eq!(out.status, CartStatus::Maintenance);

    assert_eq!(fleet.sweep(at(200)).len(), 1);
    let out = fleet.process(&mut lane, &ping("cart-07", 201, 37.39, 127.09, 6.0), at(201)).unwrap();
    assert_eq!(out.status, CartStatus::Maintenance);
    assert_eq!(out.events[0].event_type, EventType::ConnectionRestored);

    assert!(fleet.clear_maintenance("cart-07").unwrap());
    let types: Vec<_> = sink.events().iter().map(|e| e.event_type).collect();
    assert_eq!(types, vec![EventType::ConnectionLost, EventType::ConnectionRestored]);
}

#[test]
fn unknown_cart_is_refused() {
    let (fleet, _) = course();
    let err = fleet.process(&mut LaneState::new(), &ping("cart-99", 0, 37.39, 127.09, 0.0), at(0)).unwrap_err();
    assert!(err.is_lookup_miss());
    assert!(fleet.cart("cart-99").is_none());
}
