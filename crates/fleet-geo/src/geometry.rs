use serde::{Deserialize, Serialize};

use crate::GeometryError;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

// Tolerance for the on-edge test, in squared degrees.
const EDGE_EPS: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }

    pub fn in_range(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lng)
    }

    pub fn distance_m(&self, other: &LatLng) -> f64 {
        haversine_m(self.lat, self.lng, other.lat, other.lng)
    }
}

pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat/2.0).sin().powi(2) + lat1.to_radians().cos()*lat2.to_radians().cos()*(dlon/2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0-a).sqrt());
    EARTH_RADIUS_M * c
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl BoundingBox {
    pub fn contains(&self, p: LatLng) -> bool {
        p.lat >= self.min_lat - EDGE_EPS && p.lat <= self.max_lat + EDGE_EPS
            && p.lng >= self.min_lng - EDGE_EPS && p.lng <= self.max_lng + EDGE_EPS
    }
}

/// Closed polygon ring. The last vertex always equals the first.
#[derive(Debug, Clone, PartialEq)]
pub struct Ring {
    vertices: Vec<LatLng>,
}

impl Ring {
    pub fn new(mut vertices: Vec<LatLng>) -> Result<Self, GeometryError> {
        for (i, v) in vertices.iter().enumerate() {
            if !v.is_finite() {
                return Err(GeometryError::NonFinite(i));
            }
            if !v.in_range() {
                return Err(GeometryError::CoordinateOutOfRange { index: i, lat: v.lat, lng: v.lng });
            }
        }

        let distinct = count_distinct(&vertices);
        if distinct < 3 {
            return Err(GeometryError::TooFewVertices(distinct));
        }

        if vertices.first() != vertices.last() {
            let first = vertices[0];
            vertices.push(first);
        }
        Ok(Self { vertices })
    }

    pub fn vertices(&self) -> &[LatLng] {
        &self.vertices
    }

    pub fn bbox(&self) -> BoundingBox {
        let mut b = BoundingBox {
            min_lat: f64::INFINITY,
            max_lat: f64::NEG_INFINITY,
            min_lng: f64::INFINITY,
            max_lng: f64::NEG_INFINITY,
        };
        for v in &self.vertices {
            b.min_lat = b.min_lat.min(v.lat);
            b.max_lat = b.max_lat.max(v.lat);
            b.min_lng = b.min_lng.min(v.lng);
            b.max_lng = b.max_lng.max(v.lng);
        }
        b
    }

    pub fn perimeter_m(&self) -> f64 {
        self.vertices.windows(2).map(|s| s[0].distance_m(&s[1])).sum()
    }

    /// Crossing-number test on the closed ring. Points on an edge or vertex
    /// count as inside.
    pub fn contains(&self, p: LatLng) -> bool {
        let mut inside = false;
        for seg in self.vertices.windows(2) {
            let (a, b) = (seg[0], seg[1]);
            if on_segment(p, a, b) {
                return true;
            }
            if (a.lat > p.lat) != (b.lat > p.lat) {
                let x = (b.lng - a.lng) * (p.lat - a.lat) / (b.lat - a.lat) + a.lng;
                if p.lng < x { inside = !inside; }
            }
        }
        inside
    }
}

fn on_segment(p: LatLng, a: LatLng, b: LatLng) -> bool {
    let cross = (b.lng - a.lng) * (p.lat - a.lat) - (b.lat - a.lat) * (p.lng - a.lng);
    if cross.abs() > EDGE_EPS {
        return false;
    }
    p.lng >= a.lng.min(b.lng) - EDGE_EPS && p.lng <= a.lng.max(b.lng) + EDGE_EPS
        && p.lat >= a.lat.min(b.lat) - EDGE_EPS && p.lat <= a.lat.max(b.lat) + EDGE_EPS
}

fn count_distinct(vertices: &[LatLng]) -> usize {
    let mut seen: Vec<LatLng> = Vec::with_capacity(vertices.len());
    for v in vertices {
        if !seen.contains(v) { seen.push(*v); }
    }
    seen.len()
}
