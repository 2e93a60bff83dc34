use std::collections::HashMap;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::fence::{Geofence, GeofenceRecord};
use crate::geometry::{BoundingBox, LatLng};
use crate::GeometryError;

/// Read side of the geometry index. Callers only see this trait so the
/// search strategy can change without touching them.
pub trait FenceLookup: Send + Sync {
    /// Active fences of `course_id` whose ring contains `point`, boundary inclusive.
    fn containing(&self, course_id: &str, point: LatLng) -> Vec<&Geofence>;

    fn get(&self, fence_id: &str) -> Option<&Geofence>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    Linear,
    #[default]
    Bbox,
}

/// A fence that was left out of the index at load time.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejected {
    pub fence_id: String,
    pub error: GeometryError,
}

/// Validated, active fences grouped by course.
#[derive(Debug, Default)]
pub struct FenceSet {
    fences: Vec<Geofence>,
    by_id: HashMap<String, usize>,
    by_course: HashMap<String, Vec<usize>>,
}

impl FenceSet {
    /// Degenerate or duplicate fences are skipped and reported; the rest are kept.
    pub fn build(records: impl IntoIterator<Item = GeofenceRecord>) -> (Self, Vec<Rejected>) {
        let mut set = FenceSet::default();
        let mut rejected = Vec::new();

        for rec in records {
            if !rec.active {
                debug!("geo: skipping inactive fence {}", rec.id);
                continue;
            }
            let fence_id = rec.id.clone();
            if set.by_id.contains_key(&fence_id) {
                warn!("geo: fence {} rejected: duplicate id", fence_id);
                rejected.push(Rejected { error: GeometryError::DuplicateFence(fence_id.clone()), fence_id });
                continue;
            }
            match Geofence::from_record(rec) {
                Ok(fence) => {
                    let idx = set.fences.len();
                    set.by_id.insert(fence.id.clone(), idx);
                    set.by_course.entry(fence.golf_course_id.clone()).or_default().push(idx);
                    set.fences.push(fence);
                }
                Err(error) => {
                    warn!("geo: fence {} rejected: {}", fence_id, error);
                    rejected.push(Rejected { fence_id, error });
                }
            }
        }
        (set, rejected)
    }

    pub fn fences(&self) -> &[Geofence] {
        &self.fences
    }

    fn course(&self, course_id: &str) -> &[usize] {
        self.by_course.get(course_id).map(Vec::as_slice).unwrap_or(&[])
    }

    fn get(&self, fence_id: &str) -> Option<&Geofence> {
        self.by_id.get(fence_id).map(|&i| &self.fences[i])
    }
}

/// Tests every fence of the course.
#[derive(Debug)]
pub struct LinearIndex {
    set: FenceSet,
}

impl LinearIndex {
    pub fn new(set: FenceSet) -> Self {
        Self { set }
    }
}

impl FenceLookup for LinearIndex {
    fn containing(&self, course_id: &str, point: LatLng) -> Vec<&Geofence> {
        self.set.course(course_id).iter()
            .map(|&i| &self.set.fences[i])
            .filter(|f| f.contains(point))
            .collect()
    }

    fn get(&self, fence_id: &str) -> Option<&Geofence> {
        self.set.get(fence_id)
    }

    fn len(&self) -> usize {
        self.set.fences.len()
    }
}

/// Skips the ring test when the point is outside the fence's bounding box.
#[derive(Debug)]
pub struct BoundingBoxIndex {
    set: FenceSet,
    boxes: Vec<BoundingBox>,
}

impl BoundingBoxIndex {
    pub fn new(set: FenceSet) -> Self {
        let boxes = set.fences.iter().map(|f| f.ring.bbox()).collect();
        Self { set, boxes }
    }
}

impl FenceLookup for BoundingBoxIndex {
    fn containing(&self, course_id: &str, point: LatLng) -> Vec<&Geofence> {
        self.set.course(course_id).iter()
            .filter(|&&i| self.boxes[i].contains(point))
            .map(|&i| &self.set.fences[i])
            .filter(|f| f.contains(point))
            .collect()
    }

    fn get(&self, fence_id: &str) -> Option<&Geofence> {
        self.set.get(fence_id)
    }

    fn len(&self) -> usize {
        self.set.fences.len()
    }
}

pub fn build_index(kind: IndexKind, records: impl IntoIterator<Item = GeofenceRecord>) -> (Box<dyn FenceLookup>, Vec<Rejected>) {
    let (set, rejected) = FenceSet::build(records);
    let index: Box<dyn FenceLookup> = match kind {
        IndexKind::Linear => Box::new(LinearIndex::new(set)),
        IndexKind::Bbox => Box::new(BoundingBoxIndex::new(set)),
    };
    (index, rejected)
}
