//! Camera overlap zones
//!
//! Static configuration of which camera pairs share a physical field of
//! view and where. The resolver uses this purely as a matching prior when
//! selecting candidate identities; it never assigns identity by itself.

use crate::types::CameraId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Geometric test for "this point lies inside the overlap region".
///
/// The region is expressed in the observing camera's pixel coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ZoneRegion {
    /// The whole frame overlaps.
    Full,
    /// Axis-aligned rectangle.
    Rect { x1: f32, y1: f32, x2: f32, y2: f32 },
    /// Arbitrary polygon, vertices in order.
    Polygon(Vec<[f32; 2]>),
}

impl ZoneRegion {
    pub fn contains(&self, x: f32, y: f32) -> bool {
        match self {
            ZoneRegion::Full => true,
            ZoneRegion::Rect { x1, y1, x2, y2 } => x >= *x1 && x <= *x2 && y >= *y1 && y <= *y2,
            ZoneRegion::Polygon(vertices) => point_in_polygon(x, y, vertices),
        }
    }
}

/// Ray-casting point-in-polygon test.
fn point_in_polygon(px: f32, py: f32, vertices: &[[f32; 2]]) -> bool {
    let n = vertices.len();
    if n < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = (vertices[i][0], vertices[i][1]);
        let (xj, yj) = (vertices[j][0], vertices[j][1]);
        if (yi > py) != (yj > py) && px < (xj - xi) * (py - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Declared overlap between two cameras' fields of view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlapZone {
    pub camera_a: CameraId,
    pub camera_b: CameraId,
    /// Overlap region in `camera_a`'s coordinates; `camera_b` is assumed
    /// symmetric unless a reverse zone is declared with its own region.
    pub region: ZoneRegion,
}

impl OverlapZone {
    pub fn new(camera_a: CameraId, camera_b: CameraId, region: ZoneRegion) -> Self {
        Self {
            camera_a,
            camera_b,
            region,
        }
    }
}

/// Read-mostly map from camera to its overlapping peers.
#[derive(Debug, Clone, Default)]
pub struct ZoneManager {
    overlaps: HashMap<CameraId, Vec<(CameraId, ZoneRegion)>>,
}

impl ZoneManager {
    /// Build from declared zones. Each zone registers both directions; a
    /// later zone for the reverse pair overrides the symmetric default.
    pub fn from_zones(zones: Vec<OverlapZone>) -> Self {
        let mut overlaps: HashMap<CameraId, Vec<(CameraId, ZoneRegion)>> = HashMap::new();

        for zone in zones {
            let forward = overlaps.entry(zone.camera_a.clone()).or_default();
            if let Some(slot) = forward.iter_mut().find(|(cam, _)| *cam == zone.camera_b) {
                slot.1 = zone.region.clone();
            } else {
                forward.push((zone.camera_b.clone(), zone.region.clone()));
            }

            let reverse = overlaps.entry(zone.camera_b.clone()).or_default();
            if !reverse.iter().any(|(cam, _)| *cam == zone.camera_a) {
                reverse.push((zone.camera_a.clone(), zone.region));
            }
        }

        Self { overlaps }
    }

    /// Cameras overlapping `camera`, with the overlap region in `camera`'s
    /// coordinates.
    pub fn overlapping(&self, camera: &CameraId) -> &[(CameraId, ZoneRegion)] {
        self.overlaps
            .get(camera)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn cameras_overlap(&self, a: &CameraId, b: &CameraId) -> bool {
        self.overlapping(a).iter().any(|(cam, _)| cam == b)
    }

    /// Whether a point in `a`'s frame lies inside its overlap with `b`.
    pub fn in_overlap(&self, a: &CameraId, b: &CameraId, x: f32, y: f32) -> bool {
        self.overlapping(a)
            .iter()
            .any(|(cam, region)| cam == b && region.contains(x, y))
    }

    pub fn is_empty(&self) -> bool {
        self.overlaps.is_empty()
    }
}
