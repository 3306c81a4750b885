//! Bounding box primitives and IoU matrix computation

use ndarray::prelude::*;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box in corner form (x1, y1, x2, y2).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bbox {
    pub xmin: f32,
    pub ymin: f32,
    pub xmax: f32,
    pub ymax: f32,
}

impl Bbox {
    pub fn new(xmin: f32, ymin: f32, xmax: f32, ymax: f32) -> Self {
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
        }
    }

    pub fn width(&self) -> f32 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> f32 {
        self.ymax - self.ymin
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn center_x(&self) -> f32 {
        (self.xmin + self.xmax) / 2.0
    }

    pub fn center_y(&self) -> f32 {
        (self.ymin + self.ymax) / 2.0
    }

    /// Corner array [x1, y1, x2, y2].
    pub fn to_corners(&self) -> [f32; 4] {
        [self.xmin, self.ymin, self.xmax, self.ymax]
    }

    /// A box is usable for association when its coordinates are finite and
    /// it has strictly positive area. Degenerate boxes are discarded before
    /// assignment rather than propagated.
    pub fn is_valid(&self) -> bool {
        self.to_corners().iter().all(|v| v.is_finite())
            && self.xmax > self.xmin
            && self.ymax > self.ymin
    }

    /// Convert to center form [cx, cy, area, aspect_ratio], the observation
    /// space of the Kalman motion model.
    pub fn to_z(&self) -> [f32; 4] {
        let w = self.width();
        let h = self.height();
        let aspect = if h != 0.0 { w / h } else { 1.0 };
        [self.center_x(), self.center_y(), w * h, aspect]
    }

    /// Reconstruct a corner-form box from center form.
    pub fn from_z(z: &[f32; 4]) -> Self {
        let [cx, cy, area, aspect] = *z;
        let h = if aspect > 0.0 {
            (area / aspect).sqrt()
        } else {
            area.abs().sqrt()
        };
        let w = aspect * h;

        Self {
            xmin: cx - w / 2.0,
            ymin: cy - h / 2.0,
            xmax: cx + w / 2.0,
            ymax: cy + h / 2.0,
        }
    }

    /// Intersection over union with another box, in [0, 1].
    pub fn iou(&self, other: &Bbox) -> f32 {
        let x1 = self.xmin.max(other.xmin);
        let y1 = self.ymin.max(other.ymin);
        let x2 = self.xmax.min(other.xmax);
        let y2 = self.ymax.min(other.ymax);

        if x2 <= x1 || y2 <= y1 {
            return 0.0;
        }

        let intersection = (x2 - x1) * (y2 - y1);
        let union = self.area() + other.area() - intersection;

        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }

    /// Width/height agreement with another box, in [0, 1].
    ///
    /// Appearance-free plausibility signal: two observations of the same
    /// person tend to have similar box dimensions even across cameras with
    /// comparable perspectives. 1.0 means identical dimensions.
    pub fn shape_similarity(&self, other: &Bbox) -> f32 {
        let (w1, h1) = (self.width(), self.height());
        let (w2, h2) = (other.width(), other.height());
        if w1 <= 0.0 || h1 <= 0.0 || w2 <= 0.0 || h2 <= 0.0 {
            return 0.0;
        }
        let w_ratio = w1.min(w2) / w1.max(w2);
        let h_ratio = h1.min(h2) / h1.max(h2);
        (w_ratio + h_ratio) / 2.0
    }
}

/// Pairwise IoU matrix between detection and track boxes.
///
/// Rows are matrices of at least 4 columns [x1, y1, x2, y2, ..]; extra
/// columns are ignored. Returns a (n_detections, n_tracks) matrix, computed
/// row-parallel.
pub fn ious(detections: ArrayView2<f32>, tracks: ArrayView2<f32>) -> Array2<f32> {
    let n_dets = detections.nrows();
    let n_tracks = tracks.nrows();

    if n_dets == 0 || n_tracks == 0 {
        return Array2::zeros((n_dets, n_tracks));
    }

    let iou_data: Vec<f32> = (0..n_dets)
        .into_par_iter()
        .flat_map(|i| {
            let det_row = detections.row(i);
            if det_row.len() < 4 {
                return vec![0.0; n_tracks];
            }
            let det_box = Bbox::new(det_row[0], det_row[1], det_row[2], det_row[3]);

            (0..n_tracks)
                .map(|j| {
                    let track_row = tracks.row(j);
                    if track_row.len() < 4 {
                        return 0.0;
                    }
                    let track_box = Bbox::new(track_row[0], track_row[1], track_row[2], track_row[3]);
                    det_box.iou(&track_box)
                })
                .collect::<Vec<_>>()
        })
        .collect();

    Array2::from_shape_vec((n_dets, n_tracks), iou_data)
        .unwrap_or_else(|_| Array2::zeros((n_dets, n_tracks)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_bbox_properties() {
        let bbox = Bbox::new(0.0, 0.0, 10.0, 5.0);
        assert_eq!(bbox.width(), 10.0);
        assert_eq!(bbox.height(), 5.0);
        assert_eq!(bbox.area(), 50.0);
        assert_eq!(bbox.center_x(), 5.0);
        assert_eq!(bbox.center_y(), 2.5);
    }

    #[test]
    fn test_validity() {
        assert!(Bbox::new(0.0, 0.0, 10.0, 10.0).is_valid());
        assert!(!Bbox::new(10.0, 0.0, 10.0, 10.0).is_valid()); // zero width
        assert!(!Bbox::new(20.0, 0.0, 10.0, 10.0).is_valid()); // negative width
        assert!(!Bbox::new(f32::NAN, 0.0, 10.0, 10.0).is_valid());
        assert!(!Bbox::new(f32::INFINITY, 0.0, 10.0, 10.0).is_valid());
    }

    #[test]
    fn test_iou() {
        let a = Bbox::new(0.0, 0.0, 10.0, 10.0);
        let b = Bbox::new(5.0, 5.0, 15.0, 15.0);
        assert_abs_diff_eq!(a.iou(&b), 25.0 / 175.0, epsilon = 0.001);

        let far = Bbox::new(100.0, 100.0, 110.0, 110.0);
        assert_eq!(a.iou(&far), 0.0);
        assert_abs_diff_eq!(a.iou(&a), 1.0, epsilon = 0.001);
    }

    #[test]
    fn test_center_form_round_trip() {
        let bbox = Bbox::new(10.0, 20.0, 30.0, 60.0);
        let back = Bbox::from_z(&bbox.to_z());

        assert_abs_diff_eq!(bbox.xmin, back.xmin, epsilon = 0.001);
        assert_abs_diff_eq!(bbox.ymin, back.ymin, epsilon = 0.001);
        assert_abs_diff_eq!(bbox.xmax, back.xmax, epsilon = 0.001);
        assert_abs_diff_eq!(bbox.ymax, back.ymax, epsilon = 0.001);
    }

    #[test]
    fn test_shape_similarity() {
        let a = Bbox::new(0.0, 0.0, 10.0, 20.0);
        let same_shape = Bbox::new(100.0, 100.0, 110.0, 120.0);
        assert_abs_diff_eq!(a.shape_similarity(&same_shape), 1.0, epsilon = 0.001);

        let half = Bbox::new(0.0, 0.0, 5.0, 10.0);
        assert_abs_diff_eq!(a.shape_similarity(&half), 0.5, epsilon = 0.001);
    }

    #[test]
    fn test_iou_matrix_shape() {
        let dets = array![[0.0, 0.0, 10.0, 10.0, 0.9], [20.0, 20.0, 30.0, 30.0, 0.8]];
        let tracks = array![[1.0, 1.0, 11.0, 11.0, 1.0]];
        let m = ious(dets.view(), tracks.view());
        assert_eq!(m.shape(), &[2, 1]);
        assert!(m[[0, 0]] > 0.5);
        assert_eq!(m[[1, 0]], 0.0);
    }
}
