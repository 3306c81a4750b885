//! Optimal detection-to-track assignment
//!
//! Dense cost matrices go through the Kuhn-Munkres (Hungarian) algorithm;
//! sparse ones (mostly-invalid pairings) use a greedy best-first pass which
//! is much cheaper and equivalent in practice.

use ndarray::ArrayView2;
use pathfinding::prelude::{kuhn_munkres, Matrix};

/// Cost units per 1.0 of cost when quantizing to integer weights.
const COST_SCALE: f32 = 1000.0;
/// Weight assigned to pairings above the threshold so the solver avoids them.
const INVALID_WEIGHT: i32 = -1_000_000;

/// Outcome of one assignment round.
#[derive(Debug, Clone)]
pub struct AssignmentResult {
    /// Accepted (detection_idx, track_idx) pairs.
    pub assignments: Vec<(usize, usize)>,
    /// Detection rows left without a track.
    pub unassigned_detections: Vec<usize>,
    /// Track columns left without a detection.
    pub unassigned_tracks: Vec<usize>,
}

impl AssignmentResult {
    fn empty(num_detections: usize, num_tracks: usize) -> Self {
        Self {
            assignments: Vec::new(),
            unassigned_detections: (0..num_detections).collect(),
            unassigned_tracks: (0..num_tracks).collect(),
        }
    }
}

/// Assignment solver with dense (Hungarian) and sparse (greedy) paths.
pub struct AssignmentSolver;

impl AssignmentSolver {
    /// Solve an assignment problem on a cost matrix. Pairings with cost
    /// at or above `threshold` are never accepted.
    pub fn solve(cost_matrix: ArrayView2<f32>, threshold: f32) -> AssignmentResult {
        let num_detections = cost_matrix.nrows();
        let num_tracks = cost_matrix.ncols();

        if num_detections == 0 || num_tracks == 0 {
            return AssignmentResult::empty(num_detections, num_tracks);
        }

        let valid_count = cost_matrix.iter().filter(|&&c| c < threshold).count();
        let total_entries = num_detections * num_tracks;

        // Under 25% valid pairings the optimal and greedy solutions rarely
        // differ; skip the O(n³) machinery.
        if valid_count < total_entries / 4 {
            Self::solve_greedy(cost_matrix, threshold)
        } else {
            Self::solve_hungarian(cost_matrix, threshold)
        }
    }

    fn solve_hungarian(cost_matrix: ArrayView2<f32>, threshold: f32) -> AssignmentResult {
        let num_detections = cost_matrix.nrows();
        let num_tracks = cost_matrix.ncols();

        // kuhn_munkres maximizes total weight, so costs are negated; the
        // matrix is padded square with strongly negative dummy weights.
        let size = num_detections.max(num_tracks);
        let mut weights = Matrix::new(size, size, INVALID_WEIGHT);

        for i in 0..num_detections {
            for j in 0..num_tracks {
                let cost = cost_matrix[[i, j]];
                if cost < threshold {
                    weights[(i, j)] = -(cost * COST_SCALE) as i32;
                }
            }
        }

        let (_total, raw_assignments) = kuhn_munkres(&weights);

        let assignments: Vec<(usize, usize)> = raw_assignments
            .iter()
            .enumerate()
            .filter_map(|(det_idx, &track_idx)| {
                if det_idx < num_detections
                    && track_idx < num_tracks
                    && weights[(det_idx, track_idx)] != INVALID_WEIGHT
                {
                    Some((det_idx, track_idx))
                } else {
                    None
                }
            })
            .collect();

        Self::collect_unassigned(assignments, num_detections, num_tracks)
    }

    /// Best-first greedy assignment for sparse cost matrices.
    fn solve_greedy(cost_matrix: ArrayView2<f32>, threshold: f32) -> AssignmentResult {
        let num_detections = cost_matrix.nrows();
        let num_tracks = cost_matrix.ncols();

        let mut candidates: Vec<(f32, usize, usize)> = Vec::new();
        for i in 0..num_detections {
            for j in 0..num_tracks {
                let cost = cost_matrix[[i, j]];
                if cost < threshold {
                    candidates.push((cost, i, j));
                }
            }
        }

        candidates.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        let mut assignments = Vec::new();
        let mut used_detections = vec![false; num_detections];
        let mut used_tracks = vec![false; num_tracks];

        for (_cost, det_idx, track_idx) in candidates {
            if !used_detections[det_idx] && !used_tracks[track_idx] {
                assignments.push((det_idx, track_idx));
                used_detections[det_idx] = true;
                used_tracks[track_idx] = true;
            }
        }

        Self::collect_unassigned(assignments, num_detections, num_tracks)
    }

    fn collect_unassigned(
        assignments: Vec<(usize, usize)>,
        num_detections: usize,
        num_tracks: usize,
    ) -> AssignmentResult {
        let mut det_assigned = vec![false; num_detections];
        let mut track_assigned = vec![false; num_tracks];
        for &(d, t) in &assignments {
            det_assigned[d] = true;
            track_assigned[t] = true;
        }

        AssignmentResult {
            assignments,
            unassigned_detections: (0..num_detections).filter(|&i| !det_assigned[i]).collect(),
            unassigned_tracks: (0..num_tracks).filter(|&i| !track_assigned[i]).collect(),
        }
    }

    /// Solve on an IoU matrix: IoU is converted to cost (1 - IoU) and pairs
    /// below `iou_threshold` are rejected.
    pub fn solve_iou(iou_matrix: ArrayView2<f32>, iou_threshold: f32) -> AssignmentResult {
        let cost_matrix = iou_matrix.mapv(|iou| 1.0 - iou);
        Self::solve(cost_matrix.view(), 1.0 - iou_threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_diagonal_assignment() {
        // Clear diagonal optimum.
        let iou = array![[0.9, 0.1, 0.0], [0.05, 0.8, 0.1], [0.0, 0.1, 0.7]];
        let result = AssignmentSolver::solve_iou(iou.view(), 0.3);

        assert_eq!(result.assignments.len(), 3);
        for (d, t) in &result.assignments {
            assert_eq!(d, t);
        }
        assert!(result.unassigned_detections.is_empty());
        assert!(result.unassigned_tracks.is_empty());
    }

    #[test]
    fn test_threshold_rejects_weak_pairs() {
        let iou = array![[0.2, 0.0], [0.0, 0.9]];
        let result = AssignmentSolver::solve_iou(iou.view(), 0.3);

        assert_eq!(result.assignments, vec![(1, 1)]);
        assert_eq!(result.unassigned_detections, vec![0]);
        assert_eq!(result.unassigned_tracks, vec![0]);
    }

    #[test]
    fn test_sparse_path_matches_expectation() {
        // One valid pairing in a 4x4 matrix: below 25% density, greedy path.
        let mut iou = ndarray::Array2::<f32>::zeros((4, 4));
        iou[[2, 1]] = 0.8;
        let result = AssignmentSolver::solve_iou(iou.view(), 0.3);

        assert_eq!(result.assignments, vec![(2, 1)]);
        assert_eq!(result.unassigned_detections, vec![0, 1, 3]);
        assert_eq!(result.unassigned_tracks, vec![0, 2, 3]);
    }

    #[test]
    fn test_empty_inputs() {
        let iou = ndarray::Array2::<f32>::zeros((0, 3));
        let result = AssignmentSolver::solve_iou(iou.view(), 0.3);
        assert!(result.assignments.is_empty());
        assert_eq!(result.unassigned_tracks, vec![0, 1, 2]);
    }

    #[test]
    fn test_rectangular_more_detections_than_tracks() {
        let iou = array![[0.9], [0.6], [0.1]];
        let result = AssignmentSolver::solve_iou(iou.view(), 0.3);

        assert_eq!(result.assignments.len(), 1);
        assert_eq!(result.assignments[0].1, 0);
        assert_eq!(result.assignments[0].0, 0); // highest IoU wins the only track
        assert_eq!(result.unassigned_detections, vec![1, 2]);
    }
}
