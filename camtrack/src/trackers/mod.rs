//! Tracker strategies behind a common interface
//!
//! Both strategies share the same track state machine and assignment core;
//! they differ in how many association rounds run per frame. The strategy
//! is chosen by configuration, not by swapping source files.

use crate::bbox::{ious, Bbox};
use crate::hungarian::AssignmentSolver;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

mod single_stage;
mod two_stage;

pub use single_stage::SingleStageTracker;
pub use two_stage::TwoStageTracker;

/// One person detection for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub bbox: Bbox,
    pub confidence: f32,
}

impl Detection {
    pub fn new(bbox: Bbox, confidence: f32) -> Self {
        Self { bbox, confidence }
    }

    /// Detections with degenerate boxes or out-of-range confidences are
    /// discarded before association.
    pub fn is_valid(&self) -> bool {
        self.bbox.is_valid() && (0.0..=1.0).contains(&self.confidence)
    }
}

/// A confirmed track reported for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackOutput {
    pub track_id: u32,
    pub bbox: Bbox,
    /// Mean confidence over the track's recent observation window.
    pub confidence: f32,
    /// Index into this frame's detection slice that updated the track.
    pub det_idx: Option<usize>,
}

/// Which association strategy a tracker runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TrackerKind {
    /// One association round per frame (SORT-style).
    SingleStage,
    /// High/low confidence split with a recovery round for lost tracks.
    #[default]
    TwoStage,
}

/// Tracker tuning knobs, shared by both strategies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    pub kind: TrackerKind,
    /// Confidence at or above which a detection counts as high-confidence
    /// and may start a new track.
    pub activation_threshold: f32,
    /// Floor for the low-confidence recovery set; detections below it are
    /// ignored entirely.
    pub low_score_threshold: f32,
    /// Minimum IoU for the first association round.
    pub iou_match_threshold: f32,
    /// Minimum IoU for the recovery round against lost tracks.
    pub low_iou_threshold: f32,
    /// Consecutive matches required before a new track is reported.
    pub min_consecutive_hits: u32,
    /// Predicted steps a lost track survives without a detection.
    pub miss_buffer: u32,
    /// Recent (box, confidence) pairs kept per track.
    pub history_capacity: usize,
    /// Observation noise covariance diagonal (cx, cy, area, aspect).
    pub measurement_noise: [f32; 4],
    /// Process noise covariance diagonal (state vector order).
    pub process_noise: [f32; 7],
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            kind: TrackerKind::TwoStage,
            activation_threshold: 0.5,
            low_score_threshold: 0.1,
            iou_match_threshold: 0.3,
            low_iou_threshold: 0.2,
            min_consecutive_hits: 3,
            miss_buffer: 30,
            history_capacity: 30,
            measurement_noise: [1.0, 1.0, 10.0, 10.0],
            process_noise: [1.0, 1.0, 1.0, 1.0, 0.01, 0.01, 0.0001],
        }
    }
}

/// Common interface for per-camera trackers.
///
/// `update` never blocks and fails soft: malformed detections are filtered
/// out and internal motion-model failures drop the affected track, so a bad
/// frame yields a shorter output list rather than an error.
pub trait TrackerStrategy: Send {
    /// Process one frame of detections; returns the confirmed tracks.
    fn update(&mut self, detections: &[Detection]) -> Vec<TrackOutput>;

    /// Drain the ids of tracks purged since the last call. Callers use this
    /// to release per-track resources held elsewhere.
    fn take_removed(&mut self) -> Vec<u32>;

    /// Number of live (non-removed) tracks.
    fn num_tracks(&self) -> usize;

    /// Frames processed so far.
    fn frame_count(&self) -> u64;

    /// Drop all tracks and reset ids.
    fn clear(&mut self);
}

/// Build the tracker selected by `config.kind`.
pub fn build_tracker(config: &TrackerConfig) -> Box<dyn TrackerStrategy> {
    match config.kind {
        TrackerKind::SingleStage => Box::new(SingleStageTracker::new(config.clone())),
        TrackerKind::TwoStage => Box::new(TwoStageTracker::new(config.clone())),
    }
}

/// Outcome of associating a detection subset with a track subset.
pub(crate) struct Association {
    /// (track_id, detection index into the original frame slice).
    pub matched: Vec<(u32, usize)>,
    /// Frame indices of detections left unmatched.
    pub unmatched_detections: Vec<usize>,
    /// Ids of tracks left unmatched.
    pub unmatched_tracks: Vec<u32>,
}

/// Run one Hungarian round between predicted track boxes and the detections
/// selected by `det_indices` (indices into the full frame slice).
pub(crate) fn associate(
    track_boxes: &[(u32, Bbox)],
    detections: &[Detection],
    det_indices: &[usize],
    iou_threshold: f32,
) -> Association {
    if track_boxes.is_empty() || det_indices.is_empty() {
        return Association {
            matched: Vec::new(),
            unmatched_detections: det_indices.to_vec(),
            unmatched_tracks: track_boxes.iter().map(|(id, _)| *id).collect(),
        };
    }

    let det_matrix = corners_matrix(det_indices.iter().map(|&i| detections[i].bbox));
    let track_matrix = corners_matrix(track_boxes.iter().map(|(_, b)| *b));

    let iou_matrix = ious(det_matrix.view(), track_matrix.view());
    let result = AssignmentSolver::solve_iou(iou_matrix.view(), iou_threshold);

    let matched: Vec<(u32, usize)> = result
        .assignments
        .iter()
        .map(|&(det_row, track_col)| (track_boxes[track_col].0, det_indices[det_row]))
        .collect();

    Association {
        matched,
        unmatched_detections: result
            .unassigned_detections
            .iter()
            .map(|&row| det_indices[row])
            .collect(),
        unmatched_tracks: result
            .unassigned_tracks
            .iter()
            .map(|&col| track_boxes[col].0)
            .collect(),
    }
}

fn corners_matrix(boxes: impl Iterator<Item = Bbox>) -> Array2<f32> {
    let data: Vec<f32> = boxes.flat_map(|b| b.to_corners()).collect();
    let rows = data.len() / 4;
    Array2::from_shape_vec((rows, 4), data).unwrap_or_else(|_| Array2::zeros((0, 4)))
}
