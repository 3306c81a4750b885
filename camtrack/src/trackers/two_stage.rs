//! Two-stage tracker: high/low confidence association with lost-track recovery

use super::{associate, Detection, TrackOutput, TrackerConfig, TrackerStrategy};
use crate::bbox::Bbox;
use crate::track::{Track, TrackState};
use std::collections::BTreeMap;

/// Default per-camera tracker.
///
/// Each frame runs two association rounds: confident detections are matched
/// against every active track first, then leftover low-confidence detections
/// get a chance to recover tracks that are currently `Lost`. This keeps
/// briefly occluded or under-detected people on their existing track id
/// instead of spawning a duplicate.
#[derive(Debug, Clone)]
pub struct TwoStageTracker {
    config: TrackerConfig,
    tracks: BTreeMap<u32, Track>,
    next_track_id: u32,
    frames: u64,
    removed: Vec<u32>,
}

impl TwoStageTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            tracks: BTreeMap::new(),
            next_track_id: 1,
            frames: 0,
            removed: Vec::new(),
        }
    }

    /// Predict every active track one step forward; tracks whose motion
    /// state degenerated are dropped on the spot.
    fn predict_all(&mut self) -> Vec<(u32, Bbox)> {
        let mut predicted = Vec::with_capacity(self.tracks.len());
        let mut degenerate = Vec::new();

        for (id, track) in self.tracks.iter_mut() {
            let bbox = track.predict();
            if bbox.is_valid() {
                predicted.push((*id, bbox));
            } else {
                track.remove();
                degenerate.push(*id);
            }
        }

        for id in degenerate {
            self.tracks.remove(&id);
            self.removed.push(id);
        }
        predicted
    }

    /// Split frame detections into high- and low-confidence index sets,
    /// discarding malformed detections and those below the low floor.
    fn split_detections(&self, detections: &[Detection]) -> (Vec<usize>, Vec<usize>) {
        let mut high = Vec::new();
        let mut low = Vec::new();

        for (i, det) in detections.iter().enumerate() {
            if !det.is_valid() {
                continue;
            }
            if det.confidence >= self.config.activation_threshold {
                high.push(i);
            } else if det.confidence >= self.config.low_score_threshold {
                low.push(i);
            }
        }
        (high, low)
    }

    fn apply_matches(&mut self, matches: &[(u32, usize)], detections: &[Detection]) {
        for &(track_id, det_idx) in matches {
            let det = &detections[det_idx];
            if let Some(track) = self.tracks.get_mut(&track_id) {
                track.det_idx = Some(det_idx);
                if track
                    .confirm_hit(
                        det.bbox,
                        det.confidence,
                        self.config.min_consecutive_hits,
                    )
                    .is_err()
                {
                    // Motion model failure: discard the track.
                    self.tracks.remove(&track_id);
                    self.removed.push(track_id);
                }
            }
        }
    }

    fn purge_removed(&mut self) {
        let dead: Vec<u32> = self
            .tracks
            .iter()
            .filter(|(_, t)| !t.is_active())
            .map(|(id, _)| *id)
            .collect();
        for id in dead {
            self.tracks.remove(&id);
            self.removed.push(id);
        }
    }

    fn collect_outputs(&self) -> Vec<TrackOutput> {
        self.tracks
            .values()
            .filter(|t| t.is_confirmed() && t.steps_since_update == 0)
            .map(|t| TrackOutput {
                track_id: t.id,
                bbox: t.bbox(),
                confidence: t.avg_confidence(),
                det_idx: t.det_idx,
            })
            .collect()
    }
}

impl TrackerStrategy for TwoStageTracker {
    fn update(&mut self, detections: &[Detection]) -> Vec<TrackOutput> {
        self.frames += 1;

        // Round 0: motion prediction.
        let predicted = self.predict_all();

        let (high, low) = self.split_detections(detections);

        // Round 1: confident detections vs every active track.
        let first = associate(
            &predicted,
            detections,
            &high,
            self.config.iou_match_threshold,
        );
        self.apply_matches(&first.matched, detections);

        // Round 2: leftover low-confidence detections vs lost tracks only,
        // at a relaxed IoU threshold.
        let lost_boxes: Vec<(u32, Bbox)> = first
            .unmatched_tracks
            .iter()
            .filter_map(|id| {
                let track = self.tracks.get(id)?;
                (track.state() == TrackState::Lost).then(|| (*id, track.bbox()))
            })
            .collect();
        let second = associate(
            &lost_boxes,
            detections,
            &low,
            self.config.low_iou_threshold,
        );
        self.apply_matches(&second.matched, detections);

        // Everything still unmatched accrues a miss.
        let recovered: std::collections::HashSet<u32> =
            second.matched.iter().map(|(id, _)| *id).collect();
        for id in &first.unmatched_tracks {
            if recovered.contains(id) {
                continue;
            }
            if let Some(track) = self.tracks.get_mut(id) {
                track.register_miss(self.config.miss_buffer);
            }
        }

        // New tracks from unmatched confident detections.
        for det_idx in &first.unmatched_detections {
            let det = &detections[*det_idx];
            let track = Track::new(
                self.next_track_id,
                det.bbox,
                det.confidence,
                self.config.history_capacity,
                self.config.measurement_noise,
                self.config.process_noise,
            );
            self.tracks.insert(self.next_track_id, track);
            self.next_track_id += 1;
        }

        self.purge_removed();
        self.collect_outputs()
    }

    fn take_removed(&mut self) -> Vec<u32> {
        std::mem::take(&mut self.removed)
    }

    fn num_tracks(&self) -> usize {
        self.tracks.len()
    }

    fn frame_count(&self) -> u64 {
        self.frames
    }

    fn clear(&mut self) {
        self.removed.extend(self.tracks.keys().copied());
        self.tracks.clear();
        self.next_track_id = 1;
        self.frames = 0;
    }
}
