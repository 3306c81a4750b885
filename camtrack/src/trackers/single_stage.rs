//! Single-stage tracker: one association round per frame (SORT-style)

use super::{associate, Detection, TrackOutput, TrackerConfig, TrackerStrategy};
use crate::bbox::Bbox;
use crate::track::Track;
use std::collections::BTreeMap;

/// Baseline tracker without the low-confidence recovery round.
///
/// Detections below `activation_threshold` are ignored outright, so tracks
/// under brief occlusion rely on the miss buffer alone. Cheaper per frame
/// than `TwoStageTracker` and adequate for sparse scenes.
#[derive(Debug, Clone)]
pub struct SingleStageTracker {
    config: TrackerConfig,
    tracks: BTreeMap<u32, Track>,
    next_track_id: u32,
    frames: u64,
    removed: Vec<u32>,
}

impl SingleStageTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            tracks: BTreeMap::new(),
            next_track_id: 1,
            frames: 0,
            removed: Vec::new(),
        }
    }
}

impl TrackerStrategy for SingleStageTracker {
    fn update(&mut self, detections: &[Detection]) -> Vec<TrackOutput> {
        self.frames += 1;

        // Predict, dropping tracks whose motion state degenerated.
        let mut predicted: Vec<(u32, Bbox)> = Vec::with_capacity(self.tracks.len());
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

        let usable: Vec<usize> = detections
            .iter()
            .enumerate()
            .filter(|(_, d)| d.is_valid() && d.confidence >= self.config.activation_threshold)
            .map(|(i, _)| i)
            .collect();

        let assoc = associate(
            &predicted,
            detections,
            &usable,
            self.config.iou_match_threshold,
        );

        for &(track_id, det_idx) in &assoc.matched {
            let det = &detections[det_idx];
            if let Some(track) = self.tracks.get_mut(&track_id) {
                track.det_idx = Some(det_idx);
                if track
                    .confirm_hit(det.bbox, det.confidence, self.config.min_consecutive_hits)
                    .is_err()
                {
                    self.tracks.remove(&track_id);
                    self.removed.push(track_id);
                }
            }
        }

        for id in &assoc.unmatched_tracks {
            if let Some(track) = self.tracks.get_mut(id) {
                track.register_miss(self.config.miss_buffer);
            }
        }

        for det_idx in &assoc.unmatched_detections {
            let det = &detections[*det_idx];
            self.tracks.insert(
                self.next_track_id,
                Track::new(
                    self.next_track_id,
                    det.bbox,
                    det.confidence,
                    self.config.history_capacity,
                    self.config.measurement_noise,
                    self.config.process_noise,
                ),
            );
            self.next_track_id += 1;
        }

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
