//! Per-track state: Kalman-backed motion estimate plus lifecycle machine

use crate::bbox::Bbox;
use crate::kalman::KalmanFilter;
use anyhow::Result;
use nalgebra::DVector;
use std::collections::VecDeque;

/// Lifecycle of a local track.
///
/// `New` tracks need a run of consecutive matches before they are reported;
/// `Tracked` tracks that miss a frame become `Lost` and may be recovered by
/// the low-confidence association round; `Removed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    New,
    Tracked,
    Lost,
    Removed,
}

/// A single person trajectory as seen by one camera.
#[derive(Debug, Clone)]
pub struct Track {
    /// Camera-scoped track id.
    pub id: u32,
    /// Index of the detection matched this frame, if any.
    pub det_idx: Option<usize>,
    state: TrackState,
    kf: KalmanFilter,
    /// Steps this track has been predicted for.
    pub age: u32,
    /// Total matched detections.
    pub hits: u32,
    /// Consecutive matched detections.
    pub hit_streak: u32,
    /// Consecutive steps predicted without a matching detection.
    pub steps_since_update: u32,
    /// Recent observed (box, confidence) pairs, newest last.
    history: VecDeque<(Bbox, f32)>,
    history_capacity: usize,
}

impl Track {
    pub fn new(
        id: u32,
        bbox: Bbox,
        confidence: f32,
        history_capacity: usize,
        meas_var: [f32; 4],
        proc_var: [f32; 7],
    ) -> Self {
        let mut history = VecDeque::with_capacity(history_capacity.min(64));
        history.push_back((bbox, confidence));

        Self {
            id,
            det_idx: None,
            state: TrackState::New,
            kf: KalmanFilter::constant_velocity_box(&bbox, meas_var, proc_var),
            age: 0,
            hits: 1,
            hit_streak: 1,
            steps_since_update: 0,
            history,
            history_capacity: history_capacity.max(1),
        }
    }

    /// Predict the box position for the next frame.
    pub fn predict(&mut self) -> Bbox {
        // Keep the area from going negative on shrinking tracks.
        if self.kf.x[6] + self.kf.x[2] <= 0.0 {
            self.kf.x[6] = 0.0;
        }

        self.kf.predict();
        self.age += 1;

        if self.steps_since_update > 0 {
            self.hit_streak = 0;
        }
        self.steps_since_update += 1;
        self.det_idx = None;

        self.bbox()
    }

    /// Fold a matched detection into the track.
    ///
    /// Promotes `New` tracks once their streak reaches
    /// `min_consecutive_hits` and recovers `Lost` tracks back to `Tracked`.
    /// A Kalman failure leaves the track for the caller to discard.
    pub fn confirm_hit(
        &mut self,
        bbox: Bbox,
        confidence: f32,
        min_consecutive_hits: u32,
    ) -> Result<()> {
        if self.steps_since_update > 0 {
            self.hits += 1;
            self.hit_streak += 1;
        }
        self.steps_since_update = 0;

        let z = bbox.to_z();
        self.kf.update(DVector::from_vec(z.to_vec()))?;

        self.history.push_back((bbox, confidence));
        while self.history.len() > self.history_capacity {
            self.history.pop_front();
        }

        match self.state {
            TrackState::New => {
                if self.hit_streak >= min_consecutive_hits {
                    self.state = TrackState::Tracked;
                }
            }
            TrackState::Lost => {
                self.state = TrackState::Tracked;
            }
            TrackState::Tracked | TrackState::Removed => {}
        }

        Ok(())
    }

    /// Register a frame with no matching detection.
    ///
    /// Unconfirmed tracks are dropped outright; `Tracked` demotes to `Lost`;
    /// a `Lost` track that outlives `miss_buffer` predicted steps is
    /// removed. `Removed` never transitions again.
    pub fn register_miss(&mut self, miss_buffer: u32) {
        match self.state {
            TrackState::New => {
                self.state = TrackState::Removed;
            }
            TrackState::Tracked => {
                self.state = TrackState::Lost;
            }
            TrackState::Lost => {
                if self.steps_since_update > miss_buffer {
                    self.state = TrackState::Removed;
                }
            }
            TrackState::Removed => {}
        }
    }

    pub fn state(&self) -> TrackState {
        self.state
    }

    /// Force-remove the track (degenerate motion state).
    pub fn remove(&mut self) {
        self.state = TrackState::Removed;
    }

    /// True while the track takes part in association.
    pub fn is_active(&self) -> bool {
        self.state != TrackState::Removed
    }

    /// True once the track is confirmed and reportable.
    pub fn is_confirmed(&self) -> bool {
        self.state == TrackState::Tracked
    }

    /// Current box estimate from the motion model.
    pub fn bbox(&self) -> Bbox {
        self.kf.state_bbox()
    }

    /// Mean confidence over the recent observation window.
    pub fn avg_confidence(&self) -> f32 {
        if self.history.is_empty() {
            return 0.0;
        }
        let sum: f32 = self.history.iter().map(|(_, c)| c).sum();
        sum / self.history.len() as f32
    }

    /// Most recently observed box, if any.
    pub fn last_observed(&self) -> Option<&Bbox> {
        self.history.back().map(|(b, _)| b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MEAS: [f32; 4] = [1.0, 1.0, 10.0, 10.0];
    const PROC: [f32; 7] = [1.0, 1.0, 1.0, 1.0, 0.01, 0.01, 0.0001];

    fn track() -> Track {
        Track::new(1, Bbox::new(0.0, 0.0, 10.0, 20.0), 0.9, 30, MEAS, PROC)
    }

    #[test]
    fn test_promotion_after_consecutive_hits() {
        let mut t = track();
        assert_eq!(t.state(), TrackState::New);

        for step in 0..2 {
            t.predict();
            t.confirm_hit(Bbox::new(0.0, 0.0, 10.0, 20.0), 0.9, 3).unwrap();
            if step == 0 {
                assert_eq!(t.state(), TrackState::New); // streak 2 of 3
            }
        }
        assert_eq!(t.state(), TrackState::Tracked);
        assert_eq!(t.hit_streak, 3);
    }

    #[test]
    fn test_unconfirmed_miss_removes() {
        let mut t = track();
        t.predict();
        t.register_miss(30);
        assert_eq!(t.state(), TrackState::Removed);
    }

    #[test]
    fn test_tracked_miss_demotes_then_expires() {
        let mut t = track();
        for _ in 0..3 {
            t.predict();
            t.confirm_hit(Bbox::new(0.0, 0.0, 10.0, 20.0), 0.9, 3).unwrap();
        }
        assert_eq!(t.state(), TrackState::Tracked);

        t.predict();
        t.register_miss(2);
        assert_eq!(t.state(), TrackState::Lost);

        t.predict();
        t.register_miss(2);
        assert_eq!(t.state(), TrackState::Lost); // 2 misses, still within buffer

        t.predict();
        t.register_miss(2);
        assert_eq!(t.state(), TrackState::Removed); // exceeded buffer
    }

    #[test]
    fn test_lost_recovers_on_hit() {
        let mut t = track();
        for _ in 0..3 {
            t.predict();
            t.confirm_hit(Bbox::new(0.0, 0.0, 10.0, 20.0), 0.9, 3).unwrap();
        }
        t.predict();
        t.register_miss(30);
        assert_eq!(t.state(), TrackState::Lost);

        t.predict();
        t.confirm_hit(Bbox::new(1.0, 0.0, 11.0, 20.0), 0.6, 3).unwrap();
        assert_eq!(t.state(), TrackState::Tracked);
    }

    #[test]
    fn test_removed_is_terminal() {
        let mut t = track();
        t.predict();
        t.register_miss(30);
        assert_eq!(t.state(), TrackState::Removed);

        t.register_miss(30);
        assert_eq!(t.state(), TrackState::Removed);
        // A late hit must not resurrect the track either.
        let _ = t.confirm_hit(Bbox::new(0.0, 0.0, 10.0, 20.0), 0.9, 3);
        assert_eq!(t.state(), TrackState::Removed);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut t = Track::new(1, Bbox::new(0.0, 0.0, 10.0, 20.0), 0.5, 4, MEAS, PROC);
        for i in 0..10 {
            t.predict();
            t.confirm_hit(Bbox::new(0.0, 0.0, 10.0, 20.0), 0.1 * i as f32, 3)
                .unwrap();
        }
        assert!(t.avg_confidence() > 0.5); // only the newest entries remain
    }
}
