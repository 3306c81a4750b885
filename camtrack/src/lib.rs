//! Per-camera multi-object tracking library
//!
//! This crate turns a stream of per-frame person detections into continuous
//! local track ids for a single camera. It provides the building blocks
//! (bounding boxes and IoU matrices, a linear Kalman motion model, an
//! optimal-assignment solver) and two tracker strategies behind a common
//! trait:
//!
//! - `SingleStageTracker`: one association round per frame (SORT-style)
//! - `TwoStageTracker`: high/low confidence split with a recovery round for
//!   lost tracks (ByteTrack-style, the default)
//!
//! ```rust,ignore
//! use camtrack::{Detection, Bbox, TrackerConfig, TwoStageTracker, TrackerStrategy};
//!
//! let mut tracker = TwoStageTracker::new(TrackerConfig::default());
//! let detections = vec![Detection::new(Bbox::new(10.0, 10.0, 50.0, 90.0), 0.9)];
//! let tracks = tracker.update(&detections);
//! ```

pub mod bbox;
pub mod hungarian;
pub mod kalman;
pub mod track;
pub mod trackers;

pub use bbox::Bbox;
pub use hungarian::{AssignmentResult, AssignmentSolver};
pub use track::{Track, TrackState};
pub use trackers::{
    build_tracker, Detection, SingleStageTracker, TrackOutput, TrackerConfig, TrackerKind,
    TrackerStrategy, TwoStageTracker,
};
