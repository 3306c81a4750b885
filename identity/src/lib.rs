//! Multi-camera person identity engine
//!
//! Consumes per-frame person detections (and optional appearance embeddings)
//! from independent camera streams and maintains a deduplicated registry of
//! global identities across all cameras. Per-camera tracking runs on
//! isolated worker threads (`camtrack` does the motion/association work);
//! identity decisions go through a single serialized write path so that two
//! cameras can never race a brand-new person into two identities.
//!
//! ```rust,ignore
//! use person_identity_engine::{
//!     CameraId, EngineConfig, FrameInput, ResolverConfig, TrackingEngine, ZoneManager,
//! };
//!
//! let mut engine = TrackingEngine::new(
//!     EngineConfig::default(),
//!     ResolverConfig::default(),
//!     ZoneManager::default(),
//! );
//! engine.add_camera(CameraId::from("entrance"))?;
//! engine.submit(&CameraId::from("entrance"), FrameInput::new(detections, embeddings, now_ms))?;
//! ```

pub mod config;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod gallery;
pub mod index;
pub mod lifecycle;
pub mod metrics;
pub mod resolver;
pub mod types;
pub mod zones;

pub use camtrack::{Bbox, Detection, TrackerConfig, TrackerKind};
pub use config::{EngineConfig, ResolverConfig};
pub use embedding::Embedding;
pub use engine::{FrameInput, FrameOutput, TrackingEngine};
pub use error::{IdentityError, Result};
pub use gallery::{GalleryStore, GlobalIdentity, Sighting};
pub use index::{BruteForceIndex, SimilarityIndex};
pub use lifecycle::LifecycleCoordinator;
pub use metrics::{MetricsSnapshot, ResolverMetrics};
pub use resolver::{IdentityResolver, ResolveOutcome, ResolveRequest, SweepStats};
pub use types::{CameraId, GlobalId, IdentityRecord, TrackedPerson};
pub use zones::{OverlapZone, ZoneManager, ZoneRegion};
