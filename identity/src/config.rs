//! Configuration surface for the resolver and the engine

use crate::types::CameraId;
use camtrack::TrackerConfig;
use serde::{Deserialize, Serialize};

/// Identity resolution tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Camera allowed to mint new global identities. When `None`, every
    /// camera may create; otherwise all other cameras are support cameras
    /// that can only match.
    pub primary_camera_id: Option<CameraId>,

    /// Whether the primary camera searches the gallery before creating a
    /// new identity. `false` restores create-immediately behavior for
    /// unmapped primary tracks.
    pub primary_rematches: bool,

    /// Blended score required to accept a candidate when an embedding is
    /// available.
    pub match_similarity_threshold: f32,

    /// Shape-only score required when no embedding is available. Stricter
    /// than the embedding threshold since box dimensions alone are a weak
    /// signal.
    pub position_only_threshold: f32,

    /// How far back an identity's sighting on an overlapping camera still
    /// counts for zone-biased candidate selection.
    pub match_time_window_ms: u64,

    /// Minimum gap between sightings for a new visit to be counted,
    /// rather than incrementing on every frame.
    pub reunion_gap_ms: u64,

    /// Inactivity after which an identity is eligible for expiry.
    /// `None` disables expiry.
    pub gallery_ttl_ms: Option<u64>,

    /// Rolling embeddings kept per identity (oldest evicted).
    pub embedding_window_capacity: usize,

    /// Rolling per-camera positions kept per identity.
    pub position_window_capacity: usize,

    /// Weight of the appearance score in the blend; the remainder goes to
    /// the box-shape score.
    pub appearance_weight: f32,

    /// Candidates retrieved from the similarity index on full-gallery
    /// fallback.
    pub max_candidates: usize,

    /// Attempts for a registry mutation before giving up with `Pending`.
    pub mutation_retries: u32,

    /// Backoff between mutation attempts.
    pub retry_backoff_ms: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            primary_camera_id: None,
            primary_rematches: true,
            match_similarity_threshold: 0.65,
            position_only_threshold: 0.85,
            match_time_window_ms: 4_000,
            reunion_gap_ms: 300_000,
            gallery_ttl_ms: Some(90 * 24 * 60 * 60 * 1_000), // 90 days
            embedding_window_capacity: 16,
            position_window_capacity: 32,
            appearance_weight: 0.8,
            max_candidates: 10,
            mutation_retries: 3,
            retry_backoff_ms: 5,
        }
    }
}

/// Engine-level knobs: per-camera queues, sweep cadence, tracker config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Capacity of each camera's frame queue; `submit` fails soft when the
    /// queue is full instead of blocking the frame loop.
    pub channel_capacity: usize,

    /// Period of the lifecycle sweep.
    pub sweep_interval_ms: u64,

    /// Identities examined for expiry per sweep tick, keeping the write
    /// lock short on large galleries.
    pub sweep_batch_size: usize,

    /// Soft-deleted index entries tolerated before a compaction runs.
    pub compact_tombstone_threshold: usize,

    /// Per-camera tracker configuration.
    pub tracker: TrackerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 8,
            sweep_interval_ms: 1_000,
            sweep_batch_size: 64,
            compact_tombstone_threshold: 256,
            tracker: TrackerConfig::default(),
        }
    }
}
