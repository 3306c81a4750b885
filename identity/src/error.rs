//! Error types for the identity engine

use crate::types::{CameraId, GlobalId};
use thiserror::Error;

/// Result type alias for the identity engine.
pub type Result<T> = std::result::Result<T, IdentityError>;

/// Errors that can occur in the identity layer.
///
/// Per-frame input problems (malformed boxes, missing embeddings) never
/// surface here; they degrade the affected resolution instead. These
/// variants cover structural misuse and shared-state failures.
#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("invalid embedding: {0}")]
    InvalidEmbedding(String),

    #[error("unknown identity: {0}")]
    UnknownIdentity(GlobalId),

    #[error("unknown camera: {0}")]
    UnknownCamera(CameraId),

    #[error("camera already registered: {0}")]
    DuplicateCamera(CameraId),

    #[error("frame queue full for camera {0}")]
    QueueFull(CameraId),

    #[error("engine is stopped")]
    EngineStopped,

    #[error("identity registry lock poisoned")]
    RegistryPoisoned,

    #[error("label already in use: {0}")]
    DuplicateLabel(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl IdentityError {
    pub fn invalid_embedding<S: Into<String>>(msg: S) -> Self {
        Self::InvalidEmbedding(msg.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }
}
