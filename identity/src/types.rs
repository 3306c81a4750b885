//! Core identifier and record types

use camtrack::Bbox;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Name of a camera stream, as configured by the deployment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CameraId(String);

impl CameraId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CameraId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for CameraId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for CameraId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// System-wide identifier of a unique person.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct GlobalId(pub u64);

impl fmt::Display for GlobalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "G{}", self.0)
    }
}

/// Per-frame output for one tracked person on one camera.
///
/// `global_id` is `None` while identity resolution is pending for this
/// track (e.g. a support camera with no confident match yet).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedPerson {
    pub local_track_id: u32,
    pub global_id: Option<GlobalId>,
    pub bbox: Bbox,
    pub confidence: f32,
}

/// Read-only gallery record exposed to external consumers for display and
/// audit. Mutation goes through the resolver only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub global_id: GlobalId,
    pub label: String,
    pub first_seen_ms: u64,
    pub last_seen_ms: u64,
    pub visit_count: u64,
    pub cameras: BTreeSet<CameraId>,
    pub embedding_count: usize,
}
