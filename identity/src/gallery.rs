//! Gallery of global identities
//!
//! The registry of every person the system knows about, keyed by global id
//! with secondary lookup by display label and by camera. All mutation goes
//! through the resolver's serialized write path; this module only enforces
//! the per-record invariants (bounded windows, visit accounting, merge
//! semantics).

use crate::embedding::Embedding;
use crate::error::{IdentityError, Result};
use crate::types::{CameraId, GlobalId, IdentityRecord};
use camtrack::Bbox;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

/// One recorded observation of an identity on a camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sighting {
    pub camera: CameraId,
    pub bbox: Bbox,
    pub timestamp_ms: u64,
}

/// A unique person across all cameras.
#[derive(Debug, Clone)]
pub struct GlobalIdentity {
    pub id: GlobalId,
    pub label: String,
    pub first_seen_ms: u64,
    pub last_seen_ms: u64,
    pub visit_count: u64,
    pub cameras: BTreeSet<CameraId>,
    /// Rolling appearance window, newest last.
    embeddings: VecDeque<Embedding>,
    /// Rolling position window, newest last.
    positions: VecDeque<Sighting>,
    last_seen_by_camera: HashMap<CameraId, u64>,
}

impl GlobalIdentity {
    pub fn embedding_window(&self) -> &VecDeque<Embedding> {
        &self.embeddings
    }

    pub fn position_window(&self) -> &VecDeque<Sighting> {
        &self.positions
    }

    /// Most recent recorded position, if any.
    pub fn latest_position(&self) -> Option<&Sighting> {
        self.positions.back()
    }

    pub fn last_seen_on(&self, camera: &CameraId) -> Option<u64> {
        self.last_seen_by_camera.get(camera).copied()
    }

    pub fn record(&self) -> IdentityRecord {
        IdentityRecord {
            global_id: self.id,
            label: self.label.clone(),
            first_seen_ms: self.first_seen_ms,
            last_seen_ms: self.last_seen_ms,
            visit_count: self.visit_count,
            cameras: self.cameras.clone(),
            embedding_count: self.embeddings.len(),
        }
    }
}

/// In-memory identity registry with bounded per-record windows.
#[derive(Debug)]
pub struct GalleryStore {
    identities: HashMap<GlobalId, GlobalIdentity>,
    by_label: HashMap<String, GlobalId>,
    by_camera: HashMap<CameraId, HashSet<GlobalId>>,
    next_id: u64,
    embedding_capacity: usize,
    position_capacity: usize,
    reunion_gap_ms: u64,
}

impl GalleryStore {
    pub fn new(embedding_capacity: usize, position_capacity: usize, reunion_gap_ms: u64) -> Self {
        Self {
            identities: HashMap::new(),
            by_label: HashMap::new(),
            by_camera: HashMap::new(),
            next_id: 1,
            embedding_capacity: embedding_capacity.max(1),
            position_capacity: position_capacity.max(1),
            reunion_gap_ms,
        }
    }

    /// Allocate a new identity seeded with its first sighting.
    pub fn create(
        &mut self,
        camera: &CameraId,
        bbox: Bbox,
        embedding: Option<Embedding>,
        now_ms: u64,
    ) -> GlobalId {
        let id = GlobalId(self.next_id);
        self.next_id += 1;
        let label = format!("person-{}", id.0);

        let mut identity = GlobalIdentity {
            id,
            label: label.clone(),
            first_seen_ms: now_ms,
            last_seen_ms: now_ms,
            visit_count: 1,
            cameras: BTreeSet::new(),
            embeddings: VecDeque::new(),
            positions: VecDeque::new(),
            last_seen_by_camera: HashMap::new(),
        };
        identity.cameras.insert(camera.clone());
        identity.last_seen_by_camera.insert(camera.clone(), now_ms);
        identity.positions.push_back(Sighting {
            camera: camera.clone(),
            bbox,
            timestamp_ms: now_ms,
        });
        if let Some(embedding) = embedding {
            identity.embeddings.push_back(embedding);
        }

        self.by_label.insert(label, id);
        self.by_camera.entry(camera.clone()).or_default().insert(id);
        self.identities.insert(id, identity);
        id
    }

    pub fn get(&self, id: GlobalId) -> Option<&GlobalIdentity> {
        self.identities.get(&id)
    }

    pub fn get_by_label(&self, label: &str) -> Option<&GlobalIdentity> {
        self.by_label.get(label).and_then(|id| self.identities.get(id))
    }

    /// Identities that a camera has ever observed.
    pub fn ids_seen_by_camera(&self, camera: &CameraId) -> Vec<GlobalId> {
        let mut ids: Vec<GlobalId> = self
            .by_camera
            .get(camera)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    /// Identities last seen on `camera` at or after `since_ms`.
    pub fn seen_within(&self, camera: &CameraId, since_ms: u64) -> Vec<GlobalId> {
        let mut ids: Vec<GlobalId> = self
            .by_camera
            .get(camera)
            .map(|set| {
                set.iter()
                    .copied()
                    .filter(|id| {
                        self.identities
                            .get(id)
                            .and_then(|p| p.last_seen_on(camera))
                            .map(|ts| ts >= since_ms)
                            .unwrap_or(false)
                    })
                    .collect()
            })
            .unwrap_or_default();
        ids.sort();
        ids
    }

    /// Append a sighting to an identity's rolling windows.
    ///
    /// The visit counter increments only when the gap since the previous
    /// sighting exceeds the reunion gap. Returns `true` when the embedding
    /// window evicted an entry, signalling the caller to refresh the
    /// similarity index for this identity.
    pub fn record_sighting(
        &mut self,
        id: GlobalId,
        camera: &CameraId,
        bbox: Bbox,
        embedding: Option<Embedding>,
        now_ms: u64,
    ) -> Result<bool> {
        let identity = self
            .identities
            .get_mut(&id)
            .ok_or(IdentityError::UnknownIdentity(id))?;

        let gap = now_ms.saturating_sub(identity.last_seen_ms);
        if gap > self.reunion_gap_ms {
            identity.visit_count += 1;
        }
        identity.last_seen_ms = identity.last_seen_ms.max(now_ms);
        identity.cameras.insert(camera.clone());
        identity
            .last_seen_by_camera
            .insert(camera.clone(), now_ms);

        identity.positions.push_back(Sighting {
            camera: camera.clone(),
            bbox,
            timestamp_ms: now_ms,
        });
        while identity.positions.len() > self.position_capacity {
            identity.positions.pop_front();
        }

        let mut evicted = false;
        if let Some(embedding) = embedding {
            identity.embeddings.push_back(embedding);
            while identity.embeddings.len() > self.embedding_capacity {
                identity.embeddings.pop_front();
                evicted = true;
            }
        }

        self.by_camera.entry(camera.clone()).or_default().insert(id);
        Ok(evicted)
    }

    /// Drop every recorded position (the person has left all views).
    pub fn clear_positions(&mut self, id: GlobalId) -> Result<()> {
        let identity = self
            .identities
            .get_mut(&id)
            .ok_or(IdentityError::UnknownIdentity(id))?;
        identity.positions.clear();
        identity.last_seen_by_camera.clear();
        Ok(())
    }

    /// Rename an identity's display label.
    pub fn set_label(&mut self, id: GlobalId, label: String) -> Result<()> {
        if let Some(existing) = self.by_label.get(&label) {
            if *existing != id {
                return Err(IdentityError::DuplicateLabel(label));
            }
            return Ok(());
        }
        let identity = self
            .identities
            .get_mut(&id)
            .ok_or(IdentityError::UnknownIdentity(id))?;
        self.by_label.remove(&identity.label);
        identity.label = label.clone();
        self.by_label.insert(label, id);
        Ok(())
    }

    /// Up to `batch` identities whose inactivity exceeds `ttl_ms`.
    pub fn expired_ids(&self, now_ms: u64, ttl_ms: u64, batch: usize) -> Vec<GlobalId> {
        let mut ids: Vec<GlobalId> = self
            .identities
            .values()
            .filter(|p| now_ms.saturating_sub(p.last_seen_ms) > ttl_ms)
            .map(|p| p.id)
            .collect();
        ids.sort();
        ids.truncate(batch);
        ids
    }

    /// Remove an identity and its secondary index entries.
    pub fn remove(&mut self, id: GlobalId) -> Option<GlobalIdentity> {
        let identity = self.identities.remove(&id)?;
        self.by_label.remove(&identity.label);
        for camera in &identity.cameras {
            if let Some(set) = self.by_camera.get_mut(camera) {
                set.remove(&id);
                if set.is_empty() {
                    self.by_camera.remove(camera);
                }
            }
        }
        Some(identity)
    }

    /// Fold `absorbed` into `survivor`.
    ///
    /// The survivor keeps the earliest first-seen and latest last-seen of
    /// either record, the summed visit count, the camera-set union, and
    /// windows bounded to the configured capacities with the most recent
    /// entries retained. Merging an id that no longer exists is a no-op
    /// (`Ok(false)`), which makes retries after a completed merge safe.
    pub fn merge(&mut self, survivor: GlobalId, absorbed: GlobalId) -> Result<bool> {
        if survivor == absorbed {
            return Ok(false);
        }
        if !self.identities.contains_key(&survivor) {
            return Err(IdentityError::UnknownIdentity(survivor));
        }
        let Some(absorbed_identity) = self.remove(absorbed) else {
            return Ok(false);
        };

        // remove() above cannot have dropped the survivor.
        let identity = self
            .identities
            .get_mut(&survivor)
            .ok_or(IdentityError::UnknownIdentity(survivor))?;

        identity.first_seen_ms = identity.first_seen_ms.min(absorbed_identity.first_seen_ms);
        identity.last_seen_ms = identity.last_seen_ms.max(absorbed_identity.last_seen_ms);
        identity.visit_count += absorbed_identity.visit_count;
        identity.cameras.extend(absorbed_identity.cameras.iter().cloned());

        for (camera, ts) in absorbed_identity.last_seen_by_camera {
            let slot = identity.last_seen_by_camera.entry(camera).or_insert(0);
            *slot = (*slot).max(ts);
        }

        // Positions carry timestamps: merge-sort and keep the newest.
        let mut positions: Vec<Sighting> = identity
            .positions
            .drain(..)
            .chain(absorbed_identity.positions.into_iter())
            .collect();
        positions.sort_by_key(|s| s.timestamp_ms);
        if positions.len() > self.position_capacity {
            positions.drain(..positions.len() - self.position_capacity);
        }
        identity.positions = positions.into();

        // Embeddings are unstamped; prefer the survivor's window and fill
        // the remaining capacity with the absorbed record's newest entries.
        let room = self
            .embedding_capacity
            .saturating_sub(identity.embeddings.len());
        let absorbed_embeddings = absorbed_identity.embeddings;
        let skip = absorbed_embeddings.len().saturating_sub(room);
        for embedding in absorbed_embeddings.into_iter().skip(skip) {
            identity.embeddings.push_back(embedding);
        }

        for camera in identity.cameras.clone() {
            self.by_camera.entry(camera).or_default().insert(survivor);
        }

        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    pub fn ids(&self) -> Vec<GlobalId> {
        let mut ids: Vec<GlobalId> = self.identities.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Audit records for every identity, ordered by id.
    pub fn records(&self) -> Vec<IdentityRecord> {
        self.ids()
            .into_iter()
            .filter_map(|id| self.identities.get(&id).map(|p| p.record()))
            .collect()
    }

    /// Audit records as a JSON document.
    pub fn export_records_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.records())?)
    }
}
