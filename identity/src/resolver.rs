//! Cross-camera identity resolution
//!
//! The single coordination point between per-camera trackers and the shared
//! gallery. Matching and creation against the candidate pool happen under
//! one registry lock held for the whole decision, so two cameras observing
//! a genuinely new person at the same instant cannot both mint an identity
//! for them.

use crate::config::ResolverConfig;
use crate::embedding::{window_score, Embedding};
use crate::error::{IdentityError, Result};
use crate::gallery::{GalleryStore, GlobalIdentity};
use crate::index::{BruteForceIndex, SimilarityIndex};
use crate::metrics::ResolverMetrics;
use crate::types::{CameraId, GlobalId, IdentityRecord};
use crate::zones::ZoneManager;
use camtrack::Bbox;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// One track observation submitted for identity resolution.
#[derive(Debug, Clone)]
pub struct ResolveRequest {
    pub camera_id: CameraId,
    pub local_track_id: u32,
    pub bbox: Bbox,
    pub embedding: Option<Embedding>,
    pub timestamp_ms: u64,
}

/// Outcome of a resolution call. Absence of an identity is a first-class
/// result, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// The track maps to an existing identity.
    Matched(GlobalId),
    /// A new identity was minted for the track.
    Created(GlobalId),
    /// No identity assignable yet (support camera without a confident
    /// match, or a mutation that could not complete).
    Pending,
}

impl ResolveOutcome {
    pub fn global_id(&self) -> Option<GlobalId> {
        match self {
            ResolveOutcome::Matched(id) | ResolveOutcome::Created(id) => Some(*id),
            ResolveOutcome::Pending => None,
        }
    }
}

/// Result of one lifecycle sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub expired: usize,
    pub remaining: usize,
    pub compacted: bool,
}

/// Shared mutable state guarded by one lock: the gallery, its similarity
/// index, and the local-to-global track mapping. They move together so a
/// resolution is all-or-nothing.
struct Registry {
    gallery: GalleryStore,
    index: BruteForceIndex,
    mappings: HashMap<(CameraId, u32), GlobalId>,
}

/// Serialized write path for the identity registry.
pub struct IdentityResolver {
    config: ResolverConfig,
    zones: ZoneManager,
    registry: Mutex<Registry>,
    metrics: ResolverMetrics,
}

impl IdentityResolver {
    pub fn new(config: ResolverConfig, zones: ZoneManager) -> Self {
        let gallery = GalleryStore::new(
            config.embedding_window_capacity,
            config.position_window_capacity,
            config.reunion_gap_ms,
        );
        Self {
            config,
            zones,
            registry: Mutex::new(Registry {
                gallery,
                index: BruteForceIndex::new(),
                mappings: HashMap::new(),
            }),
            metrics: ResolverMetrics::default(),
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn metrics(&self) -> &ResolverMetrics {
        &self.metrics
    }

    fn is_primary(&self, camera: &CameraId) -> bool {
        self.config.primary_camera_id.as_ref() == Some(camera)
    }

    /// Whether `camera` may mint new identities.
    fn may_create(&self, camera: &CameraId) -> bool {
        match &self.config.primary_camera_id {
            Some(primary) => primary == camera,
            None => true,
        }
    }

    /// Acquire the registry lock, retrying with bounded backoff. Gives up
    /// after the configured attempts and reports the failure.
    fn lock_registry(&self) -> Result<MutexGuard<'_, Registry>> {
        let mut attempt = 0;
        loop {
            match self.registry.lock() {
                Ok(guard) => return Ok(guard),
                Err(_) if attempt < self.config.mutation_retries => {
                    attempt += 1;
                    std::thread::sleep(Duration::from_millis(self.config.retry_backoff_ms));
                }
                Err(_) => {
                    ResolverMetrics::incr(&self.metrics.mutation_failures);
                    return Err(IdentityError::RegistryPoisoned);
                }
            }
        }
    }

    /// Resolve a local track to a global identity.
    ///
    /// Never blocks the frame loop on failure: if the registry cannot be
    /// mutated the call reports `Pending` and the frame proceeds without a
    /// global id.
    pub fn resolve(&self, req: &ResolveRequest) -> Result<ResolveOutcome> {
        if req.embedding.is_none() {
            ResolverMetrics::incr(&self.metrics.degraded_no_embedding);
            log::debug!(
                "camera {} track {}: no embedding, position-only matching",
                req.camera_id,
                req.local_track_id
            );
        }

        let mut guard = match self.lock_registry() {
            Ok(guard) => guard,
            Err(_) => {
                log::error!(
                    "camera {} track {}: registry unavailable, returning pending",
                    req.camera_id,
                    req.local_track_id
                );
                ResolverMetrics::incr(&self.metrics.resolved_pending);
                return Ok(ResolveOutcome::Pending);
            }
        };
        let reg = &mut *guard;

        let key = (req.camera_id.clone(), req.local_track_id);

        // Fast path: the track already maps to an identity; refresh it.
        if let Some(&global_id) = reg.mappings.get(&key) {
            match Self::commit_sighting(&mut reg.gallery, &mut reg.index, global_id, req) {
                Ok(()) => {
                    ResolverMetrics::incr(&self.metrics.resolved_matched);
                    return Ok(ResolveOutcome::Matched(global_id));
                }
                Err(_) => {
                    // The identity expired under the mapping; resolve fresh.
                    log::warn!(
                        "camera {} track {}: dropping stale mapping to {}",
                        req.camera_id,
                        req.local_track_id,
                        global_id
                    );
                    reg.mappings.remove(&key);
                }
            }
        }

        let may_create = self.may_create(&req.camera_id);
        let skip_match = may_create && self.is_primary(&req.camera_id) && !self.config.primary_rematches;

        if !skip_match {
            if let Some((global_id, score)) = self.best_candidate(reg, req) {
                let threshold = if req.embedding.is_some() {
                    self.config.match_similarity_threshold
                } else {
                    self.config.position_only_threshold
                };
                if score >= threshold {
                    Self::commit_sighting(&mut reg.gallery, &mut reg.index, global_id, req)?;
                    reg.mappings.insert(key, global_id);
                    ResolverMetrics::incr(&self.metrics.resolved_matched);
                    log::debug!(
                        "camera {} track {} matched {} (score {:.3})",
                        req.camera_id,
                        req.local_track_id,
                        global_id,
                        score
                    );
                    return Ok(ResolveOutcome::Matched(global_id));
                }
            }
        }

        if may_create {
            let global_id = reg.gallery.create(
                &req.camera_id,
                req.bbox,
                req.embedding.clone(),
                req.timestamp_ms,
            );
            if let Some(embedding) = &req.embedding {
                reg.index.add(global_id, embedding.clone());
            }
            reg.mappings.insert(key, global_id);
            ResolverMetrics::incr(&self.metrics.resolved_created);
            log::info!(
                "camera {} track {} created identity {}",
                req.camera_id,
                req.local_track_id,
                global_id
            );
            Ok(ResolveOutcome::Created(global_id))
        } else {
            ResolverMetrics::incr(&self.metrics.resolved_pending);
            Ok(ResolveOutcome::Pending)
        }
    }

    /// Append the observation to an identity and keep the index in step.
    fn commit_sighting(
        gallery: &mut GalleryStore,
        index: &mut BruteForceIndex,
        global_id: GlobalId,
        req: &ResolveRequest,
    ) -> Result<()> {
        let evicted = gallery.record_sighting(
            global_id,
            &req.camera_id,
            req.bbox,
            req.embedding.clone(),
            req.timestamp_ms,
        )?;

        if let Some(embedding) = &req.embedding {
            if evicted {
                // The window rolled over: rebuild this identity's entries so
                // search never sees evicted embeddings.
                let window: Vec<Embedding> = gallery
                    .get(global_id)
                    .map(|p| p.embedding_window().iter().cloned().collect())
                    .unwrap_or_default();
                index.refresh(global_id, &window);
            } else {
                index.add(global_id, embedding.clone());
            }
        }
        Ok(())
    }

    /// Best-scoring candidate identity for the request, if any.
    ///
    /// Identities recently seen on an overlapping camera are preferred;
    /// when none qualify and an embedding is available, the similarity
    /// index serves candidates from the full active gallery. Position-only
    /// requests never search the full gallery.
    fn best_candidate(&self, reg: &Registry, req: &ResolveRequest) -> Option<(GlobalId, f32)> {
        let mut candidates = self.zone_candidates(&reg.gallery, req);

        if candidates.is_empty() {
            if let Some(embedding) = &req.embedding {
                candidates = reg
                    .index
                    .search(embedding, self.config.max_candidates, 0.0)
                    .into_iter()
                    .map(|(id, _)| id)
                    .collect();
            }
        }

        candidates
            .into_iter()
            .filter_map(|id| {
                let identity = reg.gallery.get(id)?;
                Some((id, self.score_candidate(identity, req)))
            })
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
    }

    /// Identities last seen on a camera overlapping the request's camera
    /// within the match time window, provided the track sits inside the
    /// overlap region.
    fn zone_candidates(&self, gallery: &GalleryStore, req: &ResolveRequest) -> Vec<GlobalId> {
        let since = req
            .timestamp_ms
            .saturating_sub(self.config.match_time_window_ms);
        let (cx, cy) = (req.bbox.center_x(), req.bbox.center_y());

        let mut out = Vec::new();
        for (other, region) in self.zones.overlapping(&req.camera_id) {
            if !region.contains(cx, cy) {
                continue;
            }
            for id in gallery.seen_within(other, since) {
                if !out.contains(&id) {
                    out.push(id);
                }
            }
        }
        out
    }

    /// Blend of appearance similarity and box-shape plausibility.
    fn score_candidate(&self, identity: &GlobalIdentity, req: &ResolveRequest) -> f32 {
        let shape = identity
            .latest_position()
            .map(|s| req.bbox.shape_similarity(&s.bbox));

        match (&req.embedding, shape) {
            (Some(embedding), Some(shape)) => {
                let appearance = window_score(embedding, identity.embedding_window());
                let w = self.config.appearance_weight;
                w * appearance + (1.0 - w) * shape
            }
            (Some(embedding), None) => window_score(embedding, identity.embedding_window()),
            (None, Some(shape)) => shape,
            (None, None) => 0.0,
        }
    }

    /// Drop the local-to-global mappings of purged tracks.
    pub fn release_tracks(&self, camera: &CameraId, track_ids: &[u32]) {
        if track_ids.is_empty() {
            return;
        }
        if let Ok(mut guard) = self.lock_registry() {
            for id in track_ids {
                guard.mappings.remove(&(camera.clone(), *id));
            }
        }
    }

    /// Fold identity `absorbed` into `survivor`, repointing mappings and
    /// index entries. Safe to retry.
    pub fn merge(&self, survivor: GlobalId, absorbed: GlobalId) -> Result<()> {
        if survivor == absorbed {
            return Ok(());
        }
        let mut guard = self.lock_registry()?;
        let reg = &mut *guard;

        if reg.gallery.merge(survivor, absorbed)? {
            reg.index.remove(absorbed);
            let window: Vec<Embedding> = reg
                .gallery
                .get(survivor)
                .map(|p| p.embedding_window().iter().cloned().collect())
                .unwrap_or_default();
            reg.index.refresh(survivor, &window);

            for mapped in reg.mappings.values_mut() {
                if *mapped == absorbed {
                    *mapped = survivor;
                }
            }
            ResolverMetrics::incr(&self.metrics.identities_merged);
            log::info!("merged identity {} into {}", absorbed, survivor);
        }
        Ok(())
    }

    /// Expire identities past their TTL and keep the index tidy. Called by
    /// the lifecycle coordinator on a timer; bounded to `batch` records per
    /// call so the write lock stays short.
    pub fn sweep(&self, now_ms: u64, batch: usize, compact_tombstone_threshold: usize) -> SweepStats {
        let mut stats = SweepStats::default();
        let Ok(mut guard) = self.lock_registry() else {
            return stats;
        };
        let reg = &mut *guard;

        if let Some(ttl_ms) = self.config.gallery_ttl_ms {
            for id in reg.gallery.expired_ids(now_ms, ttl_ms, batch) {
                reg.gallery.remove(id);
                reg.index.remove(id);
                reg.mappings.retain(|_, mapped| *mapped != id);
                ResolverMetrics::incr(&self.metrics.identities_expired);
                stats.expired += 1;
            }
        }

        if reg.index.tombstones() > compact_tombstone_threshold {
            reg.index.compact();
            stats.compacted = true;
        }
        stats.remaining = reg.gallery.len();
        stats
    }

    /// Simulate the person leaving every view (clears position windows and
    /// per-camera recency; appearance and visit history stay).
    pub fn clear_positions(&self, id: GlobalId) -> Result<()> {
        self.lock_registry()?.gallery.clear_positions(id)
    }

    pub fn record(&self, id: GlobalId) -> Result<IdentityRecord> {
        let guard = self.lock_registry()?;
        guard
            .gallery
            .get(id)
            .map(|p| p.record())
            .ok_or(IdentityError::UnknownIdentity(id))
    }

    pub fn records(&self) -> Result<Vec<IdentityRecord>> {
        Ok(self.lock_registry()?.gallery.records())
    }

    pub fn identity_count(&self) -> usize {
        self.lock_registry().map(|g| g.gallery.len()).unwrap_or(0)
    }

    pub fn set_label(&self, id: GlobalId, label: String) -> Result<()> {
        self.lock_registry()?.gallery.set_label(id, label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zones::{OverlapZone, ZoneRegion};

    fn emb(values: &[f32]) -> Embedding {
        Embedding::new(values.to_vec()).unwrap()
    }

    fn person_box() -> Bbox {
        Bbox::new(100.0, 100.0, 140.0, 180.0)
    }

    fn req(camera: &str, track: u32, embedding: Option<Embedding>, ts: u64) -> ResolveRequest {
        ResolveRequest {
            camera_id: CameraId::from(camera),
            local_track_id: track,
            bbox: person_box(),
            embedding,
            timestamp_ms: ts,
        }
    }

    fn overlap_full(a: &str, b: &str) -> ZoneManager {
        ZoneManager::from_zones(vec![OverlapZone::new(
            CameraId::from(a),
            CameraId::from(b),
            ZoneRegion::Full,
        )])
    }

    fn resolver_with_primary(primary: &str, zones: ZoneManager) -> IdentityResolver {
        IdentityResolver::new(
            ResolverConfig {
                primary_camera_id: Some(CameraId::from(primary)),
                ..ResolverConfig::default()
            },
            zones,
        )
    }

    #[test]
    fn test_create_then_idempotent_resolve() {
        let resolver = IdentityResolver::new(ResolverConfig::default(), ZoneManager::default());
        let request = req("cam", 1, Some(emb(&[1.0, 0.0, 0.0])), 1_000);

        let first = resolver.resolve(&request).unwrap();
        let created = first.global_id().unwrap();
        assert!(matches!(first, ResolveOutcome::Created(_)));

        // Identical immediate re-resolution yields the same id.
        let second = resolver.resolve(&request).unwrap();
        assert_eq!(second, ResolveOutcome::Matched(created));
        assert_eq!(resolver.identity_count(), 1);
    }

    #[test]
    fn test_support_camera_stays_pending() {
        let resolver = resolver_with_primary("main", overlap_full("main", "side"));
        let request = req("side", 5, Some(emb(&[1.0, 0.0, 0.0])), 1_000);

        assert_eq!(resolver.resolve(&request).unwrap(), ResolveOutcome::Pending);
        assert_eq!(resolver.identity_count(), 0);
        assert_eq!(resolver.metrics().snapshot().resolved_pending, 1);
    }

    #[test]
    fn test_cross_camera_match_through_overlap() {
        let resolver = resolver_with_primary("main", overlap_full("main", "side"));

        let created = resolver
            .resolve(&req("main", 1, Some(emb(&[1.0, 0.0, 0.0])), 1_000))
            .unwrap()
            .global_id()
            .unwrap();

        // The support camera sees a near-identical appearance within the
        // match window.
        let outcome = resolver
            .resolve(&req("side", 9, Some(emb(&[0.99, 0.1, 0.0])), 2_000))
            .unwrap();
        assert_eq!(outcome, ResolveOutcome::Matched(created));

        let record = resolver.record(created).unwrap();
        assert!(record.cameras.contains(&CameraId::from("main")));
        assert!(record.cameras.contains(&CameraId::from("side")));
    }

    #[test]
    fn test_support_rematch_after_disappearance() {
        let resolver = resolver_with_primary("main", overlap_full("main", "side"));

        let created = resolver
            .resolve(&req("main", 1, Some(emb(&[1.0, 0.0, 0.0])), 1_000))
            .unwrap()
            .global_id()
            .unwrap();

        // Person leaves every view; a support camera sees them again long
        // after the zone time window, well before the gallery TTL.
        resolver.clear_positions(created).unwrap();
        let later = 1_000 + 60_000;
        let outcome = resolver
            .resolve(&req("side", 2, Some(emb(&[1.0, 0.05, 0.0])), later))
            .unwrap();
        assert_eq!(outcome, ResolveOutcome::Matched(created));
        assert_eq!(resolver.identity_count(), 1);
    }

    #[test]
    fn test_distinct_appearance_creates_second_identity() {
        let resolver = IdentityResolver::new(ResolverConfig::default(), ZoneManager::default());

        let first = resolver
            .resolve(&req("cam", 1, Some(emb(&[1.0, 0.0, 0.0])), 1_000))
            .unwrap()
            .global_id()
            .unwrap();
        let second = resolver
            .resolve(&req("cam", 2, Some(emb(&[0.0, 1.0, 0.0])), 1_100))
            .unwrap()
            .global_id()
            .unwrap();

        assert_ne!(first, second);
        assert_eq!(resolver.identity_count(), 2);
    }

    #[test]
    fn test_primary_rematch_flag() {
        let zones = overlap_full("main", "side");

        // With rematch on (default), a returning person on the primary is
        // recognized rather than duplicated.
        let resolver = resolver_with_primary("main", zones.clone());
        let id = resolver
            .resolve(&req("main", 1, Some(emb(&[1.0, 0.0, 0.0])), 1_000))
            .unwrap()
            .global_id()
            .unwrap();
        let back = resolver
            .resolve(&req("main", 7, Some(emb(&[1.0, 0.02, 0.0])), 2_000))
            .unwrap();
        assert_eq!(back, ResolveOutcome::Matched(id));

        // With rematch off the primary creates immediately.
        let no_rematch = IdentityResolver::new(
            ResolverConfig {
                primary_camera_id: Some(CameraId::from("main")),
                primary_rematches: false,
                ..ResolverConfig::default()
            },
            zones,
        );
        no_rematch
            .resolve(&req("main", 1, Some(emb(&[1.0, 0.0, 0.0])), 1_000))
            .unwrap();
        let duplicate = no_rematch
            .resolve(&req("main", 7, Some(emb(&[1.0, 0.02, 0.0])), 2_000))
            .unwrap();
        assert!(matches!(duplicate, ResolveOutcome::Created(_)));
        assert_eq!(no_rematch.identity_count(), 2);
    }

    #[test]
    fn test_position_only_fallback_within_zone() {
        let resolver = resolver_with_primary("main", overlap_full("main", "side"));

        let id = resolver
            .resolve(&req("main", 1, Some(emb(&[1.0, 0.0, 0.0])), 1_000))
            .unwrap()
            .global_id()
            .unwrap();

        // Embedding extraction failed on the support camera; the matching
        // box dimensions inside the overlap window still carry the match.
        let outcome = resolver.resolve(&req("side", 4, None, 2_000)).unwrap();
        assert_eq!(outcome, ResolveOutcome::Matched(id));
        assert_eq!(resolver.metrics().snapshot().degraded_no_embedding, 1);
    }

    #[test]
    fn test_position_only_never_searches_full_gallery() {
        // No zones configured: a no-embedding request has no candidates and
        // a support camera must stay pending.
        let resolver = resolver_with_primary("main", ZoneManager::default());
        resolver
            .resolve(&req("main", 1, Some(emb(&[1.0, 0.0, 0.0])), 1_000))
            .unwrap();

        let outcome = resolver.resolve(&req("side", 4, None, 2_000)).unwrap();
        assert_eq!(outcome, ResolveOutcome::Pending);
    }

    #[test]
    fn test_sweep_expires_and_unmaps() {
        let resolver = IdentityResolver::new(
            ResolverConfig {
                gallery_ttl_ms: Some(10_000),
                ..ResolverConfig::default()
            },
            ZoneManager::default(),
        );
        let id = resolver
            .resolve(&req("cam", 1, Some(emb(&[1.0, 0.0, 0.0])), 1_000))
            .unwrap()
            .global_id()
            .unwrap();

        // Before the TTL nothing expires.
        let stats = resolver.sweep(5_000, 64, 256);
        assert_eq!(stats.expired, 0);

        let stats = resolver.sweep(20_000, 64, 256);
        assert_eq!(stats.expired, 1);
        assert_eq!(stats.remaining, 0);
        assert!(resolver.record(id).is_err());

        // The stale mapping is gone too: the same local track now creates a
        // fresh identity instead of refreshing the expired one.
        let next = resolver
            .resolve(&req("cam", 1, Some(emb(&[1.0, 0.0, 0.0])), 21_000))
            .unwrap();
        assert!(matches!(next, ResolveOutcome::Created(_)));
    }

    #[test]
    fn test_merge_repoints_mappings() {
        let resolver = IdentityResolver::new(ResolverConfig::default(), ZoneManager::default());
        let a = resolver
            .resolve(&req("cam1", 1, Some(emb(&[1.0, 0.0, 0.0])), 1_000))
            .unwrap()
            .global_id()
            .unwrap();
        let b = resolver
            .resolve(&req("cam2", 2, Some(emb(&[0.0, 1.0, 0.0])), 1_000))
            .unwrap()
            .global_id()
            .unwrap();

        resolver.merge(a, b).unwrap();
        resolver.merge(a, b).unwrap(); // retry is a no-op

        assert_eq!(resolver.identity_count(), 1);
        // cam2's track now refreshes the surviving identity.
        let outcome = resolver
            .resolve(&req("cam2", 2, Some(emb(&[0.0, 1.0, 0.0])), 2_000))
            .unwrap();
        assert_eq!(outcome, ResolveOutcome::Matched(a));
        assert_eq!(resolver.metrics().snapshot().identities_merged, 1);
    }
}
