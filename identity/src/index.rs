//! Nearest-neighbor search over identity embeddings

use crate::embedding::Embedding;
use crate::types::GlobalId;
use rayon::prelude::*;
use std::collections::HashMap;

/// Contract for similarity search backends.
///
/// Results are sorted strictly descending by similarity, contain at most
/// one entry per identity (its best-matching stored embedding), nothing
/// below `threshold`, and at most `k` entries. Backends built on immutable
/// segments may implement `remove` as soft-deletion; callers must never
/// observe soft-deleted entries in `search`.
pub trait SimilarityIndex: Send {
    fn add(&mut self, id: GlobalId, embedding: Embedding);

    /// Remove every embedding stored for `id`.
    fn remove(&mut self, id: GlobalId);

    fn search(&self, query: &Embedding, k: usize, threshold: f32) -> Vec<(GlobalId, f32)>;

    /// Replace the whole index content.
    fn rebuild(&mut self, entries: Vec<(GlobalId, Embedding)>);

    /// Live (non-deleted) entry count.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Soft-deleted entries awaiting compaction.
    fn tombstones(&self) -> usize;

    /// Replace every entry for `id` with the given window.
    fn refresh(&mut self, id: GlobalId, window: &[Embedding]) {
        self.remove(id);
        for embedding in window {
            self.add(id, embedding.clone());
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    id: GlobalId,
    embedding: Embedding,
    deleted: bool,
}

/// Exhaustive-scan index.
///
/// This is both the default backend and the transparent fallback when no
/// accelerated index is available: same contract, linear cost. Removal
/// tombstones entries; `compact` reclaims them (the lifecycle sweep calls
/// it once tombstones pile up).
#[derive(Debug, Default)]
pub struct BruteForceIndex {
    entries: Vec<Entry>,
    live: usize,
    dead: usize,
}

impl BruteForceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop tombstoned entries.
    pub fn compact(&mut self) {
        self.entries.retain(|e| !e.deleted);
        self.dead = 0;
    }
}

impl SimilarityIndex for BruteForceIndex {
    fn add(&mut self, id: GlobalId, embedding: Embedding) {
        self.entries.push(Entry {
            id,
            embedding,
            deleted: false,
        });
        self.live += 1;
    }

    fn remove(&mut self, id: GlobalId) {
        for entry in self.entries.iter_mut() {
            if entry.id == id && !entry.deleted {
                entry.deleted = true;
                self.live -= 1;
                self.dead += 1;
            }
        }
    }

    fn search(&self, query: &Embedding, k: usize, threshold: f32) -> Vec<(GlobalId, f32)> {
        if k == 0 || self.live == 0 {
            return Vec::new();
        }

        let scored: Vec<(GlobalId, f32)> = self
            .entries
            .par_iter()
            .filter(|e| !e.deleted)
            .map(|e| (e.id, query.cosine(&e.embedding)))
            .collect();

        // Best similarity per identity.
        let mut best: HashMap<GlobalId, f32> = HashMap::new();
        for (id, sim) in scored {
            let slot = best.entry(id).or_insert(f32::MIN);
            if sim > *slot {
                *slot = sim;
            }
        }

        let mut results: Vec<(GlobalId, f32)> = best
            .into_iter()
            .filter(|(_, sim)| *sim >= threshold)
            .collect();
        // Descending by similarity; ties broken by id for determinism.
        results.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        results.truncate(k);
        results
    }

    fn rebuild(&mut self, entries: Vec<(GlobalId, Embedding)>) {
        self.live = entries.len();
        self.dead = 0;
        self.entries = entries
            .into_iter()
            .map(|(id, embedding)| Entry {
                id,
                embedding,
                deleted: false,
            })
            .collect();
    }

    fn len(&self) -> usize {
        self.live
    }

    fn tombstones(&self) -> usize {
        self.dead
    }
}
