//! Multi-camera tracking engine
//!
//! One worker thread per camera owns that camera's tracker exclusively and
//! consumes frames from a bounded queue, so camera streams never share
//! mutable tracking state. Workers meet only at the identity resolver's
//! serialized write path. Submitting a frame never blocks: a full queue is
//! reported to the caller instead of stalling the frame loop.

use crate::config::{EngineConfig, ResolverConfig};
use crate::embedding::Embedding;
use crate::error::{IdentityError, Result};
use crate::lifecycle::LifecycleCoordinator;
use crate::metrics::ResolverMetrics;
use crate::resolver::{IdentityResolver, ResolveRequest};
use crate::types::{CameraId, TrackedPerson};
use crate::zones::ZoneManager;
use camtrack::{build_tracker, Detection, TrackerStrategy};
use crossbeam::channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// One camera frame: detections with optional per-detection embeddings
/// (parallel vectors; a missing embedding degrades that track to
/// position-only matching).
#[derive(Debug, Clone)]
pub struct FrameInput {
    pub detections: Vec<Detection>,
    pub embeddings: Vec<Option<Embedding>>,
    pub timestamp_ms: u64,
}

impl FrameInput {
    pub fn new(
        detections: Vec<Detection>,
        embeddings: Vec<Option<Embedding>>,
        timestamp_ms: u64,
    ) -> Self {
        Self {
            detections,
            embeddings,
            timestamp_ms,
        }
    }

    /// A frame with detections only (no embeddings available yet).
    pub fn detections_only(detections: Vec<Detection>, timestamp_ms: u64) -> Self {
        Self {
            detections,
            embeddings: Vec::new(),
            timestamp_ms,
        }
    }
}

/// Per-frame result for one camera.
#[derive(Debug, Clone)]
pub struct FrameOutput {
    pub camera_id: CameraId,
    pub timestamp_ms: u64,
    pub persons: Vec<TrackedPerson>,
}

enum CameraCommand {
    Frame(FrameInput),
    Shutdown,
}

/// Orchestrates per-camera workers, the shared resolver, and the lifecycle
/// sweep. Dropping the engine shuts everything down cleanly.
pub struct TrackingEngine {
    config: EngineConfig,
    resolver: Arc<IdentityResolver>,
    cameras: HashMap<CameraId, Sender<CameraCommand>>,
    workers: Vec<JoinHandle<()>>,
    result_tx: Sender<FrameOutput>,
    result_rx: Receiver<FrameOutput>,
    lifecycle: Option<LifecycleCoordinator>,
}

impl TrackingEngine {
    pub fn new(config: EngineConfig, resolver_config: ResolverConfig, zones: ZoneManager) -> Self {
        let resolver = Arc::new(IdentityResolver::new(resolver_config, zones));
        let (result_tx, result_rx) = unbounded();

        let lifecycle = LifecycleCoordinator::spawn(
            Arc::clone(&resolver),
            Duration::from_millis(config.sweep_interval_ms),
            config.sweep_batch_size,
            config.compact_tombstone_threshold,
        );

        Self {
            config,
            resolver,
            cameras: HashMap::new(),
            workers: Vec::new(),
            result_tx,
            result_rx,
            lifecycle: Some(lifecycle),
        }
    }

    /// Register a camera and spawn its processing unit.
    pub fn add_camera(&mut self, camera: CameraId) -> Result<()> {
        if self.cameras.contains_key(&camera) {
            return Err(IdentityError::DuplicateCamera(camera));
        }

        let (tx, rx) = bounded(self.config.channel_capacity);
        let tracker = build_tracker(&self.config.tracker);
        let resolver = Arc::clone(&self.resolver);
        let result_tx = self.result_tx.clone();
        let worker_camera = camera.clone();

        let handle = thread::spawn(move || {
            run_camera_worker(worker_camera, tracker, rx, result_tx, resolver);
        });

        log::info!("camera {camera} registered");
        self.cameras.insert(camera, tx);
        self.workers.push(handle);
        Ok(())
    }

    /// Hand a frame to a camera's worker. Fails soft when the camera's
    /// queue is full rather than blocking the caller's frame loop.
    pub fn submit(&self, camera: &CameraId, input: FrameInput) -> Result<()> {
        let tx = self
            .cameras
            .get(camera)
            .ok_or_else(|| IdentityError::UnknownCamera(camera.clone()))?;

        match tx.try_send(CameraCommand::Frame(input)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(IdentityError::QueueFull(camera.clone())),
            Err(TrySendError::Disconnected(_)) => Err(IdentityError::EngineStopped),
        }
    }

    /// Next available frame result, if any.
    pub fn try_next_output(&self) -> Option<FrameOutput> {
        self.result_rx.try_recv().ok()
    }

    /// Next frame result, waiting up to `timeout`.
    pub fn next_output_timeout(&self, timeout: Duration) -> Option<FrameOutput> {
        self.result_rx.recv_timeout(timeout).ok()
    }

    pub fn resolver(&self) -> &Arc<IdentityResolver> {
        &self.resolver
    }

    pub fn camera_count(&self) -> usize {
        self.cameras.len()
    }

    /// Stop all workers and the lifecycle sweep. In-flight frames finish
    /// before their worker exits; the registry is never left half-written.
    pub fn stop(&mut self) {
        for (camera, tx) in self.cameras.drain() {
            if tx.send(CameraCommand::Shutdown).is_err() {
                log::debug!("camera {camera} worker already gone");
            }
        }
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
        if let Some(mut lifecycle) = self.lifecycle.take() {
            lifecycle.stop();
        }
    }
}

impl Drop for TrackingEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_camera_worker(
    camera: CameraId,
    mut tracker: Box<dyn TrackerStrategy>,
    rx: Receiver<CameraCommand>,
    result_tx: Sender<FrameOutput>,
    resolver: Arc<IdentityResolver>,
) {
    log::debug!("camera {camera} worker started");

    while let Ok(command) = rx.recv() {
        let input = match command {
            CameraCommand::Frame(input) => input,
            CameraCommand::Shutdown => break,
        };

        let invalid = input.detections.iter().filter(|d| !d.is_valid()).count();
        if invalid > 0 {
            ResolverMetrics::add(
                &resolver.metrics().discarded_detections,
                invalid as u64,
            );
            log::warn!("camera {camera}: discarded {invalid} malformed detections");
        }

        let outputs = tracker.update(&input.detections);

        let removed = tracker.take_removed();
        if !removed.is_empty() {
            resolver.release_tracks(&camera, &removed);
        }

        let persons: Vec<TrackedPerson> = outputs
            .iter()
            .map(|track| {
                let embedding = track
                    .det_idx
                    .and_then(|i| input.embeddings.get(i).cloned().flatten());
                let request = ResolveRequest {
                    camera_id: camera.clone(),
                    local_track_id: track.track_id,
                    bbox: track.bbox,
                    embedding,
                    timestamp_ms: input.timestamp_ms,
                };
                let global_id = match resolver.resolve(&request) {
                    Ok(outcome) => outcome.global_id(),
                    Err(err) => {
                        log::error!(
                            "camera {camera} track {}: resolution failed: {err}",
                            track.track_id
                        );
                        None
                    }
                };
                TrackedPerson {
                    local_track_id: track.track_id,
                    global_id,
                    bbox: track.bbox,
                    confidence: track.confidence,
                }
            })
            .collect();

        let output = FrameOutput {
            camera_id: camera.clone(),
            timestamp_ms: input.timestamp_ms,
            persons,
        };
        if result_tx.send(output).is_err() {
            break; // engine gone
        }
    }

    log::debug!("camera {camera} worker stopped");
}
