//! Periodic lifecycle sweep
//!
//! A background thread that expires identities past their TTL and compacts
//! the similarity index. Each tick operates on a bounded batch so the
//! registry write lock stays short even on a large gallery; local trackers
//! purge their own removed tracks inline, so the sweep only owns
//! gallery-side cleanup.

use crate::resolver::IdentityResolver;
use crossbeam::channel::{bounded, tick, Sender};
use crossbeam::select;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub struct LifecycleCoordinator {
    shutdown_tx: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl LifecycleCoordinator {
    /// Start the sweep thread with the given period.
    pub fn spawn(
        resolver: Arc<IdentityResolver>,
        interval: Duration,
        batch: usize,
        compact_tombstone_threshold: usize,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);

        let handle = std::thread::spawn(move || {
            log::debug!("lifecycle sweep started, period {interval:?}");
            let ticker = tick(interval);
            loop {
                select! {
                    recv(ticker) -> _ => {
                        let stats = resolver.sweep(unix_ms(), batch, compact_tombstone_threshold);
                        if stats.expired > 0 || stats.compacted {
                            log::info!(
                                "lifecycle sweep: expired {} identities, {} remaining{}",
                                stats.expired,
                                stats.remaining,
                                if stats.compacted { ", index compacted" } else { "" }
                            );
                        }
                    }
                    recv(shutdown_rx) -> _ => break,
                }
            }
            log::debug!("lifecycle sweep stopped");
        });

        Self {
            shutdown_tx,
            handle: Some(handle),
        }
    }

    pub fn stop(&mut self) {
        let _ = self.shutdown_tx.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for LifecycleCoordinator {
    fn drop(&mut self) {
        self.stop();
    }
}

fn unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResolverConfig;
    use crate::embedding::Embedding;
    use crate::resolver::ResolveRequest;
    use crate::types::CameraId;
    use crate::zones::ZoneManager;
    use camtrack::Bbox;

    #[test]
    fn test_sweep_thread_expires_identities() {
        // TTL of zero: everything not seen in the current millisecond ages
        // out on the next tick.
        let resolver = Arc::new(IdentityResolver::new(
            ResolverConfig {
                gallery_ttl_ms: Some(0),
                ..ResolverConfig::default()
            },
            ZoneManager::default(),
        ));

        resolver
            .resolve(&ResolveRequest {
                camera_id: CameraId::from("cam"),
                local_track_id: 1,
                bbox: Bbox::new(0.0, 0.0, 40.0, 80.0),
                embedding: Some(Embedding::new(vec![1.0, 0.0]).unwrap()),
                timestamp_ms: 1_000, // far in the past relative to wall clock
            })
            .unwrap();
        assert_eq!(resolver.identity_count(), 1);

        let mut sweeper = LifecycleCoordinator::spawn(
            Arc::clone(&resolver),
            Duration::from_millis(20),
            64,
            256,
        );

        // Give the sweeper a few ticks.
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while resolver.identity_count() > 0 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        sweeper.stop();

        assert_eq!(resolver.identity_count(), 0);
        assert!(resolver.metrics().snapshot().identities_expired >= 1);
    }

    #[test]
    fn test_stop_joins_cleanly() {
        let resolver = Arc::new(IdentityResolver::new(
            ResolverConfig::default(),
            ZoneManager::default(),
        ));
        let mut sweeper =
            LifecycleCoordinator::spawn(resolver, Duration::from_millis(10), 8, 16);
        std::thread::sleep(Duration::from_millis(30));
        sweeper.stop();
        sweeper.stop(); // idempotent
    }
}
