//! Two overlapping cameras watching the same walkway.
//!
//! The entrance camera is primary (it mints identities); the hallway
//! camera only matches. Both see the same person, and the engine reports
//! one global identity across both streams.

use person_identity_engine::{
    Bbox, CameraId, Detection, Embedding, EngineConfig, FrameInput, OverlapZone, ResolverConfig,
    TrackingEngine, ZoneManager, ZoneRegion,
};
use std::time::Duration;

fn person_frame(x: f32, appearance: &[f32], ts: u64) -> FrameInput {
    let detection = Detection::new(Bbox::new(x, 120.0, x + 45.0, 220.0), 0.92);
    let embedding = Embedding::new(appearance.to_vec()).expect("valid embedding");
    FrameInput::new(vec![detection], vec![Some(embedding)], ts)
}

fn main() {
    let entrance = CameraId::from("entrance");
    let hallway = CameraId::from("hallway");

    let zones = ZoneManager::from_zones(vec![OverlapZone::new(
        entrance.clone(),
        hallway.clone(),
        ZoneRegion::Full,
    )]);

    let resolver_config = ResolverConfig {
        primary_camera_id: Some(entrance.clone()),
        ..ResolverConfig::default()
    };

    let mut engine = TrackingEngine::new(EngineConfig::default(), resolver_config, zones);
    engine.add_camera(entrance.clone()).expect("register entrance");
    engine.add_camera(hallway.clone()).expect("register hallway");

    // The same appearance, seen slightly differently by each camera.
    let look_entrance = [0.8_f32, 0.1, 0.6];
    let look_hallway = [0.78_f32, 0.14, 0.61];

    for step in 0..8u64 {
        let ts = 1_000 + 33 * step;
        engine
            .submit(&entrance, person_frame(100.0 + 3.0 * step as f32, &look_entrance, ts))
            .expect("submit entrance frame");
        engine
            .submit(&hallway, person_frame(400.0 - 3.0 * step as f32, &look_hallway, ts))
            .expect("submit hallway frame");
    }

    let mut received = 0;
    while received < 16 {
        match engine.next_output_timeout(Duration::from_secs(2)) {
            Some(output) => {
                received += 1;
                for person in &output.persons {
                    println!(
                        "{} @ {}ms: track {} -> {}",
                        output.camera_id,
                        output.timestamp_ms,
                        person.local_track_id,
                        person
                            .global_id
                            .map(|g| g.to_string())
                            .unwrap_or_else(|| "pending".to_string()),
                    );
                }
            }
            None => break,
        }
    }

    for record in engine.resolver().records().expect("gallery readable") {
        println!(
            "identity {} ({}): visits {}, cameras {:?}",
            record.global_id, record.label, record.visit_count, record.cameras
        );
    }

    engine.stop();
}
