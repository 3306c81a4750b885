use camtrack::{Bbox, Detection, TrackerConfig, TrackerStrategy, TwoStageTracker};
use criterion::{criterion_group, criterion_main, Criterion};

fn synthetic_frame(step: usize, people: usize) -> Vec<Detection> {
    (0..people)
        .map(|p| {
            let x = 50.0 * p as f32 + 2.0 * step as f32;
            let y = 40.0 * (p % 4) as f32;
            // Every third person flickers to low confidence.
            let conf = if (step + p) % 3 == 0 { 0.35 } else { 0.9 };
            Detection::new(Bbox::new(x, y, x + 40.0, y + 80.0), conf)
        })
        .collect()
}

fn bench_two_stage_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("two_stage_update");

    for &people in &[8usize, 32, 64] {
        group.bench_function(format!("{people}_people"), |b| {
            b.iter(|| {
                let mut tracker = TwoStageTracker::new(TrackerConfig::default());
                for step in 0..30 {
                    let frame = synthetic_frame(step, people);
                    std::hint::black_box(tracker.update(&frame));
                }
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_two_stage_update);
criterion_main!(benches);
