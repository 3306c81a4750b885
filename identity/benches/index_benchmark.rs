use criterion::{criterion_group, criterion_main, Criterion};
use person_identity_engine::{BruteForceIndex, Embedding, GlobalId, SimilarityIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const DIM: usize = 128;

fn random_embedding(rng: &mut StdRng) -> Embedding {
    let values: Vec<f32> = (0..DIM).map(|_| rng.gen_range(-1.0..1.0)).collect();
    Embedding::new(values).expect("random vector is valid")
}

fn bench_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("brute_force_search");

    for &identities in &[100usize, 1_000, 5_000] {
        let mut rng = StdRng::seed_from_u64(7);
        let mut index = BruteForceIndex::new();
        for id in 0..identities {
            for _ in 0..4 {
                index.add(GlobalId(id as u64), random_embedding(&mut rng));
            }
        }
        let query = random_embedding(&mut rng);

        group.bench_function(format!("{identities}_identities"), |b| {
            b.iter(|| std::hint::black_box(index.search(&query, 10, 0.2)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_search);
criterion_main!(benches);
