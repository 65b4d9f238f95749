use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use warbler::{
    constants::*,
    id::UserId,
    receive::{pcm_to_bytes, Mixdown},
};

pub fn mix_sources(c: &mut Criterion) {
    let sine = utils::make_sine(MONO_FRAME_SIZE, true);

    let mut group = c.benchmark_group("Combined Frame");

    for n in [1u64, 2, 4, 8, 16, 32, 64].iter() {
        group.bench_with_input(BenchmarkId::new("Mix", n), n, |b, n| {
            b.iter(|| {
                let mut mix = Mixdown::new();
                for user in 0..*n {
                    mix.add(UserId(user), black_box(&sine[..]));
                }
                black_box(mix.finish())
            });
        });

        group.bench_with_input(BenchmarkId::new("Mix + Bytes", n), n, |b, n| {
            b.iter(|| {
                let mut mix = Mixdown::new();
                for user in 0..*n {
                    mix.add(UserId(user), black_box(&sine[..]));
                }
                black_box(mix.finish().audio_data(black_box(0.5)))
            });
        });
    }

    group.finish();
}

pub fn convert_frame(c: &mut Criterion) {
    let sine = utils::make_sine(MONO_FRAME_SIZE, true);

    c.bench_function("PCM to bytes (unit volume)", |b| {
        b.iter(|| pcm_to_bytes(black_box(&sine[..]), black_box(1.0)))
    });
}

criterion_group!(benches, mix_sources, convert_frame);
criterion_main!(benches);
