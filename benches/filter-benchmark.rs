use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ndarray::{Array1, Array2};
use rusty_kalman::filter::{HybridConfig, HybridFilter, InformationFilter};
use rusty_kalman::noise::Noiseless;
use rusty_kalman::types::{identity, scaled_identity};

pub fn hybrid_update_benchmark(c: &mut Criterion) {
    let noise = Noiseless::with_covariances(scaled_identity(8, 0.01), identity(8));
    let mut kf = HybridFilter::with_config(
        Array1::zeros(8),
        scaled_identity(8, 10.0),
        noise,
        8,
        HybridConfig::default().with_process_noise(true),
    )
    .unwrap();
    let observation = Array1::ones(8);
    let computed = Array1::zeros(8);
    c.bench_function("Hybrid filter prepare and update for 8 states", |b| {
        b.iter(|| {
            kf.prepare(black_box(Array2::eye(8)), black_box(Array2::eye(8)))
                .unwrap();
            kf.update(black_box(&observation), black_box(&computed))
        })
    });
}

pub fn information_update_benchmark(c: &mut Criterion) {
    let noise = Noiseless::with_covariances(scaled_identity(8, 0.01), identity(8));
    let mut filter = InformationFilter::from_state(
        Array1::zeros(8),
        scaled_identity(8, 10.0),
        Array2::eye(8),
        Array2::zeros((8, 0)),
        Array2::eye(8),
        noise,
    )
    .unwrap();
    let measurement = Array1::ones(8);
    c.bench_function("Information filter update for 8 states", |b| {
        b.iter_with_large_drop(|| filter.update(black_box(&measurement), None))
    });
}

criterion_group!(hybrid, hybrid_update_benchmark);
criterion_group!(information, information_update_benchmark);
criterion_main!(hybrid, information);
