//! Benchmarks for PosteriorEvaluator::log_posterior
//!
//!   cargo bench --bench posterior_eval
//!   cargo bench posterior_eval -- posterior_eval/two_components

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use nalgebra::DMatrix;
use rand::{rngs::StdRng, Rng, SeedableRng};

use blendfit::config::Configuration;
use blendfit::mapping::MeasurementComponentMap;
use blendfit::photometry::Galaxy;
use blendfit::posterior::PosteriorEvaluator;
use blendfit::prior::bpz::BpzPrior;
use blendfit::responses::{FluxResponses, TabulatedResponses};
use blendfit::templates::TemplateSet;

/// Six templates, five bands: the usual BPZ-like setting.
fn fixture() -> (Configuration, TabulatedResponses, Galaxy) {
    let config = Configuration::builder()
        .num_bands(5)
        .z_hi(4.0)
        .ref_mag_hi(28.0)
        .build()
        .unwrap();
    let templates = TemplateSet::from_labels(&[
        ("El", "early"),
        ("Sbc", "late"),
        ("Scd", "late"),
        ("Im", "irr"),
        ("SB2", "irr"),
        ("SB3", "irr"),
    ])
    .unwrap();
    let z_grid: Vec<f64> = (0..=40).map(|i| 0.1 * i as f64).collect();
    let table = (0..6)
        .map(|t| DMatrix::from_fn(5, 41, |b, z| 1.0 + 0.02 * (t + 1) as f64 * (b * z) as f64))
        .collect();
    let responses = TabulatedResponses::new(templates, z_grid, table).unwrap();
    let galaxy = Galaxy::from_magnitudes(
        0,
        vec![24.0, 23.6, 23.3, 23.1, 23.0],
        vec![0.05; 5],
        None,
        &config,
    )
    .unwrap();
    (config, responses, galaxy)
}

fn bench_num_components(c: &mut Criterion, num_components: usize, name: &str) {
    let (config, responses, galaxy) = fixture();
    let model = BpzPrior::new(&config, responses.templates()).unwrap();
    let mapping =
        MeasurementComponentMap::build(None, num_components, 5, &config.ref_band).unwrap();
    let evaluator =
        PosteriorEvaluator::new(&config, &model, &responses, &mapping, &galaxy).unwrap();
    let mut rng = StdRng::seed_from_u64(0x5EED);

    c.bench_function(name, |b| {
        b.iter_batched(
            || {
                let mut z: Vec<f64> = (0..num_components)
                    .map(|_| rng.random_range(0.05..4.0))
                    .collect();
                z.sort_by(|a, b| a.total_cmp(b));
                let m = (0..num_components).map(|_| rng.random_range(22.0..27.0));
                z.extend(m);
                z
            },
            |params| black_box(evaluator.log_posterior(black_box(&params)).unwrap()),
            BatchSize::SmallInput,
        )
    });
}

fn bench_one_component(c: &mut Criterion) {
    bench_num_components(c, 1, "posterior_eval/one_component");
}

fn bench_two_components(c: &mut Criterion) {
    bench_num_components(c, 2, "posterior_eval/two_components");
}

criterion_group!(benches, bench_one_component, bench_two_components);
criterion_main!(benches);
