//! Tree encoding strategy comparison benchmarks.
//!
//! Compares the three encodings on random forests of increasing depth:
//! - GEMM (dense matrix products)
//! - Traversal table (level-by-level node lookups)
//! - Perfect tree (implicit complete layout)
//!
//! Plus automatic selection, sequential and parallel.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use forest_tensor::compile::Strategy;
use forest_tensor::testing::data::{random_features, random_labels};
use forest_tensor::testing::fit::{FitParams, Target, fit};
use forest_tensor::{CompiledModel, ConversionConfig, ModelFamily, SklearnModel, StrategyChoice, TensorType};

const N_FEATURES: usize = 32;
const TRAIN_ROWS: usize = 2_000;

fn fit_forest(max_depth: usize) -> SklearnModel {
    let x = random_features(TRAIN_ROWS, N_FEATURES, 42);
    let y = random_labels(TRAIN_ROWS, &[0, 1, 2], 43);
    let params = FitParams::builder()
        .n_estimators(20)
        .max_depth(max_depth)
        .seed(7)
        .build();
    fit(ModelFamily::RandomForest, x.view(), Target::Classes(&y), &params)
}

fn compile(model: &SklearnModel, strategy: StrategyChoice, n_threads: usize) -> CompiledModel {
    let config = ConversionConfig::builder()
        .strategy(strategy)
        .n_threads(n_threads)
        .build()
        .expect("valid config");
    let spec = [("input".to_string(), TensorType::float32([None, Some(N_FEATURES)]))];
    forest_tensor::convert_with_config(model, &spec, &config).expect("conversion succeeds")
}

// =============================================================================
// Strategy Comparison Benchmarks
// =============================================================================

fn bench_strategies(c: &mut Criterion) {
    for max_depth in [3, 6, 10] {
        let model = fit_forest(max_depth);
        let mut group = c.benchmark_group(format!("forest/strategy/depth{max_depth}"));

        let variants = [
            ("gemm", StrategyChoice::Fixed(Strategy::Gemm)),
            ("traversal_table", StrategyChoice::Fixed(Strategy::TraversalTable)),
            ("perfect_tree", StrategyChoice::Fixed(Strategy::PerfectTreeTraversal)),
            ("auto", StrategyChoice::Auto),
        ]
        .map(|(name, strategy)| (name, compile(&model, strategy, 1)));

        for batch_size in [1_000, 10_000] {
            let x = random_features(batch_size, N_FEATURES, 99);
            group.throughput(Throughput::Elements(batch_size as u64));

            for (name, compiled) in &variants {
                group.bench_with_input(BenchmarkId::new(*name, batch_size), &x, |b, x| {
                    b.iter(|| black_box(compiled.predict_proba(black_box(x.view()))))
                });
            }
        }

        group.finish();
    }
}

fn bench_parallel(c: &mut Criterion) {
    let model = fit_forest(8);
    let sequential = compile(&model, StrategyChoice::Auto, 1);
    let parallel = compile(&model, StrategyChoice::Auto, 0);

    let mut group = c.benchmark_group("forest/parallelism");
    let batch_size = 50_000;
    let x = random_features(batch_size, N_FEATURES, 5);
    group.throughput(Throughput::Elements(batch_size as u64));

    group.bench_with_input(BenchmarkId::new("sequential", batch_size), &x, |b, x| {
        b.iter(|| black_box(sequential.predict_proba(black_box(x.view()))))
    });
    group.bench_with_input(BenchmarkId::new("parallel", batch_size), &x, |b, x| {
        b.iter(|| black_box(parallel.predict_proba(black_box(x.view()))))
    });

    group.finish();
}

// =============================================================================
// Criterion Configuration
// =============================================================================

criterion_group!(benches, bench_strategies, bench_parallel);

criterion_main!(benches);
