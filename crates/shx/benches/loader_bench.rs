//! 📊 Loader benchmarks — how fast can the shovel go when nothing pushes back?
//!
//! The store here is the in-memory backend, so these numbers measure OUR
//! overhead: reading line-shaped records, batching, throttle bookkeeping,
//! task dispatch. Against a real store the network eats all of this for
//! breakfast — which is exactly why we measure without one. If the pipeline
//! itself ever becomes the slow part, these graphs are where it shows up
//! first. 🦆
//!
//! Benchmarks cover:
//! - a full end-to-end run over 1,000 records (the headline number)
//! - the same run at different batch sizes (dispatch overhead scaling)

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use shx::app_config::{AppConfig, LoadConfig, StoreConfig};
use std::fs;
use std::path::Path;
use tokio::runtime::Runtime;

const DOC_COUNT: usize = 1_000;

/// 🧪 One pseudo-JSON-array fixture file: bracket, records with trailing
/// commas, bracket. The same shape the production files have.
fn write_fixture(dir: &Path) {
    let mut contents = String::from("[\n");
    for i in 0..DOC_COUNT {
        contents.push_str(&format!(
            "{{\"id\": {i}, \"title\": \"Movie {i}\", \"textSearch\": \"movie {i}\"}},\n"
        ));
    }
    contents.push_str("]\n");
    fs::write(dir.join("bench.json"), contents).expect("💀 bench fixture must write");
}

fn fixture_config(dir: &Path, batch_size: usize) -> AppConfig {
    AppConfig {
        load: LoadConfig {
            data_dir: Some(dir.to_path_buf()),
            files: vec!["bench.json".to_string()],
            batch_size,
            // 📊 park the progress cadence out past the doc count — spinner
            // chatter in a bench loop is noise measuring noise
            report_every: u64::MAX,
            ..Default::default()
        },
        store: Some(StoreConfig::InMemory),
    }
}

/// 📊 The headline: a whole run, file open to summary, 1K documents.
fn bench_full_run(c: &mut Criterion) {
    let runtime = Runtime::new().expect("💀 the bench needs a runtime to exist");
    let dir = tempfile::tempdir().expect("💀 tempdir should materialize");
    write_fixture(dir.path());
    let config = fixture_config(dir.path(), 25);

    let mut group = c.benchmark_group("bulk_load");
    group.throughput(Throughput::Elements(DOC_COUNT as u64));
    group.bench_function("in_memory_1k_docs", |b| {
        b.to_async(&runtime).iter(|| {
            let config = config.clone();
            async move { shx::run(config).await.expect("💀 the bench run must succeed") }
        });
    });
    group.finish();
}

/// 📦 Same load, different truck sizes. Batch size 1 maximizes dispatch
/// overhead (a task per document); 100 amortizes it four times better than
/// the default. The interesting part is how little it matters.
fn bench_batch_size_scaling(c: &mut Criterion) {
    let runtime = Runtime::new().expect("💀 the bench needs a runtime to exist");
    let dir = tempfile::tempdir().expect("💀 tempdir should materialize");
    write_fixture(dir.path());

    let mut group = c.benchmark_group("batch_size_scaling");
    group.throughput(Throughput::Elements(DOC_COUNT as u64));
    group.sample_size(50);
    for batch_size in [1, 25, 100] {
        let config = fixture_config(dir.path(), batch_size);
        group.bench_with_input(
            BenchmarkId::new("in_memory_1k_docs", batch_size),
            &batch_size,
            |b, _| {
                b.to_async(&runtime).iter(|| {
                    let config = config.clone();
                    async move {
                        shx::run(config).await.expect("💀 the bench run must succeed")
                    }
                });
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_full_run, bench_batch_size_scaling);
criterion_main!(benches);
