use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, SamplingMode, Throughput};

use bids_duckdb::dataset::SyntheticSpec;
use bids_duckdb::loader::Strategy;

use bench_support::BenchCtx;

fn bench_loaders(c: &mut Criterion) {
    let sizes = [4usize, 16usize];
    let mut group = c.benchmark_group("loaders");
    group.sampling_mode(SamplingMode::Flat);
    group.sample_size(10);

    for &subjects in &sizes {
        let spec = SyntheticSpec { subjects, ..SyntheticSpec::default() };
        let ctx = BenchCtx::new(&spec).expect("bench ctx");
        group.throughput(Throughput::Elements(ctx.files as u64));

        for strategy in Strategy::ALL {
            // load plus a full scan, so the lazy view does its work too
            group.bench_with_input(BenchmarkId::new(strategy.as_str(), subjects.to_string()), &strategy, |b, s| {
                b.iter(|| {
                    let loader = ctx.loader(*s).expect("loader");
                    let table = loader.load_tabular("**/*_events.tsv").expect("load");
                    loader.query(&format!("SELECT COUNT(*) FROM {}", table)).expect("count");
                });
            });
        }

        let loader = ctx.loader(Strategy::Preprocess).expect("loader");
        loader.load_tabular("**/*_events.tsv").expect("load");
        group.bench_function(BenchmarkId::new("group_by_subject", subjects.to_string()), |b| {
            b.iter(|| {
                loader
                    .query("SELECT subject, task, COUNT(*) AS n FROM bids_tsv_data GROUP BY subject, task")
                    .expect("query");
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_loaders);
criterion_main!(benches);
