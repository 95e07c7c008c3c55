use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use skin_search::objective::from_fn;
use skin_search::parameter::{FloatParam, IntParam, Parameter};
use skin_search::sampler::{RandomSampler, Sampler, TpeSampler};
use skin_search::{Direction, Error, Study, TrialRecord};

/// Build a ledger snapshot of `n` completed trials over a batch size and a
/// dropout rate, scored by a smooth synthetic accuracy.
fn build_history(n: usize) -> Vec<TrialRecord> {
    let study = Study::builder()
        .maximize()
        .sampler(RandomSampler::with_seed(42))
        .build()
        .unwrap();
    let objective = from_fn("val_accuracy", |trial| {
        let batch = IntParam::new("batch_size", 1, 15).suggest(trial)?;
        let dropout = FloatParam::new("dropout", 0.1, 0.9).suggest(trial)?;
        Ok::<_, Error>(1.0 - (dropout - 0.3).powi(2) - 0.001 * (batch as f64 - 7.0).powi(2))
    });
    study.optimize(n, &objective).unwrap();
    study.trials().unwrap()
}

fn bench_tpe_sample(c: &mut Criterion) {
    let mut group = c.benchmark_group("tpe_sample");
    let dist = FloatParam::new("dropout", 0.1, 0.9).distribution();
    let tpe = TpeSampler::builder().seed(42).build();

    for history_size in [10, 100, 1000] {
        let history = build_history(history_size);
        group.bench_with_input(
            BenchmarkId::new("history", history_size),
            &history,
            |b, history| {
                b.iter(|| {
                    tpe.sample(
                        "dropout",
                        &dist,
                        history.len() as u64,
                        history,
                        Direction::Maximize,
                    )
                });
            },
        );
    }
    group.finish();
}

fn bench_random_sample(c: &mut Criterion) {
    let mut group = c.benchmark_group("random_sample");
    let dist = FloatParam::new("dropout", 0.1, 0.9).distribution();
    let sampler = RandomSampler::with_seed(42);

    for history_size in [10, 100, 1000] {
        let history = build_history(history_size);
        group.bench_with_input(
            BenchmarkId::new("history", history_size),
            &history,
            |b, history| {
                b.iter(|| {
                    sampler.sample(
                        "dropout",
                        &dist,
                        history.len() as u64,
                        history,
                        Direction::Maximize,
                    )
                });
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_tpe_sample, bench_random_sample);
criterion_main!(benches);
