//! End-to-end search runs on a small in-memory dataset.

use std::sync::Arc;

use skin_search::TrialState;
use skin_search::context::RunContext;
use skin_search::data::{Example, InMemoryDataset};
use skin_search::extractor::Flatten;
use skin_search::settings::{HyperbandSettings, SearchConfig, TpeSettings};
use skin_search::{report, search};

fn nanos() -> u128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos()
}

fn dataset() -> Arc<InMemoryDataset> {
    let examples: Vec<Example> = (0..30)
        .map(|i| {
            let x = f64::from(i) / 15.0 - 1.0;
            Example::new(vec![x, x * x, -x], f64::from(u8::from(i % 15 >= 7)))
        })
        .collect();
    let (train, rest) = examples.split_at(20);
    Arc::new(
        InMemoryDataset::new(train.to_vec(), rest.to_vec(), rest[..5].to_vec()).with_seed(9),
    )
}

fn config(db: &std::path::Path, root: &std::path::Path) -> SearchConfig {
    SearchConfig {
        storage: format!("sqlite:///{}", db.display()),
        study_name: "e2e".into(),
        n_trials: 5,
        epochs: 4,
        seed: Some(17),
        tpe: TpeSettings {
            n_startup_trials: 3,
            ..TpeSettings::default()
        },
        hyperband: HyperbandSettings {
            min_resource: 1,
            reduction_factor: 2,
        },
        output_root: root.to_path_buf(),
        ..SearchConfig::default()
    }
}

#[test]
fn search_writes_ledger_artifacts_and_reports() {
    let id = nanos();
    let db = std::env::temp_dir().join(format!("skin_search_e2e_{id}.db"));
    let root = std::env::temp_dir().join(format!("skin_search_e2e_{id}"));
    let config = config(&db, &root);

    let context = RunContext::create(&config.output_root).unwrap();
    assert_eq!(context.id(), 1);
    config.save(&context.config_path()).unwrap();

    let study = search::open_study(&config).unwrap();
    let summary = search::run_search(
        &study,
        &config,
        Arc::new(Flatten::new(3)),
        dataset(),
        &context,
    )
    .unwrap();
    assert_eq!(summary.completed + summary.pruned + summary.failed, 5);

    let trials = study.trials().unwrap();
    assert_eq!(trials.len(), 5);
    for t in &trials {
        assert_ne!(t.state, TrialState::Running);
        assert!(t.params.contains("batch_size"));
        assert!(t.intermediate_values.len() <= 4);
        if t.state == TrialState::Complete {
            let v = t.value.unwrap();
            assert!((0.0..=1.0).contains(&v));
        }
    }

    report::write_reports(&study, &context).unwrap();
    assert!(context.report_path().exists());
    if summary.completed > 0 {
        let text = std::fs::read_to_string(context.best_trial_path()).unwrap();
        assert!(text.starts_with("Best trial is #"));
    }

    // a second invocation reuses the study and claims the next run directory
    let next = RunContext::create(&config.output_root).unwrap();
    assert_eq!(next.id(), 2);
    let study = search::open_study(&SearchConfig {
        n_trials: 2,
        ..config.clone()
    })
    .unwrap();
    search::run_search(
        &study,
        &SearchConfig {
            n_trials: 2,
            ..config
        },
        Arc::new(Flatten::new(3)),
        dataset(),
        &next,
    )
    .unwrap();
    let numbers: Vec<u64> = study.trials().unwrap().iter().map(|t| t.number).collect();
    assert_eq!(numbers, [0, 1, 2, 3, 4, 5, 6]);

    std::fs::remove_dir_all(&root).ok();
    std::fs::remove_file(&db).ok();
}

#[test]
fn changing_the_metric_of_a_stored_study_fails() {
    let id = nanos();
    let db = std::env::temp_dir().join(format!("skin_search_metric_{id}.db"));
    let root = std::env::temp_dir().join(format!("skin_search_metric_{id}"));
    let config = config(&db, &root);
    search::open_study(&config).unwrap();

    let other = SearchConfig {
        metric: skin_search::metrics::MonitoredMetric::ValAuc,
        ..config
    };
    assert!(matches!(
        search::open_study(&other),
        Err(skin_search::Error::MetricMismatch { .. })
    ));
    std::fs::remove_file(&db).ok();
}
