//! Runner protocol tests: validation, stop conditions, train/search modes.

mod common;

use std::time::Duration;

use annb::{
    Dataset, EngineConfig, EngineFactory, Error, IndexFactory, MetricType, Runner, RunnerConfig,
    RunnerState, SearchArgs, StageRecorder, TestMode,
};
use common::{small_dataset, MockFactory};
use tempfile::TempDir;

fn config(dimension: usize) -> RunnerConfig {
    RunnerConfig::default()
        .with_dimension(dimension)
        .with_metric(MetricType::L2)
        .with_nq(5)
        .with_topk(3)
}

#[test]
fn validate_rejects_dimension_mismatch_before_create() {
    let dir = TempDir::new().unwrap();
    let dataset = small_dataset(dir.path(), 8, 200, MetricType::L2);
    let factory = MockFactory::new();

    let err = Runner::new(&dataset, &factory, config(16)).err().unwrap();
    match err {
        Error::ConfigMismatch { field, runner, dataset } => {
            assert_eq!(field, "dimension");
            assert_eq!(runner, "16");
            assert_eq!(dataset, "8");
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(factory.created(), 0);
    assert!(factory.log.entries().is_empty());
}

#[test]
fn validate_rejects_metric_mismatch_before_create() {
    let dir = TempDir::new().unwrap();
    let dataset = small_dataset(dir.path(), 8, 200, MetricType::InnerProduct);
    let factory = MockFactory::new();

    let err = Runner::new(&dataset, &factory, config(8)).err().unwrap();
    assert!(matches!(err, Error::ConfigMismatch { field: "metric", .. }));
    assert_eq!(factory.created(), 0);
}

#[test]
fn validate_rejects_topk_beyond_truth_depth_for_recall() {
    let dir = TempDir::new().unwrap();
    let dataset = small_dataset(dir.path(), 8, 200, MetricType::L2);
    let factory = MockFactory::new();
    let cfg = config(8)
        .with_test_modes(&[TestMode::Search, TestMode::Recall])
        .with_topk(dataset.truth_depth() + 1);
    assert!(matches!(
        Runner::new(&dataset, &factory, cfg),
        Err(Error::InvalidConfig(_))
    ));
    assert_eq!(factory.created(), 0);
}

#[test]
fn iterations_without_timeout_run_exactly() {
    let dir = TempDir::new().unwrap();
    let dataset = small_dataset(dir.path(), 8, 200, MetricType::L2);
    let factory = MockFactory::new();
    let recorder = StageRecorder::new();

    let mut runner = Runner::new(&dataset, &factory, config(8).with_iterations(5).with_timeout(-1.0))
        .unwrap()
        .with_observer(recorder.clone());
    assert_eq!(runner.state(), RunnerState::Initializing);
    let report = runner.run().unwrap();
    assert_eq!(runner.state(), RunnerState::Stopped);

    assert_eq!(report.iterations, 5);
    assert_eq!(factory.log.count("search#"), 5);
    assert_eq!(factory.created(), 1);

    let events = recorder.events();
    assert_eq!(events.len(), 5);
    assert_eq!(events[0].stage, "search(L2),nb=200,dim=8,query=5,k=3#1");
    assert_eq!(events[4].stage, "search(L2),nb=200,dim=8,query=5,k=3#5");
    assert!(events.iter().all(|e| e.key == "search(L2),nb=200,dim=8,query=5,k=3"));

    assert_eq!(report.stages.len(), 1);
    assert_eq!(report.stages[0].count, 5);
    assert_eq!(recorder.summaries(), report.stages);
    assert!(report.recall.is_none());
}

#[test]
fn search_mode_lifecycle_order() {
    let dir = TempDir::new().unwrap();
    let dataset = small_dataset(dir.path(), 8, 200, MetricType::L2);
    let factory = MockFactory::new();
    let cfg = config(8)
        .with_iterations(2)
        .with_verify(true)
        .with_search_args(SearchArgs { nprobe: Some(8) });

    Runner::new(&dataset, &factory, cfg).unwrap().run().unwrap();
    assert_eq!(
        factory.log.entries(),
        vec![
            "create#1",
            "verify#1",
            "train#1",
            "add#1",
            "search_args(Some(8))#1",
            "warmup#1",
            "search#1",
            "search#1",
            "cleanup#1",
        ]
    );
}

#[test]
fn timeout_stops_between_iterations() {
    let dir = TempDir::new().unwrap();
    let dataset = small_dataset(dir.path(), 8, 200, MetricType::L2);
    let factory = MockFactory::new().with_search_delay(Duration::from_millis(4));

    let cfg = config(8).with_iterations(1000).with_timeout(0.01);
    let report = Runner::new(&dataset, &factory, cfg).unwrap().run().unwrap();

    // Each iteration takes >= 4ms, so the 10ms budget is exceeded after at
    // most 3 iterations, and always after at least one full iteration.
    assert!(report.iterations >= 1);
    assert!(report.iterations <= 3, "ran {} iterations", report.iterations);
    assert!(report.elapsed > Duration::from_millis(10));
    assert_eq!(factory.log.count("search#"), report.iterations);
}

#[test]
fn zero_timeout_still_completes_one_iteration() {
    let dir = TempDir::new().unwrap();
    let dataset = small_dataset(dir.path(), 8, 200, MetricType::L2);
    let factory = MockFactory::new().with_search_delay(Duration::from_millis(1));
    let cfg = config(8).with_iterations(100).with_timeout(0.0);
    let report = Runner::new(&dataset, &factory, cfg).unwrap().run().unwrap();
    assert_eq!(report.iterations, 1);
}

#[test]
fn train_mode_cleans_up_before_next_create() {
    let dir = TempDir::new().unwrap();
    let dataset = small_dataset(dir.path(), 8, 200, MetricType::L2);
    let factory = MockFactory::new();
    let recorder = StageRecorder::new();

    let cfg = config(8).with_test_modes(&[TestMode::Train]).with_iterations(3);
    let report = Runner::new(&dataset, &factory, cfg)
        .unwrap()
        .with_observer(recorder.clone())
        .run()
        .unwrap();

    assert_eq!(report.iterations, 3);
    assert_eq!(factory.created(), 3);
    assert_eq!(factory.log.count("search#"), 0);
    for i in 2..=3 {
        let cleanup = factory.log.position(&format!("cleanup#{}", i - 1)).unwrap();
        let create = factory.log.position(&format!("create#{}", i)).unwrap();
        assert!(cleanup < create, "cleanup#{} must precede create#{}", i - 1, i);
    }
    // The last index is released at stop.
    assert_eq!(factory.log.entries().last().unwrap(), "cleanup#3");

    let stage = report.stage("train").unwrap();
    assert_eq!(stage.count, 3);
    assert!(recorder.events().iter().all(|e| e.stage == "train"));
}

#[test]
fn train_mode_timeout_releases_every_index() {
    let dir = TempDir::new().unwrap();
    let dataset = small_dataset(dir.path(), 8, 200, MetricType::L2);
    let factory = MockFactory::new().with_train_delay(Duration::from_millis(4));

    let cfg = config(8)
        .with_test_modes(&[TestMode::Train])
        .with_iterations(1000)
        .with_timeout(0.01);
    let report = Runner::new(&dataset, &factory, cfg).unwrap().run().unwrap();

    assert!(report.iterations >= 1 && report.iterations <= 3);
    assert_eq!(factory.created(), report.iterations);
    assert_eq!(factory.log.count("cleanup#"), report.iterations);
}

#[test]
fn engine_failure_aborts_run() {
    let dir = TempDir::new().unwrap();
    let dataset = small_dataset(dir.path(), 8, 200, MetricType::L2);
    let factory = MockFactory::new().with_fail_on("search");

    let mut runner = Runner::new(&dataset, &factory, config(8)).unwrap();
    match runner.run() {
        Err(Error::Engine { stage, source }) => {
            assert!(stage.starts_with("search(L2)"));
            assert!(source.to_string().contains("injected search failure"));
        }
        other => panic!("unexpected {:?}", other.map(|r| r.iterations)),
    }
    assert_eq!(factory.log.count("search#"), 1);
    assert_eq!(runner.state(), RunnerState::Stopped);
}

#[test]
fn failed_verify_is_an_engine_error() {
    let dir = TempDir::new().unwrap();
    let dataset = small_dataset(dir.path(), 8, 200, MetricType::L2);
    let factory = MockFactory::new().with_verify_result(false);
    let err = Runner::new(&dataset, &factory, config(8).with_verify(true))
        .unwrap()
        .run()
        .unwrap_err();
    assert!(matches!(err, Error::Engine { ref stage, .. } if stage == "verify"));
    assert_eq!(factory.log.count("train#"), 0);
}

#[test]
fn runner_runs_once() {
    let dir = TempDir::new().unwrap();
    let dataset = small_dataset(dir.path(), 8, 200, MetricType::L2);
    let factory = MockFactory::new();
    let mut runner = Runner::new(&dataset, &factory, config(8).with_iterations(1)).unwrap();
    runner.run().unwrap();
    assert!(matches!(runner.run(), Err(Error::InvalidConfig(_))));
    assert_eq!(factory.created(), 1);
}

#[test]
fn flat_engine_reaches_full_recall() {
    let dir = TempDir::new().unwrap();
    let dataset = small_dataset(dir.path(), 8, 300, MetricType::L2);
    let mut factory = EngineFactory::new();
    factory.setup().unwrap();

    let cfg = config(8)
        .with_test_modes(&[TestMode::Search, TestMode::Recall])
        .with_topk(10)
        .with_nq(20)
        .with_iterations(3);
    let report = Runner::new(&dataset, &factory, cfg).unwrap().run().unwrap();
    let recall = report.recall.unwrap();
    assert!((recall - 1.0).abs() < 1e-9, "recall {}", recall);
}

#[test]
fn unsupported_engine_surfaces_unchanged() {
    let dir = TempDir::new().unwrap();
    let dataset = small_dataset(dir.path(), 8, 200, MetricType::L2);
    let factory = EngineFactory::new();
    let cfg = config(8).with_engine(EngineConfig {
        index: "ivfsq".into(),
        ..Default::default()
    });
    let err = Runner::new(&dataset, &factory, cfg).unwrap().run().unwrap_err();
    assert!(matches!(err, Error::UnsupportedEngine(tag) if tag == "ivfsq"));
}
