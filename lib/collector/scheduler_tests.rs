use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::test_support::{fixture_records, fixture_registry, limit, orchestrator, MockFetcher};
use super::{CollectorConfig, RunMode, Scheduler, SchedulerReport, SchedulerState};
use crate::registry::{Domain, EntityType};
use crate::server::monitoring::CollectorMetrics;
use crate::sink::{MemoryInventorySink, SinkCall};

fn two_top_level_types() -> Vec<EntityType> {
    vec![
        EntityType::new("vms", Domain::Compute, limit(10)).top_level(),
        EntityType::new("flavors", Domain::Compute, limit(10)).top_level(),
    ]
}

fn scheduler(
    fetcher: Arc<MockFetcher>,
    sink: Arc<MemoryInventorySink>,
    metrics: CollectorMetrics,
    mode: RunMode,
    shutdown_token: CancellationToken,
) -> Scheduler {
    Scheduler::new(
        orchestrator(
            fixture_registry(two_top_level_types(), fetcher),
            &["s1", "s2", "s3"],
            sink,
            metrics.clone(),
        ),
        CollectorConfig {
            poll_interval: Duration::from_secs(300),
            mode,
        },
        metrics,
        shutdown_token,
    )
}

fn swept_collections(sink: &MemoryInventorySink) -> Vec<Vec<String>> {
    sink.sweeps()
        .into_iter()
        .filter_map(|call| match call {
            SinkCall::Sweep { collections, .. } => Some(collections),
            SinkCall::Upload { .. } => None,
        })
        .collect()
}

#[tokio::test]
async fn single_shot_runs_every_top_level_type_once_then_stops() {
    let fetcher = Arc::new(MockFetcher::default());
    fetcher.set_records("vms", "s1", fixture_records("vms", "s1", 3));
    fetcher.set_records("flavors", "s2", fixture_records("flavors", "s2", 2));
    let sink = Arc::new(MemoryInventorySink::new());
    let mut scheduler = scheduler(
        fetcher,
        sink.clone(),
        CollectorMetrics::default(),
        RunMode::SingleShot,
        CancellationToken::new(),
    );
    assert_eq!(scheduler.state(), SchedulerState::Idle);

    let report = scheduler.run().await;

    assert_eq!(
        report,
        SchedulerReport {
            passes: 1,
            cycles_succeeded: 2,
            cycles_failed: 0,
        }
    );
    assert_eq!(scheduler.state(), SchedulerState::Stopped);
    assert_eq!(
        swept_collections(&sink),
        vec![vec!["vms".to_string()], vec!["flavors".to_string()]]
    );
}

#[tokio::test]
async fn failed_type_is_counted_once_and_next_type_still_runs() {
    let fetcher = Arc::new(MockFetcher::default());
    fetcher.set_records("vms", "s1", fixture_records("vms", "s1", 2));
    fetcher.set_records("vms", "s2", fixture_records("vms", "s2", 2));
    fetcher.fail_after("vms", "s3", Vec::new());
    fetcher.set_records("flavors", "s1", fixture_records("flavors", "s1", 4));
    let sink = Arc::new(MemoryInventorySink::new());
    let metrics = CollectorMetrics::default();
    let mut scheduler = scheduler(
        fetcher,
        sink.clone(),
        metrics.clone(),
        RunMode::SingleShot,
        CancellationToken::new(),
    );

    let report = scheduler.run().await;

    assert_eq!(report.cycles_failed, 1);
    assert_eq!(report.cycles_succeeded, 1);
    assert!(report.had_failures());
    assert_eq!(metrics.cycle_errors_total.get(), 1);
    assert_eq!(swept_collections(&sink), vec![vec!["flavors".to_string()]]);
    assert_eq!(sink.active_refs("flavors").len(), 4);
}

#[tokio::test]
async fn cancelled_before_start_runs_no_pass() {
    let fetcher = Arc::new(MockFetcher::default());
    let sink = Arc::new(MemoryInventorySink::new());
    let shutdown_token = CancellationToken::new();
    shutdown_token.cancel();
    let mut scheduler = scheduler(
        fetcher.clone(),
        sink,
        CollectorMetrics::default(),
        RunMode::Continuous,
        shutdown_token,
    );

    let report = scheduler.run().await;

    assert_eq!(report.passes, 0);
    assert_eq!(scheduler.state(), SchedulerState::Stopped);
    assert!(fetcher.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn continuous_mode_sleeps_between_passes_until_cancelled() {
    let fetcher = Arc::new(MockFetcher::default());
    fetcher.set_records("vms", "s1", fixture_records("vms", "s1", 1));
    let sink = Arc::new(MemoryInventorySink::new());
    let metrics = CollectorMetrics::default();
    let shutdown_token = CancellationToken::new();
    let mut scheduler = scheduler(
        fetcher,
        sink.clone(),
        metrics.clone(),
        RunMode::Continuous,
        shutdown_token.clone(),
    );

    let handle = tokio::spawn(async move {
        let report = scheduler.run().await;
        (report, scheduler.state())
    });

    // Passes start at t=0 and t=300s; cancel while sleeping toward t=600s.
    tokio::time::sleep(Duration::from_secs(450)).await;
    shutdown_token.cancel();
    let (report, state) = handle.await.expect("scheduler task should not panic");

    assert_eq!(report.passes, 2);
    assert_eq!(report.cycles_succeeded, 4);
    assert_eq!(state, SchedulerState::Stopped);
    assert_eq!(metrics.cycles_started_total.get(), 4);
    assert_eq!(sink.sweeps().len(), 2, "only vms produced records");
}
