use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::cycle::CycleOrchestrator;
use super::types::{CollectorConfig, RunMode, SchedulerReport, SchedulerState};
use crate::logging::format_error_report;
use crate::server::monitoring::CollectorMetrics;

/// Repeats refresh cycles for every top-level entity type.
///
/// A failed cycle is logged and counted, then the pass moves on to the next
/// type. Cancellation is observed before each pass and while sleeping, never
/// in the middle of a cycle.
pub struct Scheduler {
    orchestrator: CycleOrchestrator,
    config: CollectorConfig,
    metrics: CollectorMetrics,
    shutdown_token: CancellationToken,
    state: SchedulerState,
}

impl Scheduler {
    pub fn new(
        orchestrator: CycleOrchestrator,
        config: CollectorConfig,
        metrics: CollectorMetrics,
        shutdown_token: CancellationToken,
    ) -> Self {
        Self {
            orchestrator,
            config,
            metrics,
            shutdown_token,
            state: SchedulerState::Idle,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub async fn run(&mut self) -> SchedulerReport {
        let mut report = SchedulerReport::default();

        loop {
            if self.shutdown_token.is_cancelled() {
                break;
            }

            self.transition(SchedulerState::Collecting);
            self.run_pass(&mut report).await;

            if self.config.mode == RunMode::SingleShot {
                break;
            }

            self.transition(SchedulerState::Sleeping);
            tokio::select! {
                _ = self.shutdown_token.cancelled() => break,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        self.transition(SchedulerState::Stopped);
        info!(
            event = "scheduler_stopped",
            passes = report.passes,
            cycles_succeeded = report.cycles_succeeded,
            cycles_failed = report.cycles_failed,
            "scheduler stopped"
        );
        report
    }

    async fn run_pass(&self, report: &mut SchedulerReport) {
        let started_at = Instant::now();
        let entity_types: Vec<String> = self
            .orchestrator
            .registry()
            .top_level_types()
            .map(|entity| entity.tag().to_string())
            .collect();

        for entity_type in &entity_types {
            match self.orchestrator.process_entity(entity_type).await {
                Ok(_) => report.cycles_succeeded += 1,
                Err(err) => {
                    self.metrics.record_error();
                    report.cycles_failed += 1;
                    error!(
                        event = "cycle_failed",
                        cycle_id = %err.cycle_id,
                        entity_type = %err.entity_type,
                        parts_uploaded = err.parts_uploaded,
                        error = %format_error_report(&err),
                        "refresh cycle failed"
                    );
                }
            }
        }

        report.passes += 1;
        let elapsed = started_at.elapsed();
        self.metrics.last_pass_seconds.set(elapsed.as_secs_f64());
        info!(
            event = "pass_finished",
            pass = report.passes,
            entity_types = entity_types.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "scheduler pass finished"
        );
    }

    fn transition(&mut self, next: SchedulerState) {
        if self.state != next {
            info!(
                event = "scheduler_state",
                from = %self.state,
                to = %next,
                "scheduler state changed"
            );
            self.state = next;
        }
    }
}
