use std::fmt;
use std::time::Duration;

use crate::inventory::CycleId;

/// Whether the scheduler keeps polling or stops after one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Continuous,
    SingleShot,
}

#[derive(Debug, Clone, Copy)]
pub struct CollectorConfig {
    /// Sleep between passes in continuous mode.
    pub poll_interval: Duration,
    pub mode: RunMode,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(300),
            mode: RunMode::Continuous,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Collecting,
    Sleeping,
    Stopped,
}

impl SchedulerState {
    pub fn as_str(self) -> &'static str {
        match self {
            SchedulerState::Idle => "idle",
            SchedulerState::Collecting => "collecting",
            SchedulerState::Sleeping => "sleeping",
            SchedulerState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one completed refresh cycle.
#[derive(Debug, Clone)]
pub struct CycleSummary {
    pub cycle_id: CycleId,
    pub entity_type: String,
    pub scopes: usize,
    /// Raw records normalized across the primary and related types.
    pub records: usize,
    /// Parts written, summed from the store's responses.
    pub parts: usize,
    pub swept: bool,
    /// Collections named in the sweep, sorted.
    pub sweep_scope: Vec<String>,
}

/// Totals over a scheduler run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerReport {
    pub passes: usize,
    pub cycles_succeeded: usize,
    pub cycles_failed: usize,
}

impl SchedulerReport {
    pub fn had_failures(&self) -> bool {
        self.cycles_failed > 0
    }
}
