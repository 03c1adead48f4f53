mod cycle;
mod error;
mod scheduler;
pub mod types;

#[cfg(test)]
mod scheduler_tests;
#[cfg(test)]
mod test_support;

pub use cycle::CycleOrchestrator;
pub use error::{CycleError, Error, TransportError};
pub use scheduler::Scheduler;
pub use types::{CollectorConfig, CycleSummary, RunMode, SchedulerReport, SchedulerState};
