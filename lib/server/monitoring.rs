use crate::build_info;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::{counter::Counter, gauge::Gauge};
use prometheus_client::registry::Registry;
use std::sync::atomic::AtomicU64;

/// Registers immutable build metadata for `/metrics` scraping.
///
/// Encoded as a labeled gauge with value `1` so the build labels survive the
/// Prometheus text exposition format.
pub fn register_build_info_metric(registry: &mut Registry, prefix: &str) {
    let build_info_metric = Family::<BuildInfoLabels, Gauge>::default();
    build_info_metric
        .get_or_create(&BuildInfoLabels {
            service: "inventory_collector",
            version: build_info::VERSION,
            commit: build_info::short_commit_hash(),
        })
        .set(1);
    let sub_registry = registry.sub_registry_with_prefix(prefix);
    sub_registry.register(
        "build_info",
        "Build identity labels for this process",
        build_info_metric,
    );
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct BuildInfoLabels {
    service: &'static str,
    version: &'static str,
    commit: &'static str,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct EntityTypeLabels {
    pub entity_type: String,
}

/// Counters for refresh cycles.
///
/// Handed to the orchestrator and scheduler at construction. Clones share the
/// same underlying atomics, so a handle built with `Default` works unregistered
/// in tests and a registered one feeds `/metrics`.
#[derive(Clone, Default)]
pub struct CollectorMetrics {
    /// Refresh cycles started, one per primary entity type per pass.
    pub cycles_started_total: Counter,
    /// Refresh cycles that reached their sweep decision without error.
    pub cycles_completed_total: Counter,
    /// Refresh cycles aborted by a collaborator failure.
    pub cycle_errors_total: Counter,
    /// Parts written by the inventory store, as reported by the store.
    pub parts_uploaded_total: Counter,
    pub sweeps_issued_total: Counter,
    /// Raw records normalized, by entity type.
    pub records_collected_total: Family<EntityTypeLabels, Counter>,
    /// Wall time of the most recent scheduler pass.
    pub last_pass_seconds: Gauge<f64, AtomicU64>,
}

impl CollectorMetrics {
    pub fn register(registry: &mut Registry, prefix: &str) -> Self {
        let metrics = Self::default();
        let sub_registry = registry.sub_registry_with_prefix(prefix);
        sub_registry.register(
            "cycles_started",
            "Total number of refresh cycles started",
            metrics.cycles_started_total.clone(),
        );
        sub_registry.register(
            "cycles_completed",
            "Total number of refresh cycles completed",
            metrics.cycles_completed_total.clone(),
        );
        sub_registry.register(
            "cycle_errors",
            "Total number of refresh cycles aborted by an error",
            metrics.cycle_errors_total.clone(),
        );
        sub_registry.register(
            "parts_uploaded",
            "Total number of parts written by the inventory store",
            metrics.parts_uploaded_total.clone(),
        );
        sub_registry.register(
            "sweeps_issued",
            "Total number of sweeps issued to the inventory store",
            metrics.sweeps_issued_total.clone(),
        );
        sub_registry.register(
            "records_collected",
            "Total number of raw records normalized, by entity type",
            metrics.records_collected_total.clone(),
        );
        sub_registry.register(
            "last_pass_seconds",
            "Duration of the most recent scheduler pass in seconds",
            metrics.last_pass_seconds.clone(),
        );
        metrics
    }

    pub fn record_error(&self) {
        self.cycle_errors_total.inc();
    }

    pub fn record_collected(&self, entity_type: &str) {
        self.records_collected_total
            .get_or_create(&EntityTypeLabels {
                entity_type: entity_type.to_string(),
            })
            .inc();
    }

    pub fn collected_for(&self, entity_type: &str) -> u64 {
        self.records_collected_total
            .get_or_create(&EntityTypeLabels {
                entity_type: entity_type.to_string(),
            })
            .get()
    }
}
