use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use tracing::{debug, info};

use super::error::{CycleError, Error, TransportError};
use super::types::CycleSummary;
use crate::cloud_client::ScopeSource;
use crate::inventory::{BatchAccumulator, CycleId, PartId, Scope};
use crate::registry::{EntityType, EntityTypeRegistry};
use crate::server::monitoring::CollectorMetrics;
use crate::sink::InventorySink;

/// Live state of one refresh cycle. Owned by the single in-flight
/// `process_entity` call and dropped when it returns.
struct RefreshCycle {
    cycle_id: CycleId,
    entity_type: String,
    /// Parts written so far, as reported by the store.
    parts: usize,
    sweep_scope: BTreeSet<String>,
    accumulator: BatchAccumulator,
    scopes: usize,
    records: usize,
}

impl RefreshCycle {
    fn new(entity_type: &str) -> Self {
        Self {
            cycle_id: CycleId::generate(),
            entity_type: entity_type.to_string(),
            parts: 0,
            sweep_scope: BTreeSet::new(),
            accumulator: BatchAccumulator::new(),
            scopes: 0,
            records: 0,
        }
    }
}

/// Drives refresh cycles: fetch, normalize, flush parts, sweep.
pub struct CycleOrchestrator {
    registry: Arc<EntityTypeRegistry>,
    scopes: Arc<dyn ScopeSource>,
    sink: Arc<dyn InventorySink>,
    metrics: CollectorMetrics,
}

impl CycleOrchestrator {
    pub fn new(
        registry: Arc<EntityTypeRegistry>,
        scopes: Arc<dyn ScopeSource>,
        sink: Arc<dyn InventorySink>,
        metrics: CollectorMetrics,
    ) -> Self {
        Self {
            registry,
            scopes,
            sink,
            metrics,
        }
    }

    pub fn registry(&self) -> &EntityTypeRegistry {
        &self.registry
    }

    /// Runs one full refresh cycle for `primary` and its related types.
    ///
    /// Steps:
    /// 1. Seed the sweep scope with the primary type's own collections.
    /// 2. For every scope, collect the primary type and then each related type
    ///    into one shared accumulator, flushing a part whenever the running
    ///    count reaches the batch limit of the type being collected.
    /// 3. Flush whatever is left.
    /// 4. Sweep, but only if at least one part was written.
    ///
    /// Any failure abandons the rest of the cycle. Parts already written are
    /// left with the store and no sweep is issued.
    pub async fn process_entity(&self, primary: &str) -> Result<CycleSummary, CycleError> {
        let mut cycle = RefreshCycle::new(primary);
        let started_at = Instant::now();
        self.metrics.cycles_started_total.inc();
        info!(
            event = "cycle_started",
            cycle_id = %cycle.cycle_id,
            entity_type = primary,
            "starting refresh cycle"
        );

        let swept = match self.run_cycle(&mut cycle).await {
            Ok(swept) => swept,
            Err(source) => {
                return Err(CycleError {
                    cycle_id: cycle.cycle_id,
                    entity_type: cycle.entity_type,
                    parts_uploaded: cycle.parts,
                    source,
                })
            }
        };

        self.metrics.cycles_completed_total.inc();
        info!(
            event = "cycle_finished",
            cycle_id = %cycle.cycle_id,
            entity_type = primary,
            scopes = cycle.scopes,
            records = cycle.records,
            parts = cycle.parts,
            swept,
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "refresh cycle finished"
        );

        Ok(CycleSummary {
            cycle_id: cycle.cycle_id,
            entity_type: cycle.entity_type,
            scopes: cycle.scopes,
            records: cycle.records,
            parts: cycle.parts,
            swept,
            sweep_scope: cycle.sweep_scope.into_iter().collect(),
        })
    }

    async fn run_cycle(&self, cycle: &mut RefreshCycle) -> Result<bool, Error> {
        let primary = self.registry.get(&cycle.entity_type)?;
        let related = self.registry.related_types(primary.tag())?;
        cycle
            .sweep_scope
            .extend(primary.collections().iter().cloned());

        let scopes = self.scopes.scopes().await.map_err(TransportError::Scopes)?;
        for scope in &scopes {
            self.collect_and_accumulate(cycle, primary, scope).await?;
            for entity in &related {
                self.collect_and_accumulate(cycle, entity, scope).await?;
            }
            cycle.scopes += 1;
        }

        if !cycle.accumulator.is_empty() {
            self.flush(cycle).await?;
        }

        if cycle.parts == 0 {
            debug!(
                event = "cycle_sweep_skipped",
                cycle_id = %cycle.cycle_id,
                entity_type = %cycle.entity_type,
                "no parts uploaded, skipping sweep"
            );
            return Ok(false);
        }

        let collections: Vec<String> = cycle.sweep_scope.iter().cloned().collect();
        info!(
            event = "cycle_sweep_started",
            cycle_id = %cycle.cycle_id,
            entity_type = %cycle.entity_type,
            total_parts = cycle.parts,
            collections = ?collections,
            "sweeping stale records"
        );
        self.sink
            .sweep(cycle.cycle_id, cycle.parts, &collections)
            .await?;
        self.metrics.sweeps_issued_total.inc();
        info!(
            event = "cycle_sweep_finished",
            cycle_id = %cycle.cycle_id,
            entity_type = %cycle.entity_type,
            total_parts = cycle.parts,
            "sweep finished"
        );

        Ok(true)
    }

    /// Streams `entity` records for `scope` into the cycle's accumulator.
    ///
    /// The running count is shared by every type in the cycle; the threshold
    /// is the batch limit of `entity`.
    async fn collect_and_accumulate(
        &self,
        cycle: &mut RefreshCycle,
        entity: &EntityType,
        scope: &Scope,
    ) -> Result<(), Error> {
        let binding = self.registry.binding(entity.tag())?;
        let limit = entity.batch_limit();

        let mut raw_records = binding.fetcher.fetch(entity, scope);
        while let Some(raw) = raw_records.next().await {
            let raw = raw.map_err(|source| TransportError::Fetch {
                entity_type: entity.tag().to_string(),
                scope: scope.id.clone(),
                source,
            })?;

            (binding.normalize)(&raw, scope, &mut cycle.accumulator);
            cycle.records += 1;
            self.metrics.record_collected(entity.tag());

            if cycle.accumulator.mark_raw_record() >= limit {
                self.flush(cycle).await?;
            }
        }

        Ok(())
    }

    async fn flush(&self, cycle: &mut RefreshCycle) -> Result<(), Error> {
        let raw_records = cycle.accumulator.pending();
        let snapshot = cycle.accumulator.take();
        let part_id = PartId::generate();

        let parts_written = self.sink.upload(&snapshot, cycle.cycle_id, part_id).await?;
        if parts_written == 0 {
            return Err(Error::ProtocolViolation(format!(
                "inventory store wrote zero parts for part {part_id} of cycle {}",
                cycle.cycle_id
            )));
        }

        cycle.parts += parts_written;
        cycle.sweep_scope.extend(snapshot.keys().cloned());
        self.metrics.parts_uploaded_total.inc_by(parts_written as u64);

        info!(
            event = "part_uploaded",
            cycle_id = %cycle.cycle_id,
            part_id = %part_id,
            entity_type = %cycle.entity_type,
            raw_records,
            records = snapshot.values().map(Vec::len).sum::<usize>(),
            parts_written,
            total_parts = cycle.parts,
            "uploaded part"
        );
        Ok(())
    }
}
