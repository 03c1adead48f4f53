use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use futures::future::BoxFuture;
use tracing::debug;

use super::{InventorySink, SinkError};
use crate::inventory::{Collections, CycleId, PartId, Record};

/// A record as held by the in-memory store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub record: Record,
    /// Cycle that last wrote this record.
    pub last_cycle: CycleId,
    pub active: bool,
}

/// Every call the store received, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkCall {
    Upload {
        cycle_id: CycleId,
        part_id: PartId,
        /// Record count per collection in the uploaded batch.
        collections: BTreeMap<String, usize>,
    },
    Sweep {
        cycle_id: CycleId,
        total_parts: usize,
        collections: Vec<String>,
    },
}

#[derive(Default)]
struct MemoryState {
    store: BTreeMap<String, BTreeMap<String, StoredRecord>>,
    /// Parts written per part id, per cycle. A replayed part id counts once.
    parts_received: HashMap<CycleId, HashMap<PartId, usize>>,
    calls: Vec<SinkCall>,
    uploads_seen: usize,
}

/// Inventory store kept in process memory.
///
/// Backs `--dry-run` and the test suites. It enforces the same part/sweep
/// contract as the real store: a sweep whose `total_parts` disagrees with
/// the parts received for that cycle is refused.
pub struct MemoryInventorySink {
    state: Mutex<MemoryState>,
    parts_per_upload: usize,
    fail_upload_on: Option<usize>,
    fail_sweeps: bool,
}

impl Default for MemoryInventorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryInventorySink {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            parts_per_upload: 1,
            fail_upload_on: None,
            fail_sweeps: false,
        }
    }

    /// Reports `parts` written for every upload, as a store that subdivides
    /// batches would. Zero models a store that silently drops parts.
    pub fn with_parts_per_upload(mut self, parts: usize) -> Self {
        self.parts_per_upload = parts;
        self
    }

    /// Fails the `n`-th upload call (1-based) with `SinkError::Unavailable`.
    pub fn fail_upload_on(mut self, n: usize) -> Self {
        self.fail_upload_on = Some(n);
        self
    }

    pub fn fail_sweeps(mut self) -> Self {
        self.fail_sweeps = true;
        self
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        self.state().calls.clone()
    }

    pub fn upload_count(&self) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|call| matches!(call, SinkCall::Upload { .. }))
            .count()
    }

    pub fn sweeps(&self) -> Vec<SinkCall> {
        self.state()
            .calls
            .iter()
            .filter(|call| matches!(call, SinkCall::Sweep { .. }))
            .cloned()
            .collect()
    }

    pub fn parts_received(&self, cycle_id: CycleId) -> usize {
        parts_for(&self.state(), cycle_id)
    }

    pub fn record(&self, collection: &str, ems_ref: &str) -> Option<StoredRecord> {
        self.state()
            .store
            .get(collection)
            .and_then(|records| records.get(ems_ref))
            .cloned()
    }

    /// Sorted refs of the active records in `collection`.
    pub fn active_refs(&self, collection: &str) -> Vec<String> {
        self.state()
            .store
            .get(collection)
            .map(|records| {
                records
                    .iter()
                    .filter(|(_, stored)| stored.active)
                    .map(|(ems_ref, _)| ems_ref.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Active record count per collection.
    pub fn active_counts(&self) -> BTreeMap<String, usize> {
        self.state()
            .store
            .iter()
            .map(|(name, records)| {
                (
                    name.clone(),
                    records.values().filter(|stored| stored.active).count(),
                )
            })
            .collect()
    }

    fn store_part(
        &self,
        collections: &Collections,
        cycle_id: CycleId,
        part_id: PartId,
    ) -> Result<usize, SinkError> {
        let mut state = self.state();
        state.uploads_seen += 1;
        state.calls.push(SinkCall::Upload {
            cycle_id,
            part_id,
            collections: collections
                .iter()
                .map(|(name, records)| (name.clone(), records.len()))
                .collect(),
        });

        if self.fail_upload_on == Some(state.uploads_seen) {
            return Err(SinkError::Unavailable(format!(
                "upload {} rejected",
                state.uploads_seen
            )));
        }

        for (name, records) in collections {
            let stored = state.store.entry(name.clone()).or_default();
            for record in records {
                stored.insert(
                    record.ems_ref.clone(),
                    StoredRecord {
                        record: record.clone(),
                        last_cycle: cycle_id,
                        active: true,
                    },
                );
            }
        }
        let parts_written = *state
            .parts_received
            .entry(cycle_id)
            .or_default()
            .entry(part_id)
            .or_insert(self.parts_per_upload);

        debug!(
            event = "memory_part_stored",
            cycle_id = %cycle_id,
            part_id = %part_id,
            parts_written,
            "stored part in memory"
        );
        Ok(parts_written)
    }

    fn apply_sweep(
        &self,
        cycle_id: CycleId,
        total_parts: usize,
        collections: &[String],
    ) -> Result<(), SinkError> {
        let mut state = self.state();
        state.calls.push(SinkCall::Sweep {
            cycle_id,
            total_parts,
            collections: collections.to_vec(),
        });

        if self.fail_sweeps {
            return Err(SinkError::Unavailable("sweep rejected".to_string()));
        }

        let received = parts_for(&state, cycle_id);
        if received != total_parts {
            return Err(SinkError::SweepRefused {
                cycle_id,
                reason: format!("expected {total_parts} parts, received {received}"),
            });
        }

        let mut deactivated = 0usize;
        for name in collections {
            if let Some(records) = state.store.get_mut(name) {
                for stored in records.values_mut() {
                    if stored.active && stored.last_cycle != cycle_id {
                        stored.active = false;
                        deactivated += 1;
                    }
                }
            }
        }

        debug!(
            event = "memory_sweep_applied",
            cycle_id = %cycle_id,
            deactivated,
            "applied sweep in memory"
        );
        Ok(())
    }
}

fn parts_for(state: &MemoryState, cycle_id: CycleId) -> usize {
    state
        .parts_received
        .get(&cycle_id)
        .map(|parts| parts.values().sum())
        .unwrap_or_default()
}

impl InventorySink for MemoryInventorySink {
    fn upload<'a>(
        &'a self,
        collections: &'a Collections,
        cycle_id: CycleId,
        part_id: PartId,
    ) -> BoxFuture<'a, Result<usize, SinkError>> {
        Box::pin(async move { self.store_part(collections, cycle_id, part_id) })
    }

    fn sweep<'a>(
        &'a self,
        cycle_id: CycleId,
        total_parts: usize,
        collections: &'a [String],
    ) -> BoxFuture<'a, Result<(), SinkError>> {
        Box::pin(async move { self.apply_sweep(cycle_id, total_parts, collections) })
    }
}
