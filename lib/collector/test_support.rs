use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use futures::stream::{self, BoxStream, StreamExt};
use serde_json::{json, Value};

use super::CycleOrchestrator;
use crate::cloud_client::{FetchError, FetchErrorKind, RawFetcher, StaticScopeSource};
use crate::inventory::{BatchAccumulator, RawRecord, Record, Scope};
use crate::registry::{Domain, EntityType, EntityTypeRegistry};
use crate::server::monitoring::CollectorMetrics;
use crate::sink::InventorySink;

/// Raw record understood by [`normalize_fixture`]: one canonical record with
/// `id` as its ref, pushed into `collection`.
pub(super) fn fixture_record(collection: &str, id: &str) -> RawRecord {
    json!({ "id": id, "collection": collection })
}

/// `count` fixture records for `collection`, with refs unique per scope.
pub(super) fn fixture_records(collection: &str, scope: &str, count: usize) -> Vec<RawRecord> {
    (0..count)
        .map(|index| fixture_record(collection, &format!("{scope}/{collection}/{index}")))
        .collect()
}

/// Test normalizer: pushes one record into the collection named by the raw
/// record and touches every collection listed under `touch`.
pub(super) fn normalize_fixture(raw: &RawRecord, _scope: &Scope, acc: &mut BatchAccumulator) {
    if let Some(touched) = raw.get("touch").and_then(Value::as_array) {
        for name in touched.iter().filter_map(Value::as_str) {
            acc.touch(name);
        }
    }
    let (Some(collection), Some(id)) = (
        raw.get("collection").and_then(Value::as_str),
        raw.get("id").and_then(Value::as_str),
    ) else {
        return;
    };
    acc.push(collection, Record::new(id));
}

pub(super) fn limit(value: usize) -> NonZeroUsize {
    NonZeroUsize::new(value).expect("fixture batch limit must be positive")
}

enum ScriptedFetch {
    Records(Vec<RawRecord>),
    /// Yields `records` and then fails.
    FailAfter(Vec<RawRecord>, FetchError),
}

/// Scripted fetcher keyed by `(entity tag, scope id)`.
///
/// Scripts are replayed on every fetch so repeated cycles see the same data
/// until a script is replaced. Unscripted pairs yield no records.
#[derive(Default)]
pub(super) struct MockFetcher {
    scripts: Mutex<HashMap<(String, String), ScriptedFetch>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl MockFetcher {
    pub(super) fn set_records(&self, tag: &str, scope: &str, records: Vec<RawRecord>) {
        self.scripts
            .lock()
            .expect("scripts mutex poisoned")
            .insert(
                (tag.to_string(), scope.to_string()),
                ScriptedFetch::Records(records),
            );
    }

    pub(super) fn fail_after(&self, tag: &str, scope: &str, records: Vec<RawRecord>) {
        self.scripts
            .lock()
            .expect("scripts mutex poisoned")
            .insert(
                (tag.to_string(), scope.to_string()),
                ScriptedFetch::FailAfter(
                    records,
                    FetchError::new(
                        FetchErrorKind::UpstreamUnavailable,
                        format!("scripted failure for {tag} in {scope}"),
                    ),
                ),
            );
    }

    /// `(tag, scope)` pairs in the order they were fetched.
    pub(super) fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().expect("calls mutex poisoned").clone()
    }
}

impl RawFetcher for MockFetcher {
    fn fetch<'a>(
        &'a self,
        entity: &'a EntityType,
        scope: &'a Scope,
    ) -> BoxStream<'a, Result<RawRecord, FetchError>> {
        self.calls
            .lock()
            .expect("calls mutex poisoned")
            .push((entity.tag().to_string(), scope.id.clone()));

        let scripts = self.scripts.lock().expect("scripts mutex poisoned");
        let items: Vec<Result<RawRecord, FetchError>> =
            match scripts.get(&(entity.tag().to_string(), scope.id.clone())) {
                None => Vec::new(),
                Some(ScriptedFetch::Records(records)) => {
                    records.iter().cloned().map(Ok).collect()
                }
                Some(ScriptedFetch::FailAfter(records, err)) => records
                    .iter()
                    .cloned()
                    .map(Ok)
                    .chain(std::iter::once(Err(err.clone())))
                    .collect(),
            };
        stream::iter(items).boxed()
    }
}

/// Registry over `types` with every domain served by `fetcher` and every
/// type normalized by [`normalize_fixture`].
pub(super) fn fixture_registry(
    types: Vec<EntityType>,
    fetcher: Arc<MockFetcher>,
) -> EntityTypeRegistry {
    let mut builder = EntityTypeRegistry::builder();
    for domain in Domain::all() {
        builder = builder.fetcher(domain, fetcher.clone());
    }
    for entity in &types {
        builder = builder.normalizer(entity.tag(), normalize_fixture);
    }
    builder
        .entity_types(types)
        .build()
        .expect("fixture registry should validate")
}

pub(super) fn orchestrator(
    registry: EntityTypeRegistry,
    scopes: &[&str],
    sink: Arc<dyn InventorySink>,
    metrics: CollectorMetrics,
) -> CycleOrchestrator {
    CycleOrchestrator::new(
        Arc::new(registry),
        Arc::new(StaticScopeSource::from_ids(scopes.iter().copied())),
        sink,
        metrics,
    )
}
