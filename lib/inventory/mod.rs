mod accumulator;
mod ids;
mod scope;

pub use accumulator::BatchAccumulator;
pub use ids::{CycleId, PartId};
pub use scope::Scope;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// One provider record exactly as the cloud API returned it.
pub type RawRecord = Value;

/// Snapshot of accumulated collections handed to the sink as one part.
///
/// Keyed by collection name; a `BTreeMap` keeps payloads deterministic.
pub type Collections = BTreeMap<String, Vec<Record>>;

/// One canonical inventory entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Provider-assigned reference id. Unique within a collection.
    pub ems_ref: String,
    pub attributes: Map<String, Value>,
}

impl Record {
    pub fn new(ems_ref: impl Into<String>) -> Self {
        Self {
            ems_ref: ems_ref.into(),
            attributes: Map::new(),
        }
    }

    /// Sets an attribute, skipping JSON nulls so payloads stay compact.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        let value = value.into();
        if !value.is_null() {
            self.attributes.insert(key.to_string(), value);
        }
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }
}
