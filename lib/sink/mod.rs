mod http;
mod memory;

pub use http::HttpInventorySink;
pub use memory::{MemoryInventorySink, SinkCall, StoredRecord};

use std::sync::Arc;

use futures::future::BoxFuture;
use thiserror::Error;

use crate::inventory::{Collections, CycleId, PartId};

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("inventory store request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("inventory store returned HTTP {status} for {operation}")]
    UnexpectedStatus { operation: &'static str, status: u16 },

    #[error("inventory store refused sweep of cycle {cycle_id}: {reason}")]
    SweepRefused { cycle_id: CycleId, reason: String },

    #[error("inventory store response for {operation} is invalid: {message}")]
    InvalidResponse {
        operation: &'static str,
        message: String,
    },

    #[error("inventory store unavailable: {0}")]
    Unavailable(String),
}

impl SinkError {
    /// True when the store answered but the answer breaks the part/sweep contract.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            SinkError::SweepRefused { .. } | SinkError::InvalidResponse { .. }
        )
    }
}

/// Downstream inventory store.
///
/// `upload` persists one batch under `(cycle_id, part_id)` and returns how many
/// parts it actually wrote (a store may subdivide a large batch). `sweep`
/// deactivates records in `collections` not stamped with `cycle_id`; the store
/// is expected to refuse when `total_parts` disagrees with what it received.
pub trait InventorySink: Send + Sync {
    fn upload<'a>(
        &'a self,
        collections: &'a Collections,
        cycle_id: CycleId,
        part_id: PartId,
    ) -> BoxFuture<'a, Result<usize, SinkError>>;

    fn sweep<'a>(
        &'a self,
        cycle_id: CycleId,
        total_parts: usize,
        collections: &'a [String],
    ) -> BoxFuture<'a, Result<(), SinkError>>;
}

impl<T> InventorySink for Arc<T>
where
    T: InventorySink + ?Sized,
{
    fn upload<'a>(
        &'a self,
        collections: &'a Collections,
        cycle_id: CycleId,
        part_id: PartId,
    ) -> BoxFuture<'a, Result<usize, SinkError>> {
        (**self).upload(collections, cycle_id, part_id)
    }

    fn sweep<'a>(
        &'a self,
        cycle_id: CycleId,
        total_parts: usize,
        collections: &'a [String],
    ) -> BoxFuture<'a, Result<(), SinkError>> {
        (**self).sweep(cycle_id, total_parts, collections)
    }
}
