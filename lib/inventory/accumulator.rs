use super::{Collections, Record};

/// In-progress batch for one refresh cycle.
///
/// Holds the named collections appended since the last flush and the number of
/// raw records that produced them. The count is per raw record, not per
/// canonical record: one VM may emit a `vms`, a `hardwares` and several `disks`
/// rows but still counts once against the batch limit.
#[derive(Debug, Default)]
pub struct BatchAccumulator {
    collections: Collections,
    pending_raw_records: usize,
}

impl BatchAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one canonical record to `collection`, creating it on first use.
    pub fn push(&mut self, collection: &str, record: Record) {
        self.collection_mut(collection).push(record);
    }

    /// Declares `collection` in the next part even if nothing is appended to it.
    pub fn touch(&mut self, collection: &str) {
        self.collection_mut(collection);
    }

    fn collection_mut(&mut self, collection: &str) -> &mut Vec<Record> {
        self.collections.entry(collection.to_string()).or_default()
    }

    /// Records that one more raw record was normalized into this batch.
    pub fn mark_raw_record(&mut self) -> usize {
        self.pending_raw_records += 1;
        self.pending_raw_records
    }

    /// Raw records accumulated since the last flush.
    pub fn pending(&self) -> usize {
        self.pending_raw_records
    }

    pub fn is_empty(&self) -> bool {
        self.pending_raw_records == 0
    }

    pub fn collection(&self, name: &str) -> Option<&[Record]> {
        self.collections.get(name).map(Vec::as_slice)
    }

    pub fn record_count(&self) -> usize {
        self.collections.values().map(Vec::len).sum()
    }

    /// Moves the accumulated collections out and resets the batch to empty.
    pub fn take(&mut self) -> Collections {
        self.pending_raw_records = 0;
        std::mem::take(&mut self.collections)
    }
}
