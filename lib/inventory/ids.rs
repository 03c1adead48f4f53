use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identity of one refresh cycle. Generated fresh for every cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CycleId(Uuid);

impl CycleId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for CycleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identity of one uploaded part within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartId(Uuid);

impl PartId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Deterministic id for the `index`-th sub-part of this part, so a replayed
    /// upload of the same part maps onto the same sub-part ids.
    pub fn subpart(&self, index: usize) -> Self {
        Self(Uuid::new_v5(&self.0, index.to_string().as_bytes()))
    }
}

impl fmt::Display for PartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::{CycleId, PartId};

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(CycleId::generate(), CycleId::generate());
        assert_ne!(PartId::generate(), PartId::generate());
    }

    #[test]
    fn subpart_ids_are_stable_and_distinct() {
        let part = PartId::generate();
        assert_eq!(part.subpart(0), part.subpart(0));
        assert_ne!(part.subpart(0), part.subpart(1));
        assert_ne!(part.subpart(0), part);
    }
}
