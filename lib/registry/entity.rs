use std::fmt;
use std::num::NonZeroUsize;

/// Connection family serving an entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Domain {
    Compute,
    Network,
    Storage,
}

impl Domain {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Compute => "compute",
            Self::Network => "network",
            Self::Storage => "storage",
        }
    }

    /// Management API version used by every listing in this family.
    pub fn api_version(self) -> &'static str {
        match self {
            Self::Compute => "2023-03-01",
            Self::Network => "2023-05-01",
            Self::Storage => "2023-04-02",
        }
    }

    pub fn all() -> [Domain; 3] {
        [Self::Compute, Self::Network, Self::Storage]
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static description of one kind of resource to collect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityType {
    tag: String,
    domain: Domain,
    resource_path: String,
    batch_limit: NonZeroUsize,
    collections: Vec<String>,
    related: Vec<String>,
    top_level: bool,
}

impl EntityType {
    pub fn new(tag: &str, domain: Domain, batch_limit: NonZeroUsize) -> Self {
        Self {
            tag: tag.to_string(),
            domain,
            resource_path: String::new(),
            batch_limit,
            collections: vec![tag.to_string()],
            related: Vec::new(),
            top_level: false,
        }
    }

    /// Provider listing path relative to a subscription.
    pub fn with_resource_path(mut self, path: &str) -> Self {
        self.resource_path = path.to_string();
        self
    }

    /// Collections this type's normalizer writes to. The first one is the
    /// type's own collection; all of them seed the sweep scope of its cycle.
    pub fn with_collections(mut self, names: &[&str]) -> Self {
        self.collections = names.iter().map(|name| name.to_string()).collect();
        self
    }

    /// Types collected per scope right after this one and swept under its cycle.
    pub fn with_related(mut self, tags: &[&str]) -> Self {
        self.related = tags.iter().map(|tag| tag.to_string()).collect();
        self
    }

    /// Marks the type as owning its own refresh cycle.
    pub fn top_level(mut self) -> Self {
        self.top_level = true;
        self
    }

    pub(crate) fn set_batch_limit(&mut self, limit: NonZeroUsize) {
        self.batch_limit = limit;
    }

    pub(crate) fn set_top_level(&mut self, top_level: bool) {
        self.top_level = top_level;
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn domain(&self) -> Domain {
        self.domain
    }

    pub fn resource_path(&self) -> &str {
        &self.resource_path
    }

    pub fn batch_limit(&self) -> usize {
        self.batch_limit.get()
    }

    pub fn collections(&self) -> &[String] {
        &self.collections
    }

    pub fn related(&self) -> &[String] {
        &self.related
    }

    pub fn is_top_level(&self) -> bool {
        self.top_level
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tag)
    }
}
