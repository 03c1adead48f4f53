mod catalog;
mod entity;

pub use catalog::default_entity_types;
pub use entity::{Domain, EntityType};

use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::Arc;

use thiserror::Error;

use crate::cloud_client::RawFetcher;
use crate::inventory::{BatchAccumulator, RawRecord, Scope};

/// Normalize capability for one entity type.
///
/// Appends zero or more canonical records to the accumulator. Must not fail on
/// well-formed input; malformed records are the normalizer's to skip.
pub type NormalizeFn = fn(&RawRecord, &Scope, &mut BatchAccumulator);

/// Registry resolution failures. All of them are fatal at startup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("unknown entity type: {0}")]
    UnknownEntityType(String),
    #[error("entity type registered twice: {0}")]
    DuplicateEntityType(String),
    #[error("entity type {primary} lists unknown related type {related}")]
    UnknownRelatedType { primary: String, related: String },
    #[error("entity type {0} lists itself as related")]
    SelfRelated(String),
    #[error("related type {related} of {primary} also owns a refresh cycle")]
    RelatedIsTopLevel { primary: String, related: String },
    #[error("entity type {0} declares no collections")]
    NoCollections(String),
    #[error("no fetcher bound for domain {domain} (needed by {tag})")]
    MissingFetcher { tag: String, domain: Domain },
    #[error("no normalizer bound for entity type {0}")]
    MissingNormalizer(String),
    #[error("no top-level entity types to collect")]
    NoTopLevelTypes,
}

/// Fetch and normalize capabilities resolved for one entity type.
#[derive(Clone)]
pub struct EntityBinding {
    pub fetcher: Arc<dyn RawFetcher>,
    pub normalize: NormalizeFn,
}

struct Entry {
    entity: EntityType,
    binding: EntityBinding,
}

/// Collects definitions and capabilities, then validates them all at once.
#[derive(Default)]
pub struct RegistryBuilder {
    types: Vec<EntityType>,
    fetchers: HashMap<Domain, Arc<dyn RawFetcher>>,
    normalizers: HashMap<String, NormalizeFn>,
    batch_limit_overrides: Vec<(String, NonZeroUsize)>,
    only_top_level: Option<Vec<String>>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entity_type(mut self, entity: EntityType) -> Self {
        self.types.push(entity);
        self
    }

    pub fn entity_types(mut self, entities: impl IntoIterator<Item = EntityType>) -> Self {
        self.types.extend(entities);
        self
    }

    pub fn fetcher(mut self, domain: Domain, fetcher: Arc<dyn RawFetcher>) -> Self {
        self.fetchers.insert(domain, fetcher);
        self
    }

    pub fn normalizer(mut self, tag: &str, normalize: NormalizeFn) -> Self {
        self.normalizers.insert(tag.to_string(), normalize);
        self
    }

    pub fn override_batch_limit(mut self, tag: &str, limit: NonZeroUsize) -> Self {
        self.batch_limit_overrides.push((tag.to_string(), limit));
        self
    }

    /// Restricts which top-level types the scheduler iterates. Related types of
    /// the kept ones are still collected.
    pub fn only_top_level<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.only_top_level = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    pub fn build(self) -> Result<EntityTypeRegistry, RegistryError> {
        let RegistryBuilder {
            mut types,
            fetchers,
            normalizers,
            batch_limit_overrides,
            only_top_level,
        } = self;

        let mut index = HashMap::new();
        for (position, entity) in types.iter().enumerate() {
            if index.insert(entity.tag().to_string(), position).is_some() {
                return Err(RegistryError::DuplicateEntityType(entity.tag().to_string()));
            }
        }

        for (tag, limit) in batch_limit_overrides {
            let position = *index
                .get(&tag)
                .ok_or_else(|| RegistryError::UnknownEntityType(tag.clone()))?;
            types[position].set_batch_limit(limit);
        }

        if let Some(selected) = only_top_level {
            let selected: HashSet<String> = selected.into_iter().collect();
            for tag in &selected {
                let known_top_level = index
                    .get(tag)
                    .map(|position| types[*position].is_top_level())
                    .unwrap_or(false);
                if !known_top_level {
                    return Err(RegistryError::UnknownEntityType(tag.clone()));
                }
            }
            for entity in types.iter_mut() {
                if entity.is_top_level() && !selected.contains(entity.tag()) {
                    entity.set_top_level(false);
                }
            }
        }

        validate_relations(&types, &index)?;
        if !types.iter().any(EntityType::is_top_level) {
            return Err(RegistryError::NoTopLevelTypes);
        }

        let mut entries = Vec::with_capacity(types.len());
        for entity in types {
            if entity.collections().is_empty() {
                return Err(RegistryError::NoCollections(entity.tag().to_string()));
            }
            let fetcher = fetchers.get(&entity.domain()).cloned().ok_or_else(|| {
                RegistryError::MissingFetcher {
                    tag: entity.tag().to_string(),
                    domain: entity.domain(),
                }
            })?;
            let normalize = *normalizers
                .get(entity.tag())
                .ok_or_else(|| RegistryError::MissingNormalizer(entity.tag().to_string()))?;
            entries.push(Entry {
                entity,
                binding: EntityBinding { fetcher, normalize },
            });
        }

        Ok(EntityTypeRegistry { entries, index })
    }
}

fn validate_relations(
    types: &[EntityType],
    index: &HashMap<String, usize>,
) -> Result<(), RegistryError> {
    for entity in types {
        for related in entity.related() {
            if related == entity.tag() {
                return Err(RegistryError::SelfRelated(related.clone()));
            }
            let position = index
                .get(related)
                .ok_or_else(|| RegistryError::UnknownRelatedType {
                    primary: entity.tag().to_string(),
                    related: related.clone(),
                })?;
            if entity.is_top_level() && types[*position].is_top_level() {
                return Err(RegistryError::RelatedIsTopLevel {
                    primary: entity.tag().to_string(),
                    related: related.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Validated, immutable mapping from entity-type tag to definition and capabilities.
pub struct EntityTypeRegistry {
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
}

impl EntityTypeRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    fn entry(&self, tag: &str) -> Result<&Entry, RegistryError> {
        self.index
            .get(tag)
            .map(|position| &self.entries[*position])
            .ok_or_else(|| RegistryError::UnknownEntityType(tag.to_string()))
    }

    pub fn get(&self, tag: &str) -> Result<&EntityType, RegistryError> {
        self.entry(tag).map(|entry| &entry.entity)
    }

    /// Types that own a refresh cycle, in registration order.
    pub fn top_level_types(&self) -> impl Iterator<Item = &EntityType> {
        self.entries
            .iter()
            .map(|entry| &entry.entity)
            .filter(|entity| entity.is_top_level())
    }

    pub fn related_types(&self, primary: &str) -> Result<Vec<&EntityType>, RegistryError> {
        self.get(primary)?
            .related()
            .iter()
            .map(|tag| self.get(tag))
            .collect()
    }

    pub fn batch_limit(&self, tag: &str) -> Result<usize, RegistryError> {
        self.get(tag).map(EntityType::batch_limit)
    }

    pub fn domain(&self, tag: &str) -> Result<Domain, RegistryError> {
        self.get(tag).map(EntityType::domain)
    }

    pub fn binding(&self, tag: &str) -> Result<&EntityBinding, RegistryError> {
        self.entry(tag).map(|entry| &entry.binding)
    }
}
