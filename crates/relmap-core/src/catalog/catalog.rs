//! Catalog: validated, indexed view over a schema bundle.

use std::collections::HashMap;

use super::{EntityDef, FetchProfileDef, RelationDef, SchemaBundle};
use crate::error::Error;

/// Read-only mapping metadata shared by the translator, loaders and executor.
#[derive(Debug, Clone)]
pub struct Catalog {
    schema: SchemaBundle,
    /// (owning entity, association name) -> index into `schema.relations`.
    relation_index: HashMap<(String, String), usize>,
}

impl Catalog {
    /// Validate `schema` and build the catalog.
    pub fn new(schema: SchemaBundle) -> Result<Self, Error> {
        for (name, entity) in &schema.entities {
            if name != &entity.name {
                return Err(Error::Mapping(format!(
                    "entity registered as '{}' is named '{}'",
                    name, entity.name
                )));
            }
            if entity.identifier.column_span() == 0 {
                return Err(Error::Mapping(format!(
                    "entity '{}' has an identifier without columns",
                    entity.name
                )));
            }
        }

        let mut relation_index = HashMap::new();
        for (i, relation) in schema.relations.iter().enumerate() {
            for entity in [&relation.from_entity, &relation.to_entity] {
                if !schema.entities.contains_key(entity) {
                    return Err(Error::Mapping(format!(
                        "association '{}' references unknown entity '{}'",
                        relation.name, entity
                    )));
                }
            }
            let key = (relation.from_entity.clone(), relation.name.clone());
            if relation_index.insert(key, i).is_some() {
                return Err(Error::Mapping(format!(
                    "duplicate association '{}' on entity '{}'",
                    relation.name, relation.from_entity
                )));
            }
        }

        for profile in schema.fetch_profiles.values() {
            for fetch in &profile.fetches {
                let key = (fetch.entity.clone(), fetch.association.clone());
                if !relation_index.contains_key(&key) {
                    return Err(Error::Mapping(format!(
                        "fetch profile '{}' names unknown association '{}.{}'",
                        profile.name, fetch.entity, fetch.association
                    )));
                }
            }
        }

        Ok(Self {
            schema,
            relation_index,
        })
    }

    /// The underlying schema bundle.
    pub fn schema(&self) -> &SchemaBundle {
        &self.schema
    }

    /// Schema version.
    pub fn version(&self) -> u64 {
        self.schema.version
    }

    /// Get an entity by name.
    pub fn entity(&self, name: &str) -> Option<&EntityDef> {
        self.schema.get_entity(name)
    }

    /// Get an entity by name, failing when it is not mapped.
    pub fn require_entity(&self, name: &str) -> Result<&EntityDef, Error> {
        self.entity(name)
            .ok_or_else(|| Error::UnknownEntity(name.to_string()))
    }

    /// Get an association of `entity` by name.
    pub fn relation(&self, entity: &str, name: &str) -> Option<&RelationDef> {
        self.relation_index
            .get(&(entity.to_string(), name.to_string()))
            .map(|&i| &self.schema.relations[i])
    }

    /// All associations owned by `entity`.
    pub fn relations_from(&self, entity: &str) -> Vec<&RelationDef> {
        self.schema.relations_from(entity)
    }

    /// Get a fetch profile by name.
    pub fn fetch_profile(&self, name: &str) -> Option<&FetchProfileDef> {
        self.schema.fetch_profiles.get(name)
    }
}
