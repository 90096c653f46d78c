//! Schema bundle - the complete mapping handed to the engine.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{EntityDef, RelationDef};
use crate::error::Error;

/// One eager-fetch directive of a fetch profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchDef {
    /// Owning entity.
    pub entity: String,
    /// Association fetched eagerly.
    pub association: String,
}

/// A named bundle of eager-fetch directives, enabled per session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchProfileDef {
    pub name: String,
    pub fetches: Vec<FetchDef>,
}

impl FetchProfileDef {
    /// Create an empty profile.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fetches: Vec::new(),
        }
    }

    /// Fetch `association` of `entity` eagerly.
    pub fn with_fetch(mut self, entity: impl Into<String>, association: impl Into<String>) -> Self {
        self.fetches.push(FetchDef {
            entity: entity.into(),
            association: association.into(),
        });
        self
    }

    /// Associations of `entity` fetched by this profile.
    pub fn fetches_for<'a>(&'a self, entity: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.fetches
            .iter()
            .filter(move |f| f.entity == entity)
            .map(|f| f.association.as_str())
    }
}

/// A versioned snapshot of the entire mapping.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SchemaBundle {
    /// Schema version.
    pub version: u64,
    /// Entity definitions keyed by name.
    #[serde(default)]
    pub entities: HashMap<String, EntityDef>,
    /// Association definitions.
    #[serde(default)]
    pub relations: Vec<RelationDef>,
    /// Fetch profiles keyed by name.
    #[serde(default)]
    pub fetch_profiles: HashMap<String, FetchProfileDef>,
}

impl SchemaBundle {
    /// Create an empty schema bundle.
    pub fn new(version: u64) -> Self {
        Self {
            version,
            ..Self::default()
        }
    }

    /// Add an entity to the schema.
    pub fn with_entity(mut self, entity: EntityDef) -> Self {
        self.entities.insert(entity.name.clone(), entity);
        self
    }

    /// Add an association to the schema.
    pub fn with_relation(mut self, relation: RelationDef) -> Self {
        self.relations.push(relation);
        self
    }

    /// Add a fetch profile to the schema.
    pub fn with_fetch_profile(mut self, profile: FetchProfileDef) -> Self {
        self.fetch_profiles.insert(profile.name.clone(), profile);
        self
    }

    /// Get an entity by name.
    pub fn get_entity(&self, name: &str) -> Option<&EntityDef> {
        self.entities.get(name)
    }

    /// Get all associations owned by an entity.
    pub fn relations_from(&self, entity: &str) -> Vec<&RelationDef> {
        self.relations
            .iter()
            .filter(|r| r.from_entity == entity)
            .collect()
    }

    /// List all entity names.
    pub fn entity_names(&self) -> Vec<&str> {
        self.entities.keys().map(|s| s.as_str()).collect()
    }

    /// Serialize the schema bundle to JSON.
    pub fn to_json(&self) -> Result<String, Error> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Mapping(e.to_string()))
    }

    /// Read a schema bundle from JSON.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        serde_json::from_str(json).map_err(|e| Error::Mapping(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::AttributeDef;
    use relmap_proto::SqlType;

    fn sample_schema() -> SchemaBundle {
        let customer = EntityDef::new("Customer", "customers", "id", SqlType::BigInt)
            .with_attribute(AttributeDef::basic("name", "name", SqlType::Varchar));
        let order = EntityDef::new("Order", "orders", "id", SqlType::BigInt)
            .with_attribute(AttributeDef::basic("total", "total", SqlType::Double));

        SchemaBundle::new(1)
            .with_entity(customer)
            .with_entity(order)
            .with_relation(RelationDef::many_to_one(
                "customer",
                "Order",
                "customer_id",
                "Customer",
                "id",
            ))
            .with_fetch_profile(FetchProfileDef::new("withCustomer").with_fetch("Order", "customer"))
    }

    #[test]
    fn test_schema_bundle_lookup() {
        let schema = sample_schema();
        assert_eq!(schema.entities.len(), 2);
        assert!(schema.get_entity("Customer").is_some());
        assert_eq!(schema.relations_from("Order").len(), 1);
        assert!(schema.relations_from("Customer").is_empty());
        let profile = &schema.fetch_profiles["withCustomer"];
        assert_eq!(profile.fetches_for("Order").collect::<Vec<_>>(), vec!["customer"]);
    }

    #[test]
    fn test_schema_bundle_json() {
        let schema = sample_schema();
        let json = schema.to_json().unwrap();
        let restored = SchemaBundle::from_json(&json).unwrap();
        assert_eq!(schema, restored);
        assert!(matches!(SchemaBundle::from_json("[]"), Err(Error::Mapping(_))));
    }
}
