//! Session-level influences on how entities are loaded.

use std::collections::{BTreeMap, BTreeSet};

use crate::catalog::EntityDef;
use relmap_proto::Value;

/// Fetch plan applied by the engine itself while cascading an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InternalFetchProfile {
    /// Fetch associations that cascade merge.
    Merge,
    /// Fetch associations that cascade refresh.
    Refresh,
}

/// An entity graph restricting or extending what is fetched for one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityGraph {
    pub entity: String,
    /// Associations to fetch.
    pub attribute_nodes: Vec<String>,
}

impl EntityGraph {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            attribute_nodes: Vec::new(),
        }
    }

    pub fn with_attribute_node(mut self, association: impl Into<String>) -> Self {
        self.attribute_nodes.push(association.into());
        self
    }
}

/// Filters, fetch profiles and graphs enabled on a session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadQueryInfluencers {
    /// Enabled filters and their parameter values.
    pub enabled_filters: BTreeMap<String, BTreeMap<String, Value>>,
    pub enabled_fetch_profiles: BTreeSet<String>,
    pub entity_graph: Option<EntityGraph>,
    pub internal_fetch_profile: Option<InternalFetchProfile>,
}

impl LoadQueryInfluencers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable a filter with its parameter values.
    pub fn with_filter<K: Into<String>>(
        mut self,
        name: impl Into<String>,
        parameters: impl IntoIterator<Item = (K, Value)>,
    ) -> Self {
        self.enabled_filters.insert(
            name.into(),
            parameters.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        );
        self
    }

    pub fn with_fetch_profile(mut self, name: impl Into<String>) -> Self {
        self.enabled_fetch_profiles.insert(name.into());
        self
    }

    pub fn with_entity_graph(mut self, graph: EntityGraph) -> Self {
        self.entity_graph = Some(graph);
        self
    }

    pub fn with_internal_fetch_profile(mut self, profile: InternalFetchProfile) -> Self {
        self.internal_fetch_profile = Some(profile);
        self
    }

    pub fn disable_filter(&mut self, name: &str) {
        self.enabled_filters.remove(name);
    }

    pub fn has_enabled_filters(&self) -> bool {
        !self.enabled_filters.is_empty()
    }

    pub fn has_enabled_fetch_profiles(&self) -> bool {
        !self.enabled_fetch_profiles.is_empty()
    }

    /// Whether an enabled filter applies to `entity`.
    pub fn affects_by_filters(&self, entity: &EntityDef) -> bool {
        self.enabled_filters
            .keys()
            .any(|name| entity.get_filter(name).is_some())
    }

    /// Whether the entity graph targets `entity`.
    pub fn affects_by_entity_graph(&self, entity: &EntityDef) -> bool {
        self.entity_graph
            .as_ref()
            .is_some_and(|g| g.entity == entity.name)
    }

    /// Whether anything besides an internal fetch profile changes how `entity` loads.
    pub fn affects(&self, entity: &EntityDef) -> bool {
        self.affects_by_filters(entity)
            || self.affects_by_entity_graph(entity)
            || self.has_enabled_fetch_profiles()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relmap_proto::SqlType;

    #[test]
    fn test_filters_affect_only_declaring_entities() {
        let customer = EntityDef::new("Customer", "customers", "id", SqlType::BigInt)
            .with_filter("active", "{alias}.active = :flag");
        let order = EntityDef::new("Order", "orders", "id", SqlType::BigInt);

        let influencers = LoadQueryInfluencers::new().with_filter("active", [("flag", Value::Bool(true))]);
        assert!(influencers.affects_by_filters(&customer));
        assert!(!influencers.affects_by_filters(&order));
        assert!(!influencers.affects(&order));
    }

    #[test]
    fn test_entity_graph_targets_one_entity() {
        let order = EntityDef::new("Order", "orders", "id", SqlType::BigInt);
        let influencers = LoadQueryInfluencers::new()
            .with_entity_graph(EntityGraph::new("Order").with_attribute_node("lines"));
        assert!(influencers.affects_by_entity_graph(&order));
    }
}
