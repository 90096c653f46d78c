//! Named query registry.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::error::Error;
use relmap_proto::{named_queries_from_json, NamedQueryDescriptor};

/// Named queries registered with the engine.
#[derive(Debug, Default)]
pub struct NamedQueryRegistry {
    queries: DashMap<String, Arc<NamedQueryDescriptor>>,
}

impl NamedQueryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `descriptor`, replacing a query of the same name.
    pub fn register(&self, descriptor: NamedQueryDescriptor) {
        debug!(name = %descriptor.name, entity = %descriptor.query.entity, "Registering named query");
        self.queries
            .insert(descriptor.name.clone(), Arc::new(descriptor));
    }

    /// Register every descriptor of a JSON array. Returns how many were read.
    pub fn load_json(&self, json: &str) -> Result<usize, Error> {
        let descriptors = named_queries_from_json(json)?;
        let count = descriptors.len();
        for descriptor in descriptors {
            self.register(descriptor);
        }
        Ok(count)
    }

    pub fn get(&self, name: &str) -> Option<Arc<NamedQueryDescriptor>> {
        self.queries.get(name).map(|d| d.clone())
    }

    /// The query registered under `name`.
    pub fn require(&self, name: &str) -> Result<Arc<NamedQueryDescriptor>, Error> {
        self.get(name)
            .ok_or_else(|| Error::UnknownNamedQuery(name.to_string()))
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.queries.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relmap_proto::Criteria;

    #[test]
    fn test_register_and_require() {
        let registry = NamedQueryRegistry::new();
        registry.register(NamedQueryDescriptor::new("all", Criteria::new("Customer")));
        assert_eq!(registry.require("all").unwrap().query.entity, "Customer");
        assert!(matches!(
            registry.require("missing"),
            Err(Error::UnknownNamedQuery(name)) if name == "missing"
        ));
    }

    #[test]
    fn test_load_json() {
        let registry = NamedQueryRegistry::new();
        let count = registry
            .load_json(
                r#"[
                    { "name": "b", "query": { "entity": "Order", "alias": "o" } },
                    { "name": "a", "query": { "entity": "Customer", "alias": "c" }, "cacheable": true }
                ]"#,
            )
            .unwrap();
        assert_eq!(count, 2);
        assert_eq!(registry.names(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(registry.get("a").unwrap().cacheable, Some(true));
        assert!(registry.load_json("[").is_err());
    }
}
