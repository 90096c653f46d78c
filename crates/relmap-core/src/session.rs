//! Sessions.

use std::sync::Arc;

use crate::exec::Connection;
use crate::translate::{EntityGraph, InternalFetchProfile, LoadQueryInfluencers};
use relmap_proto::{CacheMode, Value};

/// A unit of work against one connection.
///
/// A session carries the settings that apply to every query it runs: the
/// cache mode, the tenant, and the load influencers (filters, fetch
/// profiles, entity graph).
#[derive(Clone)]
pub struct Session {
    connection: Arc<dyn Connection>,
    tenant: Option<String>,
    cache_mode: CacheMode,
    influencers: LoadQueryInfluencers,
}

impl Session {
    pub fn new(connection: Arc<dyn Connection>) -> Self {
        Self {
            connection,
            tenant: None,
            cache_mode: CacheMode::default(),
            influencers: LoadQueryInfluencers::default(),
        }
    }

    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }

    pub fn with_cache_mode(mut self, cache_mode: CacheMode) -> Self {
        self.cache_mode = cache_mode;
        self
    }

    pub fn connection(&self) -> &dyn Connection {
        self.connection.as_ref()
    }

    pub(crate) fn connection_handle(&self) -> Arc<dyn Connection> {
        self.connection.clone()
    }

    pub fn tenant(&self) -> Option<&str> {
        self.tenant.as_deref()
    }

    pub fn cache_mode(&self) -> CacheMode {
        self.cache_mode
    }

    pub fn set_cache_mode(&mut self, cache_mode: CacheMode) {
        self.cache_mode = cache_mode;
    }

    pub fn influencers(&self) -> &LoadQueryInfluencers {
        &self.influencers
    }

    /// Enable a filter with its parameter values, replacing an earlier
    /// enablement of the same filter.
    pub fn enable_filter<K: Into<String>>(
        &mut self,
        name: impl Into<String>,
        parameters: impl IntoIterator<Item = (K, Value)>,
    ) {
        self.influencers.enabled_filters.insert(
            name.into(),
            parameters.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        );
    }

    pub fn disable_filter(&mut self, name: &str) {
        self.influencers.disable_filter(name);
    }

    pub fn enable_fetch_profile(&mut self, name: impl Into<String>) {
        self.influencers.enabled_fetch_profiles.insert(name.into());
    }

    pub fn disable_fetch_profile(&mut self, name: &str) {
        self.influencers.enabled_fetch_profiles.remove(name);
    }

    pub fn set_entity_graph(&mut self, graph: Option<EntityGraph>) {
        self.influencers.entity_graph = graph;
    }

    pub fn set_internal_fetch_profile(&mut self, profile: Option<InternalFetchProfile>) {
        self.influencers.internal_fetch_profile = profile;
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("tenant", &self.tenant)
            .field("cache_mode", &self.cache_mode)
            .field("influencers", &self.influencers)
            .finish_non_exhaustive()
    }
}
