//! Engine facade.
//!
//! The [`Engine`] owns everything shared between sessions: the catalog, the
//! dialect, the select executor with its results cache regions, the named
//! queries and the entity loaders. It is cheap to share behind an `Arc`.

use std::collections::BTreeSet;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::cache::QueryCacheRegistry;
use crate::catalog::Catalog;
use crate::config::EngineConfig;
use crate::dialect::{dialect_for_name, Dialect};
use crate::error::Error;
use crate::exec::{
    CompiledSelect, Connection, ExecutionContext, ResultStream, ScrollableResults, SelectExecutor,
};
use crate::loader::SingleIdEntityLoader;
use crate::named::NamedQueryRegistry;
use crate::results::{EntityInstance, ResultValue, RowTransformer};
use crate::session::Session;
use crate::translate::CriteriaTranslator;
use relmap_proto::{Criteria, LockOptions, NamedQueryDescriptor, ScrollMode, Value};

/// Compiles and runs queries for sessions.
pub struct Engine {
    catalog: Arc<Catalog>,
    dialect: Arc<dyn Dialect>,
    config: EngineConfig,
    executor: SelectExecutor,
    named_queries: NamedQueryRegistry,
    loaders: DashMap<String, Arc<SingleIdEntityLoader>>,
}

impl Engine {
    pub fn new(catalog: Catalog, dialect: Arc<dyn Dialect>, config: EngineConfig) -> Self {
        let caches = Arc::new(
            QueryCacheRegistry::new(config.default_cache_region.clone())
                .with_max_entries(config.query_cache_max_entries),
        );
        let executor = executor_for(&config, caches);
        Self {
            catalog: Arc::new(catalog),
            dialect,
            config,
            executor,
            named_queries: NamedQueryRegistry::new(),
            loaders: DashMap::new(),
        }
    }

    /// Build an engine using the dialect named by `config`.
    pub fn from_config(catalog: Catalog, config: EngineConfig) -> Result<Self, Error> {
        let dialect = dialect_for_name(&config.dialect)
            .ok_or_else(|| Error::Config(format!("unknown dialect '{}'", config.dialect)))?;
        Ok(Self::new(catalog, dialect, config))
    }

    /// Use `caches` for query results, e.g. to share regions between engines.
    pub fn with_cache_registry(mut self, caches: Arc<QueryCacheRegistry>) -> Self {
        self.executor = executor_for(&self.config, caches);
        self
    }

    /// Start a session on `connection` with the configured cache mode.
    pub fn open_session(&self, connection: Arc<dyn Connection>) -> Session {
        Session::new(connection).with_cache_mode(self.config.default_cache_mode)
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn executor(&self) -> &SelectExecutor {
        &self.executor
    }

    pub fn named_queries(&self) -> &NamedQueryRegistry {
        &self.named_queries
    }

    pub fn register_named_query(&self, descriptor: NamedQueryDescriptor) {
        self.named_queries.register(descriptor);
    }

    pub fn translator(&self) -> CriteriaTranslator<'_> {
        CriteriaTranslator::new(&self.catalog, self.dialect.as_ref())
            .with_follow_on_locking(self.config.follow_on_locking)
    }

    /// Translate and render `criteria` under the session's influencers.
    pub fn compile(&self, criteria: &Criteria, session: &Session) -> Result<CompiledSelect, Error> {
        Ok(self.translator().compile(criteria, session.influencers())?)
    }

    /// Run `criteria` and return every transformed row.
    pub fn list<R>(
        &self,
        session: &Session,
        criteria: &Criteria,
        transformer: &dyn RowTransformer<R>,
    ) -> Result<Vec<R>, Error> {
        let compiled = self.compile(criteria, session)?;
        let context = ExecutionContext::new(session, &criteria.options);
        self.executor.list(&compiled, &context, transformer)
    }

    /// Run `criteria` and return a cursor over the transformed rows.
    pub fn scroll<R>(
        &self,
        session: &Session,
        criteria: &Criteria,
        scroll_mode: ScrollMode,
        transformer: Arc<dyn RowTransformer<R>>,
    ) -> Result<ScrollableResults<R>, Error> {
        let compiled = self.compile(criteria, session)?;
        let context = ExecutionContext::new(session, &criteria.options);
        self.executor
            .scroll(&compiled, scroll_mode, &context, transformer)
    }

    /// Run `criteria` and return a lazy stream of transformed rows.
    pub fn stream<R>(
        &self,
        session: &Session,
        criteria: &Criteria,
        transformer: Arc<dyn RowTransformer<R>>,
    ) -> Result<ResultStream<R>, Error> {
        let compiled = self.compile(criteria, session)?;
        let context = ExecutionContext::new(session, &criteria.options);
        self.executor.stream(&compiled, &context, transformer)
    }

    /// Run the named query `name`.
    pub fn list_named<R>(
        &self,
        session: &Session,
        name: &str,
        transformer: &dyn RowTransformer<R>,
    ) -> Result<Vec<R>, Error> {
        let criteria = self.named_queries.require(name)?.to_criteria();
        self.list(session, &criteria, transformer)
    }

    /// Load `entity` by identifier.
    pub fn load(
        &self,
        session: &Session,
        entity: &str,
        id: &[Value],
        lock_options: &LockOptions,
    ) -> Result<Option<EntityInstance>, Error> {
        self.loader(entity)?
            .load(&self.executor, session, id, lock_options)
    }

    /// Read the current column state of `entity` with identifier `id`.
    pub fn load_database_snapshot(
        &self,
        session: &Session,
        entity: &str,
        id: &[Value],
    ) -> Result<Option<Vec<ResultValue>>, Error> {
        self.loader(entity)?
            .load_database_snapshot(&self.executor, session, id)
    }

    /// Mark tables modified, making cached results that read them stale.
    pub fn invalidate_query_spaces<I, S>(&self, spaces: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let spaces: BTreeSet<String> = spaces.into_iter().map(Into::into).collect();
        self.executor.caches().invalidate(&spaces);
    }

    /// The loader of `entity`, created on first use.
    pub fn loader(&self, entity: &str) -> Result<Arc<SingleIdEntityLoader>, Error> {
        if let Some(loader) = self.loaders.get(entity) {
            return Ok(loader.clone());
        }
        let loader = SingleIdEntityLoader::new(entity, self.catalog.clone(), self.dialect.clone())?
            .with_follow_on_locking(self.config.follow_on_locking)
            .with_statement_caching(self.config.statement_caching);
        debug!(entity, "Created entity loader");
        Ok(self
            .loaders
            .entry(entity.to_string())
            .or_insert_with(|| Arc::new(loader))
            .clone())
    }
}

fn executor_for(config: &EngineConfig, caches: Arc<QueryCacheRegistry>) -> SelectExecutor {
    SelectExecutor::new(caches)
        .with_query_cache_enabled(config.query_cache_enabled)
        .with_default_fetch_size(config.default_fetch_size)
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("dialect", &self.dialect.name())
            .field("config", &self.config)
            .field("named_queries", &self.named_queries.len())
            .field("loaders", &self.loaders.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{AttributeDef, EntityDef, SchemaBundle};
    use relmap_proto::{Restriction, SqlType};

    fn engine(config: EngineConfig) -> Result<Engine, Error> {
        let customer = EntityDef::new("Customer", "customers", "id", SqlType::BigInt)
            .with_attribute(AttributeDef::basic("name", "name", SqlType::Varchar));
        let catalog = Catalog::new(SchemaBundle::new(1).with_entity(customer))?;
        Engine::from_config(catalog, config)
    }

    #[test]
    fn test_from_config_resolves_dialect() {
        let engine = engine(EngineConfig::new().with_dialect("postgres")).unwrap();
        assert_eq!(engine.dialect().name(), "postgres");
        assert!(matches!(
            self::engine(EngineConfig::new().with_dialect("db2")),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_loaders_are_shared() {
        let engine = engine(EngineConfig::new()).unwrap();
        let a = engine.loader("Customer").unwrap();
        let b = engine.loader("Customer").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(matches!(engine.loader("Ghost"), Err(Error::UnknownEntity(_))));
    }

    #[test]
    fn test_register_named_query() {
        let engine = engine(EngineConfig::new()).unwrap();
        engine.register_named_query(NamedQueryDescriptor::new(
            "byName",
            Criteria::new("Customer").add(Restriction::eq("name", "Alice")),
        ));
        assert_eq!(engine.named_queries().names(), vec!["byName".to_string()]);
    }
}
