//! Loading one entity by identifier.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::cache::{CacheStats, StatementCache};
use crate::catalog::{Catalog, EntityDef};
use crate::dialect::Dialect;
use crate::error::Error;
use crate::exec::{CompiledSelect, ExecutionContext, JdbcParameterBindings, SelectExecutor};
use crate::results::{EntityInstance, ResultValue, RootEntity, TupleTransformer};
use crate::session::Session;
use crate::translate::{
    CriteriaTranslator, InternalFetchProfile, LoadQueryInfluencers, LOAD_ID_PARAMETER,
};
use relmap_proto::{LockMode, LockOptions, LockTimeout, QueryOptions, Value};

/// Loads instances of one entity by identifier.
///
/// Compiled selects are reused where the session's influencers and the lock
/// request allow it:
///
/// 1. filters enabled for the entity: compiled on every call;
/// 2. an internal fetch profile with a lock weaker than `Upgrade`: cached
///    per profile;
/// 3. no entity graph or fetch profile in effect and a bounded lock wait:
///    cached per lock mode and timeout;
/// 4. otherwise compiled on every call.
pub struct SingleIdEntityLoader {
    entity: String,
    catalog: Arc<Catalog>,
    dialect: Arc<dyn Dialect>,
    follow_on_locking: Option<bool>,
    statement_caching: bool,
    by_lock: StatementCache<(LockMode, LockTimeout), CompiledSelect>,
    by_profile: StatementCache<InternalFetchProfile, CompiledSelect>,
    snapshot: StatementCache<(), CompiledSelect>,
}

impl SingleIdEntityLoader {
    pub fn new(
        entity: impl Into<String>,
        catalog: Arc<Catalog>,
        dialect: Arc<dyn Dialect>,
    ) -> Result<Self, Error> {
        let entity = entity.into();
        catalog.require_entity(&entity)?;
        Ok(Self {
            entity,
            catalog,
            dialect,
            follow_on_locking: None,
            statement_caching: true,
            by_lock: StatementCache::new(),
            by_profile: StatementCache::new(),
            snapshot: StatementCache::new(),
        })
    }

    pub fn with_follow_on_locking(mut self, follow_on: Option<bool>) -> Self {
        self.follow_on_locking = follow_on;
        self
    }

    /// Disable reuse of compiled selects.
    pub fn with_statement_caching(mut self, enabled: bool) -> Self {
        self.statement_caching = enabled;
        self
    }

    pub fn entity_name(&self) -> &str {
        &self.entity
    }

    /// Load the entity with identifier `id`, one value per identifier column.
    #[instrument(skip(self, executor, session, id), fields(entity = %self.entity, lock_mode = %lock_options.lock_mode))]
    pub fn load(
        &self,
        executor: &SelectExecutor,
        session: &Session,
        id: &[Value],
        lock_options: &LockOptions,
    ) -> Result<Option<EntityInstance>, Error> {
        let compiled = self.resolve_select(lock_options, session.influencers())?;
        let bindings = self.id_bindings(id)?;
        let options = QueryOptions::none();
        let context = ExecutionContext::new(session, &options).with_bindings(&bindings);

        let mut rows = executor.list(&compiled, &context, &RootEntity)?;
        if rows.len() > 1 {
            return Err(Error::ResultShape(format!(
                "more than one row with identifier {:?} was found for {}",
                id, self.entity
            )));
        }
        Ok(rows.pop().and_then(ResultValue::into_entity))
    }

    /// Read the current column state of the entity with identifier `id`:
    /// the identifier followed by every attribute in declaration order.
    pub fn load_database_snapshot(
        &self,
        executor: &SelectExecutor,
        session: &Session,
        id: &[Value],
    ) -> Result<Option<Vec<ResultValue>>, Error> {
        let compiled = if self.statement_caching {
            self.snapshot.get_or_try_insert((), || self.compile_snapshot())?
        } else {
            Arc::new(self.compile_snapshot()?)
        };
        let bindings = self.id_bindings(id)?;
        let options = QueryOptions::none();
        let context = ExecutionContext::new(session, &options).with_bindings(&bindings);
        let mut rows = executor.list(&compiled, &context, &TupleTransformer)?;
        Ok(rows.pop())
    }

    /// The select used for `lock_options` under `influencers`, compiled or
    /// taken from the statement caches.
    pub fn resolve_select(
        &self,
        lock_options: &LockOptions,
        influencers: &LoadQueryInfluencers,
    ) -> Result<Arc<CompiledSelect>, Error> {
        let entity = self.entity_def()?;
        let compile = || self.compile(lock_options, influencers);

        if !self.statement_caching || influencers.affects_by_filters(entity) {
            debug!(entity = %self.entity, "Compiling uncached load select");
            return Ok(Arc::new(compile()?));
        }
        if let Some(profile) = influencers.internal_fetch_profile {
            if lock_options.lock_mode < LockMode::Upgrade {
                return self.by_profile.get_or_try_insert(profile, compile);
            }
        }
        if is_reusable(entity, lock_options, influencers) {
            let key = (lock_options.lock_mode, lock_options.timeout);
            return self.by_lock.get_or_try_insert(key, compile);
        }
        debug!(entity = %self.entity, "Compiling uncached load select");
        Ok(Arc::new(compile()?))
    }

    /// Statistics of the per-lock-mode select cache.
    pub fn lock_cache_stats(&self) -> &CacheStats {
        self.by_lock.stats()
    }

    /// Statistics of the per-fetch-profile select cache.
    pub fn profile_cache_stats(&self) -> &CacheStats {
        self.by_profile.stats()
    }

    fn entity_def(&self) -> Result<&EntityDef, Error> {
        self.catalog.require_entity(&self.entity)
    }

    fn translator(&self) -> CriteriaTranslator<'_> {
        CriteriaTranslator::new(&self.catalog, self.dialect.as_ref())
            .with_follow_on_locking(self.follow_on_locking)
    }

    fn compile(
        &self,
        lock_options: &LockOptions,
        influencers: &LoadQueryInfluencers,
    ) -> Result<CompiledSelect, Error> {
        let translator = self.translator();
        let translated = translator.translate_by_id(&self.entity, lock_options, influencers)?;
        Ok(translator.render(translated)?)
    }

    fn compile_snapshot(&self) -> Result<CompiledSelect, Error> {
        let translator = self.translator();
        let translated = translator.translate_snapshot(&self.entity)?;
        Ok(translator.render(translated)?)
    }

    fn id_bindings(&self, id: &[Value]) -> Result<JdbcParameterBindings, Error> {
        let span = self.entity_def()?.identifier.column_span();
        if id.len() != span {
            return Err(Error::Binding(format!(
                "{} identifier has {} columns, {} values given",
                self.entity,
                span,
                id.len()
            )));
        }
        let mut bindings = JdbcParameterBindings::new();
        bindings.bind(LOAD_ID_PARAMETER, id.to_vec());
        Ok(bindings)
    }
}

/// Whether a select compiled for `lock_options` can serve later loads with
/// the same lock mode and timeout.
fn is_reusable(entity: &EntityDef, lock_options: &LockOptions, influencers: &LoadQueryInfluencers) -> bool {
    lock_options.timeout != LockTimeout::WaitForever
        && !influencers.affects_by_entity_graph(entity)
        && !influencers.has_enabled_fetch_profiles()
}

impl std::fmt::Debug for SingleIdEntityLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleIdEntityLoader")
            .field("entity", &self.entity)
            .field("dialect", &self.dialect.name())
            .field("statement_caching", &self.statement_caching)
            .field("cached_by_lock", &self.by_lock.len())
            .field("cached_by_profile", &self.by_profile.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{AttributeDef, SchemaBundle};
    use crate::dialect::AnsiDialect;
    use crate::translate::EntityGraph;
    use relmap_proto::SqlType;

    fn loader() -> SingleIdEntityLoader {
        let customer = EntityDef::new("Customer", "customers", "id", SqlType::BigInt)
            .with_attribute(AttributeDef::basic("name", "name", SqlType::Varchar))
            .with_filter("byName", "{alias}.name = :name");
        let catalog = Catalog::new(SchemaBundle::new(1).with_entity(customer)).unwrap();
        SingleIdEntityLoader::new("Customer", Arc::new(catalog), Arc::new(AnsiDialect)).unwrap()
    }

    #[test]
    fn test_select_reused_per_lock_mode() {
        let loader = loader();
        let none = LoadQueryInfluencers::new();
        let a = loader.resolve_select(&LockOptions::none(), &none).unwrap();
        let b = loader.resolve_select(&LockOptions::none(), &none).unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let locked = loader.resolve_select(&LockOptions::upgrade(), &none).unwrap();
        assert!(!Arc::ptr_eq(&a, &locked));
        assert!(locked.sql.ends_with(" for update"));
        assert_eq!(loader.lock_cache_stats().hits(), 1);
        assert_eq!(loader.lock_cache_stats().misses(), 2);
    }

    #[test]
    fn test_filters_force_fresh_compilation() {
        let loader = loader();
        let filtered = LoadQueryInfluencers::new().with_filter("byName", [("name", Value::from("Alice"))]);
        let a = loader.resolve_select(&LockOptions::none(), &filtered).unwrap();
        let b = loader.resolve_select(&LockOptions::none(), &filtered).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(a.sql.contains("this_.name = ?"));
        assert_eq!(loader.lock_cache_stats().misses(), 0);
    }

    #[test]
    fn test_internal_profile_cached_separately() {
        let loader = loader();
        let merge = LoadQueryInfluencers::new().with_internal_fetch_profile(InternalFetchProfile::Merge);
        let a = loader.resolve_select(&LockOptions::none(), &merge).unwrap();
        let b = loader.resolve_select(&LockOptions::none(), &merge).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(loader.profile_cache_stats().hits(), 1);

        // A row lock bypasses the profile cache.
        loader.resolve_select(&LockOptions::upgrade(), &merge).unwrap();
        assert_eq!(loader.profile_cache_stats().misses(), 1);
    }

    #[test]
    fn test_wait_forever_and_entity_graph_are_not_cached() {
        let loader = loader();
        let none = LoadQueryInfluencers::new();
        let forever = LockOptions::upgrade().with_timeout(LockTimeout::WaitForever);
        let a = loader.resolve_select(&forever, &none).unwrap();
        let b = loader.resolve_select(&forever, &none).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));

        let graph = LoadQueryInfluencers::new().with_entity_graph(EntityGraph::new("Customer"));
        let c = loader.resolve_select(&LockOptions::none(), &graph).unwrap();
        let d = loader.resolve_select(&LockOptions::none(), &graph).unwrap();
        assert!(!Arc::ptr_eq(&c, &d));
        assert!(loader.by_lock.is_empty());
    }

    #[test]
    fn test_unknown_entity() {
        let catalog = Arc::new(Catalog::new(SchemaBundle::new(1)).unwrap());
        assert!(matches!(
            SingleIdEntityLoader::new("Ghost", catalog, Arc::new(AnsiDialect)),
            Err(Error::UnknownEntity(_))
        ));
    }
}
