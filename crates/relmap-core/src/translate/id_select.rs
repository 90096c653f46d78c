//! Selects keyed by entity identifier: entity loads, database snapshots and
//! follow-on lock statements.

use super::builder::{attribute_expression, QueryBuilder};
use super::criteria::{CriteriaTranslator, TranslatedQuery};
use super::influencers::LoadQueryInfluencers;
use super::lock::FollowOnLock;
use crate::catalog::{EntityDef, ValueConverter};
use crate::error::TranslationError;
use crate::results::{MappedResult, ResultDescriptor};
use crate::sql::{
    LockClause, LockedTable, ParameterId, Predicate, RenderedSql, SelectStatement, SqlAstRenderer,
    SqlSelection,
};
use relmap_proto::{ComparisonOp, LockMode, LockOptions, LockTimeout, ROOT_ALIAS};

/// Parameter carrying the identifier in every id-keyed select.
pub const LOAD_ID_PARAMETER: ParameterId = 0;

impl<'a> CriteriaTranslator<'a> {
    /// Select one entity by identifier, honoring locks and session influencers.
    pub fn translate_by_id(
        &self,
        entity: &str,
        lock_options: &LockOptions,
        influencers: &LoadQueryInfluencers,
    ) -> Result<TranslatedQuery, TranslationError> {
        let mut builder = self.id_restricted(entity)?;
        builder.add_influencer_fetches(influencers)?;
        builder.apply_filters(influencers)?;

        let results = builder.entity_results()?;
        let follow_on = self.apply_locks(&mut builder, lock_options)?;
        Ok(finish(builder, results, follow_on))
    }

    /// Select the current column state of one entity, as scalars in
    /// attribute order after the identifier.
    pub fn translate_snapshot(&self, entity: &str) -> Result<TranslatedQuery, TranslationError> {
        let mut builder = self.id_restricted(entity)?;
        let root = builder.root().entity;

        let mut results = Vec::with_capacity(root.attributes.len() + 1);
        let id = builder.id_expression(0)?;
        results.push(snapshot_result(
            builder.select_or_find(id),
            root.identifier.component_names(),
            None,
        ));
        let sql_alias = builder.root().sql_alias.clone();
        for attribute in &root.attributes {
            let expression = attribute_expression(&sql_alias, attribute)?;
            results.push(snapshot_result(
                builder.select_or_find(expression),
                attribute.component_names(),
                attribute.converter().cloned(),
            ));
        }
        Ok(finish(builder, results, None))
    }

    /// `select id from table where id = ?` with a lock clause on the whole row.
    pub fn lock_select(
        &self,
        entity: &EntityDef,
        lock_mode: LockMode,
        timeout: LockTimeout,
    ) -> Result<RenderedSql, TranslationError> {
        let mut builder = self.id_restricted(&entity.name)?;
        let id = builder.id_expression(0)?;
        builder.select_or_find(id);
        builder.spec.lock = Some(LockClause {
            lock_mode,
            timeout,
            locked: vec![LockedTable {
                sql_alias: builder.root().sql_alias.clone(),
                key_columns: entity
                    .id_column_names()
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
            }],
            all_tables: true,
        });
        let statement = SelectStatement {
            query_spec: builder.spec,
            comment: None,
        };
        SqlAstRenderer::render(self.dialect, &statement)
    }

    /// A builder over `entity` restricted by `id = ?`, the id being
    /// [`LOAD_ID_PARAMETER`].
    fn id_restricted(&self, entity: &str) -> Result<QueryBuilder<'a>, TranslationError> {
        let mut builder = QueryBuilder::new(self.catalog, entity, ROOT_ALIAS)?;
        let id = builder.id_expression(0)?;
        // First parameter allocated, so it is LOAD_ID_PARAMETER.
        let parameter = builder.unbound_parameter(id.expressable_type());
        builder
            .spec
            .add_restriction(Predicate::relational(ComparisonOp::Eq, id, parameter)?);
        Ok(builder)
    }
}

fn snapshot_result(
    selection: SqlSelection,
    components: Vec<String>,
    converter: Option<ValueConverter>,
) -> MappedResult {
    let descriptor = if selection.span() > 1 {
        ResultDescriptor::Tuple {
            selection,
            components,
        }
    } else {
        ResultDescriptor::Scalar {
            selection,
            converter,
        }
    };
    MappedResult {
        descriptor,
        user_alias: None,
        include_in_result: true,
    }
}

fn finish(
    builder: QueryBuilder<'_>,
    results: Vec<MappedResult>,
    follow_on: Option<FollowOnLock>,
) -> TranslatedQuery {
    let user_aliases = results.iter().map(|r| r.user_alias.clone()).collect();
    let mapping = builder.mapping(results);
    let query_spaces = builder.query_spaces();
    TranslatedQuery {
        statement: SelectStatement {
            query_spec: builder.spec,
            comment: None,
        },
        mapping,
        query_spaces,
        bindings: builder.bindings,
        follow_on,
        user_aliases,
    }
}
