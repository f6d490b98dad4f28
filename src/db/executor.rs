//! Query execution.
//!
//! A [`Query`] is bound to one schema handle. It collects predicates,
//! joins and preloads, then runs as a plain, paged or literal-SQL fetch.
//! Rows are decoded into the entity type, preloaded, and mapped to DTOs.
//!
//! # Paging
//!
//! Paged fetches count first. If the count fails nothing else runs; if the
//! count succeeds and the page fetch fails, the error is
//! [`RepoError::PartialPage`] carrying the total.

use crate::db::condition::{ConditionBuilder, ConditionExpression, JoinLogic, JoinType, Operator};
use crate::db::entity::Entity;
use crate::db::params::{SqlValue, to_arguments};
use crate::db::registry::SchemaHandle;
use crate::db::sql::{quote_column, quote_ident, render_checked, validate_select};
use crate::error::{RepoError, RepoResult};
use crate::mapper::{EntityMapper, map_entities};
use crate::models::{Page, PagingSpec, SortSpec};
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// A filter over `E` rows in one schema, returning `D` values.
pub struct Query<D, E> {
    handle: SchemaHandle,
    connected: Arc<AtomicBool>,
    builder: ConditionBuilder,
    joins: Vec<String>,
    preloads: Vec<String>,
    _marker: PhantomData<fn() -> (D, E)>,
}

impl<D, E> std::fmt::Debug for Query<D, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("schema", &self.handle.name())
            .field("condition", self.builder.condition())
            .field("joins", &self.joins)
            .field("preloads", &self.preloads)
            .finish()
    }
}

impl<D, E: Entity> Query<D, E> {
    pub(crate) fn new(handle: SchemaHandle, connected: Arc<AtomicBool>) -> Self {
        Self {
            handle,
            connected,
            builder: ConditionBuilder::new(),
            joins: Vec::new(),
            preloads: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Bind a query directly to a handle, without a registry lookup. The
    /// query stays usable until the handle's pool is closed.
    pub fn from_handle(handle: SchemaHandle) -> Self {
        Self::new(handle, Arc::new(AtomicBool::new(true)))
    }

    pub fn schema(&self) -> &str {
        self.handle.name()
    }

    pub fn condition(&self) -> &ConditionExpression {
        self.builder.condition()
    }

    /// See [`ConditionBuilder::add_text_condition`].
    pub fn add_text_condition(
        &mut self,
        join: JoinLogic,
        field: &str,
        op: Operator,
        value: impl Into<SqlValue>,
    ) -> &mut Self {
        self.builder.add_text_condition(join, field, op, value);
        self
    }

    /// See [`ConditionBuilder::add_two_text_conditions`].
    #[allow(clippy::too_many_arguments)]
    pub fn add_two_text_conditions(
        &mut self,
        join: JoinLogic,
        field1: &str,
        op1: Operator,
        value1: impl Into<SqlValue>,
        combine: JoinLogic,
        field2: &str,
        op2: Operator,
        value2: impl Into<SqlValue>,
    ) -> &mut Self {
        self.builder
            .add_two_text_conditions(join, field1, op1, value1, combine, field2, op2, value2);
        self
    }

    /// See [`ConditionBuilder::add_json_field_condition`].
    pub fn add_json_field_condition(
        &mut self,
        join: JoinLogic,
        field: &str,
        key: &str,
        op: Operator,
        value: impl Into<SqlValue>,
    ) -> &mut Self {
        self.builder
            .add_json_field_condition(join, field, key, op, value);
        self
    }

    /// Join `table` (in this query's schema) on `condition`.
    ///
    /// `condition` is inserted as written and must not contain `?`
    /// placeholders. Joins apply to builder queries only, not to literal SQL.
    pub fn add_join(&mut self, join_type: JoinType, table: &str, condition: &str) -> &mut Self {
        self.joins.push(format!(
            "{} {} ON {}",
            join_type.as_sql(),
            self.handle.table(table),
            condition
        ));
        self
    }

    /// Eager-load `relation` through [`Entity::preload`] after every fetch.
    pub fn add_preload(&mut self, relation: &str) -> &mut Self {
        self.preloads.push(relation.to_string());
        self
    }

    fn table(&self) -> String {
        self.handle.table(E::TABLE)
    }

    /// Column reference on the base table unless already qualified.
    fn column_ref(&self, column: &str) -> String {
        if column.contains('.') {
            quote_column(column)
        } else {
            format!("{}.{}", self.table(), quote_ident(column))
        }
    }

    /// `FROM <table> <joins> [WHERE ...]`
    fn from_where(&self) -> String {
        let mut sql = format!("FROM {}", self.table());
        for join in &self.joins {
            sql.push(' ');
            sql.push_str(join);
        }

        let mut filters = Vec::with_capacity(2);
        let condition = self.builder.condition();
        if !condition.is_empty() {
            filters.push(format!("({})", condition.expression()));
        }
        if let Some(column) = E::SOFT_DELETE_COLUMN {
            filters.push(format!("{} IS NULL", self.column_ref(column)));
        }
        if !filters.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&filters.join(" AND "));
        }
        sql
    }

    pub(crate) fn select_sql(&self, sort: &str, paging: Option<PagingSpec>) -> String {
        let sort = SortSpec::parse_or(sort, E::CREATED_AT_COLUMN);
        let mut sql = format!(
            "SELECT {}.* {} ORDER BY {} {}",
            self.table(),
            self.from_where(),
            self.column_ref(&sort.field),
            sort.direction.as_sql()
        );
        if let Some(paging) = paging {
            sql.push(' ');
            sql.push_str(&paging.to_sql());
        }
        sql
    }

    pub(crate) fn count_sql(&self) -> String {
        format!("SELECT COUNT(*) {}", self.from_where())
    }

    fn ensure_connected(&self) -> RepoResult<()> {
        if self.connected.load(Ordering::SeqCst) && !self.handle.pool().is_closed() {
            Ok(())
        } else {
            Err(RepoError::NotConnected)
        }
    }

    async fn fetch_entities(&self, sql: &str, args: &[SqlValue]) -> RepoResult<Vec<E>> {
        debug!(
            schema = %self.handle.name(),
            sql = %sql,
            params = args.len(),
            "Executing query"
        );
        let arguments = to_arguments(args)?;
        let mut entities = sqlx::query_as_with::<_, E, _>(sql, arguments)
            .fetch_all(self.handle.pool())
            .await?;

        for relation in &self.preloads {
            debug!(schema = %self.handle.name(), relation = %relation, "Preloading relation");
            E::preload(relation, &mut entities, &self.handle).await?;
        }
        Ok(entities)
    }

    async fn fetch_count(&self, sql: &str, args: &[SqlValue]) -> RepoResult<i64> {
        debug!(
            schema = %self.handle.name(),
            sql = %sql,
            params = args.len(),
            "Executing count"
        );
        let arguments = to_arguments(args)?;
        let total = sqlx::query_scalar_with::<_, i64, _>(sql, arguments)
            .fetch_one(self.handle.pool())
            .await?;
        Ok(total)
    }
}

impl<D, E> Query<D, E>
where
    D: EntityMapper<E>,
    E: Entity,
{
    async fn fetch_mapped(&self, sql: &str, args: &[SqlValue]) -> RepoResult<Vec<D>> {
        let entities = self.fetch_entities(sql, args).await?;
        Ok(map_entities::<D, E>(&entities)?)
    }

    /// Every matching row, ordered by `sort`. `total` is the item count.
    pub async fn execute_no_paging(&self, sort: &str) -> RepoResult<Page<D>> {
        self.ensure_connected()?;
        let args = self.builder.condition().args();
        let sql = render_checked(&self.select_sql(sort, None), 1, args.len())?;
        let items = self.fetch_mapped(&sql, args).await?;
        Ok(Page::from_items(items))
    }

    /// One page of matching rows plus the total number of matches.
    ///
    /// `limit < 1` means 100 and `page < 1` means 1.
    pub async fn execute_with_paging(&self, sort: &str, limit: i64, page: i64) -> RepoResult<Page<D>> {
        self.ensure_connected()?;
        let paging = PagingSpec::new(limit, page);
        let args = self.builder.condition().args();

        let count_sql = render_checked(&self.count_sql(), 1, args.len())?;
        let total = self.fetch_count(&count_sql, args).await?;

        let result = match render_checked(&self.select_sql(sort, Some(paging)), 1, args.len()) {
            Ok(sql) => self.fetch_mapped(&sql, args).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(items) => Ok(Page::new(items, total)),
            Err(e) => Err(RepoError::partial_page(total, e)),
        }
    }

    /// Run a literal SELECT written with `?` placeholders.
    ///
    /// Conditions and joins on this query are ignored; preloads still run.
    pub async fn execute_custom_query(&self, sql: &str, args: &[SqlValue]) -> RepoResult<Page<D>> {
        self.ensure_connected()?;
        let sql = render_checked(trim_statement(sql), 1, args.len())?;
        validate_select(&sql, true)?;
        let items = self.fetch_mapped(&sql, args).await?;
        Ok(Page::from_items(items))
    }

    /// Page through a literal SELECT.
    ///
    /// The query is counted as a subquery and a `LIMIT/OFFSET` clause is
    /// appended, so it must not carry its own.
    pub async fn execute_custom_query_with_paging(
        &self,
        sql: &str,
        limit: i64,
        page: i64,
        args: &[SqlValue],
    ) -> RepoResult<Page<D>> {
        self.ensure_connected()?;
        let paging = PagingSpec::new(limit, page);
        let sql = render_checked(trim_statement(sql), 1, args.len())?;
        validate_select(&sql, false)?;

        let count_sql = format!("SELECT COUNT(*) FROM ({}) AS count_query", sql);
        let total = self.fetch_count(&count_sql, args).await?;

        let page_sql = format!("{} {}", sql, paging.to_sql());
        match self.fetch_mapped(&page_sql, args).await {
            Ok(items) => Ok(Page::new(items, total)),
            Err(e) => Err(RepoError::partial_page(total, e)),
        }
    }
}

fn trim_statement(sql: &str) -> &str {
    sql.trim().trim_end_matches(';').trim_end()
}
