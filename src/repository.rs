//! CRUD operations per entity type.
//!
//! [`Repository<D, E>`] stores and loads `E` rows and speaks `D` to its
//! callers. Every call resolves its schema through the registry (`""` for
//! the default) and fails with [`RepoError::NotConnected`] while the
//! registry is down. Soft-deleted rows are invisible to every read.

use crate::db::{ConnectionRegistry, Entity, Query, SchemaHandle, SqlValue, quote_ident, to_arguments};
use crate::db::sql::render_checked;
use crate::error::{RepoError, RepoResult};
use crate::mapper::{EntityMapper, entity_from_dto, map_entities};
use crate::models::{Page, SortSpec};
use crate::validate::Validate;
use chrono::{DateTime, TimeZone, Utc};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, info};

/// Rows created after this instant are targeted by [`Repository::delete_all`].
fn delete_all_cutoff() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

pub struct Repository<D, E> {
    registry: Arc<ConnectionRegistry>,
    _marker: PhantomData<fn() -> (D, E)>,
}

impl<D, E> Clone for Repository<D, E> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            _marker: PhantomData,
        }
    }
}

impl<D, E> Repository<D, E>
where
    D: EntityMapper<E>,
    E: Entity,
{
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            _marker: PhantomData,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Start a filtered query on `schema`.
    pub async fn query(&self, schema: &str) -> RepoResult<Query<D, E>> {
        self.registry.try_query(schema).await
    }

    /// Validate `dto`, insert it, and return the stored row with
    /// store-generated fields filled in.
    pub async fn create(&self, schema: &str, dto: &D) -> RepoResult<D>
    where
        D: Validate,
    {
        let handle = self.handle(schema).await?;
        dto.validate()?;

        let entity: E = entity_from_dto(dto)?;
        let values = entity.insert_values();
        let sql = insert_sql(&handle.table(E::TABLE), &values);
        let args: Vec<SqlValue> = values.into_iter().map(|(_, v)| v).collect();

        let stored = fetch_optional::<E>(&handle, &sql, &args)
            .await?
            .ok_or_else(|| RepoError::not_found(E::TABLE))?;
        Ok(D::from_entity(&stored)?)
    }

    pub async fn read_by_id(&self, schema: &str, id: E::Id) -> RepoResult<D> {
        let handle = self.handle(schema).await?;
        let entity = self.fetch_by_id(&handle, id).await?;
        Ok(D::from_entity(&entity)?)
    }

    /// Rows whose id is in `ids`, ordered by `sort`. Missing ids are skipped.
    pub async fn read_many_by_id(
        &self,
        schema: &str,
        ids: &[E::Id],
        sort: &str,
    ) -> RepoResult<Page<D>> {
        let handle = self.handle(schema).await?;
        if ids.is_empty() {
            return Ok(Page::from_items(Vec::new()));
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let filter = format!("{} IN ({})", quote_ident(E::ID_COLUMN), placeholders);
        let sql = format!("{} ORDER BY {}", select_sql::<E>(&handle, Some(&filter)), sort_sql::<E>(sort));
        let args: Vec<SqlValue> = ids.iter().cloned().map(Into::into).collect();

        let entities = fetch_all::<E>(&handle, &sql, &args).await?;
        Ok(Page::from_items(map_entities::<D, E>(&entities)?))
    }

    pub async fn read_all(&self, schema: &str, sort: &str) -> RepoResult<Page<D>> {
        let handle = self.handle(schema).await?;
        let sql = format!("{} ORDER BY {}", select_sql::<E>(&handle, None), sort_sql::<E>(sort));
        let entities = fetch_all::<E>(&handle, &sql, &[]).await?;
        Ok(Page::from_items(map_entities::<D, E>(&entities)?))
    }

    /// First row, by id, matching a WHERE fragment written with `?`
    /// placeholders, e.g. `"email" = ?`.
    pub async fn read_with_filter(&self, schema: &str, filter: &str, args: &[SqlValue]) -> RepoResult<D> {
        let handle = self.handle(schema).await?;
        let sql = format!(
            "{} ORDER BY {} LIMIT 1",
            select_sql::<E>(&handle, Some(filter)),
            quote_ident(E::ID_COLUMN)
        );
        let entity = fetch_optional::<E>(&handle, &sql, args)
            .await?
            .ok_or_else(|| RepoError::not_found(E::TABLE))?;
        Ok(D::from_entity(&entity)?)
    }

    /// Merge `dto` onto the stored row and persist it.
    ///
    /// Fields the DTO leaves unset keep their stored values.
    pub async fn update(&self, schema: &str, id: E::Id, dto: &D) -> RepoResult<D> {
        let handle = self.handle(schema).await?;
        let mut entity = self.fetch_by_id(&handle, id.clone()).await?;
        dto.merge_into(&mut entity)?;

        let values = entity.update_values();
        let assignments: Vec<String> = values
            .iter()
            .map(|(column, _)| format!("{} = ?", quote_ident(column)))
            .collect();
        let sql = format!(
            "{} RETURNING *",
            update_sql::<E>(&handle, &assignments, &id_filter::<E>())
        );
        let mut args: Vec<SqlValue> = values.into_iter().map(|(_, v)| v).collect();
        args.push(id.into());

        let stored = fetch_optional::<E>(&handle, &sql, &args)
            .await?
            .ok_or_else(|| RepoError::not_found(E::TABLE))?;
        Ok(D::from_entity(&stored)?)
    }

    /// Soft-delete when `E` has a soft-delete column, otherwise remove the row.
    pub async fn delete_by_id(&self, schema: &str, id: E::Id) -> RepoResult<()> {
        let handle = self.handle(schema).await?;
        let filter = id_filter::<E>();
        let sql = match E::SOFT_DELETE_COLUMN {
            Some(column) => update_sql::<E>(
                &handle,
                &[format!("{} = now()", quote_ident(column))],
                &filter,
            ),
            None => format!("DELETE FROM {} WHERE {}", handle.table(E::TABLE), filter),
        };

        let affected = execute(&handle, &sql, &[id.into()]).await?;
        if affected == 0 {
            return Err(RepoError::not_found(E::TABLE));
        }
        Ok(())
    }

    /// Delete every row. With `soft` and a soft-delete column the rows are
    /// marked deleted; otherwise they are physically removed, including
    /// rows already soft-deleted. Returns the number of rows affected.
    pub async fn delete_all(&self, schema: &str, soft: bool) -> RepoResult<u64> {
        let handle = self.handle(schema).await?;
        let cutoff = format!("{} > ?", quote_ident(E::CREATED_AT_COLUMN));
        let sql = match E::SOFT_DELETE_COLUMN {
            Some(column) if soft => update_sql::<E>(
                &handle,
                &[format!("{} = now()", quote_ident(column))],
                &cutoff,
            ),
            _ => format!("DELETE FROM {} WHERE {}", handle.table(E::TABLE), cutoff),
        };

        let affected = execute(&handle, &sql, &[delete_all_cutoff().into()]).await?;
        info!(
            schema = %handle.name(),
            table = E::TABLE,
            soft,
            rows = affected,
            "Deleted all rows"
        );
        Ok(affected)
    }

    pub async fn check_exists_by_id(&self, schema: &str, id: E::Id) -> RepoResult<bool> {
        let handle = self.handle(schema).await?;
        self.exists(&handle, id).await
    }

    /// Set one column on an existing row.
    pub async fn update_single_column(
        &self,
        schema: &str,
        id: E::Id,
        column: &str,
        value: impl Into<SqlValue>,
    ) -> RepoResult<()> {
        let handle = self.handle(schema).await?;
        if column.is_empty() {
            return Err(RepoError::query("column name cannot be empty"));
        }
        if !self.exists(&handle, id.clone()).await? {
            return Err(RepoError::not_found(E::TABLE));
        }

        let sql = update_sql::<E>(
            &handle,
            &[format!("{} = ?", quote_ident(column))],
            &id_filter::<E>(),
        );
        let affected = execute(&handle, &sql, &[value.into(), id.into()]).await?;
        if affected == 0 {
            return Err(RepoError::not_found(E::TABLE));
        }
        Ok(())
    }

    async fn handle(&self, schema: &str) -> RepoResult<SchemaHandle> {
        if !self.registry.is_connected() {
            return Err(RepoError::NotConnected);
        }
        self.registry.handle(schema).await
    }

    async fn fetch_by_id(&self, handle: &SchemaHandle, id: E::Id) -> RepoResult<E> {
        let sql = format!("{} LIMIT 1", select_sql::<E>(handle, Some(&id_filter::<E>())));
        fetch_optional::<E>(handle, &sql, &[id.into()])
            .await?
            .ok_or_else(|| RepoError::not_found(E::TABLE))
    }

    async fn exists(&self, handle: &SchemaHandle, id: E::Id) -> RepoResult<bool> {
        let sql = format!(
            "SELECT COUNT(*) > 0 FROM {} WHERE {}",
            handle.table(E::TABLE),
            visible_filter::<E>(Some(&id_filter::<E>()))
        );
        let sql = render_checked(&sql, 1, 1)?;
        debug!(schema = %handle.name(), sql = %sql, params = 1, "Executing exists check");
        let exists = sqlx::query_scalar_with::<_, bool, _>(&sql, to_arguments(&[id.into()])?)
            .fetch_one(handle.pool())
            .await?;
        Ok(exists)
    }
}

fn id_filter<E: Entity>() -> String {
    format!("{} = ?", quote_ident(E::ID_COLUMN))
}

/// `filter` combined with the soft-delete exclusion, or `TRUE` when both are absent.
fn visible_filter<E: Entity>(filter: Option<&str>) -> String {
    let mut parts = Vec::with_capacity(2);
    if let Some(filter) = filter.filter(|f| !f.trim().is_empty()) {
        parts.push(format!("({})", filter));
    }
    if let Some(column) = E::SOFT_DELETE_COLUMN {
        parts.push(format!("{} IS NULL", quote_ident(column)));
    }
    if parts.is_empty() {
        "TRUE".to_string()
    } else {
        parts.join(" AND ")
    }
}

fn select_sql<E: Entity>(handle: &SchemaHandle, filter: Option<&str>) -> String {
    format!(
        "SELECT * FROM {} WHERE {}",
        handle.table(E::TABLE),
        visible_filter::<E>(filter)
    )
}

fn sort_sql<E: Entity>(sort: &str) -> String {
    SortSpec::parse_or(sort, E::CREATED_AT_COLUMN).to_sql()
}

/// `UPDATE <table> SET <assignments>[, updated_at = now()] WHERE <filter>`,
/// never touching soft-deleted rows.
fn update_sql<E: Entity>(handle: &SchemaHandle, assignments: &[String], filter: &str) -> String {
    let mut sets: Vec<String> = assignments.to_vec();
    if let Some(column) = E::UPDATED_AT_COLUMN {
        let prefix = format!("{} ", quote_ident(column));
        if !sets.iter().any(|s| s.starts_with(&prefix)) {
            sets.push(format!("{}= now()", prefix));
        }
    }
    format!(
        "UPDATE {} SET {} WHERE {}",
        handle.table(E::TABLE),
        sets.join(", "),
        visible_filter::<E>(Some(filter))
    )
}

fn insert_sql(table: &str, values: &[(&'static str, SqlValue)]) -> String {
    if values.is_empty() {
        return format!("INSERT INTO {} DEFAULT VALUES RETURNING *", table);
    }
    let columns: Vec<String> = values.iter().map(|(c, _)| quote_ident(c)).collect();
    let placeholders = vec!["?"; values.len()].join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({}) RETURNING *",
        table,
        columns.join(", "),
        placeholders
    )
}

async fn fetch_optional<E: Entity>(
    handle: &SchemaHandle,
    sql: &str,
    args: &[SqlValue],
) -> RepoResult<Option<E>> {
    let sql = render_checked(sql, 1, args.len())?;
    debug!(schema = %handle.name(), sql = %sql, params = args.len(), "Executing statement");
    let row = sqlx::query_as_with::<_, E, _>(&sql, to_arguments(args)?)
        .fetch_optional(handle.pool())
        .await?;
    Ok(row)
}

async fn fetch_all<E: Entity>(handle: &SchemaHandle, sql: &str, args: &[SqlValue]) -> RepoResult<Vec<E>> {
    let sql = render_checked(sql, 1, args.len())?;
    debug!(schema = %handle.name(), sql = %sql, params = args.len(), "Executing query");
    let rows = sqlx::query_as_with::<_, E, _>(&sql, to_arguments(args)?)
        .fetch_all(handle.pool())
        .await?;
    Ok(rows)
}

async fn execute(handle: &SchemaHandle, sql: &str, args: &[SqlValue]) -> RepoResult<u64> {
    let sql = render_checked(sql, 1, args.len())?;
    debug!(schema = %handle.name(), sql = %sql, params = args.len(), "Executing write");
    let result = sqlx::query_with(&sql, to_arguments(args)?)
        .execute(handle.pool())
        .await?;
    Ok(result.rows_affected())
}
