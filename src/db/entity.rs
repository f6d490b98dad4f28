//! Storage-side record description.
//!
//! An [`Entity`] names its table and storage columns and knows how to turn
//! itself into column/value pairs for INSERT and UPDATE. Rows come back
//! through `sqlx::FromRow`.

use crate::db::params::SqlValue;
use crate::db::registry::SchemaHandle;
use crate::error::{RepoError, RepoResult};
use sqlx::FromRow;
use sqlx::postgres::PgRow;
use std::future::Future;

/// A persisted record in one table of a schema.
///
/// ```ignore
/// #[derive(Debug, Default, Clone, sqlx::FromRow)]
/// struct UserEntity {
///     id: Uuid,
///     name: String,
///     created_at: DateTime<Utc>,
///     deleted_at: Option<DateTime<Utc>>,
/// }
///
/// impl Entity for UserEntity {
///     type Id = Uuid;
///     const TABLE: &'static str = "user";
///     const SOFT_DELETE_COLUMN: Option<&'static str> = Some("deleted_at");
///
///     fn id(&self) -> Uuid { self.id }
///     fn insert_values(&self) -> Vec<(&'static str, SqlValue)> {
///         vec![("name", self.name.clone().into())]
///     }
/// }
/// ```
pub trait Entity: for<'r> FromRow<'r, PgRow> + Default + Send + Sync + Unpin + 'static {
    type Id: Clone + Send + Sync + Into<SqlValue>;

    /// Table name, unqualified and singular.
    const TABLE: &'static str;

    const ID_COLUMN: &'static str = "id";

    /// Column used by the default sort and the delete-all filter.
    const CREATED_AT_COLUMN: &'static str = "created_at";

    /// Nullable timestamp column marking logically deleted rows. `None`
    /// means deletes are physical.
    const SOFT_DELETE_COLUMN: Option<&'static str> = None;

    /// Column set to `now()` on every update, if the table has one.
    const UPDATED_AT_COLUMN: Option<&'static str> = None;

    fn id(&self) -> Self::Id;

    /// Columns written on INSERT. Leave out columns the store fills in.
    fn insert_values(&self) -> Vec<(&'static str, SqlValue)>;

    /// Columns written on UPDATE.
    fn update_values(&self) -> Vec<(&'static str, SqlValue)> {
        self.insert_values()
    }

    /// Eager-load `relation` onto already fetched rows.
    ///
    /// The default knows no relations.
    fn preload(
        relation: &str,
        items: &mut [Self],
        handle: &SchemaHandle,
    ) -> impl Future<Output = RepoResult<()>> + Send {
        let _ = (items, handle);
        let message = format!(
            "unknown preload relation '{}' for table {}",
            relation,
            Self::TABLE
        );
        async move { Err(RepoError::query(message)) }
    }
}

/// Idempotent DDL applied to a schema by
/// [`ConnectionRegistry::migrate`](crate::db::ConnectionRegistry::migrate).
pub trait Migration: Send + Sync {
    fn name(&self) -> &str;

    /// Statements to run, in order, for `schema`. Each must be safe to run
    /// more than once (`CREATE TABLE IF NOT EXISTS`, ...).
    fn statements(&self, schema: &str) -> Vec<String>;
}
