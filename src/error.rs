//! Error types for the repository layer.
//!
//! All fallible operations return [`RepoResult`]. Errors are reported once and
//! propagated to the caller; nothing in this crate retries.

use crate::mapper::MappingError;
use crate::validate::ValidationError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RepoError {
    #[error("configuration error: {message}")]
    Config { message: String },

    #[error("schema {schema} not connected")]
    UnknownSchema { schema: String },

    #[error("not connected")]
    NotConnected,

    #[error("connection failed for schema {schema}: {source}")]
    Connection {
        schema: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("mapping failed: {0}")]
    Mapping(#[from] MappingError),

    #[error("query failed: {message}")]
    Query {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
    },

    #[error("record not found in {table}")]
    NotFound { table: String },

    /// The count step of a paged query succeeded but the page itself failed.
    #[error("page fetch failed after counting {total} rows: {source}")]
    PartialPage {
        total: i64,
        #[source]
        source: Box<RepoError>,
    },
}

impl RepoError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an unknown schema error.
    pub fn unknown_schema(schema: impl Into<String>) -> Self {
        Self::UnknownSchema {
            schema: schema.into(),
        }
    }

    /// Wrap a driver error with the schema it happened on.
    pub fn connection(schema: impl Into<String>, source: sqlx::Error) -> Self {
        Self::Connection {
            schema: schema.into(),
            source,
        }
    }

    /// Create a query error without SQL state.
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
            sql_state: None,
        }
    }

    /// Create a not found error.
    pub fn not_found(table: impl Into<String>) -> Self {
        Self::NotFound {
            table: table.into(),
        }
    }

    /// Attach a successful page count to a later failure.
    pub fn partial_page(total: i64, source: RepoError) -> Self {
        Self::PartialPage {
            total,
            source: Box::new(source),
        }
    }

    /// Check if this error means the requested row does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::PartialPage { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// Check if this error is retryable by the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::NotConnected)
    }

    /// Total row count reported before a paged fetch failed, if any.
    pub fn partial_total(&self) -> Option<i64> {
        match self {
            Self::PartialPage { total, .. } => Some(*total),
            _ => None,
        }
    }

    /// SQLSTATE code reported by the server, if any.
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            Self::Query { sql_state, .. } => sql_state.as_deref(),
            Self::PartialPage { source, .. } => source.sql_state(),
            _ => None,
        }
    }
}

/// Convert sqlx errors raised while executing statements.
///
/// Connection-establishment failures are wrapped with their schema through
/// [`RepoError::connection`] instead.
impl From<sqlx::Error> for RepoError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepoError::not_found("result set"),
            sqlx::Error::Database(db_err) => RepoError::Query {
                message: db_err.message().to_string(),
                sql_state: db_err.code().map(|c| c.to_string()),
            },
            sqlx::Error::PoolTimedOut => RepoError::query("timed out acquiring a pooled connection"),
            sqlx::Error::PoolClosed => RepoError::NotConnected,
            sqlx::Error::ColumnNotFound(col) => {
                RepoError::query(format!("column not found: {}", col))
            }
            sqlx::Error::ColumnDecode { index, source } => {
                RepoError::query(format!("failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => RepoError::query(format!("decode error: {}", source)),
            sqlx::Error::Encode(source) => RepoError::query(format!("encode error: {}", source)),
            other => RepoError::query(other.to_string()),
        }
    }
}

/// Result type alias for repository operations.
pub type RepoResult<T> = Result<T, RepoError>;
