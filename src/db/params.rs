//! Parameter values and binding.
//!
//! [`SqlValue`] is the closed set of values a condition or statement can
//! carry. Values are encoded into [`PgArguments`] in order, matching the
//! rendered `$n` placeholders.
//!
//! A null still carries a [`SqlType`]. PostgreSQL types every parameter, and
//! a `text` null cannot be assigned to a `uuid` or `timestamptz` column.

use crate::error::{RepoError, RepoResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as JsonValue;
use sqlx::Arguments;
use sqlx::postgres::PgArguments;
use sqlx::types::Json;
use std::fmt;
use uuid::Uuid;

/// Parameter type of a [`SqlValue`], kept for nulls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlType {
    Bool,
    Int,
    Float,
    Uuid,
    Timestamp,
    Text,
    Json,
}

/// Rust types with a fixed parameter type. `Option<T>` uses it to produce a
/// typed null for `None`.
pub trait HasSqlType {
    const SQL_TYPE: SqlType;
}

macro_rules! impl_has_sql_type {
    ($($t:ty => $kind:ident),* $(,)?) => {
        $(impl HasSqlType for $t {
            const SQL_TYPE: SqlType = SqlType::$kind;
        })*
    };
}

impl_has_sql_type!(
    bool => Bool,
    i32 => Int,
    i64 => Int,
    f64 => Float,
    Uuid => Uuid,
    DateTime<Utc> => Timestamp,
    str => Text,
    String => Text,
    JsonValue => Json,
);

impl<T: HasSqlType + ?Sized> HasSqlType for &T {
    const SQL_TYPE: SqlType = T::SQL_TYPE;
}

/// A bindable statement parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlValue {
    #[serde(serialize_with = "serialize_null", deserialize_with = "deserialize_null")]
    Null(SqlType),
    Bool(bool),
    Int(i64),
    Float(f64),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
    Text(String),
    Json(JsonValue),
}

impl SqlValue {
    /// Check if this parameter is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null(_))
    }

    /// The parameter type this value is bound with.
    pub fn sql_type(&self) -> SqlType {
        match self {
            Self::Null(kind) => *kind,
            Self::Bool(_) => SqlType::Bool,
            Self::Int(_) => SqlType::Int,
            Self::Float(_) => SqlType::Float,
            Self::Uuid(_) => SqlType::Uuid,
            Self::Timestamp(_) => SqlType::Timestamp,
            Self::Text(_) => SqlType::Text,
            Self::Json(_) => SqlType::Json,
        }
    }

    /// Get the type name of this parameter for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null(_) => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Uuid(_) => "uuid",
            Self::Timestamp(_) => "timestamp",
            Self::Text(_) => "text",
            Self::Json(_) => "json",
        }
    }

    /// Lower-cased `%value%` pattern for case-insensitive LIKE matching.
    pub fn to_like_pattern(&self) -> SqlValue {
        SqlValue::Text(format!("%{}%", self.to_string().to_lowercase()))
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null(_) => Ok(()),
            Self::Bool(v) => write!(f, "{}", v),
            Self::Int(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Uuid(v) => write!(f, "{}", v),
            Self::Timestamp(v) => write!(f, "{}", v.to_rfc3339()),
            Self::Text(v) => f.write_str(v),
            Self::Json(JsonValue::String(s)) => f.write_str(s),
            Self::Json(v) => write!(f, "{}", v),
        }
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&String> for SqlValue {
    fn from(v: &String) -> Self {
        Self::Text(v.clone())
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<Uuid> for SqlValue {
    fn from(v: Uuid) -> Self {
        Self::Uuid(v)
    }
}

impl From<&Uuid> for SqlValue {
    fn from(v: &Uuid) -> Self {
        Self::Uuid(*v)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Timestamp(v)
    }
}

impl From<JsonValue> for SqlValue {
    fn from(v: JsonValue) -> Self {
        Self::Json(v)
    }
}

impl<T: Into<SqlValue> + HasSqlType> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null(T::SQL_TYPE), Into::into)
    }
}

fn serialize_null<S: Serializer>(_: &SqlType, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_none()
}

// A bare JSON null carries no type, so it reads back as a text null.
fn deserialize_null<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SqlType, D::Error> {
    <()>::deserialize(deserializer)?;
    Ok(SqlType::Text)
}

/// Encode values into PostgreSQL arguments, in order.
pub fn to_arguments(values: &[SqlValue]) -> RepoResult<PgArguments> {
    let mut args = PgArguments::default();
    for value in values {
        add_value(&mut args, value)
            .map_err(|e| RepoError::query(format!("failed to encode {}: {}", value.type_name(), e)))?;
    }
    Ok(args)
}

fn add_value(args: &mut PgArguments, value: &SqlValue) -> Result<(), sqlx::error::BoxDynError> {
    match value {
        SqlValue::Null(kind) => match kind {
            SqlType::Bool => args.add(None::<bool>),
            SqlType::Int => args.add(None::<i64>),
            SqlType::Float => args.add(None::<f64>),
            SqlType::Uuid => args.add(None::<Uuid>),
            SqlType::Timestamp => args.add(None::<DateTime<Utc>>),
            SqlType::Text => args.add(None::<String>),
            SqlType::Json => args.add(None::<Json<JsonValue>>),
        },
        SqlValue::Bool(v) => args.add(*v),
        SqlValue::Int(v) => args.add(*v),
        SqlValue::Float(v) => args.add(*v),
        SqlValue::Uuid(v) => args.add(*v),
        SqlValue::Timestamp(v) => args.add(*v),
        SqlValue::Text(v) => args.add(v.clone()),
        SqlValue::Json(v) => args.add(Json(v.clone())),
    }
}
