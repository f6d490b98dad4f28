//! Database layer.
//!
//! - Schema connection registry
//! - Condition building and query execution
//! - Entity and migration traits
//! - Parameter binding and SQL text helpers

pub mod condition;
pub mod entity;
pub mod executor;
pub mod params;
pub mod registry;
pub mod sql;

pub use condition::{ConditionBuilder, ConditionExpression, JoinLogic, JoinType, Operator};
pub use entity::{Entity, Migration};
pub use executor::Query;
pub use params::{HasSqlType, SqlType, SqlValue, to_arguments};
pub use registry::{ConnectionRegistry, SchemaHandle};
pub use sql::{qualified_table, quote_column, quote_ident, quote_literal};
