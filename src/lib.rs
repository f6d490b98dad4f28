//! Schema Repo Library
//!
//! A data-access layer over one PostgreSQL database split into several
//! schemas: a connection registry, a parameterized condition builder,
//! paged query execution, DTO/entity mapping and CRUD operations.

pub mod config;
pub mod db;
pub mod error;
pub mod mapper;
pub mod models;
pub mod repository;
pub mod validate;

pub use config::{Config, DatabaseConfig, PoolOptions};
pub use db::{
    ConditionBuilder, ConnectionRegistry, Entity, JoinLogic, JoinType, Migration, Operator, Query,
    SchemaHandle, SqlType, SqlValue,
};
pub use error::{RepoError, RepoResult};
pub use mapper::{EntityMapper, MappingError};
pub use models::{ConnectionStats, Page, PagingSpec, SortSpec};
pub use repository::Repository;
pub use validate::{Validate, ValidationError};
