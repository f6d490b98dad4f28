//! Data models shared across the repository layer.

pub mod connection;
pub mod query;

pub use connection::ConnectionStats;
pub use query::{
    DEFAULT_CREATED_AT_COLUMN, DEFAULT_PAGE, DEFAULT_PAGE_LIMIT, Page, PagingSpec, SortDirection,
    SortSpec,
};
