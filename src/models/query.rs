//! Query-related data models.
//!
//! This module defines paging, sorting and result types.

use crate::db::quote_ident;
use serde::{Deserialize, Serialize};

/// Rows per page when the caller passes a limit below 1.
pub const DEFAULT_PAGE_LIMIT: i64 = 100;

/// Page used when the caller passes a page below 1.
pub const DEFAULT_PAGE: i64 = 1;

/// Column used for the default sort.
pub const DEFAULT_CREATED_AT_COLUMN: &str = "created_at";

/// Normalized page window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagingSpec {
    pub limit: i64,
    pub page: i64,
}

impl PagingSpec {
    /// Normalize caller-supplied values: `limit < 1` becomes 100, `page < 1` becomes 1.
    pub fn new(limit: i64, page: i64) -> Self {
        Self {
            limit: if limit < 1 { DEFAULT_PAGE_LIMIT } else { limit },
            page: if page < 1 { DEFAULT_PAGE } else { page },
        }
    }

    pub fn offset(&self) -> i64 {
        self.limit.saturating_mul(self.page - 1)
    }

    /// `LIMIT n OFFSET m` clause for this window.
    pub fn to_sql(&self) -> String {
        format!("LIMIT {} OFFSET {}", self.limit, self.offset())
    }
}

impl Default for PagingSpec {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_LIMIT, DEFAULT_PAGE)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// Sort order resolved from a `-field` / `+field` string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    pub direction: SortDirection,
}

impl SortSpec {
    /// Parse a sort string, defaulting to `created_at` descending.
    pub fn parse(sort: &str) -> Self {
        Self::parse_or(sort, DEFAULT_CREATED_AT_COLUMN)
    }

    /// Parse a sort string. `-field` sorts descending and `+field` ascending;
    /// anything else, including a bare field name, falls back to
    /// `default_column` descending.
    pub fn parse_or(sort: &str, default_column: &str) -> Self {
        let (field, direction) = if let Some(field) = sort.strip_prefix('-') {
            (field, SortDirection::Desc)
        } else if let Some(field) = sort.strip_prefix('+') {
            (field, SortDirection::Asc)
        } else {
            (default_column, SortDirection::Desc)
        };

        if field.is_empty() {
            return Self {
                field: default_column.to_string(),
                direction: SortDirection::Desc,
            };
        }

        Self {
            field: field.to_string(),
            direction,
        }
    }

    /// `"field" asc|desc`
    pub fn to_sql(&self) -> String {
        format!("{} {}", quote_ident(&self.field), self.direction.as_sql())
    }
}

impl Default for SortSpec {
    fn default() -> Self {
        Self::parse("")
    }
}

/// Mapped rows plus the number of rows matching the filter.
///
/// For paged queries `total` counts every matching row, not just this page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<D> {
    pub items: Vec<D>,
    pub total: i64,
}

impl<D> Page<D> {
    pub fn new(items: Vec<D>, total: i64) -> Self {
        Self { items, total }
    }

    /// Page whose total is its own length.
    pub fn from_items(items: Vec<D>) -> Self {
        let total = items.len() as i64;
        Self { items, total }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of pages needed for `total` rows at `limit` rows per page.
    pub fn page_count(&self, limit: i64) -> i64 {
        let limit = PagingSpec::new(limit, DEFAULT_PAGE).limit;
        (self.total + limit - 1) / limit
    }
}
