//! Page/limit pagination for list endpoints.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::declare::{ApiParam, ApiProperty, ApiSchema, MethodDecl, SchemaDecl};

pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_LIMIT: u64 = 10;
pub const MAX_LIMIT: u64 = 100;

fn default_page() -> u64 {
    DEFAULT_PAGE
}

fn default_limit() -> u64 {
    DEFAULT_LIMIT
}

/// `?page=&limit=` query of list endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct PaginationQuery {
    #[serde(default = "default_page")]
    #[validate(range(min = 1, message = "page must be at least 1"))]
    pub page: u64,

    #[serde(default = "default_limit")]
    #[validate(range(min = 1, max = 100, message = "limit must be between 1 and 100"))]
    pub limit: u64,
}

impl Default for PaginationQuery {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl PaginationQuery {
    /// Number of records before the requested page.
    pub fn skip(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }

    /// Document `page` and `limit` as query parameters of `method`.
    pub fn declare_params(method: MethodDecl<'_>) -> MethodDecl<'_> {
        method
            .param(
                ApiParam::query("page")
                    .of::<u64>()
                    .description("Page number, starting at 1")
                    .minimum(1.0)
                    .example(DEFAULT_PAGE),
            )
            .param(
                ApiParam::query("limit")
                    .of::<u64>()
                    .description("Items per page")
                    .minimum(1.0)
                    .maximum(MAX_LIMIT as f64)
                    .example(DEFAULT_LIMIT),
            )
    }
}

/// Pagination metadata returned next to a page of results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationMeta {
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub total_pages: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl PaginationMeta {
    pub fn new(query: PaginationQuery, total: u64) -> Self {
        let total_pages = if query.limit == 0 {
            0
        } else {
            total.div_ceil(query.limit)
        };
        Self {
            page: query.page,
            limit: query.limit,
            total,
            total_pages,
            has_next: query.page < total_pages,
            has_prev: query.page > 1,
        }
    }
}

impl ApiSchema for PaginationMeta {
    fn schema_name() -> String {
        "PaginationMetaDto".to_string()
    }

    fn declare(schema: &mut SchemaDecl<'_>) {
        schema
            .property::<u64>("page", ApiProperty::new().description("Current page").example(1))
            .property::<u64>("limit", ApiProperty::new().description("Items per page").example(10))
            .property::<u64>("total", ApiProperty::new().description("Total number of items"))
            .property::<u64>("totalPages", ApiProperty::new().description("Total number of pages"))
            .property::<bool>("hasNext", ApiProperty::new())
            .property::<bool>("hasPrev", ApiProperty::new());
    }
}
