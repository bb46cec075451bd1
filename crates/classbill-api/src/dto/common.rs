//! Envelope and paging types shared by the billing endpoints

use classbill_core::traits::{PaginatedResponse, PaginationMeta};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Highest page an operator may ask for
pub const MAX_PAGE: i64 = 1_000_000;

/// Highest page size an operator may ask for
pub const MAX_PER_PAGE: i64 = 1000;

/// Single-object body, serialized as `{"data": ...}`
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self { data }
    }
}

/// `?page=&per_page=` on list endpoints
///
/// Both bounds are checked by `validate()` before the values reach a query.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PaginationParams {
    #[serde(default = "default_page", deserialize_with = "number_or_text")]
    #[validate(range(min = 1, max = MAX_PAGE))]
    pub page: i64,

    #[serde(default = "default_per_page", deserialize_with = "number_or_text")]
    #[validate(range(min = 1, max = MAX_PER_PAGE))]
    pub per_page: i64,
}

/// Query strings carry every value as text, JSON bodies as numbers
fn number_or_text<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(i64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}

fn default_page() -> i64 {
    1
}

fn default_per_page() -> i64 {
    50
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            page: default_page(),
            per_page: default_per_page(),
        }
    }
}

impl PaginationParams {
    /// Rows to skip; saturates instead of overflowing on unvalidated input
    pub fn offset(&self) -> i64 {
        self.page.saturating_sub(1).max(0).saturating_mul(self.per_page)
    }

    pub fn limit(&self) -> i64 {
        self.per_page
    }

    pub fn paginate<T>(&self, data: Vec<T>, total: i64) -> PaginatedResponse<T> {
        PaginatedResponse {
            data,
            pagination: PaginationMeta::new(total, self.page, self.per_page),
        }
    }
}
