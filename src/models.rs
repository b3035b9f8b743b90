use serde::{Deserialize, Deserializer, Serialize};
use validator::Validate;

/// Pagination query shared by list operations.
#[derive(Debug, Clone, Copy, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    /// Page number (1-1000000)
    #[validate(range(min = 1, max = 1_000_000, message = "Page must be between 1 and 1000000"))]
    #[serde(default = "default_page")]
    pub page: i64,

    /// Maximum results (1-100)
    #[validate(range(min = 1, max = 100))]
    #[serde(default = "default_limit")]
    pub limit: i64,
}

impl PageQuery {
    pub fn offset(&self) -> i64 {
        (self.page.max(1) - 1).saturating_mul(self.limit)
    }
}

impl Default for PageQuery {
    fn default() -> Self {
        Self {
            page: default_page(),
            limit: default_limit(),
        }
    }
}

pub fn default_page() -> i64 {
    1
}

pub fn default_limit() -> i64 {
    50
}

/// Paginated response wrapper
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub data: Vec<T>,
    /// Total count matching filters
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

/// Deserializes a PATCH field so that an explicit `null` becomes `Some(None)`
/// while a missing key stays `None` (pair with `#[serde(default)]`).
pub fn deserialize_present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
