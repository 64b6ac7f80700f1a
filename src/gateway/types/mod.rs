//! Shared gateway wire types.

mod response;

pub use response::{ApiError, ApiResponse, ApiResult, error_codes, ok, sse_codes};

use serde::Deserialize;
use utoipa::IntoParams;

/// Standard `pageNum` / `pageSize` paging query.
#[derive(Debug, Clone, Copy, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    #[serde(default = "default_page_num")]
    pub page_num: i64,
    #[serde(default = "default_page_size")]
    pub page_size: i64,
}

impl PageQuery {
    /// Clamp to sane bounds and compute the OFFSET.
    pub fn normalized(self) -> (i64, i64, i64) {
        let page = self.page_num.max(1);
        let size = self.page_size.clamp(1, 100);
        (page, size, (page - 1) * size)
    }
}

fn default_page_num() -> i64 {
    1
}

fn default_page_size() -> i64 {
    20
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_query_normalizes_out_of_range() {
        let (page, size, offset) = PageQuery {
            page_num: 0,
            page_size: 1000,
        }
        .normalized();
        assert_eq!((page, size, offset), (1, 100, 0));

        let (page, size, offset) = PageQuery {
            page_num: 3,
            page_size: 10,
        }
        .normalized();
        assert_eq!((page, size, offset), (3, 10, 20));
    }
}
