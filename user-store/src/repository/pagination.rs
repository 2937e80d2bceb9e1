//! Pagination types
//!
//! # Example
//!
//! ```rust
//! use user_store::repository::Pagination;
//!
//! let third = Pagination::page(3, 20);
//! assert_eq!(third.offset, 40);
//! assert_eq!(third.limit, 20);
//! ```

use serde::{Deserialize, Serialize};

/// Offset/limit window over a result set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// Number of results to skip
    pub offset: u64,
    /// Maximum number of results; `0` means unlimited
    pub limit: u64,
}

impl Pagination {
    /// Explicit offset and limit
    #[must_use]
    pub const fn new(offset: u64, limit: u64) -> Self {
        Self { offset, limit }
    }

    /// Window for a 1-based page number; page `0` is treated as page `1`
    #[must_use]
    pub const fn page(page_number: u64, page_size: u64) -> Self {
        let page_number = if page_number == 0 { 1 } else { page_number };
        Self {
            offset: (page_number - 1).saturating_mul(page_size),
            limit: page_size,
        }
    }

    /// Whether a limit is applied
    pub const fn is_limited(&self) -> bool {
        self.limit > 0
    }

    /// Pages needed for `total` rows
    ///
    /// Unlimited windows hold everything on a single page.
    pub const fn total_pages(&self, total: u64) -> u64 {
        if total == 0 {
            0
        } else if self.limit == 0 {
            1
        } else {
            total.div_ceil(self.limit)
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 20,
        }
    }
}

/// One page of results with totals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaginationResult<T> {
    /// Items on this page
    pub items: Vec<T>,
    /// Rows matching the filter across all pages
    pub total: u64,
    /// Pages needed for `total` rows at this limit
    pub total_pages: u64,
    /// 1-based page number
    pub page: u64,
    /// Page size
    pub limit: u64,
}

impl<T> PaginationResult<T> {
    /// Whether a later page exists
    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_offsets() {
        assert_eq!(Pagination::page(1, 10), Pagination::new(0, 10));
        assert_eq!(Pagination::page(2, 10), Pagination::new(10, 10));
        assert_eq!(Pagination::page(0, 10), Pagination::new(0, 10));
    }

    #[test]
    fn test_total_pages() {
        let window = Pagination::page(1, 10);
        assert_eq!(window.total_pages(25), 3);
        assert_eq!(window.total_pages(20), 2);
        assert_eq!(window.total_pages(1), 1);
        assert_eq!(window.total_pages(0), 0);
    }

    #[test]
    fn test_unlimited_is_one_page() {
        let window = Pagination::new(0, 0);
        assert!(!window.is_limited());
        assert_eq!(window.total_pages(25), 1);
        assert_eq!(window.total_pages(0), 0);
    }

    #[test]
    fn test_has_next() {
        let result = PaginationResult::<u8> {
            items: vec![],
            total: 25,
            total_pages: 3,
            page: 2,
            limit: 10,
        };
        assert!(result.has_next());
    }
}
