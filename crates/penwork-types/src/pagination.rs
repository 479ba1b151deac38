//! Offset pagination for post listings.

use serde::Deserialize;

/// Posts shown per page on the public listing.
pub const POSTS_PER_PAGE: u32 = 3;

/// The `?page=` query parameter.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
}

impl PageQuery {
    pub fn request(&self, per_page: u32) -> PageRequest {
        PageRequest::new(self.page.unwrap_or(1), per_page)
    }
}

/// A 1-based page number together with its page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    per_page: u32,
}

impl PageRequest {
    /// Page numbers below 1 are clamped to 1; a zero page size becomes 1.
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.max(1),
        }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn per_page(&self) -> u32 {
        self.per_page
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.per_page)
    }

    pub fn limit(&self) -> u64 {
        u64::from(self.per_page)
    }
}

/// One page of results plus what a template needs for navigation.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: u64, request: PageRequest) -> Self {
        Self {
            items,
            total,
            page: request.page(),
            per_page: request.per_page(),
        }
    }

    /// Number of pages needed for `total` items; at least 1 so an empty listing still renders.
    pub fn page_count(&self) -> u32 {
        let per_page = u64::from(self.per_page.max(1));
        let pages = self.total.div_ceil(per_page).max(1);
        u32::try_from(pages).unwrap_or(u32::MAX)
    }

    pub fn previous_page(&self) -> Option<u32> {
        (self.page > 1).then(|| self.page - 1)
    }

    pub fn next_page(&self) -> Option<u32> {
        (self.page < self.page_count()).then(|| self.page + 1)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_or_zero_page_means_first() {
        assert_eq!(PageQuery { page: None }.request(3).page(), 1);
        assert_eq!(PageQuery { page: Some(0) }.request(3).page(), 1);
        assert_eq!(PageQuery { page: Some(4) }.request(3).page(), 4);
    }

    #[test]
    fn offsets_follow_page_size() {
        let req = PageRequest::new(1, 3);
        assert_eq!((req.offset(), req.limit()), (0, 3));
        let req = PageRequest::new(3, 3);
        assert_eq!((req.offset(), req.limit()), (6, 3));
        let req = PageRequest::new(u32::MAX, 3);
        assert_eq!(req.offset(), u64::from(u32::MAX - 1) * 3);
    }

    #[test]
    fn navigation_metadata() {
        let page = Page::new(vec![1, 2, 3], 7, PageRequest::new(2, 3));
        assert_eq!(page.page_count(), 3);
        assert_eq!(page.previous_page(), Some(1));
        assert_eq!(page.next_page(), Some(3));

        let last = Page::new(vec![7], 7, PageRequest::new(3, 3));
        assert_eq!(last.next_page(), None);

        let empty: Page<i32> = Page::new(vec![], 0, PageRequest::new(1, 3));
        assert_eq!(empty.page_count(), 1);
        assert_eq!(empty.previous_page(), None);
        assert_eq!(empty.next_page(), None);
        assert!(empty.is_empty());
    }

    #[test]
    fn out_of_range_page_has_no_next() {
        let page: Page<i32> = Page::new(vec![], 4, PageRequest::new(9, 3));
        assert_eq!(page.next_page(), None);
        assert_eq!(page.previous_page(), Some(8));
    }
}
