//! Offset pagination types for list operations.

use serde::{Deserialize, Serialize};

/// A request for a window of results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// Number of items to skip.
    pub offset: usize,
    /// Maximum number of items to return.
    pub limit: usize,
}

impl PageRequest {
    /// The default page size.
    pub const DEFAULT_LIMIT: usize = 20;
    /// The maximum allowed page size.
    pub const MAX_LIMIT: usize = 1000;

    /// Creates a new page request, clamping the limit.
    #[must_use]
    pub fn new(offset: usize, limit: usize) -> Self {
        Self {
            offset,
            limit: limit.min(Self::MAX_LIMIT),
        }
    }

    /// Creates a request for the first page.
    #[must_use]
    pub fn first(limit: usize) -> Self {
        Self::new(0, limit)
    }

    /// Returns the request for the page following this one.
    #[must_use]
    pub const fn next(&self) -> Self {
        Self {
            offset: self.offset + self.limit,
            limit: self.limit,
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::first(Self::DEFAULT_LIMIT)
    }
}

/// A page of results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    /// The items on this page.
    pub content: Vec<T>,
    /// The total number of items across all pages.
    pub total: u64,
    /// The request that produced this page.
    pub request: PageRequest,
}

impl<T> Page<T> {
    /// Creates a new page.
    #[must_use]
    pub fn new(content: Vec<T>, request: PageRequest, total: u64) -> Self {
        Self {
            content,
            total,
            request,
        }
    }

    /// Creates an empty page.
    #[must_use]
    pub fn empty(request: PageRequest) -> Self {
        Self::new(Vec::new(), request, 0)
    }

    /// Returns true if there are items beyond this page.
    #[must_use]
    pub fn has_next(&self) -> bool {
        !self.content.is_empty() && ((self.request.offset + self.content.len()) as u64) < self.total
    }

    /// Returns true if the page is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Returns the number of items on this page.
    #[must_use]
    pub fn len(&self) -> usize {
        self.content.len()
    }
}

impl<T> IntoIterator for Page<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.content.into_iter()
    }
}
