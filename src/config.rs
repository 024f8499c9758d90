//! # Store Configuration
//!
//! Centralizes the tunables of the layered store. Keeping the defaults in one
//! place makes the interdependencies visible: the residency bound is
//! `page_size * max_pages` bytes, and the strict size limit (when set) caps
//! every read and write regardless of the other two.
//!
//! | Option                | Default | Effect                                  |
//! |-----------------------|---------|-----------------------------------------|
//! | `page_size`           | 1 MiB   | Page granularity of the overlay         |
//! | `max_pages`           | 100     | Resident page bound (LRU capacity)      |
//! | `create_if_missing`   | true    | Backend open may create the file        |
//! | `strict_size_limit`   | unset   | Reject I/O past this byte               |
//! | `flush_on_close`      | true    | Flush dirty pages before backend close  |
//! | `auto_flush_on_evict` | true    | Flush dirty pages before eviction       |

use eyre::{ensure, Result};

/// Default page granularity: 1 MiB.
pub const DEFAULT_PAGE_SIZE: usize = 1024 * 1024;

/// Default resident page bound.
pub const DEFAULT_MAX_PAGES: usize = 100;

/// Configuration for a layered store.
///
/// Built fluently and handed to [`LayeredStore::with_options`]:
///
/// ```ignore
/// let store = LayeredStore::with_options(
///     MemoryBackend::new(),
///     StoreOptions::new().page_size(4096).max_pages(32),
/// )?;
/// ```
///
/// [`LayeredStore::with_options`]: crate::LayeredStore::with_options
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Page granularity in bytes.
    pub page_size: usize,
    /// Maximum number of resident pages before LRU eviction.
    pub max_pages: usize,
    /// Whether backend open may create a missing file.
    pub create_if_missing: bool,
    /// When set, any read or write extending past this byte fails.
    pub strict_size_limit: Option<u64>,
    /// Whether close flushes dirty pages before closing the backend.
    pub flush_on_close: bool,
    /// Whether a dirty page is written back before capacity eviction.
    pub auto_flush_on_evict: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: DEFAULT_MAX_PAGES,
            create_if_missing: true,
            strict_size_limit: None,
            flush_on_close: true,
            auto_flush_on_evict: true,
        }
    }
}

impl StoreOptions {
    /// Creates options with the defaults from the table above.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the page granularity in bytes.
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Sets the resident page bound.
    pub fn max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Controls whether backend open may create a missing file.
    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    /// Rejects any read or write extending past `limit` bytes.
    pub fn strict_size_limit(mut self, limit: u64) -> Self {
        self.strict_size_limit = Some(limit);
        self
    }

    /// Controls whether close flushes dirty pages first.
    pub fn flush_on_close(mut self, flush: bool) -> Self {
        self.flush_on_close = flush;
        self
    }

    /// Controls whether dirty pages are written back before eviction.
    pub fn auto_flush_on_evict(mut self, flush: bool) -> Self {
        self.auto_flush_on_evict = flush;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        ensure!(self.page_size > 0, "page size must be at least 1 byte");
        ensure!(self.max_pages > 0, "max pages must be at least 1");
        Ok(())
    }
}
