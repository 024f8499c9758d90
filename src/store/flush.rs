//! # Flush Engine
//!
//! Reconciles a byte range of the overlay with the backend.
//!
//! A flush walks the pages the range touches and writes each dirty page's
//! bytes to the backend at the identity-mapped offset (zero-padded to the
//! page's logical extent, so zero-holes inside a dirty page materialize on
//! the backend). Clean and non-resident pages are skipped: their backend
//! bytes already equal what the overlay would read, and rewriting them
//! could only lose data when the backend is the source of truth.
//!
//! Dirty flags clear per page as each backend write succeeds, so a failure
//! mid-flush leaves exactly the unflushed pages dirty. After the last page,
//! the backend is truncated down to the overlay size when the flushed extent
//! reaches past it and the backend supports truncation.

use eyre::{Result, WrapErr};

use crate::backend::Backend;
use crate::error::StoreError;

use super::LayeredStore;

impl<B: Backend> LayeredStore<B> {
    /// Flushes the whole store. See [`flush_range`](Self::flush_range).
    pub fn flush(&mut self) -> Result<()> {
        let size = self.size;
        self.flush_range(0, size)
    }

    /// Writes the dirty pages of `[offset, offset + len)` back to the
    /// backend, page by page.
    ///
    /// `len` is clipped to the current store size. A failed page write
    /// aborts the flush: pages already written stay clean, the rest stay
    /// dirty. Dirty pages outside the range are untouched. A second flush of
    /// the same range finds its dirty pages gone and is a no-op.
    pub fn flush_range(&mut self, offset: u64, len: u64) -> Result<()> {
        self.ensure_open()?;

        let len = len.min(self.size);
        if len == 0 {
            return Ok(());
        }

        let ps = self.opts.page_size as u64;
        let end = offset + len;
        let first_page = offset / ps;
        let last_page = (end - 1) / ps;

        for index in first_page..=last_page {
            if !self.cache.is_dirty(index) {
                continue;
            }
            let page_start = index * ps;
            let write_start = offset.max(page_start);
            let write_end = end.min(page_start + ps);
            let in_page = (write_start - page_start) as usize;
            let write_len = (write_end - write_start) as usize;

            // Dirty pages are resident; borrow the bytes directly when the
            // buffer covers the range, zero-pad a copy otherwise.
            let Some(page) = self.cache.peek(index) else {
                continue;
            };
            let mut padded = Vec::new();
            let chunk: &[u8] = if page.len() >= in_page + write_len {
                &page.bytes()[in_page..in_page + write_len]
            } else {
                padded.resize(write_len, 0);
                page.copy_out(in_page, &mut padded);
                &padded
            };

            self.backend
                .write_at(write_start, chunk)
                .map_err(|err| StoreError::backend("write", format!("{err:#}")))
                .wrap_err_with(|| format!("failed to flush page {index} to backend"))?;

            self.cache.clear_dirty(index);
        }

        if self.size < end && self.backend.supports_truncate() {
            self.backend
                .truncate(self.size)
                .wrap_err("failed to truncate backend after flush")?;
        }
        Ok(())
    }
}
