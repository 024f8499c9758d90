//! # Byte-Range I/O Engine
//!
//! Slices byte-addressed operations into per-page steps over the cache.
//!
//! ## Page Loading
//!
//! A miss inside the logical size loads the page from the backend (when the
//! file exists and the backend can read); a short read at end-of-file is
//! zero-padded. A miss at or past the logical size materializes an empty
//! page: those bytes are zeros by definition and the backend is not
//! consulted. Writes load through the same path before modifying, so the
//! bytes a page holds outside the written subrange always equal what a read
//! would have returned before the write.
//!
//! ## Eviction on Insert
//!
//! Inserting a loaded page may push residency past `max_pages`. The coldest
//! unpinned pages come back out of the cache and are disposed here: dirty
//! evictees are written back first when `auto_flush_on_evict` is set, and a
//! write-back failure evicts anyway (logged).
//!
//! ## Size Bookkeeping
//!
//! A write extends the logical size to the end of the last byte it actually
//! wrote; bytes skipped by the write bitmask do not count. A trailing
//! delete shortens the size to its start offset. Truncate sets it exactly.

use eyre::{eyre, Result, WrapErr};
use smallvec::SmallVec;

use crate::backend::Backend;
use crate::error::StoreError;

use super::page::Page;
use super::LayeredStore;

/// One page's share of a byte-range operation.
#[derive(Debug, Clone, Copy)]
struct PageSpan {
    /// Page index.
    index: u64,
    /// First byte within the page.
    start: usize,
    /// One past the last byte within the page.
    end: usize,
    /// Offset of this span within the caller's buffer.
    buf_at: usize,
}

/// Splits `[offset, offset + len)` into in-page spans, in order.
fn page_spans(page_size: usize, offset: u64, len: usize) -> SmallVec<[PageSpan; 4]> {
    let ps = page_size as u64;
    let mut spans = SmallVec::new();
    let mut at = 0usize;
    while at < len {
        let abs = offset + at as u64;
        let start = (abs % ps) as usize;
        let take = (page_size - start).min(len - at);
        spans.push(PageSpan {
            index: abs / ps,
            start,
            end: start + take,
            buf_at: at,
        });
        at += take;
    }
    spans
}

fn range_end(offset: u64, len: u64) -> Result<u64> {
    offset
        .checked_add(len)
        .ok_or_else(|| eyre!("byte range {offset}+{len} exceeds the u64 address space"))
}

impl<B: Backend> LayeredStore<B> {
    /// Reads `len` bytes at `offset`.
    ///
    /// Bytes past the logical size read as zeros; this is not an error (see
    /// [`StrictStore`](crate::StrictStore) for the bounds-checked variant).
    pub fn read(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        self.ensure_open()?;
        self.check_limit("read", offset, len as u64)?;
        range_end(offset, len as u64)?;

        let mut out = vec![0u8; len];
        for span in page_spans(self.opts.page_size, offset, len) {
            let page = self.load_page(span.index)?;
            page.copy_out(span.start, &mut out[span.buf_at..span.buf_at + (span.end - span.start)]);
        }
        Ok(out)
    }

    /// Writes `data` at `offset`, extending the store as needed.
    ///
    /// When a bitmask is installed, only permitted bytes are written; a
    /// subrange whose bytes are all forbidden leaves its page untouched.
    pub fn write(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        self.ensure_open()?;
        self.check_limit("write", offset, data.len() as u64)?;
        range_end(offset, data.len() as u64)?;
        if data.is_empty() {
            return Ok(());
        }

        let ps = self.opts.page_size as u64;
        let mut written_end: Option<u64> = None;

        for span in page_spans(self.opts.page_size, offset, data.len()) {
            let abs_start = offset + span.buf_at as u64;
            let abs_end = abs_start + (span.end - span.start) as u64;

            let runs: SmallVec<[(u64, u64); 2]> = match &self.mask {
                Some(mask) => mask.permitted_runs(abs_start, abs_end),
                None => smallvec::smallvec![(abs_start, abs_end)],
            };
            if runs.is_empty() {
                continue;
            }

            // Load first so bytes outside the written runs keep their
            // backend contents.
            let page = self.load_page(span.index)?;
            for &(run_start, run_end) in &runs {
                let in_page = (run_start - span.index * ps) as usize;
                let buf_at = (run_start - offset) as usize;
                let run_len = (run_end - run_start) as usize;
                page.write_in(in_page, &data[buf_at..buf_at + run_len]);
                written_end = Some(written_end.map_or(run_end, |end| end.max(run_end)));
            }
            self.cache.mark_dirty(span.index);
        }

        if let Some(end) = written_end {
            self.size = self.size.max(end);
        }
        Ok(())
    }

    /// Zero-fills `[offset, offset + len)`; `len = None` means to the end of
    /// the store. A delete reaching the current end shortens the store to
    /// `offset`.
    ///
    /// Interior deletes load the pages they touch so the zeros are readable
    /// and flushable; a page wholly covered by the range is replaced without
    /// a backend round-trip. A trailing delete leaves non-resident pages
    /// alone; bytes past the new size read as zeros anyway. The zeros reach
    /// the backend when the range is flushed.
    pub fn del(&mut self, offset: u64, len: Option<u64>) -> Result<()> {
        self.ensure_open()?;

        let current = self.size;
        let end = match len {
            Some(len) => offset.saturating_add(len),
            None => current,
        };
        let trailing = end >= current;
        let end = end.min(current);

        if offset < end {
            let ps = self.opts.page_size as u64;
            for span in page_spans(self.opts.page_size, offset, (end - offset) as usize) {
                if !self.cache.contains(span.index) {
                    if trailing {
                        continue;
                    }
                    let logical = ps.min(current - span.index * ps) as usize;
                    if span.start == 0 && span.end >= logical {
                        self.install_page(span.index, Page::new());
                        self.cache.mark_dirty(span.index);
                        continue;
                    }
                }
                let page = self.load_page(span.index)?;
                if page.zero_range(span.start, span.end) {
                    self.cache.mark_dirty(span.index);
                }
            }
        }

        if trailing && offset < current {
            self.size = offset;
        }
        Ok(())
    }

    /// Sets the logical size to exactly `new_len`.
    ///
    /// Growing zero-fills through the write path (so an installed bitmask
    /// gates the fill); shrinking drops pages past the boundary without
    /// flushing them, trims the boundary page, and truncates the backend
    /// when it supports that.
    pub fn truncate(&mut self, new_len: u64) -> Result<()> {
        self.ensure_open()?;

        if new_len > self.size {
            let zeros = vec![0u8; self.opts.page_size];
            let mut at = self.size;
            while at < new_len {
                let chunk = (self.opts.page_size as u64).min(new_len - at) as usize;
                self.write(at, &zeros[..chunk])
                    .wrap_err("failed to zero-fill while growing")?;
                at += chunk as u64;
            }
            self.size = new_len;
            return Ok(());
        }

        self.size = new_len;
        let ps = self.opts.page_size as u64;
        let boundary = new_len / ps;

        let doomed: Vec<u64> = self
            .cache
            .resident_indices()
            .filter(|&p| p > boundary)
            .collect();
        for p in doomed {
            self.cache.remove(p);
        }

        if new_len % ps == 0 {
            self.cache.remove(boundary);
        } else if let Some(page) = self.cache.peek_mut(boundary) {
            page.truncate_to((new_len % ps) as usize);
            self.cache.mark_dirty(boundary);
        }

        if self.backend.supports_truncate() {
            self.backend
                .truncate(new_len)
                .wrap_err("failed to truncate backend")?;
        }
        Ok(())
    }

    /// Returns the resident page for `index`, loading it on a miss and
    /// promoting it to most recently used.
    pub(super) fn load_page(&mut self, index: u64) -> Result<&mut Page> {
        if !self.cache.contains(index) {
            let page = self.fetch_page(index)?;
            self.install_page(index, page);
        }
        Ok(self
            .cache
            .get_mut(index)
            .expect("page was just installed")) // INVARIANT: insert never evicts the new page
    }

    /// Materializes a page: zeros past the logical size, backend bytes
    /// (zero-padded at EOF) inside it.
    fn fetch_page(&mut self, index: u64) -> Result<Page> {
        let ps = self.opts.page_size as u64;
        let abs = index * ps;
        if abs >= self.size || !self.file_exists || !self.backend.supports_read() {
            return Ok(Page::new());
        }

        let want = ps.min(self.size - abs) as usize;
        let mut data = vec![0u8; want];
        let got = self
            .backend
            .read_at(abs, &mut data)
            .map_err(|err| StoreError::backend("read", format!("{err:#}")))
            .wrap_err_with(|| format!("failed to read page {index} from backend"))?;
        debug_assert!(got <= want, "backend over-filled the read buffer");
        Ok(Page::from_data(data))
    }

    /// Inserts a page, disposing of anything the cache evicts to stay within
    /// its bound.
    fn install_page(&mut self, index: u64, page: Page) {
        let auto_flush = self.opts.auto_flush_on_evict;
        for (evicted_index, evicted) in self.cache.insert(index, page) {
            self.dispose_page(evicted_index, evicted, auto_flush);
        }
    }

    pub(super) fn check_limit(&self, op: &'static str, offset: u64, len: u64) -> Result<()> {
        if let Some(limit) = self.opts.strict_size_limit {
            if offset.saturating_add(len) > limit {
                return Err(StoreError::LimitExceeded {
                    op,
                    offset,
                    len,
                    limit,
                }
                .into());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::config::StoreOptions;

    fn small_store() -> LayeredStore<MemoryBackend> {
        LayeredStore::with_options(
            MemoryBackend::new(),
            StoreOptions::new().page_size(1024).max_pages(10),
        )
        .unwrap()
    }

    #[test]
    fn page_spans_cover_the_range_in_order() {
        let spans = page_spans(1024, 1000, 2000);

        assert_eq!(spans.len(), 3);
        assert_eq!((spans[0].index, spans[0].start, spans[0].end), (0, 1000, 1024));
        assert_eq!((spans[1].index, spans[1].start, spans[1].end), (1, 0, 1024));
        assert_eq!((spans[2].index, spans[2].start, spans[2].end), (2, 0, 952));
        assert_eq!(spans[2].buf_at, 1048);
    }

    #[test]
    fn read_your_writes_round_trips() {
        let mut store = small_store();

        store.write(0, b"Hello, world!").unwrap();

        assert_eq!(store.read(0, 13).unwrap(), b"Hello, world!");
    }

    #[test]
    fn reads_of_an_empty_store_are_zero_filled() {
        let mut store = small_store();

        assert_eq!(store.read(0, 64).unwrap(), vec![0u8; 64]);
        assert_eq!(store.read(5000, 10).unwrap(), vec![0u8; 10]);
    }

    #[test]
    fn overlapping_writes_land_at_their_offsets() {
        let mut store = small_store();

        store.write(10, b"hi").unwrap();
        store.write(0, b"hello").unwrap();

        assert_eq!(store.read(10, 2).unwrap(), b"hi");
        assert_eq!(store.read(0, 5).unwrap(), b"hello");
        assert_eq!(store.read(5, 5).unwrap(), vec![0u8; 5]);
    }

    #[test]
    fn write_extends_the_size_to_its_end() {
        let mut store = small_store();

        store.write(4000, &[1; 100]).unwrap();

        assert_eq!(store.size(), 4100);
    }

    #[test]
    fn writes_spanning_pages_stay_contiguous() {
        let mut store = small_store();
        let data: Vec<u8> = (0..3000u32).map(|i| (i % 251) as u8).collect();

        store.write(500, &data).unwrap();

        assert_eq!(store.read(500, 3000).unwrap(), data);
    }

    #[test]
    fn write_preserves_backend_bytes_outside_the_written_range() {
        let backend = MemoryBackend::with_contents(vec![0xAB; 2048]);
        let mut store = LayeredStore::with_options(
            backend,
            StoreOptions::new().page_size(1024).max_pages(10),
        )
        .unwrap();

        store.write(100, &[0xCD; 8]).unwrap();

        assert_eq!(store.read(0, 100).unwrap(), vec![0xAB; 100]);
        assert_eq!(store.read(100, 8).unwrap(), vec![0xCD; 8]);
        assert_eq!(store.read(108, 100).unwrap(), vec![0xAB; 100]);
    }

    #[test]
    fn bitmask_gates_writes_per_byte() {
        let mut store = small_store();
        store.write(0, &[0xEE; 8]).unwrap();

        // Bits 0-2 and 5-7 set: bytes 3 and 4 are protected.
        store.set_bitmask(vec![0b1110_0111]);
        store.write(0, &[0x11; 8]).unwrap();

        assert_eq!(
            store.read(0, 8).unwrap(),
            vec![0x11, 0x11, 0x11, 0xEE, 0xEE, 0x11, 0x11, 0x11]
        );
    }

    #[test]
    fn fully_masked_write_leaves_pages_and_size_alone() {
        let mut store = small_store();

        store.set_bitmask(vec![0x00]);
        store.write(0, &[1; 16]).unwrap();

        assert_eq!(store.size(), 0);
        assert_eq!(store.dirty_page_count(), 0);
    }

    #[test]
    fn masked_tail_does_not_extend_the_size() {
        let mut store = small_store();

        // Only the first 8 bytes are writable.
        store.set_bitmask(vec![0xFF]);
        store.write(0, &[1; 32]).unwrap();

        assert_eq!(store.size(), 8);
        assert_eq!(store.read(0, 8).unwrap(), vec![1; 8]);
    }

    #[test]
    fn clearing_the_bitmask_permits_writes_again() {
        let mut store = small_store();

        store.set_bitmask(vec![0x00]);
        store.write(0, b"blocked").unwrap();
        store.clear_bitmask();
        store.write(0, b"allowed").unwrap();

        assert_eq!(store.read(0, 7).unwrap(), b"allowed");
    }

    #[test]
    fn strict_limit_rejects_reads_and_writes_past_the_bound() {
        let mut store = LayeredStore::with_options(
            MemoryBackend::new(),
            StoreOptions::new().page_size(1024).strict_size_limit(10),
        )
        .unwrap();

        store.write(0, &[1; 10]).unwrap();

        let err = store.write(10, &[1]).unwrap_err();
        assert!(err.to_string().contains("exceeds strict size enforcement"));
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::LimitExceeded { .. })
        ));

        assert!(store.read(0, 11).is_err());
        assert_eq!(store.size(), 10, "rejected I/O SHOULD have no side effects");
    }

    #[test]
    fn del_zero_fills_resident_pages() {
        let mut store = small_store();
        store.write(0, &[0xFF; 100]).unwrap();

        store.del(10, Some(20)).unwrap();

        let data = store.read(0, 100).unwrap();
        assert_eq!(&data[..10], &[0xFF; 10]);
        assert_eq!(&data[10..30], &[0u8; 20]);
        assert_eq!(&data[30..], &[0xFF; 70]);
        assert_eq!(store.size(), 100, "interior delete SHOULD keep the size");
    }

    #[test]
    fn trailing_del_shortens_the_store() {
        let mut store = small_store();
        store.write(0, &[0xFF; 100]).unwrap();

        store.del(40, None).unwrap();

        assert_eq!(store.size(), 40);
        assert_eq!(store.read(40, 10).unwrap(), vec![0u8; 10]);
    }

    #[test]
    fn del_past_the_end_never_grows_the_store() {
        let mut store = small_store();
        store.write(0, &[0xFF; 10]).unwrap();

        store.del(50, Some(10)).unwrap();
        store.del(50, None).unwrap();

        assert_eq!(store.size(), 10);
    }

    #[test]
    fn truncate_grow_reads_back_as_zeros() {
        let mut store = small_store();
        store.write(0, &[0xFF; 1024]).unwrap();

        store.truncate(2048).unwrap();

        assert_eq!(store.size(), 2048);
        assert_eq!(store.read(1024, 1024).unwrap(), vec![0u8; 1024]);
    }

    #[test]
    fn truncate_shrink_is_lossy() {
        let mut store = small_store();
        store.write(0, &[0xFF; 3000]).unwrap();

        store.truncate(1500).unwrap();

        assert_eq!(store.size(), 1500);
        assert_eq!(store.read(0, 1500).unwrap(), vec![0xFF; 1500]);
        assert_eq!(store.read(1500, 100).unwrap(), vec![0u8; 100]);
    }

    #[test]
    fn truncate_shrink_drops_pages_past_the_boundary() {
        let mut store = small_store();
        store.write(0, &[0xFF; 4096]).unwrap();
        assert_eq!(store.resident_page_count(), 4);

        store.truncate(1024).unwrap();

        assert_eq!(
            store.resident_page_count(),
            1,
            "page-aligned shrink SHOULD drop the boundary page, keeping page 0"
        );
    }

    #[test]
    fn truncate_shrink_trims_the_boundary_page() {
        let mut store = small_store();
        store.write(0, &[0xFF; 2048]).unwrap();

        store.truncate(1500).unwrap();

        assert_eq!(store.resident_page_count(), 2, "the trimmed boundary page stays resident");
        assert_eq!(store.read(1024, 476).unwrap(), vec![0xFF; 476]);
        assert!(store.dirty_page_count() > 0, "trimmed boundary page SHOULD be dirty");
    }

    #[test]
    fn truncate_shrink_truncates_a_capable_backend() {
        let backend = MemoryBackend::with_contents(vec![1; 4000]);
        let mut store = LayeredStore::with_options(
            backend,
            StoreOptions::new().page_size(1024).max_pages(10),
        )
        .unwrap();

        store.truncate(1000).unwrap();

        assert_eq!(store.backend().len(), 1000);
    }

    #[test]
    fn lru_pressure_evicts_and_reloads_through_the_backend() {
        let mut store = LayeredStore::with_options(
            MemoryBackend::new(),
            StoreOptions::new().page_size(1024).max_pages(2),
        )
        .unwrap();

        for p in 0u8..5 {
            store.write(u64::from(p) * 1024, &[p; 1024]).unwrap();
        }
        assert_eq!(store.resident_page_count(), 2);

        // Evicted pages were auto-flushed and reload with their contents.
        for p in 0u8..5 {
            assert_eq!(store.read(u64::from(p) * 1024, 1024).unwrap(), vec![p; 1024]);
        }
    }

    #[test]
    fn eviction_without_auto_flush_loses_unflushed_pages() {
        let mut store = LayeredStore::with_options(
            MemoryBackend::new(),
            StoreOptions::new()
                .page_size(1024)
                .max_pages(1)
                .auto_flush_on_evict(false),
        )
        .unwrap();

        store.write(0, &[7; 1024]).unwrap();
        store.write(1024, &[8; 1024]).unwrap();

        assert_eq!(
            store.read(0, 1024).unwrap(),
            vec![0u8; 1024],
            "page 0 was evicted dirty without write-back"
        );
    }
}
