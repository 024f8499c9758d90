//! # Layered Store
//!
//! The overlay itself: a page-granular, in-memory layer in front of a
//! [`Backend`]. Reads and writes are byte-addressed; internally every
//! operation is sliced into per-page steps over a bounded LRU cache of
//! resident pages. Dirty pages are written back on explicit flush, on
//! eviction, and on close.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────┐
//! │  LayeredStore: read / write / del /       │
//! │  truncate / flush / pin / evict / stat    │
//! ├──────────────┬──────────────┬─────────────┤
//! │  PageCache   │  WriteMask   │ size / state│
//! │  (LRU + pins │  (byte-level │ (lifecycle, │
//! │   + dirty)   │   write gate)│  length)    │
//! ├──────────────┴──────────────┴─────────────┤
//! │        Backend (RAM, file, or another     │
//! │        LayeredStore, identity-mapped)   │
//! └───────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - `page`: page buffers (data + dirty flag)
//! - `cache`: bounded LRU residency with pin and dirty sets
//! - `bitmask`: byte-indexed write gate
//! - `io`: the byte-range ↔ page-span engine (read/write/del/truncate)
//! - `flush`: write-back of a byte range to the backend
//! - `strict`: the bounds-checked read variant ([`StrictStore`])
//!
//! ## Ownership and Threading
//!
//! The store exclusively owns its cache, mask, and size counter, and owns
//! the backend it was constructed with (retrieve it with
//! [`into_backend`](LayeredStore::into_backend)). Every operation takes
//! `&mut self` and runs to completion, so a single operation is atomic at
//! the byte level. The store is `Send` when its backend is; callers that
//! share one across threads put a lock above it.

use eyre::{bail, Result, WrapErr};
use tracing::{debug, warn};

use crate::backend::Backend;
use crate::config::StoreOptions;
use crate::error::StoreError;

mod bitmask;
mod cache;
mod flush;
mod io;
mod page;
mod strict;

pub use strict::StrictStore;

use bitmask::WriteMask;
use cache::PageCache;
use page::Page;

/// Result of [`LayeredStore::stat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStat {
    /// Logical length of the store in bytes.
    pub size: u64,
}

/// Lifecycle of a store. Transitions are monotonic: once closed or unlinked
/// a store never reopens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Fresh,
    Opened,
    Closed,
    Unlinked,
}

/// A page-granular in-memory overlay over a random-access backend.
#[derive(Debug)]
pub struct LayeredStore<B: Backend> {
    backend: B,
    opts: StoreOptions,
    cache: PageCache,
    mask: Option<WriteMask>,
    size: u64,
    state: State,
    file_exists: bool,
}

impl<B: Backend> LayeredStore<B> {
    /// Creates a store over `backend` with default options.
    pub fn new(backend: B) -> Self {
        Self::with_options(backend, StoreOptions::default())
            .expect("default options are valid")
    }

    /// Creates a store over `backend` with the given options.
    pub fn with_options(backend: B, opts: StoreOptions) -> Result<Self> {
        opts.validate()?;
        let cache = PageCache::new(opts.max_pages);
        Ok(Self {
            backend,
            opts,
            cache,
            mask: None,
            size: 0,
            state: State::Fresh,
            file_exists: false,
        })
    }

    /// Opens the store: opens the backend and reconciles the overlay length
    /// with the backend's, keeping whichever is larger.
    ///
    /// Idempotent while open. A stat failure is not fatal; the backend is
    /// treated as empty. Fails once the store has been closed or unlinked.
    pub fn open(&mut self) -> Result<()> {
        match self.state {
            State::Opened => return Ok(()),
            State::Closed | State::Unlinked => return Err(StoreError::Closed.into()),
            State::Fresh => {}
        }

        self.backend
            .open(self.opts.create_if_missing)
            .wrap_err("failed to open backend")?;
        self.file_exists = true;

        if self.backend.supports_stat() {
            match self.backend.stat() {
                Ok(len) => self.size = self.size.max(len),
                Err(err) => {
                    debug!(error = %err, "backend stat failed at open; treating as empty");
                }
            }
        }

        self.state = State::Opened;
        debug!(size = self.size, "store opened");
        Ok(())
    }

    /// Closes the store. When `flush_on_close` is set, dirty pages are
    /// flushed first; a flush failure is logged and close proceeds.
    pub fn close(&mut self) -> Result<()> {
        match self.state {
            State::Closed | State::Unlinked => bail!("store already closed"),
            State::Fresh => {
                self.state = State::Closed;
                return Ok(());
            }
            State::Opened => {}
        }

        if self.opts.flush_on_close {
            let size = self.size;
            if let Err(err) = self.flush_range(0, size) {
                warn!(error = %err, "flush on close failed; closing anyway");
            }
        }

        self.backend.close().wrap_err("failed to close backend")?;
        self.state = State::Closed;
        debug!("store closed");
        Ok(())
    }

    /// Removes the backing file. When the backend cannot unlink, the overlay
    /// state is cleared instead: all pages, pins, dirty flags, and the size.
    pub fn unlink(&mut self) -> Result<()> {
        self.ensure_open()?;

        if self.backend.supports_unlink() {
            self.backend.unlink().wrap_err("failed to unlink backend")?;
        } else {
            self.cache.clear();
            self.size = 0;
        }

        self.state = State::Unlinked;
        debug!("store unlinked");
        Ok(())
    }

    /// Excludes every page touched by `[offset, offset + len)` from
    /// eviction. Pinning a range that is not resident yet is valid.
    pub fn pin(&mut self, offset: u64, len: u64) {
        if let Some((first, last)) = self.page_range(offset, len) {
            self.cache.pin_range(first, last);
        }
    }

    /// Makes the pages of `[offset, offset + len)` evictable again.
    pub fn unpin(&mut self, offset: u64, len: u64) {
        if let Some((first, last)) = self.page_range(offset, len) {
            self.cache.unpin_range(first, last);
        }
    }

    /// Installs a write bitmask: bit `i` (LSB-first within byte `i / 8`)
    /// permits writing byte `i`. Bytes beyond the mask are not writable.
    pub fn set_bitmask(&mut self, bits: impl Into<Vec<u8>>) {
        self.mask = Some(WriteMask::new(bits.into()));
    }

    /// Removes the write bitmask; all writes are permitted again.
    pub fn clear_bitmask(&mut self) {
        self.mask = None;
    }

    /// Evicts `percent` (clamped to `[0, 1]`) of the resident unpinned
    /// pages, coldest first. Dirty victims are written back when
    /// `flush_first` is set or `auto_flush_on_evict` is configured; a
    /// write-back failure is logged and the page is evicted regardless.
    pub fn evict(&mut self, percent: f64, flush_first: bool) -> Result<()> {
        self.ensure_open()?;

        let percent = percent.clamp(0.0, 1.0);
        let unpinned = self.cache.unpinned_resident_count();
        let count = (unpinned as f64 * percent).ceil() as usize;
        if count == 0 {
            return Ok(());
        }

        let flush = flush_first || self.opts.auto_flush_on_evict;
        let victims = self.cache.take_lru_unpinned(count);
        for (index, page) in victims {
            self.dispose_page(index, page, flush);
        }
        Ok(())
    }

    /// Reports the current logical length.
    pub fn stat(&mut self) -> Result<StoreStat> {
        self.ensure_open()?;
        Ok(StoreStat { size: self.size })
    }

    /// Logical length of the overlay in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Alias for [`size`](Self::size).
    pub fn len(&self) -> u64 {
        self.size
    }

    /// Returns true if the store holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// The configured options.
    pub fn options(&self) -> &StoreOptions {
        &self.opts
    }

    /// Number of pages currently resident in the cache.
    pub fn resident_page_count(&self) -> usize {
        self.cache.resident_count()
    }

    /// Number of resident pages holding unflushed bytes.
    pub fn dirty_page_count(&self) -> u64 {
        self.cache.dirty_count()
    }

    /// Shared access to the underlying backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Mutable access to the underlying backend.
    ///
    /// Bytes read this way do not see unflushed overlay writes.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Consumes the store, returning the backend. Dirty pages are discarded;
    /// call [`flush`](Self::flush) or [`close`](Self::close) first to keep
    /// them.
    pub fn into_backend(self) -> B {
        self.backend
    }

    /// Opens the store if it is fresh; fails if it was closed or unlinked.
    pub(crate) fn ensure_open(&mut self) -> Result<()> {
        match self.state {
            State::Opened => Ok(()),
            State::Fresh => self.open(),
            State::Closed | State::Unlinked => Err(StoreError::Closed.into()),
        }
    }

    /// Converts a byte range to the inclusive page index range it touches.
    fn page_range(&self, offset: u64, len: u64) -> Option<(u64, u64)> {
        if len == 0 {
            return None;
        }
        let ps = self.opts.page_size as u64;
        let last = offset.saturating_add(len - 1);
        Some((offset / ps, last / ps))
    }

    /// Writes a dirty evictee back before dropping it. Failure is logged and
    /// the page is dropped anyway: relieving memory pressure wins.
    fn dispose_page(&mut self, index: u64, page: Page, flush: bool) {
        if flush && page.is_dirty() {
            if let Err(err) = self.write_page_back(index, &page) {
                warn!(page = index, error = %err, "failed to flush page during eviction; evicting anyway");
            }
        }
    }

    /// Writes the in-size portion of a page to the backend at its identity
    /// offset.
    fn write_page_back(&mut self, index: u64, page: &Page) -> Result<()> {
        let ps = self.opts.page_size as u64;
        let abs = index * ps;
        if abs >= self.size {
            return Ok(());
        }
        let len = ps.min(self.size - abs) as usize;
        let mut buf = vec![0u8; len];
        page.copy_out(0, &mut buf);
        self.backend
            .write_at(abs, &buf)
            .map_err(|err| StoreError::backend("write", format!("{err:#}")))
            .wrap_err_with(|| format!("failed to write page {index} back to backend"))
    }
}

/// A layered store is itself a backend, so overlays compose.
///
/// `read_at` returns a short count at the overlay's end-of-file, which an
/// outer layer zero-fills like any other backend. The `create` flag on open
/// is ignored; the store's own `create_if_missing` governs.
impl<B: Backend> Backend for LayeredStore<B> {
    fn open(&mut self, _create: bool) -> Result<()> {
        LayeredStore::open(self)
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        self.ensure_open()?;
        if offset >= self.size {
            return Ok(0);
        }
        let want = (buf.len() as u64).min(self.size - offset) as usize;
        let data = self.read(offset, want)?;
        buf[..want].copy_from_slice(&data);
        Ok(want)
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        self.write(offset, data)
    }

    fn supports_del(&self) -> bool {
        true
    }

    fn del_range(&mut self, offset: u64, len: u64) -> Result<()> {
        self.del(offset, Some(len))
    }

    fn supports_truncate(&self) -> bool {
        true
    }

    fn truncate(&mut self, len: u64) -> Result<()> {
        LayeredStore::truncate(self, len)
    }

    fn supports_stat(&self) -> bool {
        true
    }

    fn stat(&mut self) -> Result<u64> {
        Ok(LayeredStore::stat(self)?.size)
    }

    fn close(&mut self) -> Result<()> {
        LayeredStore::close(self)
    }

    fn supports_unlink(&self) -> bool {
        true
    }

    fn unlink(&mut self) -> Result<()> {
        LayeredStore::unlink(self)
    }
}
