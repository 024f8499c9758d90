//! Bounds-checked read variant of the layered store.
//!
//! [`StrictStore`] wraps a [`LayeredStore`] and overrides `read`: a read
//! extending past the current size fails with
//! [`StoreError::OutOfRange`](crate::StoreError::OutOfRange) before any page
//! is loaded, instead of returning zeros. Everything else delegates to the
//! inner store.
//!
//! The bound is local to this layer: wrapping a store never changes a nested
//! layer's configuration, so a strict store over a lenient one only checks
//! its own reads.

use eyre::Result;

use crate::backend::Backend;
use crate::config::StoreOptions;
use crate::error::StoreError;

use super::{LayeredStore, StoreStat};

/// A layered store whose reads are bounds-checked against the current size.
#[derive(Debug)]
pub struct StrictStore<B: Backend> {
    inner: LayeredStore<B>,
}

impl<B: Backend> StrictStore<B> {
    /// Creates a strict store over `backend` with default options.
    pub fn new(backend: B) -> Self {
        Self {
            inner: LayeredStore::new(backend),
        }
    }

    /// Creates a strict store over `backend` with the given options.
    pub fn with_options(backend: B, opts: StoreOptions) -> Result<Self> {
        Ok(Self {
            inner: LayeredStore::with_options(backend, opts)?,
        })
    }

    /// Wraps an existing store.
    pub fn from_store(inner: LayeredStore<B>) -> Self {
        Self { inner }
    }

    /// Reads `len` bytes at `offset`, failing with
    /// [`StoreError::OutOfRange`](crate::StoreError::OutOfRange) if the
    /// range extends past the current size. No pages are loaded on failure.
    pub fn read(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        self.inner.ensure_open()?;
        let end = offset.saturating_add(len as u64);
        if end > self.inner.size() {
            return Err(StoreError::OutOfRange {
                offset,
                len: len as u64,
                size: self.inner.size(),
            }
            .into());
        }
        self.inner.read(offset, len)
    }

    /// See [`LayeredStore::open`].
    pub fn open(&mut self) -> Result<()> {
        self.inner.open()
    }

    /// See [`LayeredStore::write`].
    pub fn write(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        self.inner.write(offset, data)
    }

    /// See [`LayeredStore::del`].
    pub fn del(&mut self, offset: u64, len: Option<u64>) -> Result<()> {
        self.inner.del(offset, len)
    }

    /// See [`LayeredStore::truncate`].
    pub fn truncate(&mut self, new_len: u64) -> Result<()> {
        self.inner.truncate(new_len)
    }

    /// See [`LayeredStore::flush`].
    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()
    }

    /// See [`LayeredStore::flush_range`].
    pub fn flush_range(&mut self, offset: u64, len: u64) -> Result<()> {
        self.inner.flush_range(offset, len)
    }

    /// See [`LayeredStore::stat`].
    pub fn stat(&mut self) -> Result<StoreStat> {
        self.inner.stat()
    }

    /// See [`LayeredStore::close`].
    pub fn close(&mut self) -> Result<()> {
        self.inner.close()
    }

    /// See [`LayeredStore::unlink`].
    pub fn unlink(&mut self) -> Result<()> {
        self.inner.unlink()
    }

    /// See [`LayeredStore::evict`].
    pub fn evict(&mut self, percent: f64, flush_first: bool) -> Result<()> {
        self.inner.evict(percent, flush_first)
    }

    /// See [`LayeredStore::pin`].
    pub fn pin(&mut self, offset: u64, len: u64) {
        self.inner.pin(offset, len);
    }

    /// See [`LayeredStore::unpin`].
    pub fn unpin(&mut self, offset: u64, len: u64) {
        self.inner.unpin(offset, len);
    }

    /// See [`LayeredStore::set_bitmask`].
    pub fn set_bitmask(&mut self, bits: impl Into<Vec<u8>>) {
        self.inner.set_bitmask(bits);
    }

    /// See [`LayeredStore::clear_bitmask`].
    pub fn clear_bitmask(&mut self) {
        self.inner.clear_bitmask();
    }

    /// Logical length of the overlay in bytes.
    pub fn size(&self) -> u64 {
        self.inner.size()
    }

    /// Alias for [`size`](Self::size).
    pub fn len(&self) -> u64 {
        self.inner.len()
    }

    /// Returns true if the store holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// The wrapped store.
    pub fn get_ref(&self) -> &LayeredStore<B> {
        &self.inner
    }

    /// The wrapped store, mutably. Reads issued through it are not
    /// bounds-checked.
    pub fn get_mut(&mut self) -> &mut LayeredStore<B> {
        &mut self.inner
    }

    /// Consumes the wrapper, returning the inner store.
    pub fn into_inner(self) -> LayeredStore<B> {
        self.inner
    }
}

/// A strict store composes like any other backend. `read_at` clips to the
/// current size (short read at end-of-file), so composition never trips the
/// bounds check.
impl<B: Backend> Backend for StrictStore<B> {
    fn open(&mut self, create: bool) -> Result<()> {
        Backend::open(&mut self.inner, create)
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        Backend::read_at(&mut self.inner, offset, buf)
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        Backend::write_at(&mut self.inner, offset, data)
    }

    fn supports_del(&self) -> bool {
        true
    }

    fn del_range(&mut self, offset: u64, len: u64) -> Result<()> {
        Backend::del_range(&mut self.inner, offset, len)
    }

    fn supports_truncate(&self) -> bool {
        true
    }

    fn truncate(&mut self, len: u64) -> Result<()> {
        Backend::truncate(&mut self.inner, len)
    }

    fn supports_stat(&self) -> bool {
        true
    }

    fn stat(&mut self) -> Result<u64> {
        Backend::stat(&mut self.inner)
    }

    fn close(&mut self) -> Result<()> {
        Backend::close(&mut self.inner)
    }

    fn supports_unlink(&self) -> bool {
        true
    }

    fn unlink(&mut self) -> Result<()> {
        Backend::unlink(&mut self.inner)
    }
}
