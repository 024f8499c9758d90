//! # Backend Abstraction Layer
//!
//! This module provides the [`Backend`] trait, the capability-probed contract
//! between the layered store and whatever actually holds the bytes: a RAM
//! buffer, a local file, or another layered store.
//!
//! ## Copy-Based Interface
//!
//! The contract uses copy semantics for maximum portability:
//!
//! ```text
//! fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize>;
//! fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()>;
//! ```
//!
//! `read_at` fills the buffer fully except at end-of-file, where a short
//! count is returned and the *caller* is responsible for zero-filling the
//! tail. `write_at` writes everything and may implicitly extend the backend.
//!
//! ## Capability Probing
//!
//! Not every backend can delete ranges, truncate, report its length, or
//! unlink itself. Each optional operation is paired with a `supports_*`
//! probe defaulting to `false`; the store consults the probe and substitutes
//! an overlay-only behavior when the capability is absent (for example,
//! unlink without backend support clears in-memory state only).
//!
//! `open` and `close` default to no-ops: a backend without an open step is
//! implicitly open.
//!
//! ## Layered Composition
//!
//! [`LayeredStore`](crate::LayeredStore) itself implements `Backend`, so
//! overlays stack: a store over a store over a file. In such a chain a short
//! read is permitted only at end-of-file, which the outer layer zero-fills
//! like any other backend read.

use eyre::{bail, Result};

mod file;
mod memory;

pub use file::FileBackend;
pub use memory::MemoryBackend;

/// A random-access byte store the overlay can sit in front of.
pub trait Backend {
    /// Prepares the backend for I/O. `create` indicates whether a missing
    /// backing file may be created.
    ///
    /// Backends without an open step are implicitly open.
    fn open(&mut self, create: bool) -> Result<()> {
        let _ = create;
        Ok(())
    }

    /// Returns true if this backend can serve reads.
    fn supports_read(&self) -> bool {
        true
    }

    /// Reads bytes at `offset` into `buf`.
    ///
    /// Returns the number of bytes read. A count shorter than `buf.len()` is
    /// permitted only at end-of-file; the caller zero-fills the tail.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize>;

    /// Writes all of `data` at `offset`, extending the backend if needed.
    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()>;

    /// Returns true if this backend can zero-fill ranges in place.
    fn supports_del(&self) -> bool {
        false
    }

    /// Zero-fills `len` bytes at `offset`. Equivalent to a write of zeros;
    /// must not extend the backend.
    fn del_range(&mut self, offset: u64, len: u64) -> Result<()> {
        let _ = (offset, len);
        bail!("backend does not support del");
    }

    /// Returns true if this backend can be truncated to an exact length.
    fn supports_truncate(&self) -> bool {
        false
    }

    /// Sets the backend length to exactly `len` bytes.
    fn truncate(&mut self, len: u64) -> Result<()> {
        let _ = len;
        bail!("backend does not support truncate");
    }

    /// Returns true if this backend can report its current length.
    fn supports_stat(&self) -> bool {
        false
    }

    /// Returns the current backend length in bytes.
    fn stat(&mut self) -> Result<u64> {
        bail!("backend does not support stat");
    }

    /// Releases the backend. Terminal.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    /// Returns true if this backend can remove its backing file.
    fn supports_unlink(&self) -> bool {
        false
    }

    /// Removes the backing file. Terminal.
    fn unlink(&mut self) -> Result<()> {
        bail!("backend does not support unlink");
    }
}

impl<B: Backend + ?Sized> Backend for &mut B {
    fn open(&mut self, create: bool) -> Result<()> {
        (**self).open(create)
    }

    fn supports_read(&self) -> bool {
        (**self).supports_read()
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        (**self).read_at(offset, buf)
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        (**self).write_at(offset, data)
    }

    fn supports_del(&self) -> bool {
        (**self).supports_del()
    }

    fn del_range(&mut self, offset: u64, len: u64) -> Result<()> {
        (**self).del_range(offset, len)
    }

    fn supports_truncate(&self) -> bool {
        (**self).supports_truncate()
    }

    fn truncate(&mut self, len: u64) -> Result<()> {
        (**self).truncate(len)
    }

    fn supports_stat(&self) -> bool {
        (**self).supports_stat()
    }

    fn stat(&mut self) -> Result<u64> {
        (**self).stat()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }

    fn supports_unlink(&self) -> bool {
        (**self).supports_unlink()
    }

    fn unlink(&mut self) -> Result<()> {
        (**self).unlink()
    }
}

impl<B: Backend + ?Sized> Backend for Box<B> {
    fn open(&mut self, create: bool) -> Result<()> {
        (**self).open(create)
    }

    fn supports_read(&self) -> bool {
        (**self).supports_read()
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        (**self).read_at(offset, buf)
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        (**self).write_at(offset, data)
    }

    fn supports_del(&self) -> bool {
        (**self).supports_del()
    }

    fn del_range(&mut self, offset: u64, len: u64) -> Result<()> {
        (**self).del_range(offset, len)
    }

    fn supports_truncate(&self) -> bool {
        (**self).supports_truncate()
    }

    fn truncate(&mut self, len: u64) -> Result<()> {
        (**self).truncate(len)
    }

    fn supports_stat(&self) -> bool {
        (**self).supports_stat()
    }

    fn stat(&mut self) -> Result<u64> {
        (**self).stat()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }

    fn supports_unlink(&self) -> bool {
        (**self).supports_unlink()
    }

    fn unlink(&mut self) -> Result<()> {
        (**self).unlink()
    }
}
