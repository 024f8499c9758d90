//! Page buffers for the overlay.
//!
//! A page holds up to `page_size` bytes and is logically zero beyond the end
//! of its buffer, so a freshly created page allocates nothing and a tail page
//! stays as short as the bytes actually present. The dirty flag is owned by
//! the page but only ever toggled through the page cache, which keeps the
//! flag and the cache-wide dirty set in lockstep.

/// A fixed-size window of the logical byte file; unit of caching and flush.
#[derive(Debug, Default)]
pub(crate) struct Page {
    data: Vec<u8>,
    dirty: bool,
}

impl Page {
    /// Creates an empty page (all bytes logically zero).
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a clean page holding `data`.
    pub fn from_data(data: Vec<u8>) -> Self {
        Self { data, dirty: false }
    }

    /// Length of the materialized buffer. Bytes past this are logically zero.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Toggled only by the page cache so the dirty set stays consistent.
    pub fn set_dirty(&mut self, dirty: bool) {
        self.dirty = dirty;
    }

    /// The materialized bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Copies bytes starting at `start` into `out`. `out` must be
    /// pre-zeroed by the caller; bytes past the buffer end are left alone.
    pub fn copy_out(&self, start: usize, out: &mut [u8]) {
        if start >= self.data.len() {
            return;
        }
        let n = out.len().min(self.data.len() - start);
        out[..n].copy_from_slice(&self.data[start..start + n]);
    }

    /// Copies `bytes` in at `start`, zero-filling any gap between the current
    /// buffer end and `start`. The caller bounds `start + bytes.len()` by the
    /// page size.
    pub fn write_in(&mut self, start: usize, bytes: &[u8]) {
        let end = start + bytes.len();
        if self.data.len() < end {
            self.data.resize(end, 0);
        }
        self.data[start..end].copy_from_slice(bytes);
    }

    /// Zero-fills `[start, end)` where it overlaps the materialized buffer.
    /// Returns true if any byte was touched; bytes past the buffer end are
    /// already logically zero.
    pub fn zero_range(&mut self, start: usize, end: usize) -> bool {
        let end = end.min(self.data.len());
        if start >= end {
            return false;
        }
        self.data[start..end].fill(0);
        true
    }

    /// Drops all bytes at and past `len`.
    pub fn truncate_to(&mut self, len: usize) {
        self.data.truncate(len);
    }
}
