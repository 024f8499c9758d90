//! In-memory backend backed by a growable byte vector.
//!
//! The reference backend: supports the full capability set, so it doubles as
//! the test harness backend and as the RAM flavor of the store.

use eyre::Result;

use super::Backend;

/// A growable in-RAM byte store.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    data: Vec<u8>,
}

impl MemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend pre-populated with `data`.
    pub fn with_contents(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }

    /// Returns the current contents.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Returns the current length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the backend holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Consumes the backend, returning its contents.
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

impl Backend for MemoryBackend {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let len = self.data.len() as u64;
        if offset >= len {
            return Ok(0);
        }
        let at = offset as usize;
        let n = buf.len().min(self.data.len() - at);
        buf[..n].copy_from_slice(&self.data[at..at + n]);
        Ok(n)
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        let at = offset as usize;
        let end = at + data.len();
        if self.data.len() < end {
            self.data.resize(end, 0);
        }
        self.data[at..end].copy_from_slice(data);
        Ok(())
    }

    fn supports_del(&self) -> bool {
        true
    }

    fn del_range(&mut self, offset: u64, len: u64) -> Result<()> {
        let start = (offset.min(self.data.len() as u64)) as usize;
        let end = (offset.saturating_add(len)).min(self.data.len() as u64) as usize;
        self.data[start..end].fill(0);
        Ok(())
    }

    fn supports_truncate(&self) -> bool {
        true
    }

    fn truncate(&mut self, len: u64) -> Result<()> {
        self.data.resize(len as usize, 0);
        Ok(())
    }

    fn supports_stat(&self) -> bool {
        true
    }

    fn stat(&mut self) -> Result<u64> {
        Ok(self.data.len() as u64)
    }

    fn supports_unlink(&self) -> bool {
        true
    }

    fn unlink(&mut self) -> Result<()> {
        self.data.clear();
        Ok(())
    }
}
