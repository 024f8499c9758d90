//! File-backed storage using positioned reads and writes.
//!
//! The backing file is the identity mapping of the logical byte file: byte
//! `b` of the overlay lives at byte `b` of the file. Writes past end-of-file
//! extend the file (the gap reads as zeros), truncation uses `set_len`, and
//! unlink removes the file from the filesystem.
//!
//! All fallible operations return `eyre::Result` with the file path in the
//! error context.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use eyre::{eyre, Result, WrapErr};

use super::Backend;
use crate::error::StoreError;

/// A backend over a local file.
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    file: Option<File>,
}

impl FileBackend {
    /// Creates a backend for `path`. The file is not touched until
    /// [`Backend::open`] runs.
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            file: None,
        }
    }

    /// Returns the backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn file_mut(&mut self) -> Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| eyre!("backend file '{}' is not open", self.path.display()))
    }
}

impl Backend for FileBackend {
    fn open(&mut self, create: bool) -> Result<()> {
        if self.file.is_some() {
            return Ok(());
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(create)
            .open(&self.path)
            .map_err(|err| {
                if err.kind() == io::ErrorKind::NotFound {
                    eyre::Report::new(StoreError::not_found(self.path.display().to_string()))
                } else {
                    eyre::Report::new(err).wrap_err(format!(
                        "failed to open backend file '{}'",
                        self.path.display()
                    ))
                }
            })?;

        self.file = Some(file);
        Ok(())
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let path = self.path.clone();
        let file = self.file_mut()?;

        file.seek(SeekFrom::Start(offset))
            .wrap_err_with(|| format!("failed to seek to {} in '{}'", offset, path.display()))?;

        let mut filled = 0;
        while filled < buf.len() {
            let n = file
                .read(&mut buf[filled..])
                .wrap_err_with(|| format!("failed to read from '{}'", path.display()))?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        let path = self.path.clone();
        let file = self.file_mut()?;

        file.seek(SeekFrom::Start(offset))
            .wrap_err_with(|| format!("failed to seek to {} in '{}'", offset, path.display()))?;
        file.write_all(data)
            .wrap_err_with(|| format!("failed to write to '{}'", path.display()))?;
        Ok(())
    }

    fn supports_truncate(&self) -> bool {
        true
    }

    fn truncate(&mut self, len: u64) -> Result<()> {
        let path = self.path.clone();
        self.file_mut()?
            .set_len(len)
            .wrap_err_with(|| format!("failed to truncate '{}' to {} bytes", path.display(), len))
    }

    fn supports_stat(&self) -> bool {
        true
    }

    fn stat(&mut self) -> Result<u64> {
        let path = self.path.clone();
        let metadata = self
            .file_mut()?
            .metadata()
            .wrap_err_with(|| format!("failed to stat '{}'", path.display()))?;
        Ok(metadata.len())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(file) = self.file.take() {
            file.sync_all()
                .wrap_err_with(|| format!("failed to sync '{}'", self.path.display()))?;
        }
        Ok(())
    }

    fn supports_unlink(&self) -> bool {
        true
    }

    fn unlink(&mut self) -> Result<()> {
        self.file = None;
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            // Already gone; unlink is terminal either way.
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).wrap_err_with(|| {
                format!("failed to unlink backend file '{}'", self.path.display())
            }),
        }
    }
}
