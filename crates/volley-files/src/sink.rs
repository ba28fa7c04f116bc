//! Append-mode output for received bytes.
//!
//! Every server session appends to one output file, so repeated sessions
//! accumulate rather than overwrite. UDP receivers open, append, and close
//! per datagram; TCP receivers keep an [`AppendFile`] for the lifetime of one
//! accepted connection.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::trace;

/// Output file errors
#[derive(Debug, Error)]
pub enum SinkError {
    /// Output file could not be opened for appending
    #[error("can't open file at {}: {source}", path.display())]
    Open {
        /// Output file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Appending failed
    #[error("write to {} failed: {source}", path.display())]
    Write {
        /// Output file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },
}

/// Destination file for received bytes.
#[derive(Debug, Clone)]
pub struct OutputSink {
    path: PathBuf,
}

impl OutputSink {
    /// Sink writing to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Output file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Confirm the file can be opened for appending (creating it if missing).
    ///
    /// # Errors
    /// Returns [`SinkError::Open`] if the file cannot be opened.
    pub fn check(&self) -> Result<(), SinkError> {
        self.open().map(drop)
    }

    /// Open the file for a run of appends.
    ///
    /// # Errors
    /// Returns [`SinkError::Open`] if the file cannot be opened.
    pub fn open(&self) -> Result<AppendFile, SinkError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| SinkError::Open {
                path: self.path.clone(),
                source,
            })?;

        Ok(AppendFile {
            file,
            path: self.path.clone(),
            written: 0,
        })
    }

    /// Open, append exactly `bytes`, and close.
    ///
    /// # Errors
    /// Returns [`SinkError::Open`] or [`SinkError::Write`].
    pub fn append(&self, bytes: &[u8]) -> Result<(), SinkError> {
        let mut file = self.open()?;
        file.write(bytes)
    }
}

/// An output file held open across several appends.
#[derive(Debug)]
pub struct AppendFile {
    file: File,
    path: PathBuf,
    written: u64,
}

impl AppendFile {
    /// Append `bytes` in full.
    ///
    /// # Errors
    /// Returns [`SinkError::Write`] if the write fails.
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), SinkError> {
        self.file
            .write_all(bytes)
            .map_err(|source| SinkError::Write {
                path: self.path.clone(),
                source,
            })?;
        self.written += bytes.len() as u64;
        trace!("Appended {} bytes to {}", bytes.len(), self.path.display());
        Ok(())
    }

    /// Bytes appended through this handle.
    #[must_use]
    pub fn written(&self) -> u64 {
        self.written
    }
}
