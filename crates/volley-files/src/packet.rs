//! Fixed-size packet building.
//!
//! A client session sends one buffer, built once from the head of its source
//! file: bytes are copied in order, the buffer is truncated at `packet_size`,
//! and anything past end-of-file is zero.

use std::fs::File;
use std::io::{self, Read};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Hard ceiling on packet size: the largest allocation Rust permits.
pub const MAX_PACKET_SIZE: usize = isize::MAX as usize;

/// Packet building errors
#[derive(Debug, Error)]
pub enum PacketError {
    /// Source file could not be opened
    #[error("can't open file at {}: {source}", path.display())]
    FileOpen {
        /// Source file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Requested size exceeds the allocation ceiling
    #[error("packet size {size} too big, use a number no larger than {limit}")]
    PacketTooLarge {
        /// Requested size
        size: usize,
        /// Ceiling in force
        limit: usize,
    },

    /// Reading the source file failed part way
    #[error("read from {} failed: {source}", path.display())]
    Read {
        /// Source file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },
}

/// Immutable packet buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    bytes: Box<[u8]>,
}

impl Packet {
    /// Wrap existing bytes as a packet.
    #[must_use]
    pub fn from_bytes(bytes: impl Into<Box<[u8]>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    /// Packet length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the packet is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Packet contents.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl Deref for Packet {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.bytes
    }
}

impl AsRef<[u8]> for Packet {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

/// Builds packets from files.
#[derive(Debug, Clone, Copy)]
pub struct PacketBuilder {
    max_size: usize,
}

impl PacketBuilder {
    /// Builder with the default ceiling ([`MAX_PACKET_SIZE`]).
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_size(MAX_PACKET_SIZE)
    }

    /// Builder with a lower ceiling.
    #[must_use]
    pub fn with_max_size(max_size: usize) -> Self {
        Self {
            max_size: max_size.min(MAX_PACKET_SIZE),
        }
    }

    /// Ceiling in force.
    #[must_use]
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Build a `packet_size`-byte packet from the head of `path`.
    ///
    /// The size is checked before the file is touched, and the buffer is
    /// reserved up front so an allocator refusal is reported rather than
    /// aborting.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError::PacketTooLarge`] if `packet_size` exceeds the
    /// ceiling or cannot be allocated, [`PacketError::FileOpen`] if the file
    /// cannot be opened, and [`PacketError::Read`] on a read failure.
    ///
    /// # Examples
    /// ```no_run
    /// use volley_files::PacketBuilder;
    ///
    /// let packet = PacketBuilder::new().build("payload.txt", 1024).unwrap();
    /// assert_eq!(packet.len(), 1024);
    /// ```
    pub fn build(&self, path: impl AsRef<Path>, packet_size: usize) -> Result<Packet, PacketError> {
        let path = path.as_ref();
        let too_large = || PacketError::PacketTooLarge {
            size: packet_size,
            limit: self.max_size,
        };

        if packet_size > self.max_size {
            return Err(too_large());
        }

        let file = File::open(path).map_err(|source| PacketError::FileOpen {
            path: path.to_path_buf(),
            source,
        })?;

        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(packet_size)
            .map_err(|_| too_large())?;

        file.take(packet_size as u64)
            .read_to_end(&mut bytes)
            .map_err(|source| PacketError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let copied = bytes.len();
        bytes.resize(packet_size, 0);

        debug!(
            "Built {}-byte packet from {} ({} file bytes, {} padding)",
            packet_size,
            path.display(),
            copied,
            packet_size - copied
        );

        Ok(Packet::from_bytes(bytes))
    }
}

impl Default for PacketBuilder {
    fn default() -> Self {
        Self::new()
    }
}
