//! Content sources: the ways an asset's bytes can be obtained.
//!
//! An [`AssetSource`] is declared when an asset is added to a transaction,
//! but nothing is read, copied, or invoked until the reconciliation
//! algorithm decides the asset actually needs to be written. Lazy producers
//! in particular are evaluated at most once, and only when their output
//! would be used.

use std::fmt;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use crate::error::CacheResult;

/// A producer invoked at most once to yield a content source on demand.
pub type LazySource = Box<dyn FnOnce() -> io::Result<AssetSource> + Send>;

/// The origin of an asset's bytes.
///
/// The four variants are the closed set of source kinds the cache accepts;
/// resolution collapses them to a concrete kind when a write is needed.
pub enum AssetSource {
    /// An existing file on disk. Materialized as a symbolic link into the
    /// cache, so large files cost nothing to store and later edits to the
    /// source propagate without a re-copy. The flip side: the cache is not
    /// a content snapshot for this source kind.
    Path(PathBuf),

    /// In-memory bytes, copied verbatim into a regular file.
    Bytes(Vec<u8>),

    /// A readable byte stream, drained into a regular file. The reader is
    /// dropped as soon as the copy finishes.
    Reader(Box<dyn Read + Send>),

    /// A producer returning one of the other kinds, invoked only if the
    /// entry is actually written.
    Lazy(LazySource),
}

/// A content source with all lazy producers evaluated away.
pub(crate) enum ResolvedSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
    Reader(Box<dyn Read + Send>),
}

impl AssetSource {
    /// Source backed by an existing file on disk.
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    /// Source backed by an in-memory byte buffer.
    pub fn bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::Bytes(bytes.into())
    }

    /// Source backed by a readable byte stream.
    pub fn reader(reader: impl Read + Send + 'static) -> Self {
        Self::Reader(Box::new(reader))
    }

    /// Source produced on demand by a fallible thunk.
    pub fn lazy(producer: impl FnOnce() -> io::Result<AssetSource> + Send + 'static) -> Self {
        Self::Lazy(Box::new(producer))
    }

    /// Evaluate lazy producers until a concrete source kind remains.
    ///
    /// Consumes the source: readers and producers are single-use.
    pub(crate) fn resolve(self) -> CacheResult<ResolvedSource> {
        let mut source = self;
        loop {
            source = match source {
                Self::Path(path) => return Ok(ResolvedSource::Path(path)),
                Self::Bytes(bytes) => return Ok(ResolvedSource::Bytes(bytes)),
                Self::Reader(reader) => return Ok(ResolvedSource::Reader(reader)),
                Self::Lazy(producer) => producer()?,
            };
        }
    }
}

impl fmt::Debug for AssetSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Self::Bytes(bytes) => f.debug_struct("Bytes").field("len", &bytes.len()).finish(),
            Self::Reader(_) => f.write_str("Reader(..)"),
            Self::Lazy(_) => f.write_str("Lazy(..)"),
        }
    }
}

impl From<PathBuf> for AssetSource {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<&Path> for AssetSource {
    fn from(path: &Path) -> Self {
        Self::Path(path.to_path_buf())
    }
}

impl From<Vec<u8>> for AssetSource {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<&[u8]> for AssetSource {
    fn from(bytes: &[u8]) -> Self {
        Self::Bytes(bytes.to_vec())
    }
}
