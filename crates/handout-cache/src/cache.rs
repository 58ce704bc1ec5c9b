//! The cache root: creates and enumerates contexts.

use std::fs;
use std::path::{Path, PathBuf};

use crate::context::Context;
use crate::error::{CacheError, CacheResult};

/// The asset cache: a registry of named [`Context`]s under one root
/// directory.
///
/// Create one per enclosing project and keep it for the process lifetime.
/// The root may only contain context directories; anything else found there
/// is reported as corruption. Contexts are durable on disk — a handle can be
/// re-derived at any time from the root and the context name.
#[derive(Debug)]
pub struct AssetCache {
    root: PathBuf,
}

impl AssetCache {
    /// Open the cache rooted at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> CacheResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// The cache root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create (or re-open) the context named `name`.
    ///
    /// Idempotent: the backing directory is created on first access and
    /// reused afterwards. Fails with
    /// [`InvalidName`](CacheError::InvalidName) if `name` is not a single
    /// path segment.
    pub fn create_context(&self, name: &str) -> CacheResult<Context> {
        Context::open(&self.root, name)
    }

    /// Names of all contexts in the cache, sorted.
    ///
    /// Fails with [`CorruptCache`](CacheError::CorruptCache) if the root
    /// contains anything other than context directories.
    pub fn list_context_names(&self) -> CacheResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let path = entry.path();
            if !fs::metadata(&path)?.is_dir() {
                return Err(CacheError::CorruptCache {
                    path,
                    reason: "non-directory entry at the cache root".to_string(),
                });
            }
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }
}
