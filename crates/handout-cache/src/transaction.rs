//! Transactions: write-once declarations of a context's desired asset set.
//!
//! A [`Transaction`] collects `name -> (mtime, source)` entries and applies
//! them all at once on [`commit`](Transaction::commit), which runs the
//! diff/apply/prune reconciliation cycle:
//!
//! 1. Snapshot the context's current entries into a to-delete set.
//! 2. For each declared entry: create it if absent, overwrite it only if
//!    the declared mtime is strictly newer than the one on disk, and leave
//!    it untouched otherwise — without ever evaluating its content source.
//! 3. Delete whatever remains in the to-delete set.
//!
//! After commit the context's asset set equals exactly the declared set; an
//! empty transaction clears the context.

use std::collections::{BTreeMap, BTreeSet};
use std::ffi::{OsStr, OsString};
use std::fs;
use std::io;
use std::mem;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::debug;

use crate::context::{classify_entry, corrupt_entry, Context, EntryKind};
use crate::error::{CacheError, CacheResult};
use crate::manifest::ContextManifest;
use crate::names::validate_asset_name;
use crate::source::{AssetSource, ResolvedSource};

/// One declared asset: the caller's modification time plus a content source.
#[derive(Debug)]
struct PendingEntry {
    mtime: SystemTime,
    source: AssetSource,
}

/// A declarative, write-once update to a [`Context`].
///
/// Created through [`Context::transaction`]. Entries accumulate in memory;
/// no filesystem work happens until [`commit`](Transaction::commit), which
/// may be called exactly once. Dropping an uncommitted transaction releases
/// the context without touching the cache.
#[derive(Debug)]
pub struct Transaction<'a> {
    context: &'a Context,
    entries: BTreeMap<String, PendingEntry>,
    committed: bool,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(context: &'a Context) -> Self {
        Self {
            context,
            entries: BTreeMap::new(),
            committed: false,
        }
    }

    /// Number of declared assets.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no assets have been declared. Committing an empty
    /// transaction clears the context.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Declare an asset.
    ///
    /// `mtime` is the caller's notion of when the content was last modified;
    /// the reconciliation algorithm rewrites an existing asset only when the
    /// declared mtime is strictly newer than the one on disk. Redeclaring a
    /// name replaces the previous entry.
    pub fn add(
        &mut self,
        name: &str,
        mtime: SystemTime,
        source: impl Into<AssetSource>,
    ) -> CacheResult<()> {
        if self.committed {
            return Err(CacheError::TransactionClosed);
        }
        validate_asset_name(name)?;
        self.entries.insert(
            name.to_string(),
            PendingEntry {
                mtime,
                source: source.into(),
            },
        );
        Ok(())
    }

    /// Declare an asset backed by an existing file, using the file's own
    /// modification time.
    ///
    /// Unlike a path source passed to [`add`](Transaction::add) (which is
    /// checked lazily at commit), this fails up front with
    /// [`SourceMissing`](CacheError::SourceMissing) if `path` is not an
    /// existing regular file.
    pub fn add_file(&mut self, name: &str, path: impl Into<PathBuf>) -> CacheResult<()> {
        let path = path.into();
        let meta = match fs::metadata(&path) {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => return Err(CacheError::SourceMissing { path }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(CacheError::SourceMissing { path })
            }
            Err(e) => return Err(e.into()),
        };
        let mtime = meta.modified()?;
        self.add(name, mtime, AssetSource::Path(path))
    }

    /// Reconcile the context's storage with the declared asset set.
    ///
    /// The context is released before any I/O, so a new transaction can be
    /// opened as soon as this returns, and this transaction is inert either
    /// way. A [`SourceMissing`](CacheError::SourceMissing) discovered while
    /// resolving a source aborts the remaining work: entries already written
    /// stay written, nothing is pruned, and the manifest keeps its previous
    /// contents.
    pub fn commit(&mut self) -> CacheResult<()> {
        if self.committed {
            return Err(CacheError::TransactionClosed);
        }
        self.committed = true;
        self.context.release_transaction();

        let files_dir = self.context.files_dir();
        let mut to_delete: BTreeSet<OsString> = BTreeSet::new();
        for entry in fs::read_dir(files_dir)? {
            to_delete.insert(entry?.file_name());
        }

        let mut manifest = ContextManifest::new();
        let mut written = 0usize;
        let mut retained = 0usize;
        for (name, entry) in mem::take(&mut self.entries) {
            to_delete.remove(OsStr::new(&name));
            let target = files_dir.join(&name);
            let mtime = entry.mtime;
            match existing_mtime(&target)? {
                None => {
                    write_entry(&target, entry, false)?;
                    written += 1;
                }
                Some(disk_mtime) if mtime > disk_mtime => {
                    write_entry(&target, entry, true)?;
                    written += 1;
                }
                Some(_) => retained += 1,
            }
            manifest.assets.insert(name, mtime);
        }

        let mut deleted = 0usize;
        for name in to_delete {
            let path = files_dir.join(&name);
            match classify_entry(&path)? {
                EntryKind::File => {
                    fs::remove_file(&path)?;
                    deleted += 1;
                }
                kind => return Err(corrupt_entry(path, &kind)),
            }
        }

        manifest.save(&self.context.manifest_path())?;
        debug!(
            context = self.context.name(),
            written, retained, deleted, "transaction committed"
        );
        Ok(())
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.context.release_transaction();
        }
    }
}

/// Modification time of an existing asset, `None` if absent, or
/// [`CorruptCache`](CacheError::CorruptCache) if the entry is not a regular
/// file.
fn existing_mtime(target: &Path) -> CacheResult<Option<SystemTime>> {
    match fs::symlink_metadata(target) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
        Ok(_) => {}
    }
    match classify_entry(target)? {
        EntryKind::File => Ok(Some(fs::metadata(target)?.modified()?)),
        kind => Err(corrupt_entry(target.to_path_buf(), &kind)),
    }
}

/// Create or overwrite one asset from its resolved content source, then
/// stamp the declared mtime onto it.
fn write_entry(target: &Path, entry: PendingEntry, replace: bool) -> CacheResult<()> {
    let PendingEntry { mtime, source } = entry;

    // Remove the old entry first so we never write through a symlink and so
    // an asset can change kind between commits.
    if replace {
        fs::remove_file(target)?;
    }

    match source.resolve()? {
        ResolvedSource::Path(src) => {
            match fs::metadata(&src) {
                Ok(meta) if meta.is_file() => {}
                Ok(_) => return Err(CacheError::SourceMissing { path: src }),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    return Err(CacheError::SourceMissing { path: src })
                }
                Err(e) => return Err(e.into()),
            }
            symlink_file(&src, target)?;
        }
        ResolvedSource::Bytes(bytes) => {
            fs::write(target, &bytes)?;
        }
        ResolvedSource::Reader(mut reader) => {
            let mut out = fs::File::create(target)?;
            io::copy(&mut reader, &mut out)?;
        }
    }

    // Stamp the declared mtime, not the wall clock, so later transactions
    // compare against the caller's notion of freshness. Follows symlinks,
    // matching the stat-based comparison in `existing_mtime`.
    let file = fs::OpenOptions::new().write(true).open(target)?;
    file.set_times(fs::FileTimes::new().set_modified(mtime))?;
    Ok(())
}

#[cfg(unix)]
fn symlink_file(src: &Path, dst: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(src, dst)
}

#[cfg(windows)]
fn symlink_file(src: &Path, dst: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(src, dst)
}
