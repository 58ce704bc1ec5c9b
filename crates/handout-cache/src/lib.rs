//! Transactional on-disk asset cache for the handout pipeline.
//!
//! A caller declares the complete desired set of named files for a
//! namespace (a [`Context`]) and commits; the cache reconciles that
//! declaration against its storage directory — writing new or newer
//! entries, leaving unchanged ones untouched, and deleting anything no
//! longer declared.
//!
//! # Key Types
//!
//! - [`AssetCache`] — registry of contexts under one root directory
//! - [`Context`] — one namespace: listing, retrieval, clearing, maintenance
//! - [`Transaction`] — write-once declaration of a context's next asset set
//! - [`AssetSource`] — where an asset's bytes come from: an existing file,
//!   an in-memory buffer, a byte stream, or a lazy producer
//!
//! # Design Rules
//!
//! 1. Commit provides set-replacement semantics: afterwards the context
//!    holds exactly the declared set. An empty transaction clears it.
//! 2. An existing asset is rewritten only when its declared mtime is
//!    strictly newer than the one on disk; otherwise its content source is
//!    never evaluated. Unchanged assets cost zero I/O.
//! 3. Path sources are stored as symlinks: cheap for large files, but the
//!    cache is not a content snapshot for them.
//! 4. One transaction per context at a time — rejected, never queued.
//! 5. All work is synchronous; when `commit` returns, the disk matches the
//!    declaration.
//! 6. Entries the cache did not create are corruption: detected and
//!    reported, never silently repaired. Only `clear` and a non-checking
//!    `sync` remove them, each with a warning.
//!
//! # Layout
//!
//! ```text
//! <cache-root>/<context-name>/files/<asset-name>   # file or symlink
//! <cache-root>/<context-name>/manifest.json        # committed set
//! ```

pub mod cache;
pub mod context;
pub mod error;
pub mod manifest;
pub mod names;
pub mod source;
pub mod transaction;

// Re-export primary types at crate root for ergonomic imports.
pub use cache::AssetCache;
pub use context::Context;
pub use error::{CacheError, CacheResult};
pub use manifest::{ContextManifest, MANIFEST_VERSION};
pub use names::{validate_asset_name, validate_context_name};
pub use source::{AssetSource, LazySource};
pub use transaction::Transaction;
