//! Name validation for contexts and assets.
//!
//! Every name stored in the cache must be exactly one path segment under
//! both POSIX and Windows conventions. This is the sole defense against a
//! caller escaping the cache directory, so the rules are deliberately
//! strict:
//!
//! - Must be non-empty
//! - Must not be `.` or `..`
//! - Must not contain `/`, `\`, or `:` (separators on either convention)
//! - Must not contain NUL

use crate::error::{CacheError, CacheResult};

/// Characters that act as path separators on POSIX or Windows.
const SEPARATORS: &[char] = &['/', '\\', ':'];

/// Validate an asset name, returning `Ok(())` if valid.
///
/// # Examples
///
/// ```
/// use handout_cache::names::validate_asset_name;
///
/// assert!(validate_asset_name("flag.txt").is_ok());
/// assert!(validate_asset_name("../flag.txt").is_err());
/// assert!(validate_asset_name("").is_err());
/// ```
pub fn validate_asset_name(name: &str) -> CacheResult<()> {
    validate_segment(name).map_err(|reason| CacheError::InvalidName {
        name: name.to_string(),
        reason,
    })
}

/// Validate a context name. Same rules as asset names.
pub fn validate_context_name(name: &str) -> CacheResult<()> {
    validate_segment(name).map_err(|reason| CacheError::InvalidName {
        name: name.to_string(),
        reason,
    })
}

/// Check that `name` is a single path segment on every platform.
fn validate_segment(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("name must not be empty".to_string());
    }

    // `.` and `..` are traversal segments, not names.
    if name == "." || name == ".." {
        return Err(format!("{name:?} is a relative traversal segment"));
    }

    for ch in SEPARATORS {
        if name.contains(*ch) {
            return Err(format!("contains forbidden character: {ch:?}"));
        }
    }

    if name.contains('\0') {
        return Err("contains NUL".to_string());
    }

    Ok(())
}
