//! Path-safety validation for remote object keys.
//!
//! Every key is validated before any filesystem write. The checks are
//! purely lexical: nothing here reads the filesystem, so validation
//! cannot be confused by symlinks or files created between check and
//! write.

use std::path::{Component, Path, PathBuf};

use crate::error::{SyncError, SyncResult};

/// Resolves a remote object key to a local path under `root`.
///
/// The key is percent-decoded once, then rejected if it contains a `..`
/// segment, is an absolute path, is empty or whitespace-only, falls
/// outside the configured `prefix`, or normalizes to a path outside
/// `root`. Errors carry the original (undecoded) key.
pub fn resolve_local_path(key: &str, prefix: &str, root: &Path) -> SyncResult<PathBuf> {
    let decoded = urlencoding::decode(key)
        .map_err(|e| SyncError::traversal(key, format!("malformed percent-encoding: {e}")))?;

    if has_parent_segment(&decoded) {
        return Err(SyncError::traversal(key, "contains a '..' segment"));
    }
    if Path::new(decoded.as_ref()).is_absolute()
        || decoded.starts_with('/')
        || decoded.starts_with('\\')
    {
        return Err(SyncError::traversal(key, "absolute paths are not allowed"));
    }
    if decoded.trim().is_empty() {
        return Err(SyncError::traversal(key, "key is empty"));
    }

    let Some(remainder) = decoded.strip_prefix(prefix) else {
        return Err(SyncError::traversal(
            key,
            format!("outside the configured prefix {prefix:?}"),
        ));
    };
    let remainder = remainder.trim_start_matches(['/', '\\']);
    if remainder.trim().is_empty() {
        return Err(SyncError::traversal(key, "no path remains after the prefix"));
    }

    let normalized_root = normalize(root);
    let candidate = normalize(&normalized_root.join(remainder));
    if candidate == normalized_root || !candidate.starts_with(&normalized_root) {
        return Err(SyncError::traversal(key, "resolves outside the sync root"));
    }

    Ok(candidate)
}

/// True when any `/`- or `\`-separated segment of the key is `..`.
fn has_parent_segment(key: &str) -> bool {
    key.split(['/', '\\']).any(|segment| segment == "..")
}

/// Lexical normalization: folds `.` segments without touching the
/// filesystem. `..` segments never reach this point in validated keys;
/// any present in `root` itself pass through unchanged so both sides of
/// the containment check see the same shape.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            other => out.push(other),
        }
    }
    out
}
