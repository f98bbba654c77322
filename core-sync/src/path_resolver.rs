//! Safe path resolution
//!
//! Every path the engine touches on disk passes through here first. Checks
//! are lexical and performed before any filesystem access: null bytes and
//! `..` segments are rejected outright, whichever separator they hide behind.

use std::path::{Component, Path, PathBuf};

use crate::error::{Result, SyncError};

/// Resolves `candidate` against `allowed_root`.
///
/// Relative candidates are joined onto the root; absolute candidates must
/// already lie under it. `.` segments and repeated separators collapse.
pub fn resolve_safe_path(candidate: &str, allowed_root: &Path) -> Result<PathBuf> {
    reject_unsafe_segments(candidate)?;

    let root = normalize_lexically(allowed_root);
    let candidate_path = Path::new(candidate);
    let resolved = if candidate_path.is_absolute() {
        normalize_lexically(candidate_path)
    } else {
        normalize_lexically(&root.join(candidate_path))
    };

    if !resolved.starts_with(&root) {
        return Err(SyncError::PathTraversal(format!(
            "{} is outside {}",
            candidate,
            root.display()
        )));
    }

    Ok(resolved)
}

/// Validates one user-supplied mount directory.
pub fn validate_mount_root(path: &str) -> Result<PathBuf> {
    if path.trim().is_empty() {
        return Err(SyncError::PathTraversal("mount directory is blank".to_string()));
    }
    reject_unsafe_segments(path)?;

    let candidate = Path::new(path);
    if !candidate.is_absolute() {
        return Err(SyncError::PathTraversal(format!(
            "{} is not an absolute path",
            path
        )));
    }

    Ok(normalize_lexically(candidate))
}

/// Validates a mount request as a whole.
///
/// Any invalid entry rejects the request; the error lists every offending
/// entry verbatim, in input order. Valid entries are de-duplicated.
pub fn validate_mount_directories(directories: &[String]) -> Result<Vec<PathBuf>> {
    let mut valid: Vec<PathBuf> = Vec::new();
    let mut invalid = Vec::new();

    for directory in directories {
        match validate_mount_root(directory) {
            Ok(path) => {
                if !valid.contains(&path) {
                    valid.push(path);
                }
            }
            Err(_) => invalid.push(directory.clone()),
        }
    }

    if !invalid.is_empty() {
        return Err(SyncError::InvalidMountDirectories { invalid });
    }

    Ok(valid)
}

/// Path as a forward-slash string.
pub fn to_forward_slash(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// `path` relative to `root` in forward-slash form, `None` when outside.
pub fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let key = to_forward_slash(relative);
    if key.is_empty() {
        None
    } else {
        Some(key)
    }
}

fn reject_unsafe_segments(candidate: &str) -> Result<()> {
    if candidate.contains('\0') {
        return Err(SyncError::PathTraversal(
            "path contains a null byte".to_string(),
        ));
    }

    if candidate.split(['/', '\\']).any(|segment| segment == "..") {
        return Err(SyncError::PathTraversal(format!(
            "{} contains a parent directory segment",
            candidate
        )));
    }

    Ok(())
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}
