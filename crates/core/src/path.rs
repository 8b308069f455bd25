//! Path normalization helpers
//!
//! Every path that crosses a crate boundary is a root-relative string with
//! `/` separators and no leading `./` components. The root itself is `.`.

use std::path::{Component, Path};

/// Key used for the watch root
pub const ROOT: &str = ".";

/// Normalize a relative path
///
/// Strips every leading `./` component and joins the rest with `/`.
/// Idempotent: normalizing an already-normalized path returns it unchanged.
pub fn normalize(path: &Path) -> String {
    let mut parts = Vec::new();
    let mut leading = true;

    for component in path.components() {
        match component {
            Component::CurDir if leading => continue,
            other => {
                leading = false;
                parts.push(other.as_os_str().to_string_lossy());
            }
        }
    }

    if parts.is_empty() {
        return ROOT.to_string();
    }
    parts.join("/")
}

/// Normalize `path` relative to `root`
///
/// Returns `None` when `path` does not live under `root`.
pub fn relative_to(root: &Path, path: &Path) -> Option<String> {
    path.strip_prefix(root).ok().map(normalize)
}

/// Check whether `path` equals `parent` or lies beneath it
///
/// Matches on a separator boundary, so `a` is not a parent of `ab`.
pub fn is_within(parent: &str, path: &str) -> bool {
    if parent == ROOT {
        return true;
    }
    match path.strip_prefix(parent) {
        Some("") => true,
        Some(rest) => rest.starts_with('/'),
        None => false,
    }
}
