//! Repository path handling
//!
//! Repository paths are `/`-separated UTF-8 strings. The canonical
//! internal form has no leading or trailing slash; the empty string is
//! the root directory. Component names are non-empty and compared
//! byte-exact.

use tessera_core::{Error, Result};

/// Normalize a path and split it into components
///
/// Accepts an optional leading slash and an optional trailing slash;
/// the root directory is `""` or `"/"`. Empty interior components
/// (`"a//b"`) are rejected.
pub fn split(path: &str) -> Result<Vec<&str>> {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    let trimmed = trimmed.strip_suffix('/').unwrap_or(trimmed);
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let components: Vec<&str> = trimmed.split('/').collect();
    if components.iter().any(|c| c.is_empty()) {
        return Err(Error::PathNotFound {
            path: path.to_string(),
        });
    }
    Ok(components)
}

/// Canonical form of a path: no leading or trailing slash
pub fn canonicalize(path: &str) -> Result<String> {
    Ok(split(path)?.join("/"))
}

/// Join a canonical parent path and a component name
pub fn join(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", parent, name)
    }
}

/// Split a canonical path into (parent, basename)
///
/// The root splits into `("", "")`.
pub fn split_dirname(path: &str) -> (&str, &str) {
    match path.rsplit_once('/') {
        Some((parent, name)) => (parent, name),
        None => ("", path),
    }
}
