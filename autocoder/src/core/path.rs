//! Lexical normalization of model-supplied project paths.

use std::path::Path;

/// Normalize a relative path to `/`-separated components.
///
/// - Backslashes are treated as separators.
/// - Empty and `.` segments are dropped; `..` pops the previous segment.
/// - Returns `None` when a `..` climbs above the starting directory.
///
/// An empty result means the path names the starting directory itself.
pub fn normalize_relative(raw: &str) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();
    for segment in raw.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    Some(parts.join("/"))
}

/// True when `path` is strictly below `root` (the root itself is not a descendant).
pub fn is_descendant(path: &Path, root: &Path) -> bool {
    path != root && path.starts_with(root)
}

/// Render a path relative to `root` with `/` separators.
pub fn to_posix_relative(path: &Path, root: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|component| component.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}
