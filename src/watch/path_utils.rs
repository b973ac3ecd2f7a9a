// src/watch/path_utils.rs

//! Path helpers shared by the watcher, the registry and the dev server.

use std::path::{Component, Path, PathBuf};

/// Convert a path into a string relative to `root`, with forward slashes.
///
/// A direct `strip_prefix(root)` is tried first; if that fails (symlinks,
/// `/private/var` vs `/var` on macOS) both paths are canonicalized and the
/// strip is retried.
///
/// Returns `None` if the path cannot be related to `root`.
pub fn relative_str(root: &Path, path: &Path) -> Option<String> {
    if let Ok(rel) = path.strip_prefix(root) {
        return Some(slash_string(rel));
    }

    if let (Ok(root_canon), Ok(path_canon)) = (root.canonicalize(), path.canonicalize()) {
        if let Ok(rel) = path_canon.strip_prefix(&root_canon) {
            return Some(slash_string(rel));
        }
    }

    None
}

fn slash_string(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Lexically normalise a path: drop `.` components and fold `..` into
/// their parent. Does not touch the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// True if either path contains the other (or they are equal), after
/// lexical normalisation.
pub fn paths_overlap(a: &Path, b: &Path) -> bool {
    let a = normalize(a);
    let b = normalize(b);
    a.starts_with(&b) || b.starts_with(&a)
}

/// URL path (leading slash) of `path` as served from `serve_root`.
pub fn url_path(serve_root: &Path, path: &Path) -> Option<String> {
    relative_str(serve_root, path).map(|rel| format!("/{}", rel.trim_start_matches('/')))
}
