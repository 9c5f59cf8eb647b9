//! Path normalization and resolution.
//!
//! Every path stored or emitted by the VFS is absolute, has no `.`/`..`
//! segments, no repeated separators and no trailing `/` except the root
//! itself. Normalization never fails: `..` above the root is dropped and an
//! empty path means the root.

/// Normalize a path.
///
/// ```
/// use vos_vfs::normalize_path;
///
/// assert_eq!(normalize_path("a/./b/../c/"), "/a/c");
/// assert_eq!(normalize_path("/../.."), "/");
/// assert_eq!(normalize_path(""), "/");
/// ```
pub fn normalize_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            name => parts.push(name),
        }
    }

    if parts.is_empty() {
        String::from("/")
    } else {
        let mut out = String::with_capacity(path.len() + 1);
        for part in parts {
            out.push('/');
            out.push_str(part);
        }
        out
    }
}

/// Parent of a normalized path. The parent of `/` is `/`.
pub fn parent_path(path: &str) -> String {
    match path.rfind('/') {
        Some(0) | None => String::from("/"),
        Some(idx) => String::from(&path[..idx]),
    }
}

/// Last segment of a normalized path. Empty for `/`.
pub fn filename(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Join a name onto a directory and normalize the result.
pub fn join_path(dir: &str, name: &str) -> String {
    normalize_path(&format!("{}/{}", dir, name))
}

/// True if `path` equals `ancestor` or lies beneath it. Both normalized.
pub fn is_within(ancestor: &str, path: &str) -> bool {
    relative_to(ancestor, path).is_some()
}

/// Path of `path` relative to `ancestor`, both normalized.
///
/// Returns `Some("")` when they are equal and `None` when `path` is outside.
pub fn relative_to<'a>(ancestor: &str, path: &'a str) -> Option<&'a str> {
    if ancestor == "/" {
        return Some(path.trim_start_matches('/'));
    }
    let rest = path.strip_prefix(ancestor)?;
    if rest.is_empty() {
        Some(rest)
    } else {
        rest.strip_prefix('/')
    }
}

/// Every ancestor of a normalized path, root first, excluding the path itself.
pub fn ancestors(path: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    out.push(String::from("/"));
    for segment in segments.iter().take(segments.len().saturating_sub(1)) {
        current.push('/');
        current.push_str(segment);
        out.push(current.clone());
    }
    if path == "/" {
        out.clear();
    }
    out
}
