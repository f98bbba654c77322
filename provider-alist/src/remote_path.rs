//! Remote path helpers.
//!
//! Remote paths are absolute, forward-slash separated, and carry no trailing
//! slash except for the root itself.

/// Normalizes a remote directory path (`""` and `"/"` become `/`).
pub fn normalize_dir(path: &str) -> String {
    let segments: Vec<&str> = path
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect();
    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segments.join("/"))
    }
}

/// Joins `name` onto the directory `dir`.
pub fn join(dir: &str, name: &str) -> String {
    let dir = normalize_dir(dir);
    let name = name.trim_matches('/');
    if name.is_empty() {
        dir
    } else if dir == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", dir, name)
    }
}

/// Splits a path into its parent directory and final segment.
pub fn split(path: &str) -> (String, String) {
    let normalized = normalize_dir(path);
    match normalized.rsplit_once('/') {
        Some(("", name)) => ("/".to_string(), name.to_string()),
        Some((parent, name)) => (parent.to_string(), name.to_string()),
        None => ("/".to_string(), normalized),
    }
}

/// `path` relative to `root`, or `None` when it lies outside.
pub fn strip_root<'a>(root: &str, path: &'a str) -> Option<&'a str> {
    if root == "/" {
        return path.strip_prefix('/');
    }
    path.strip_prefix(root)?.strip_prefix('/')
}

/// Percent-encodes every segment, keeping the separators.
pub fn encode_segments(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
