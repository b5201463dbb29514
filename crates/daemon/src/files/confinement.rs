//! Path confinement for remote paths.
//!
//! Remote paths are plain POSIX strings, so confinement is pure string
//! algebra: nothing here touches the remote side. A caller-supplied path is
//! always treated as relative to the root, normalized, and only then checked
//! against the root with a component-wise prefix test.

use thiserror::Error;

/// Errors produced while confining a path.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfinementError {
    /// The normalized path leaves the root.
    #[error("path outside confined root: {0}")]
    OutsideRoot(String),

    /// The path contains a NUL byte.
    #[error("path contains a NUL byte")]
    NulByte,
}

/// A path that has been normalized and verified to live under the root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedPath {
    absolute: String,
}

impl ResolvedPath {
    /// The absolute remote path.
    pub fn as_str(&self) -> &str {
        &self.absolute
    }

    /// Final path segment, or `/` for the filesystem root.
    pub fn file_name(&self) -> &str {
        file_name(&self.absolute)
    }

    /// Parent directory of this path.
    pub fn parent(&self) -> String {
        parent(&self.absolute)
    }

    /// Consume the resolved path, returning the absolute string.
    pub fn into_string(self) -> String {
        self.absolute
    }
}

impl std::fmt::Display for ResolvedPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.absolute)
    }
}

impl AsRef<str> for ResolvedPath {
    fn as_ref(&self) -> &str {
        &self.absolute
    }
}

/// Normalize a POSIX path lexically.
///
/// Collapses repeated separators, `.` segments and `..` segments. A `..` at
/// the top of an absolute path stays at `/`. An empty relative result is `.`.
pub fn normalize(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&last) if last != ".." => {
                    parts.pop();
                }
                _ if absolute => {}
                _ => parts.push(".."),
            },
            other => parts.push(other),
        }
    }

    let joined = parts.join("/");
    if absolute {
        format!("/{joined}")
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}

/// Whether `path` equals `root` or sits below it, compared by components.
///
/// Both arguments must already be normalized.
pub fn is_within(root: &str, path: &str) -> bool {
    if path == root {
        return true;
    }
    if root == "/" {
        return path.starts_with('/');
    }
    path.strip_prefix(root)
        .is_some_and(|rest| rest.starts_with('/'))
}

/// Resolve a caller-supplied path against the confinement root.
///
/// Leading separators on `relative` are stripped so that `/docs` means
/// `<root>/docs`. The confinement check runs on the normalized result.
pub fn resolve(root: &str, relative: &str) -> Result<ResolvedPath, ConfinementError> {
    if relative.contains('\0') {
        return Err(ConfinementError::NulByte);
    }

    let root = normalize(root);
    let relative = relative.trim_start_matches('/');
    let joined = normalize(&format!("{root}/{relative}"));

    if !is_within(&root, &joined) {
        return Err(ConfinementError::OutsideRoot(relative.to_string()));
    }

    Ok(ResolvedPath { absolute: joined })
}

/// Join a directory and an entry name.
pub fn join(dir: &str, name: &str) -> String {
    if dir.ends_with('/') {
        format!("{dir}{name}")
    } else {
        format!("{dir}/{name}")
    }
}

/// Final segment of a normalized absolute path.
pub fn file_name(path: &str) -> &str {
    match path.rsplit_once('/') {
        Some((_, "")) | None => "/",
        Some((_, name)) => name,
    }
}

/// Parent directory of a normalized absolute path.
pub fn parent(path: &str) -> String {
    match path.rsplit_once('/') {
        Some(("", _)) | None => "/".to_string(),
        Some((dir, _)) => dir.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_collapses_segments() {
        assert_eq!(normalize("/srv//data/./x/../y"), "/srv/data/y");
        assert_eq!(normalize("/srv/data/"), "/srv/data");
        assert_eq!(normalize("/"), "/");
        assert_eq!(normalize("/.."), "/");
        assert_eq!(normalize("/../../etc"), "/etc");
    }

    #[test]
    fn test_normalize_relative() {
        assert_eq!(normalize(""), ".");
        assert_eq!(normalize("./a/.."), ".");
        assert_eq!(normalize("../a"), "../a");
        assert_eq!(normalize("a/../../b"), "../b");
    }

    #[test]
    fn test_resolve_inside_root() {
        let resolved = resolve("/srv/data", "/docs/report.pdf").unwrap();
        assert_eq!(resolved.as_str(), "/srv/data/docs/report.pdf");

        let resolved = resolve("/srv/data", "docs/./a/../report.pdf").unwrap();
        assert_eq!(resolved.as_str(), "/srv/data/docs/report.pdf");
    }

    #[test]
    fn test_resolve_root_itself() {
        assert_eq!(resolve("/srv/data", "/").unwrap().as_str(), "/srv/data");
        assert_eq!(resolve("/srv/data", "").unwrap().as_str(), "/srv/data");
        assert_eq!(resolve("/srv/data/", "./").unwrap().as_str(), "/srv/data");
        assert_eq!(resolve("/srv/data", "a/..").unwrap().as_str(), "/srv/data");
    }

    #[test]
    fn test_resolve_traversal_rejected() {
        let result = resolve("/srv/data", "/uploads/../../etc/passwd");
        assert!(matches!(result, Err(ConfinementError::OutsideRoot(_))));

        let result = resolve("/srv/data", "../../etc/passwd");
        assert!(matches!(result, Err(ConfinementError::OutsideRoot(_))));

        let result = resolve("/srv/data", "..");
        assert!(matches!(result, Err(ConfinementError::OutsideRoot(_))));
    }

    #[test]
    fn test_resolve_sibling_with_shared_prefix_rejected() {
        // `/base2` shares a string prefix with `/base` but is not inside it.
        let result = resolve("/base", "../base2/file");
        assert!(matches!(result, Err(ConfinementError::OutsideRoot(_))));
    }

    #[test]
    fn test_resolve_leading_slashes_stay_relative() {
        let resolved = resolve("/srv/data", "//etc/passwd").unwrap();
        assert_eq!(resolved.as_str(), "/srv/data/etc/passwd");
    }

    #[test]
    fn test_resolve_unnormalized_root() {
        let resolved = resolve("/srv/./data//", "x").unwrap();
        assert_eq!(resolved.as_str(), "/srv/data/x");
    }

    #[test]
    fn test_resolve_filesystem_root() {
        assert_eq!(resolve("/", "etc").unwrap().as_str(), "/etc");
        assert_eq!(resolve("/", "../..").unwrap().as_str(), "/");
    }

    #[test]
    fn test_resolve_nul_byte() {
        assert_eq!(resolve("/srv", "a\0b"), Err(ConfinementError::NulByte));
    }

    #[test]
    fn test_climbing_inputs_always_rejected() {
        for depth in 1..6 {
            let climb = "../".repeat(depth + 2);
            let input = format!("{}etc", climb);
            assert!(resolve("/srv/data", &input).is_err(), "accepted {input}");
        }
    }

    #[test]
    fn test_is_within_component_prefix() {
        assert!(is_within("/base", "/base"));
        assert!(is_within("/base", "/base/x"));
        assert!(!is_within("/base", "/base2"));
        assert!(!is_within("/base", "/"));
        assert!(is_within("/", "/anything"));
    }

    #[test]
    fn test_file_name_and_parent() {
        let resolved = resolve("/srv/data", "docs/report.pdf").unwrap();
        assert_eq!(resolved.file_name(), "report.pdf");
        assert_eq!(resolved.parent(), "/srv/data/docs");

        assert_eq!(file_name("/"), "/");
        assert_eq!(parent("/top"), "/");
        assert_eq!(parent("/"), "/");
    }

    #[test]
    fn test_join() {
        assert_eq!(join("/a", "b"), "/a/b");
        assert_eq!(join("/", "b"), "/b");
    }
}
