//! The columnar row type shared by the aggregator, blob store, and query layer.

use serde::{Deserialize, Serialize};

/// One row of a scan: a file, a directory, or a synthesized object-store prefix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// Path relative to the scan root. The root itself is `"."`.
    pub path: String,
    /// Parent's relative path. The root's parent is `""`; see the asymmetric
    /// convention on direct children documented in `is_direct_root_child`.
    pub parent: String,
    /// Absolute external identifier: a local path or an `s3://bucket/key` URI.
    pub uri: String,
    pub kind: EntryKind,
    pub size: u64,
    pub mtime: f64,
    pub n_desc: u64,
    pub n_children: u32,
    pub depth: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Dir,
}

impl Entry {
    pub fn is_root(&self) -> bool {
        self.path == "."
    }

    /// Number of path components, used to derive `depth` from `path`.
    pub fn depth_of(path: &str) -> u32 {
        if path == "." {
            0
        } else {
            path.split('/').count() as u32
        }
    }

    /// Parent path of a relative path, following the scan's slash convention.
    pub fn parent_of(path: &str) -> String {
        match path.rsplit_once('/') {
            Some((parent, _)) => parent.to_string(),
            None if path == "." => String::new(),
            None => ".".to_string(),
        }
    }
}

/// Component-wise descendant test. Never use raw string prefix matching:
/// `a/b` is not a descendant of `a/b` alone matching `a/bc`'s bytes.
pub fn is_descendant(candidate: &str, ancestor: &str) -> bool {
    if ancestor.is_empty() || ancestor == "." {
        return candidate != ancestor;
    }
    if candidate == ancestor {
        return false;
    }
    candidate
        .strip_prefix(ancestor)
        .is_some_and(|rest| rest.starts_with('/'))
}

/// Component-wise self-or-descendant test, used for subtree slicing.
pub fn is_self_or_descendant(candidate: &str, ancestor: &str) -> bool {
    candidate == ancestor || is_descendant(candidate, ancestor)
}

/// Strips `prefix` from `uri`, returning the relative path, using the same
/// component-wise comparison as [`is_descendant`] rather than byte slicing.
pub fn relative_to(uri: &str, prefix: &str) -> Option<String> {
    if uri == prefix {
        return Some(".".to_string());
    }
    let trimmed = prefix.trim_end_matches('/');
    uri.strip_prefix(trimmed)
        .and_then(|rest| rest.strip_prefix('/'))
        .map(|rest| rest.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_of_root_is_zero() {
        assert_eq!(Entry::depth_of("."), 0);
        assert_eq!(Entry::depth_of("a"), 1);
        assert_eq!(Entry::depth_of("a/b"), 2);
    }

    #[test]
    fn parent_of_cases() {
        assert_eq!(Entry::parent_of("."), "");
        assert_eq!(Entry::parent_of("a"), ".");
        assert_eq!(Entry::parent_of("a/b"), "a");
    }

    #[test]
    fn is_descendant_rejects_sibling_with_shared_prefix() {
        // a/b must not be considered an ancestor of a/bc
        assert!(!is_descendant("a/bc", "a/b"));
        assert!(is_descendant("a/b/c", "a/b"));
        assert!(!is_descendant("a/b", "a/b"));
    }

    #[test]
    fn is_descendant_under_root() {
        assert!(is_descendant("child", "."));
        assert!(!is_descendant(".", "."));
    }

    #[test]
    fn relative_to_strips_component_wise() {
        assert_eq!(relative_to("/t/subdir/child1", "/t/subdir"), Some("child1".into()));
        assert_eq!(relative_to("/t/subdir", "/t/subdir"), Some(".".into()));
        assert_eq!(relative_to("/t/subdirectory", "/t/subdir"), None);
    }
}
