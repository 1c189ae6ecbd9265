//! Rolls leaf records up into directory totals.
//!
//! The walker emits one record per file and, separately, one record per
//! directory it enumerated (so empty directories are represented). The
//! aggregator repeatedly collapses the deepest level into its parent,
//! merging a directory's own placeholder row with the rollup computed from
//! its children, until only the scan root remains. Rollups within a depth
//! level are computed in parallel, since sibling parents never share state.

use std::collections::HashMap;

use rayon::prelude::*;

use crate::entry::{Entry, EntryKind};
use crate::walker::WalkRecord;

/// Aggregates a flat record stream (relative to `root_uri`) into a sorted,
/// fully-populated table satisfying the scan invariants.
pub fn aggregate(root_uri: &str, records: &[WalkRecord]) -> Vec<Entry> {
    let mut by_path: HashMap<String, Entry> = HashMap::new();

    for rec in records {
        let path = relative_path(root_uri, &rec.uri);
        let size = match rec.kind {
            EntryKind::File => rec.size,
            EntryKind::Dir => 0,
        };
        by_path.insert(
            path.clone(),
            Entry {
                path: path.clone(),
                parent: Entry::parent_of(&path),
                uri: rec.uri.clone(),
                kind: rec.kind,
                size,
                mtime: rec.mtime,
                n_desc: 1,
                n_children: 0,
                depth: Entry::depth_of(&path),
            },
        );
    }

    if by_path.is_empty() {
        return vec![synthetic_root(root_uri)];
    }

    by_path.entry(".".to_string()).or_insert_with(|| Entry {
        path: ".".to_string(),
        parent: String::new(),
        uri: root_uri.to_string(),
        kind: EntryKind::Dir,
        size: 0,
        mtime: 0.0,
        n_desc: 1,
        n_children: 0,
        depth: 0,
    });

    let max_depth = by_path.values().map(|e| e.depth).max().unwrap_or(0);

    for depth in (1..=max_depth).rev() {
        let mut by_parent: HashMap<String, Vec<&Entry>> = HashMap::new();
        for e in by_path.values() {
            if e.depth == depth {
                by_parent.entry(Entry::parent_of(&e.path)).or_default().push(e);
            }
        }

        // Each parent's rollup is independent of every other parent's at this
        // depth, so wide directories (many siblings at the same level) fan
        // out across threads instead of folding serially.
        let rollups: HashMap<String, (u64, u64, f64, u32)> = by_parent
            .par_iter()
            .map(|(parent, children)| {
                let size: u64 = children.iter().map(|c| c.size).sum();
                let n_desc: u64 = children.iter().map(|c| c.n_desc).sum();
                let mtime = children.iter().map(|c| c.mtime).fold(f64::MIN, f64::max);
                let n_children = children.len() as u32;
                (parent.clone(), (size, n_desc, mtime, n_children))
            })
            .collect();

        for (parent_path, (size, n_desc, mtime, n_children)) in rollups {
            let parent_depth = Entry::depth_of(&parent_path);
            let entry = by_path.entry(parent_path.clone()).or_insert_with(|| Entry {
                path: parent_path.clone(),
                parent: Entry::parent_of(&parent_path),
                uri: format!("{}/{}", root_uri.trim_end_matches('/'), parent_path),
                kind: EntryKind::Dir,
                size: 0,
                mtime: 0.0,
                n_desc: 1,
                n_children: 0,
                depth: parent_depth,
            });
            entry.size = size;
            entry.n_desc = 1 + n_desc;
            entry.mtime = entry.mtime.max(mtime);
            entry.n_children = n_children;
        }
    }

    apply_root_child_convention(&mut by_path);

    let mut entries: Vec<Entry> = by_path.into_values().collect();
    entries.sort_by(|a, b| a.depth.cmp(&b.depth).then_with(|| a.path.cmp(&b.path)));
    entries
}

/// Historical asymmetry: direct child directories keep `parent = "."`;
/// direct child files get `parent = ""`, matching every blob already on
/// disk. Preserved rather than unified — see the Open Questions in
/// SPEC_FULL.md.
fn apply_root_child_convention(by_path: &mut HashMap<String, Entry>) {
    for entry in by_path.values_mut() {
        if entry.depth == 1 && entry.kind == EntryKind::File {
            entry.parent = String::new();
        }
    }
}

fn relative_path(root_uri: &str, uri: &str) -> String {
    if uri == root_uri {
        return ".".to_string();
    }
    let trimmed_root = root_uri.trim_end_matches('/');
    uri.strip_prefix(trimmed_root)
        .and_then(|rest| rest.strip_prefix('/'))
        .map(|rest| rest.to_string())
        .unwrap_or_else(|| uri.to_string())
}

fn synthetic_root(root_uri: &str) -> Entry {
    Entry {
        path: ".".to_string(),
        parent: String::new(),
        uri: root_uri.to_string(),
        kind: EntryKind::Dir,
        size: 0,
        mtime: 0.0,
        n_desc: 0,
        n_children: 0,
        depth: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(uri: &str, kind: EntryKind, size: u64, mtime: f64) -> WalkRecord {
        WalkRecord { uri: uri.to_string(), kind, size, mtime }
    }

    #[test]
    fn empty_input_yields_synthetic_root() {
        let entries = aggregate("/t", &[]);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, ".");
        assert_eq!(entries[0].size, 0);
    }

    #[test]
    fn rolls_up_sizes_and_counts() {
        let records = vec![
            rec("/t", EntryKind::Dir, 0, 1.0),
            rec("/t/child", EntryKind::Dir, 0, 2.0),
            rec("/t/child/a.txt", EntryKind::File, 100, 3.0),
            rec("/t/child/b.txt", EntryKind::File, 200, 2.5),
        ];
        let entries = aggregate("/t", &records);
        let root = entries.iter().find(|e| e.path == ".").unwrap();
        assert_eq!(root.size, 300);
        assert_eq!(root.n_desc, 4);
        assert_eq!(root.n_children, 1);

        let child = entries.iter().find(|e| e.path == "child").unwrap();
        assert_eq!(child.size, 300);
        assert_eq!(child.n_children, 2);
        assert_eq!(child.parent, ".");
        assert_eq!(child.mtime, 3.0);
    }

    #[test]
    fn direct_child_file_parent_is_empty_string() {
        let records = vec![rec("/t", EntryKind::Dir, 0, 1.0), rec("/t/a.txt", EntryKind::File, 10, 1.0)];
        let entries = aggregate("/t", &records);
        let file = entries.iter().find(|e| e.path == "a.txt").unwrap();
        assert_eq!(file.parent, "");
    }

    #[test]
    fn sorted_by_depth_then_path() {
        let records = vec![
            rec("/t", EntryKind::Dir, 0, 1.0),
            rec("/t/b", EntryKind::Dir, 0, 1.0),
            rec("/t/a", EntryKind::Dir, 0, 1.0),
            rec("/t/a/x.txt", EntryKind::File, 1, 1.0),
        ];
        let entries = aggregate("/t", &records);
        let paths: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec![".", "a", "b", "a/x.txt"]);
    }

    #[test]
    fn empty_directory_has_zero_stats() {
        let records = vec![rec("/t", EntryKind::Dir, 0, 1.0), rec("/t/empty", EntryKind::Dir, 0, 1.0)];
        let entries = aggregate("/t", &records);
        let empty = entries.iter().find(|e| e.path == "empty").unwrap();
        assert_eq!(empty.size, 0);
        assert_eq!(empty.n_desc, 1);
        assert_eq!(empty.n_children, 0);
    }
}
