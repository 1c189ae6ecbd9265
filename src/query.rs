//! Answers subtree, history, and comparison queries against the catalog,
//! merging live directory listings when no scan covers the queried URI.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::blob;
use crate::cache::{ParquetCache, ResponseCache};
use crate::catalog::{Catalog, ScanRow};
use crate::entry::{is_descendant, is_self_or_descendant, relative_to, Entry, EntryKind};
use crate::error::QueryError;

pub const DEFAULT_DEPTH: u32 = 2;
pub const DEFAULT_MAX_ROWS: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Full,
    Partial,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanListItem {
    pub id: i64,
    pub path: String,
    pub time: f64,
    pub size: u64,
    pub n_children: u32,
    pub n_desc: u64,
    pub error_count: u64,
}

impl From<ScanRow> for ScanListItem {
    fn from(row: ScanRow) -> Self {
        ScanListItem {
            id: row.id,
            path: row.path,
            time: row.time,
            size: row.size,
            n_children: row.n_children,
            n_desc: row.n_desc,
            error_count: row.error_count,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtreeChild {
    pub name: String,
    pub uri: String,
    pub kind: EntryKind,
    pub size: u64,
    pub mtime: f64,
    pub n_desc: u64,
    pub n_children: u32,
    pub scanned: ScanStatus,
    pub patched: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtreeResponse {
    pub uri: String,
    pub root_size: u64,
    pub root_n_desc: u64,
    pub root_n_children: u32,
    pub children: Vec<SubtreeChild>,
    pub rows: Vec<Entry>,
    pub time: Option<f64>,
    pub scan_path: Option<String>,
    pub scan_status: ScanStatus,
    pub error_count: Option<u64>,
    pub error_paths: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanHistoryItem {
    pub id: i64,
    pub path: String,
    pub scan_path: String,
    pub time: f64,
    pub size: u64,
    pub n_desc: u64,
    pub n_children: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompareStatus {
    Added,
    Removed,
    Changed,
    Unchanged,
}

/// One comparison row, carrying only the fields that make sense for its
/// variant rather than a bag of `Option`s shared across all four.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum CompareRow {
    Added { name: String, uri: String, size: u64, n_desc: u64 },
    Removed { name: String, uri: String, size: u64, n_desc: u64 },
    Changed { name: String, uri: String, size_old: u64, n_desc_old: u64, size_delta: i64, n_desc_delta: i64 },
    Unchanged { name: String, uri: String, size: u64, n_desc: u64 },
}

impl CompareRow {
    pub fn name(&self) -> &str {
        match self {
            CompareRow::Added { name, .. }
            | CompareRow::Removed { name, .. }
            | CompareRow::Changed { name, .. }
            | CompareRow::Unchanged { name, .. } => name,
        }
    }

    pub fn status(&self) -> CompareStatus {
        match self {
            CompareRow::Added { .. } => CompareStatus::Added,
            CompareRow::Removed { .. } => CompareStatus::Removed,
            CompareRow::Changed { .. } => CompareStatus::Changed,
            CompareRow::Unchanged { .. } => CompareStatus::Unchanged,
        }
    }

    fn size_delta(&self) -> i64 {
        match self {
            CompareRow::Added { size, .. } => *size as i64,
            CompareRow::Removed { size, .. } => -(*size as i64),
            CompareRow::Changed { size_delta, .. } => *size_delta,
            CompareRow::Unchanged { .. } => 0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompareSummary {
    pub added: u64,
    pub removed: u64,
    pub changed: u64,
    pub unchanged: u64,
    pub total_size_delta: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompareResponse {
    pub uri: String,
    pub scan1: i64,
    pub scan2: i64,
    pub rows: Vec<CompareRow>,
    pub summary: CompareSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteResult {
    pub success: bool,
    pub path: String,
    pub deleted_size: u64,
    pub deleted_n_desc: u64,
}

/// A basic stat for one live directory child, as produced by a listing
/// source. Credential handling and the listing process invocation itself
/// are external collaborators; this trait is the seam.
pub trait LiveLister: Send + Sync {
    fn list_children(&self, uri: &str) -> Result<Vec<LiveChild>, QueryError>;
}

#[derive(Debug, Clone)]
pub struct LiveChild {
    pub name: String,
    pub uri: String,
    pub kind: EntryKind,
    pub size: u64,
    pub mtime: f64,
}

/// Lists the immediate children of a local directory via `read_dir`.
pub struct LocalFsLister;

impl LiveLister for LocalFsLister {
    fn list_children(&self, uri: &str) -> Result<Vec<LiveChild>, QueryError> {
        let read_dir = std::fs::read_dir(uri).map_err(|e| QueryError::NotFound(format!("{uri}: {e}")))?;
        let mut children = Vec::new();
        for entry in read_dir.flatten() {
            let path = entry.path();
            let meta = match entry.metadata() {
                Ok(m) => m,
                Err(_) => continue,
            };
            let kind = if meta.is_dir() { EntryKind::Dir } else { EntryKind::File };
            let mtime = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_secs_f64())
                .unwrap_or(0.0);
            children.push(LiveChild {
                name: entry.file_name().to_string_lossy().to_string(),
                uri: path.to_string_lossy().to_string(),
                kind,
                size: meta.len(),
                mtime,
            });
        }
        Ok(children)
    }
}

pub struct QueryService {
    catalog: Arc<Catalog>,
    scans_dir: PathBuf,
    parquet_cache: Arc<ParquetCache>,
    response_cache: ResponseCache<String>,
    lister: Arc<dyn LiveLister>,
}

impl QueryService {
    pub fn new(catalog: Arc<Catalog>, scans_dir: PathBuf, parquet_cache: Arc<ParquetCache>) -> Self {
        QueryService {
            catalog,
            scans_dir,
            parquet_cache,
            response_cache: ResponseCache::default(),
            lister: Arc::new(LocalFsLister),
        }
    }

    pub fn with_lister(mut self, lister: Arc<dyn LiveLister>) -> Self {
        self.lister = lister;
        self
    }

    pub fn list_scans(&self) -> Result<Vec<ScanListItem>, QueryError> {
        if let Some(cached) = self.response_cache.get("list-scans") {
            if let Ok(items) = serde_json::from_str(&cached) {
                return Ok(items);
            }
        }
        let items: Vec<ScanListItem> = self.catalog.list_scans()?.into_iter().map(ScanListItem::from).collect();
        if let Ok(json) = serde_json::to_string(&items) {
            self.response_cache.put("list-scans".into(), json);
        }
        Ok(items)
    }

    fn load_scan_table(&self, scan: &ScanRow, depth_range: Option<(u32, u32)>) -> Result<Arc<Vec<Entry>>, QueryError> {
        let blob_path = blob::blob_path(&self.scans_dir, &scan.blob);
        let blob_path_str = blob_path.to_string_lossy().to_string();
        let (lo, hi) = depth_range.unwrap_or((0, u32::MAX));
        if let Some(cached) = self.parquet_cache.get(&blob_path_str, lo, hi) {
            return Ok(cached);
        }
        let entries = blob::read_blob(&blob_path, depth_range)?;
        self.parquet_cache.put(&blob_path_str, lo, hi, entries.clone());
        Ok(Arc::new(entries))
    }

    pub fn get_scan(&self, uri: &str, scan_id: Option<i64>, depth: u32, max_rows: usize) -> Result<SubtreeResponse, QueryError> {
        let resolved = match scan_id {
            Some(id) => {
                let scan = self.catalog.get_scan(id)?.ok_or_else(|| QueryError::NotFound(format!("scan {id}")))?;
                if scan.path != uri && !is_descendant(uri, &scan.path) {
                    return Err(QueryError::BadRequest(format!("scan {id} does not cover {uri}")));
                }
                Some(scan)
            }
            None => self.catalog.find_covering_scan(uri)?,
        };

        match resolved {
            Some(scan) => self.slice_from_scan(&scan, uri, depth, max_rows),
            None => self.synthesize(uri, depth),
        }
    }

    fn slice_from_scan(&self, scan: &ScanRow, uri: &str, depth: u32, max_rows: usize) -> Result<SubtreeResponse, QueryError> {
        let viewed_depth = if uri == scan.path { 0 } else { Entry::depth_of(&relative_to(uri, &scan.path).unwrap_or_default()) };
        let max_depth = viewed_depth + depth;
        let table = self.load_scan_table(scan, Some((0, max_depth)))?;

        let rel_table: Vec<Entry> = if uri == scan.path {
            table.iter().cloned().collect()
        } else {
            table
                .iter()
                .filter(|e| is_self_or_descendant(&e.uri, uri))
                .map(|e| {
                    let rel_path = relative_to(&e.uri, uri).unwrap_or_else(|| e.path.clone());
                    let rel_parent = Entry::parent_of(&rel_path);
                    Entry {
                        path: rel_path.clone(),
                        parent: rel_parent,
                        uri: e.uri.clone(),
                        kind: e.kind,
                        size: e.size,
                        mtime: e.mtime,
                        n_desc: e.n_desc,
                        n_children: e.n_children,
                        depth: Entry::depth_of(&rel_path),
                    }
                })
                .collect()
        };

        let root = rel_table.iter().find(|e| e.path == ".").cloned().unwrap_or_else(|| synthetic_zero_root(uri));

        let mut children: Vec<SubtreeChild> = rel_table
            .iter()
            .filter(|e| is_direct_root_child(e))
            .map(|e| SubtreeChild {
                name: e.path.clone(),
                uri: e.uri.clone(),
                kind: e.kind,
                size: e.size,
                mtime: e.mtime,
                n_desc: e.n_desc,
                n_children: e.n_children,
                scanned: ScanStatus::Full,
                patched: false,
            })
            .collect();

        self.apply_fresher_child_patches(uri, scan.time, &mut children)?;

        let rows = cap_rows(rel_table, max_rows);

        Ok(SubtreeResponse {
            uri: uri.to_string(),
            root_size: root.size,
            root_n_desc: root.n_desc,
            root_n_children: root.n_children,
            children,
            rows,
            time: Some(scan.time),
            scan_path: Some(scan.path.clone()),
            scan_status: ScanStatus::Full,
            error_count: Some(scan.error_count),
            error_paths: if scan.error_paths.is_empty() { None } else { Some(scan.error_paths.clone()) },
        })
    }

    /// Replaces a direct child's stats with a strictly-newer scan of that
    /// child's own URI. Never applied transitively to grandchildren.
    fn apply_fresher_child_patches(&self, uri: &str, since: f64, children: &mut [SubtreeChild]) -> Result<(), QueryError> {
        let fresher = self.catalog.fresher_direct_children(uri, since)?;
        for fc in fresher {
            let name = fc.path.rsplit('/').next().unwrap_or(&fc.path).to_string();
            if let Some(child) = children.iter_mut().find(|c| c.name == name) {
                child.size = fc.size;
                child.n_desc = fc.n_desc;
                child.n_children = fc.n_children;
                child.scanned = ScanStatus::Full;
                child.patched = true;
            }
        }
        Ok(())
    }

    fn synthesize(&self, uri: &str, depth: u32) -> Result<SubtreeResponse, QueryError> {
        let live_children = self.lister.list_children(uri)?;
        let descendant_scans: Vec<ScanRow> = self
            .catalog
            .list_scans()?
            .into_iter()
            .filter(|s| s.path == uri || is_descendant(&s.path, uri))
            .collect();

        let mut total_size = 0u64;
        let mut total_n_desc = 0u64;
        let mut any_scanned = false;

        let children: Vec<SubtreeChild> = live_children
            .into_iter()
            .map(|lc| {
                let exact = descendant_scans.iter().find(|s| s.path == lc.uri);
                let has_descendant = descendant_scans.iter().any(|s| is_descendant(&s.path, &lc.uri));
                let (size, n_desc, n_children, scanned) = match exact {
                    Some(s) => {
                        any_scanned = true;
                        (s.size, s.n_desc, s.n_children, ScanStatus::Full)
                    }
                    None if has_descendant => {
                        any_scanned = true;
                        (lc.size, 1, 0, ScanStatus::Partial)
                    }
                    None => (lc.size, 1, 0, ScanStatus::None),
                };
                if matches!(scanned, ScanStatus::Full | ScanStatus::Partial) {
                    total_size += size;
                    total_n_desc += n_desc;
                }
                SubtreeChild {
                    name: lc.name,
                    uri: lc.uri,
                    kind: lc.kind,
                    size,
                    mtime: lc.mtime,
                    n_desc,
                    n_children,
                    scanned,
                    patched: false,
                }
            })
            .collect();

        let _ = depth;
        Ok(SubtreeResponse {
            uri: uri.to_string(),
            root_size: total_size,
            root_n_desc: total_n_desc,
            root_n_children: children.len() as u32,
            children,
            rows: Vec::new(),
            time: None,
            scan_path: None,
            scan_status: if any_scanned { ScanStatus::Partial } else { ScanStatus::None },
            error_count: None,
            error_paths: None,
        })
    }

    pub fn scan_history(&self, uri: &str) -> Result<Vec<ScanHistoryItem>, QueryError> {
        let mut items = Vec::new();
        for scan in self.catalog.scan_history(uri)? {
            if scan.path == uri {
                items.push(ScanHistoryItem {
                    id: scan.id,
                    path: scan.path.clone(),
                    scan_path: scan.path.clone(),
                    time: scan.time,
                    size: scan.size,
                    n_desc: scan.n_desc,
                    n_children: scan.n_children,
                });
            } else {
                let rel = relative_to(uri, &scan.path).unwrap_or_default();
                let target_depth = Entry::depth_of(&rel);
                let table = self.load_scan_table(&scan, Some((target_depth, target_depth)))?;
                if let Some(row) = table.iter().find(|e| e.path == rel) {
                    items.push(ScanHistoryItem {
                        id: scan.id,
                        path: uri.to_string(),
                        scan_path: scan.path.clone(),
                        time: scan.time,
                        size: row.size,
                        n_desc: row.n_desc,
                        n_children: row.n_children,
                    });
                }
            }
        }
        Ok(items)
    }

    pub fn compare(&self, uri: &str, scan1_id: i64, scan2_id: i64, depth: u32) -> Result<CompareResponse, QueryError> {
        let cache_key = format!("compare:{uri}:{scan1_id}:{scan2_id}:{depth}");
        if let Some(cached) = self.response_cache.get(&cache_key) {
            if let Ok(resp) = serde_json::from_str(&cached) {
                return Ok(resp);
            }
        }

        let scan1 = self.catalog.get_scan(scan1_id)?.ok_or_else(|| QueryError::NotFound(format!("scan {scan1_id}")))?;
        let scan2 = self.catalog.get_scan(scan2_id)?.ok_or_else(|| QueryError::NotFound(format!("scan {scan2_id}")))?;

        let children1 = self.compare_children(&scan1, uri, depth)?;
        let children2 = self.compare_children(&scan2, uri, depth)?;

        let names1: HashMap<&String, &Entry> = children1.iter().map(|(n, e)| (n, e)).collect();
        let names2: HashMap<&String, &Entry> = children2.iter().map(|(n, e)| (n, e)).collect();
        let set1: HashSet<&String> = names1.keys().copied().collect();
        let set2: HashSet<&String> = names2.keys().copied().collect();

        let mut rows = Vec::new();
        let mut summary = CompareSummary::default();

        for name in set1.difference(&set2) {
            let e = names1[*name];
            summary.removed += 1;
            summary.total_size_delta -= e.size as i64;
            rows.push(CompareRow::Removed { name: (*name).clone(), uri: e.uri.clone(), size: e.size, n_desc: e.n_desc });
        }
        for name in set2.difference(&set1) {
            let e = names2[*name];
            summary.added += 1;
            summary.total_size_delta += e.size as i64;
            rows.push(CompareRow::Added { name: (*name).clone(), uri: e.uri.clone(), size: e.size, n_desc: e.n_desc });
        }
        for name in set1.intersection(&set2) {
            let e1 = names1[*name];
            let e2 = names2[*name];
            let size_delta = e2.size as i64 - e1.size as i64;
            let n_desc_delta = e2.n_desc as i64 - e1.n_desc as i64;
            if size_delta != 0 || n_desc_delta != 0 {
                summary.changed += 1;
                summary.total_size_delta += size_delta;
                rows.push(CompareRow::Changed {
                    name: (*name).clone(),
                    uri: e2.uri.clone(),
                    size_old: e1.size,
                    n_desc_old: e1.n_desc,
                    size_delta,
                    n_desc_delta,
                });
            } else {
                summary.unchanged += 1;
                rows.push(CompareRow::Unchanged { name: (*name).clone(), uri: e2.uri.clone(), size: e2.size, n_desc: e2.n_desc });
            }
        }

        rows.sort_by(|a, b| b.size_delta().abs().cmp(&a.size_delta().abs()));

        let response = CompareResponse { uri: uri.to_string(), scan1: scan1_id, scan2: scan2_id, rows, summary };
        if let Ok(json) = serde_json::to_string(&response) {
            self.response_cache.put(cache_key, json);
        }
        Ok(response)
    }

    fn compare_children(&self, scan: &ScanRow, uri: &str, depth: u32) -> Result<Vec<(String, Entry)>, QueryError> {
        let viewed_depth = if uri == scan.path { 0 } else { Entry::depth_of(&relative_to(uri, &scan.path).unwrap_or_default()) };
        let table = self.load_scan_table(scan, Some((viewed_depth + depth, viewed_depth + depth)))?;
        let rel_prefix = if uri == scan.path { ".".to_string() } else { relative_to(uri, &scan.path).unwrap_or_default() };
        Ok(table
            .iter()
            .filter(|e| e.parent == rel_prefix)
            .map(|e| {
                let name = e.path.rsplit('/').next().unwrap_or(&e.path).to_string();
                (name, e.clone())
            })
            .collect())
    }

    /// Deletes a local path and rewrites every ancestor scan's blob to
    /// subtract the removed subtree. Succeeds even if a blob rewrite fails;
    /// the row is simply stale until the next scan.
    pub fn delete(&self, path: &str) -> Result<DeleteResult, QueryError> {
        if !path.starts_with('/') {
            return Err(QueryError::BadRequest("path must be absolute".into()));
        }
        let metadata = std::fs::symlink_metadata(path).map_err(|e| QueryError::NotFound(format!("{path}: {e}")))?;
        let (deleted_size, deleted_n_desc) = local_subtree_size(path, &metadata);

        if metadata.is_dir() {
            std::fs::remove_dir_all(path).map_err(QueryError::from_io)?;
        } else {
            std::fs::remove_file(path).map_err(QueryError::from_io)?;
        }

        for scan in self.catalog.list_scans()? {
            if is_descendant(path, &scan.path) {
                if let Err(e) = self.rewrite_ancestor_blob(&scan, path, deleted_size, deleted_n_desc) {
                    log::warn!("delete: failed to rewrite ancestor blob for scan {}: {e}", scan.id);
                }
            }
        }

        self.parquet_cache.clear();
        self.response_cache.clear();

        Ok(DeleteResult { success: true, path: path.to_string(), deleted_size, deleted_n_desc })
    }

    fn rewrite_ancestor_blob(&self, scan: &ScanRow, deleted_path: &str, deleted_size: u64, deleted_n_desc: u64) -> Result<(), QueryError> {
        let blob_path = blob::blob_path(&self.scans_dir, &scan.blob);
        let mut entries = blob::read_blob(&blob_path, None)?;
        let rel_deleted = relative_to(deleted_path, &scan.path).unwrap_or_default();

        entries.retain(|e| !is_self_or_descendant(&e.path, &rel_deleted));

        for e in entries.iter_mut() {
            if is_descendant(&rel_deleted, &e.path) || e.path == "." {
                e.size = e.size.saturating_sub(deleted_size);
                e.n_desc = e.n_desc.saturating_sub(deleted_n_desc);
                if Entry::parent_of(&rel_deleted) == e.path {
                    e.n_children = e.n_children.saturating_sub(1);
                }
            }
        }

        blob::write_blob(&blob_path, &entries)?;
        if let Some(root) = entries.iter().find(|e| e.path == ".") {
            self.catalog.update_scan_blob(scan.id, root.size, root.n_children, root.n_desc)?;
        }
        self.parquet_cache.invalidate_blob(&blob_path.to_string_lossy());
        Ok(())
    }
}

fn is_direct_root_child(e: &Entry) -> bool {
    e.path != "." && (e.parent == "." || (e.parent.is_empty() && e.depth == 1))
}

fn synthetic_zero_root(uri: &str) -> Entry {
    Entry { path: ".".into(), parent: String::new(), uri: uri.to_string(), kind: EntryKind::Dir, size: 0, mtime: 0.0, n_desc: 0, n_children: 0, depth: 0 }
}

/// Computes directory size on disk for the delete response, walking the
/// subtree synchronously; acceptable because delete is a rare, user-
/// initiated operation, not a hot path.
fn local_subtree_size(path: &str, metadata: &std::fs::Metadata) -> (u64, u64) {
    if metadata.is_file() {
        return (metadata.len(), 1);
    }
    let mut size = 0u64;
    let mut n_desc = 1u64;
    if let Ok(read_dir) = std::fs::read_dir(path) {
        for entry in read_dir.flatten() {
            if let Ok(child_meta) = entry.metadata() {
                let child_path = entry.path();
                let (child_size, child_n_desc) = local_subtree_size(&child_path.to_string_lossy(), &child_meta);
                size += child_size;
                n_desc += child_n_desc;
            }
        }
    }
    (size, n_desc)
}

/// Keeps the largest `max_rows` rows by size, re-includes every ancestor of
/// a kept row so the client's treemap has no dangling parents, and rolls
/// trimmed siblings into a synthetic `(other)` row per parent.
fn cap_rows(mut table: Vec<Entry>, max_rows: usize) -> Vec<Entry> {
    if table.len() <= max_rows {
        return table;
    }

    table.sort_by(|a, b| b.size.cmp(&a.size));
    let kept: Vec<Entry> = table.iter().take(max_rows).cloned().collect();
    let kept_paths: HashSet<String> = kept.iter().map(|e| e.path.clone()).collect();

    let mut result: HashMap<String, Entry> = kept.into_iter().map(|e| (e.path.clone(), e)).collect();

    // Re-include ancestors of every kept row.
    for path in kept_paths.iter().cloned().collect::<Vec<_>>() {
        let mut current = path;
        loop {
            let parent = Entry::parent_of(&current);
            if parent.is_empty() && current == "." {
                break;
            }
            if let Some(ancestor) = table.iter().find(|e| e.path == parent) {
                result.entry(parent.clone()).or_insert_with(|| ancestor.clone());
            }
            if parent == current || parent.is_empty() {
                break;
            }
            current = parent;
        }
    }

    // Roll up everything dropped into a synthetic "(other)" row per parent.
    let mut other_by_parent: HashMap<String, (u64, u64)> = HashMap::new();
    for e in &table {
        if !result.contains_key(&e.path) {
            let bucket = other_by_parent.entry(e.parent.clone()).or_insert((0, 0));
            bucket.0 += e.size;
            bucket.1 += 1;
        }
    }
    for (parent, (size, count)) in other_by_parent {
        if count == 0 {
            continue;
        }
        let depth = Entry::depth_of(&parent) + 1;
        let other_path = if parent == "." { "(other)".to_string() } else { format!("{parent}/(other)") };
        result.insert(
            other_path.clone(),
            Entry {
                path: other_path,
                parent,
                uri: String::new(),
                kind: EntryKind::File,
                size,
                mtime: 0.0,
                n_desc: count,
                n_children: 0,
                depth,
            },
        );
    }

    let mut out: Vec<Entry> = result.into_values().collect();
    out.sort_by(|a, b| a.depth.cmp(&b.depth).then_with(|| a.path.cmp(&b.path)));
    out
}

impl QueryError {
    fn from_io(err: std::io::Error) -> Self {
        QueryError::Catalog(crate::error::CatalogError::Io(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob;
    use crate::catalog::NewScan;
    use tempfile::tempdir;

    fn entries_for(root_uri: &str) -> Vec<Entry> {
        vec![
            Entry { path: ".".into(), parent: "".into(), uri: root_uri.into(), kind: EntryKind::Dir, size: 1000, mtime: 1.0, n_desc: 2, n_children: 1, depth: 0 },
            Entry { path: "child".into(), parent: ".".into(), uri: format!("{root_uri}/child"), kind: EntryKind::File, size: 500, mtime: 1.0, n_desc: 1, n_children: 0, depth: 1 },
        ]
    }

    fn setup(root_uri: &str) -> (tempfile::TempDir, QueryService) {
        let dir = tempdir().unwrap();
        let scans_dir = dir.path().join("scans");
        std::fs::create_dir_all(&scans_dir).unwrap();
        let blob_name = blob::new_blob_filename();
        blob::write_blob(&scans_dir.join(&blob_name), &entries_for(root_uri)).unwrap();

        let catalog = Arc::new(Catalog::open(&dir.path().join("catalog.sqlite")).unwrap());
        catalog
            .insert_scan(&NewScan { path: root_uri.into(), time: 1.0, blob: blob_name, error_count: 0, error_paths: vec![], size: 1000, n_children: 1, n_desc: 2 })
            .unwrap();

        let cache = Arc::new(ParquetCache::default());
        let svc = QueryService::new(catalog, scans_dir, cache);
        (dir, svc)
    }

    #[test]
    fn exact_match_subtree_returns_root_and_child() {
        let (_dir, svc) = setup("/t");
        let resp = svc.get_scan("/t", None, 2, 1000).unwrap();
        assert_eq!(resp.root_size, 1000);
        assert_eq!(resp.scan_status, ScanStatus::Full);
        assert_eq!(resp.children.len(), 1);
        assert_eq!(resp.children[0].name, "child");
        assert_eq!(resp.children[0].size, 500);
    }

    #[test]
    fn ancestor_subtree_uses_relative_names() {
        let (_dir, svc) = setup("/test");
        // query for a deeper uri than the scan root's direct children only
        let resp = svc.get_scan("/test", None, 2, 1000).unwrap();
        assert!(resp.children.iter().all(|c| !c.name.contains('/')));
    }

    #[test]
    fn compare_same_scan_is_a_no_op() {
        let (dir, svc) = setup("/t");
        let catalog = Catalog::open(&dir.path().join("catalog.sqlite")).unwrap();
        let id = catalog.list_scans().unwrap()[0].id;
        let resp = svc.compare("/t", id, id, 1).unwrap();
        assert_eq!(resp.summary.added, 0);
        assert_eq!(resp.summary.removed, 0);
        assert_eq!(resp.summary.total_size_delta, 0);
    }
}
