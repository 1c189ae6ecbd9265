//! Idempotent upgrades for catalog rows and blobs written before a schema
//! addition. Each routine can be run alone; neither depends on the other
//! having run first.

use std::path::Path;

use crate::blob;
use crate::catalog::Catalog;
use crate::entry::Entry;
use crate::error::{BlobError, CatalogError};

#[derive(Debug, Default, Clone, Copy)]
pub struct MigrationReport {
    pub updated: u64,
    pub skipped: u64,
    pub errors: u64,
}

/// Backfills a scan row's denormalised `size`/`n_children`/`n_desc` from
/// its blob's root row, for scans written before those columns existed.
pub fn backfill_root_stats(catalog: &Catalog, scans_dir: &Path) -> Result<MigrationReport, CatalogError> {
    let mut report = MigrationReport::default();
    for scan in catalog.list_scans()? {
        if scan.size != 0 || scan.n_desc != 0 {
            report.skipped += 1;
            continue;
        }
        let blob_path = blob::blob_path(scans_dir, &scan.blob);
        match blob::read_blob(&blob_path, None) {
            Ok(entries) => match find_root_row(&entries) {
                Some(root) => {
                    catalog.update_scan_blob(scan.id, root.size, root.n_children, root.n_desc)?;
                    report.updated += 1;
                }
                None => {
                    log::warn!("migration: blob {} for scan {} has no root row", scan.blob, scan.id);
                    report.errors += 1;
                }
            },
            Err(e) => {
                log::warn!("migration: failed to read blob {} for scan {}: {e}", scan.blob, scan.id);
                report.errors += 1;
            }
        }
    }
    Ok(report)
}

/// Legacy blobs identify their root row by `parent == ""`, falling back to
/// `path == "."` for even older object-store blobs.
fn find_root_row(entries: &[Entry]) -> Option<&Entry> {
    entries
        .iter()
        .find(|e| e.parent.is_empty() && e.path != "")
        .or_else(|| entries.iter().find(|e| e.path == "."))
}

/// Adds the `depth` column to a legacy blob and rewrites it sorted by
/// `(depth, path)`, enabling pushdown reads.
pub fn add_depth_column(blob_path: &Path) -> Result<MigrationReport, BlobError> {
    let mut report = MigrationReport::default();
    if blob::has_depth_column(blob_path)? {
        report.skipped += 1;
        return Ok(report);
    }

    let mut entries = blob::read_blob(blob_path, None)?;
    for entry in &mut entries {
        entry.depth = Entry::depth_of(&entry.path);
    }
    entries.sort_by(|a, b| a.depth.cmp(&b.depth).then_with(|| a.path.cmp(&b.path)));

    blob::write_blob(blob_path, &entries)?;
    report.updated += 1;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::NewScan;
    use crate::entry::EntryKind;
    use tempfile::tempdir;

    fn sample_entries() -> Vec<Entry> {
        vec![
            Entry { path: ".".into(), parent: "".into(), uri: "/t".into(), kind: EntryKind::Dir, size: 100, mtime: 1.0, n_desc: 2, n_children: 1, depth: 0 },
            Entry { path: "a.txt".into(), parent: "".into(), uri: "/t/a.txt".into(), kind: EntryKind::File, size: 100, mtime: 1.0, n_desc: 1, n_children: 0, depth: 1 },
        ]
    }

    #[test]
    fn backfill_updates_zeroed_scan_rows() {
        let dir = tempdir().unwrap();
        let scans_dir = dir.path().join("scans");
        std::fs::create_dir_all(&scans_dir).unwrap();
        let blob_name = blob::new_blob_filename();
        blob::write_blob(&scans_dir.join(&blob_name), &sample_entries()).unwrap();

        let catalog = Catalog::open(&dir.path().join("catalog.sqlite")).unwrap();
        catalog
            .insert_scan(&NewScan { path: "/t".into(), time: 1.0, blob: blob_name, error_count: 0, error_paths: vec![], size: 0, n_children: 0, n_desc: 0 })
            .unwrap();

        let report = backfill_root_stats(&catalog, &scans_dir).unwrap();
        assert_eq!(report.updated, 1);

        let scan = catalog.list_scans().unwrap().remove(0);
        assert_eq!(scan.size, 100);
        assert_eq!(scan.n_desc, 2);
    }

    #[test]
    fn add_depth_column_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("legacy.parquet");
        blob::write_blob(&path, &sample_entries()).unwrap();

        let first = add_depth_column(&path).unwrap();
        assert_eq!(first.skipped, 1); // depth column already present from write_blob

        let second = add_depth_column(&path).unwrap();
        assert_eq!(second.skipped, 1);
    }
}
