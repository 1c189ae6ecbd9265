//! Removes superseded scan blobs for a path, opportunistically invoked at
//! scan completion. Idempotent: running twice with the same cutoff is a
//! no-op the second time.

use std::path::Path;
use std::sync::Arc;

use crate::blob;
use crate::catalog::Catalog;
use crate::error::CatalogError;

pub struct GcService {
    catalog: Arc<Catalog>,
    scans_dir: std::path::PathBuf,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct GcReport {
    pub deleted_scans: u64,
    pub deleted_blobs: u64,
}

impl GcService {
    pub fn new(catalog: Arc<Catalog>, scans_dir: std::path::PathBuf) -> Self {
        GcService { catalog, scans_dir }
    }

    pub fn collect(&self, path: &str, cutoff: f64) -> Result<GcReport, CatalogError> {
        let mut report = GcReport::default();
        for scan in self.catalog.scans_before(path, cutoff)? {
            let blob_path = blob::blob_path(&self.scans_dir, &scan.blob);
            if remove_blob_if_present(&blob_path) {
                report.deleted_blobs += 1;
            }
            self.catalog.delete_scan(scan.id)?;
            report.deleted_scans += 1;
        }
        Ok(report)
    }
}

fn remove_blob_if_present(path: &Path) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => {
            log::warn!("gc: failed to remove blob {}: {e}", path.display());
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::NewScan;
    use crate::entry::{Entry, EntryKind};
    use tempfile::tempdir;

    #[test]
    fn collect_is_idempotent() {
        let dir = tempdir().unwrap();
        let scans_dir = dir.path().join("scans");
        std::fs::create_dir_all(&scans_dir).unwrap();
        let blob_name = blob::new_blob_filename();
        let entries = vec![Entry { path: ".".into(), parent: "".into(), uri: "/t".into(), kind: EntryKind::Dir, size: 0, mtime: 0.0, n_desc: 1, n_children: 0, depth: 0 }];
        blob::write_blob(&scans_dir.join(&blob_name), &entries).unwrap();

        let catalog = Arc::new(Catalog::open(&dir.path().join("catalog.sqlite")).unwrap());
        catalog
            .insert_scan(&NewScan { path: "/t".into(), time: 1.0, blob: blob_name, error_count: 0, error_paths: vec![], size: 0, n_children: 0, n_desc: 1 })
            .unwrap();

        let gc = GcService::new(Arc::clone(&catalog), scans_dir);
        let first = gc.collect("/t", 2.0).unwrap();
        assert_eq!(first.deleted_scans, 1);

        let second = gc.collect("/t", 2.0).unwrap();
        assert_eq!(second.deleted_scans, 0);
        assert_eq!(second.deleted_blobs, 0);
    }
}
