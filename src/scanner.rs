//! Orchestrates one scan end to end: walk, aggregate, write the blob,
//! record the catalog row, and publish progress throughout.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crate::aggregator;
use crate::blob;
use crate::catalog::{Catalog, NewScan};
use crate::error::{BlobError, CatalogError, WalkerError};
use crate::progress::ProgressChannel;
use crate::walker::local::{self, LocalWalkerConfig};
use crate::walker::object_store;
use crate::walker::{ErrorCollector, WalkRecord};

#[derive(Debug)]
pub enum ScanError {
    Walker(WalkerError),
    Blob(BlobError),
    Catalog(CatalogError),
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanError::Walker(e) => write!(f, "{e}"),
            ScanError::Blob(e) => write!(f, "{e}"),
            ScanError::Catalog(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ScanError {}

impl From<WalkerError> for ScanError {
    fn from(err: WalkerError) -> Self {
        ScanError::Walker(err)
    }
}

impl From<BlobError> for ScanError {
    fn from(err: BlobError) -> Self {
        ScanError::Blob(err)
    }
}

impl From<CatalogError> for ScanError {
    fn from(err: CatalogError) -> Self {
        ScanError::Catalog(err)
    }
}

pub enum ScanSource {
    Local(LocalWalkerConfig),
    /// A pre-fetched object-store listing. Invoking the store's listing
    /// process and resolving credentials is an external collaborator.
    ObjectStore { listing: String },
}

#[derive(Debug, Clone, Copy)]
pub struct ScanReport {
    pub scan_id: i64,
    pub elapsed_secs: f64,
    pub items_per_sec: f64,
    pub error_count: u64,
    pub blob_bytes: u64,
}

pub struct Scanner {
    catalog: Arc<Catalog>,
    scans_dir: PathBuf,
    progress: Arc<ProgressChannel>,
}

impl Scanner {
    pub fn new(catalog: Arc<Catalog>, scans_dir: PathBuf, progress: Arc<ProgressChannel>) -> Self {
        Scanner { catalog, scans_dir, progress }
    }

    pub fn run(&self, root_uri: &str, source: ScanSource) -> Result<ScanReport, ScanError> {
        let start = Instant::now();
        let now = epoch_secs();
        self.progress.start(root_uri, std::process::id() as i64, now)?;

        let (records, errors) = match self.collect_records(root_uri, source) {
            Ok(pair) => pair,
            Err(e) => {
                self.progress.finish(root_uri)?;
                return Err(e);
            }
        };

        self.progress.update(root_uri, records.len() as u64, 0.0, errors.total())?;

        let entries = aggregator::aggregate(root_uri, &records);
        let root = entries.iter().find(|e| e.path == ".").cloned();

        let blob_name = blob::new_blob_filename();
        let blob_path = blob::blob_path(&self.scans_dir, &blob_name);
        std::fs::create_dir_all(&self.scans_dir).map_err(|e| BlobError::Io(e))?;
        blob::write_blob(&blob_path, &entries)?;
        let blob_bytes = std::fs::metadata(&blob_path).map(|m| m.len()).unwrap_or(0);

        let (size, n_children, n_desc) = root.map(|r| (r.size, r.n_children, r.n_desc)).unwrap_or((0, 0, 0));

        let scan_id = self.catalog.insert_scan(&NewScan {
            path: root_uri.to_string(),
            time: now,
            blob: blob_name,
            error_count: errors.total(),
            error_paths: errors.paths().to_vec(),
            size,
            n_children,
            n_desc,
        })?;

        self.progress.finish(root_uri)?;

        let elapsed = start.elapsed().as_secs_f64();
        let items_per_sec = if elapsed > 0.0 { entries.len() as f64 / elapsed } else { 0.0 };

        Ok(ScanReport { scan_id, elapsed_secs: elapsed, items_per_sec, error_count: errors.total(), blob_bytes })
    }

    fn collect_records(&self, root_uri: &str, source: ScanSource) -> Result<(Vec<WalkRecord>, ErrorCollector), ScanError> {
        match source {
            ScanSource::Local(config) => {
                let result = local::walk(&config)?;
                Ok((result.records, result.errors))
            }
            ScanSource::ObjectStore { listing } => {
                let records = object_store::parse_listing(root_uri, &listing)?;
                Ok((records, ErrorCollector::new()))
            }
        }
    }
}

fn epoch_secs() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs_f64()).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn object_store_scan_produces_a_scan_row() {
        let dir = tempdir().unwrap();
        let catalog = Arc::new(Catalog::open(&dir.path().join("catalog.sqlite")).unwrap());
        let scans_dir = dir.path().join("scans");
        let progress = Arc::new(ProgressChannel::new(Arc::clone(&catalog)));
        let scanner = Scanner::new(Arc::clone(&catalog), scans_dir, progress);

        let listing = "2024-01-01 00:00:00 10 a.txt\n2024-01-01 00:00:00 20 dir/b.txt\n";
        let report = scanner.run("s3://bucket", ScanSource::ObjectStore { listing: listing.to_string() }).unwrap();
        assert_eq!(report.error_count, 0);

        let scan = catalog.get_scan(report.scan_id).unwrap().unwrap();
        assert_eq!(scan.size, 30);

        let blob_path = blob::blob_path(&dir.path().join("scans"), &scan.blob);
        let entries = blob::read_blob(&blob_path, None).unwrap();
        let file = entries.iter().find(|e| e.path == "a.txt").unwrap();
        assert_eq!(file.uri, "s3://bucket/a.txt");
    }

    #[test]
    fn empty_bucket_produces_zeroed_root() {
        let dir = tempdir().unwrap();
        let catalog = Arc::new(Catalog::open(&dir.path().join("catalog.sqlite")).unwrap());
        let scans_dir = dir.path().join("scans");
        let progress = Arc::new(ProgressChannel::new(Arc::clone(&catalog)));
        let scanner = Scanner::new(Arc::clone(&catalog), scans_dir, progress);

        let report = scanner.run("s3://empty-bucket", ScanSource::ObjectStore { listing: String::new() }).unwrap();
        let scan = catalog.get_scan(report.scan_id).unwrap().unwrap();
        assert_eq!(scan.size, 0);
        assert_eq!(scan.n_children, 0);
    }
}
