//! Publishes scan progress without blocking the scanner.
//!
//! The scanner thread calls [`ProgressChannel::update`] at a capped rate;
//! readers call [`ProgressChannel::get_all`] from any thread via their own
//! short-lived catalog connection.

use std::sync::Arc;
use std::time::{Duration, Instant};

use sysinfo::{Pid, System};

use crate::catalog::{Catalog, ScanProgressRow};
use crate::error::CatalogError;

#[derive(Debug, Clone)]
pub struct ProgressSnapshot {
    pub path: String,
    pub pid: i64,
    pub started: f64,
    pub items_found: u64,
    pub items_per_sec: f64,
    pub error_count: u64,
    pub status: String,
}

impl From<ScanProgressRow> for ProgressSnapshot {
    fn from(row: ScanProgressRow) -> Self {
        ProgressSnapshot {
            path: row.path,
            pid: row.pid,
            started: row.started,
            items_found: row.items_found,
            items_per_sec: row.items_per_sec,
            error_count: row.error_count,
            status: row.status,
        }
    }
}

pub struct ProgressChannel {
    catalog: Arc<Catalog>,
    min_update_interval: Duration,
    last_update: std::sync::Mutex<Option<Instant>>,
}

impl ProgressChannel {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        ProgressChannel {
            catalog,
            min_update_interval: Duration::from_secs(1),
            last_update: std::sync::Mutex::new(None),
        }
    }

    pub fn start(&self, path: &str, pid: i64, started: f64) -> Result<(), CatalogError> {
        self.catalog.progress_start(path, pid, started)
    }

    /// Rate-limited to roughly once per second; callers may invoke this
    /// every loop iteration without flooding the catalog.
    pub fn update(&self, path: &str, items_found: u64, items_per_sec: f64, error_count: u64) -> Result<(), CatalogError> {
        let mut last = self.last_update.lock().unwrap();
        let now = Instant::now();
        if let Some(prev) = *last {
            if now.duration_since(prev) < self.min_update_interval {
                return Ok(());
            }
        }
        *last = Some(now);
        drop(last);
        self.catalog.progress_update(path, items_found, items_per_sec, error_count)
    }

    pub fn finish(&self, path: &str) -> Result<(), CatalogError> {
        self.catalog.progress_finish(path)
    }

    /// Snapshot of currently running scans, excluding (and opportunistically
    /// sweeping) rows whose recorded PID is no longer a live process.
    pub fn get_all(&self) -> Result<Vec<ProgressSnapshot>, CatalogError> {
        let rows = self.catalog.progress_get_all()?;
        let sys = System::new_all();

        let mut live = Vec::new();
        for row in rows {
            if sys.process(Pid::from_u32(row.pid.max(0) as u32)).is_some() {
                live.push(ProgressSnapshot::from(row));
            } else {
                log::debug!("sweeping stale scan_progress row for path {} (pid {} is gone)", row.path, row.pid);
                let _ = self.catalog.progress_delete(&row.path);
            }
        }
        Ok(live)
    }
}
