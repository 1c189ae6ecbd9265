//! SQLite-backed catalog of completed scans and their live progress rows.
//!
//! Opened in WAL mode so the progress writer thread and concurrent query
//! readers never block each other on the same file.

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::CatalogError;

pub const SCHEMA_VERSION: i64 = 1;

const CREATE_TABLES_SQL: &str = "
CREATE TABLE IF NOT EXISTS scan (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT NOT NULL,
    time REAL NOT NULL,
    blob TEXT NOT NULL,
    error_count INTEGER NOT NULL DEFAULT 0,
    error_paths TEXT NOT NULL DEFAULT '[]',
    size INTEGER NOT NULL DEFAULT 0,
    n_children INTEGER NOT NULL DEFAULT 0,
    n_desc INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS ix_scan_path_time ON scan(path, time);

CREATE TABLE IF NOT EXISTS scan_progress (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT NOT NULL UNIQUE,
    pid INTEGER NOT NULL,
    started REAL NOT NULL,
    items_found INTEGER NOT NULL DEFAULT 0,
    items_per_sec REAL NOT NULL DEFAULT 0,
    error_count INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'running'
);

CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
";

#[derive(Debug, Clone)]
pub struct ScanRow {
    pub id: i64,
    pub path: String,
    pub time: f64,
    pub blob: String,
    pub error_count: u64,
    pub error_paths: Vec<String>,
    pub size: u64,
    pub n_children: u32,
    pub n_desc: u64,
}

#[derive(Debug, Clone)]
pub struct NewScan {
    pub path: String,
    pub time: f64,
    pub blob: String,
    pub error_count: u64,
    pub error_paths: Vec<String>,
    pub size: u64,
    pub n_children: u32,
    pub n_desc: u64,
}

#[derive(Debug, Clone)]
pub struct ScanProgressRow {
    pub path: String,
    pub pid: i64,
    pub started: f64,
    pub items_found: u64,
    pub items_per_sec: f64,
    pub error_count: u64,
    pub status: String,
}

pub struct Catalog {
    db_path: std::path::PathBuf,
}

fn apply_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    Ok(())
}

impl Catalog {
    pub fn open(db_path: &Path) -> Result<Self, CatalogError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        apply_pragmas(&conn)?;
        conn.execute_batch(CREATE_TABLES_SQL)?;
        ensure_schema_version(&conn)?;
        Ok(Catalog { db_path: db_path.to_path_buf() })
    }

    fn connect(&self) -> Result<Connection, CatalogError> {
        let conn = Connection::open(&self.db_path)?;
        apply_pragmas(&conn)?;
        Ok(conn)
    }

    pub fn insert_scan(&self, scan: &NewScan) -> Result<i64, CatalogError> {
        let conn = self.connect()?;
        let error_paths = serde_json::to_string(&scan.error_paths).unwrap_or_else(|_| "[]".into());
        conn.execute(
            "INSERT INTO scan (path, time, blob, error_count, error_paths, size, n_children, n_desc)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                scan.path,
                scan.time,
                scan.blob,
                scan.error_count as i64,
                error_paths,
                scan.size as i64,
                scan.n_children as i64,
                scan.n_desc as i64,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_scan(&self, id: i64) -> Result<Option<ScanRow>, CatalogError> {
        let conn = self.connect()?;
        let row = conn
            .query_row("SELECT * FROM scan WHERE id = ?1", params![id], row_to_scan)
            .optional()?;
        Ok(row)
    }

    /// Most recent scan row for each distinct path, newest first.
    pub fn list_scans(&self) -> Result<Vec<ScanRow>, CatalogError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT s.* FROM scan s
             INNER JOIN (SELECT path, MAX(time) AS max_time FROM scan GROUP BY path) latest
               ON s.path = latest.path AND s.time = latest.max_time
             ORDER BY s.time DESC",
        )?;
        let rows = stmt.query_map([], row_to_scan)?.collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Every scan whose root is `path` or an ancestor of `path`, most
    /// recent first.
    pub fn scan_history(&self, path: &str) -> Result<Vec<ScanRow>, CatalogError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT * FROM scan WHERE path = ?1 ORDER BY time DESC")?;
        let mut rows = stmt.query_map(params![path], row_to_scan)?.collect::<Result<Vec<_>, _>>()?;

        for ancestor in ancestor_candidates(path) {
            let mut stmt = conn.prepare("SELECT * FROM scan WHERE path = ?1 ORDER BY time DESC")?;
            let ancestor_rows = stmt.query_map(params![ancestor], row_to_scan)?.collect::<Result<Vec<_>, _>>()?;
            rows.extend(ancestor_rows);
        }
        rows.sort_by(|a, b| b.time.partial_cmp(&a.time).unwrap_or(std::cmp::Ordering::Equal));
        Ok(rows)
    }

    /// Most recent scan whose root is `uri` or an ancestor of `uri`,
    /// testing candidates from `uri` upward.
    pub fn find_covering_scan(&self, uri: &str) -> Result<Option<ScanRow>, CatalogError> {
        let conn = self.connect()?;
        for candidate in std::iter::once(uri.to_string()).chain(ancestor_candidates(uri)) {
            let row = conn
                .query_row(
                    "SELECT * FROM scan WHERE path = ?1 ORDER BY time DESC LIMIT 1",
                    params![candidate],
                    row_to_scan,
                )
                .optional()?;
            if row.is_some() {
                return Ok(row);
            }
        }
        Ok(None)
    }

    /// Scans whose root is a direct child of `parent_path` and whose time
    /// is strictly newer than `since`. Intentionally non-transitive: a
    /// grandchild scan must never patch a direct child's stats.
    pub fn fresher_direct_children(&self, parent_path: &str, since: f64) -> Result<Vec<ScanRow>, CatalogError> {
        let conn = self.connect()?;
        let like_pattern = format!("{}/%", parent_path.trim_end_matches('/'));
        let mut stmt = conn.prepare(
            "SELECT s.* FROM scan s
             INNER JOIN (SELECT path, MAX(time) AS max_time FROM scan GROUP BY path) latest
               ON s.path = latest.path AND s.time = latest.max_time
             WHERE s.path LIKE ?1 AND s.path NOT LIKE ?2 AND s.time > ?3",
        )?;
        let grandchild_pattern = format!("{like_pattern}/%");
        let rows = stmt
            .query_map(params![like_pattern, grandchild_pattern, since], row_to_scan)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn delete_scan(&self, id: i64) -> Result<(), CatalogError> {
        let conn = self.connect()?;
        conn.execute("DELETE FROM scan WHERE id = ?1", params![id])?;
        Ok(())
    }

    pub fn update_scan_blob(&self, id: i64, size: u64, n_children: u32, n_desc: u64) -> Result<(), CatalogError> {
        let conn = self.connect()?;
        conn.execute(
            "UPDATE scan SET size = ?2, n_children = ?3, n_desc = ?4 WHERE id = ?1",
            params![id, size as i64, n_children as i64, n_desc as i64],
        )?;
        Ok(())
    }

    pub fn scans_before(&self, path: &str, cutoff: f64) -> Result<Vec<ScanRow>, CatalogError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT * FROM scan WHERE path = ?1 AND time < ?2")?;
        let rows = stmt.query_map(params![path, cutoff], row_to_scan)?.collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ---- scan_progress ----

    pub fn progress_start(&self, path: &str, pid: i64, started: f64) -> Result<(), CatalogError> {
        let conn = self.connect()?;
        conn.execute("DELETE FROM scan_progress WHERE path = ?1", params![path])?;
        conn.execute(
            "INSERT INTO scan_progress (path, pid, started, items_found, items_per_sec, error_count, status)
             VALUES (?1, ?2, ?3, 0, 0, 0, 'running')",
            params![path, pid, started],
        )?;
        Ok(())
    }

    pub fn progress_update(&self, path: &str, items_found: u64, items_per_sec: f64, error_count: u64) -> Result<(), CatalogError> {
        let conn = self.connect()?;
        conn.execute(
            "UPDATE scan_progress SET items_found = ?2, items_per_sec = ?3, error_count = ?4 WHERE path = ?1",
            params![path, items_found as i64, items_per_sec, error_count as i64],
        )?;
        Ok(())
    }

    pub fn progress_finish(&self, path: &str) -> Result<(), CatalogError> {
        let conn = self.connect()?;
        conn.execute("DELETE FROM scan_progress WHERE path = ?1", params![path])?;
        Ok(())
    }

    pub fn progress_get_all(&self) -> Result<Vec<ScanProgressRow>, CatalogError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT path, pid, started, items_found, items_per_sec, error_count, status FROM scan_progress")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(ScanProgressRow {
                    path: row.get(0)?,
                    pid: row.get(1)?,
                    started: row.get(2)?,
                    items_found: row.get::<_, i64>(3)? as u64,
                    items_per_sec: row.get(4)?,
                    error_count: row.get::<_, i64>(5)? as u64,
                    status: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn progress_delete(&self, path: &str) -> Result<(), CatalogError> {
        let conn = self.connect()?;
        conn.execute("DELETE FROM scan_progress WHERE path = ?1", params![path])?;
        Ok(())
    }
}

fn row_to_scan(row: &rusqlite::Row) -> rusqlite::Result<ScanRow> {
    let error_paths_json: String = row.get("error_paths")?;
    let error_paths: Vec<String> = serde_json::from_str(&error_paths_json).unwrap_or_default();
    Ok(ScanRow {
        id: row.get("id")?,
        path: row.get("path")?,
        time: row.get("time")?,
        blob: row.get("blob")?,
        error_count: row.get::<_, i64>("error_count")? as u64,
        error_paths,
        size: row.get::<_, i64>("size")? as u64,
        n_children: row.get::<_, i64>("n_children")? as u32,
        n_desc: row.get::<_, i64>("n_desc")? as u64,
    })
}

/// Ancestor paths of `path` from nearest to furthest, by repeated
/// dirname-style stripping, stopping at a fixed point.
fn ancestor_candidates(path: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = path.to_string();
    loop {
        let next = match current.rfind('/') {
            Some(0) => "/".to_string(),
            Some(pos) => current[..pos].to_string(),
            None => break,
        };
        if next == current {
            break;
        }
        out.push(next.clone());
        current = next;
    }
    out
}

fn ensure_schema_version(conn: &Connection) -> Result<(), CatalogError> {
    let existing: Option<String> = conn
        .query_row("SELECT value FROM meta WHERE key = 'schema_version'", [], |r| r.get(0))
        .optional()?;
    match existing {
        None => {
            conn.execute(
                "INSERT INTO meta (key, value) VALUES ('schema_version', ?1)",
                params![SCHEMA_VERSION.to_string()],
            )?;
        }
        Some(found) => {
            let found: i64 = found.parse().unwrap_or(0);
            if found != SCHEMA_VERSION {
                return Err(CatalogError::SchemaMismatch { expected: SCHEMA_VERSION, found });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn new_scan(path: &str, time: f64) -> NewScan {
        NewScan {
            path: path.to_string(),
            time,
            blob: format!("{path}.parquet"),
            error_count: 0,
            error_paths: vec![],
            size: 100,
            n_children: 1,
            n_desc: 2,
        }
    }

    #[test]
    fn insert_and_list_scans_returns_latest_per_path() {
        let dir = tempdir().unwrap();
        let cat = Catalog::open(&dir.path().join("catalog.sqlite")).unwrap();
        cat.insert_scan(&new_scan("/t", 1.0)).unwrap();
        cat.insert_scan(&new_scan("/t", 2.0)).unwrap();
        let scans = cat.list_scans().unwrap();
        assert_eq!(scans.len(), 1);
        assert_eq!(scans[0].time, 2.0);
    }

    #[test]
    fn ancestor_search_finds_covering_scan() {
        let dir = tempdir().unwrap();
        let cat = Catalog::open(&dir.path().join("catalog.sqlite")).unwrap();
        cat.insert_scan(&new_scan("/a/b", 1.0)).unwrap();
        let found = cat.find_covering_scan("/a/b/c/d").unwrap().unwrap();
        assert_eq!(found.path, "/a/b");
    }

    #[test]
    fn fresher_direct_children_excludes_grandchildren() {
        let dir = tempdir().unwrap();
        let cat = Catalog::open(&dir.path().join("catalog.sqlite")).unwrap();
        cat.insert_scan(&new_scan("/p", 1.0)).unwrap();
        cat.insert_scan(&new_scan("/p/child", 2.0)).unwrap();
        cat.insert_scan(&new_scan("/p/child/grandchild", 3.0)).unwrap();

        let fresher = cat.fresher_direct_children("/p", 1.0).unwrap();
        assert_eq!(fresher.len(), 1);
        assert_eq!(fresher[0].path, "/p/child");
    }

    #[test]
    fn progress_lifecycle() {
        let dir = tempdir().unwrap();
        let cat = Catalog::open(&dir.path().join("catalog.sqlite")).unwrap();
        cat.progress_start("/scan/path", 1234, 10.0).unwrap();
        cat.progress_update("/scan/path", 50, 5.0, 0).unwrap();
        let all = cat.progress_get_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].items_found, 50);
        cat.progress_finish("/scan/path").unwrap();
        assert!(cat.progress_get_all().unwrap().is_empty());
    }

    #[test]
    fn schema_version_recorded_on_first_open() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("catalog.sqlite");
        Catalog::open(&db_path).unwrap();
        // Re-opening with the same version succeeds.
        Catalog::open(&db_path).unwrap();
    }
}
