//! Resolves where the catalog and scan blobs live on disk.
//!
//! Unlike a process-wide singleton, [`Config`] is an explicit value the
//! caller constructs once and threads through to the rest of the core.

use std::path::PathBuf;

/// Overrides the config root; falls back to `~/.config/disk-tree`.
pub const ROOT_ENV_VAR: &str = "DISK_TREE_ROOT";

#[derive(Debug, Clone)]
pub struct Config {
    root: PathBuf,
}

impl Config {
    /// Resolves the root directory from `DISK_TREE_ROOT`, else
    /// `dirs::home_dir()/.config/disk-tree`.
    pub fn resolve() -> Self {
        let root = match std::env::var(ROOT_ENV_VAR) {
            Ok(val) if !val.is_empty() => PathBuf::from(val),
            _ => dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config")
                .join("disk-tree"),
        };
        Config { root }
    }

    pub fn from_root(root: PathBuf) -> Self {
        Config { root }
    }

    pub fn root_dir(&self) -> &std::path::Path {
        &self.root
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.root.join("catalog.sqlite")
    }

    pub fn scans_dir(&self) -> PathBuf {
        self.root.join("scans")
    }

    /// Ensures `root_dir()` and `scans_dir()` exist.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.scans_dir())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_override_wins() {
        // SAFETY: single-threaded test, no other code reads this var concurrently.
        unsafe { std::env::set_var(ROOT_ENV_VAR, "/tmp/disk-tree-test-root") };
        let cfg = Config::resolve();
        assert_eq!(cfg.root_dir(), std::path::Path::new("/tmp/disk-tree-test-root"));
        unsafe { std::env::remove_var(ROOT_ENV_VAR) };
    }

    #[test]
    fn derived_paths() {
        let cfg = Config::from_root(PathBuf::from("/tmp/xyz"));
        assert_eq!(cfg.catalog_path(), PathBuf::from("/tmp/xyz/catalog.sqlite"));
        assert_eq!(cfg.scans_dir(), PathBuf::from("/tmp/xyz/scans"));
    }
}
