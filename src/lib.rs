//! Disk usage scanning, aggregation, and historical scan querying.
//!
//! Three subsystems compose the core: [`walker`] enumerates a tree,
//! [`aggregator`] rolls leaves up into directory totals, and
//! [`catalog`] + [`blob`] persist and serve them back out through
//! [`query::QueryService`]. [`scanner::Scanner`] wires the first two
//! together; routing, CORS, and SSE transport for an HTTP front end are
//! left to the caller.

pub mod aggregator;
pub mod blob;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod entry;
pub mod error;
pub mod gc;
pub mod migration;
pub mod progress;
pub mod query;
pub mod scanner;
pub mod walker;

use std::sync::Arc;

use cache::ParquetCache;
use catalog::Catalog;
use config::Config;
use error::CatalogError;
use gc::GcService;
use progress::ProgressChannel;
use query::QueryService;
use scanner::Scanner;

/// Constructs and owns the pieces a caller needs, replacing the
/// process-wide singletons this was grounded on with an explicit value.
pub struct Core {
    pub config: Config,
    pub catalog: Arc<Catalog>,
    pub progress: Arc<ProgressChannel>,
    pub query: QueryService,
    pub gc: GcService,
    pub scanner: Scanner,
}

impl Core {
    pub fn open(config: Config) -> Result<Self, CatalogError> {
        config.ensure_dirs()?;
        let catalog = Arc::new(Catalog::open(&config.catalog_path())?);
        let progress = Arc::new(ProgressChannel::new(Arc::clone(&catalog)));
        let parquet_cache = Arc::new(ParquetCache::default());
        let query = QueryService::new(Arc::clone(&catalog), config.scans_dir(), Arc::clone(&parquet_cache));
        let gc = GcService::new(Arc::clone(&catalog), config.scans_dir());
        let scanner = Scanner::new(Arc::clone(&catalog), config.scans_dir(), Arc::clone(&progress));

        Ok(Core { config, catalog, progress, query, gc, scanner })
    }
}
