//! Error types for each subsystem, plus the top-level kind classification
//! the library surface exposes so a thin HTTP layer can map errors to
//! status codes without depending on this crate's internals.

use std::fmt;

#[derive(Debug)]
pub enum WalkerError {
    Io(std::io::Error),
    SpawnFailed(String),
    Timeout(String),
}

impl fmt::Display for WalkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalkerError::Io(e) => write!(f, "I/O error: {e}"),
            WalkerError::SpawnFailed(msg) => write!(f, "failed to spawn enumerator: {msg}"),
            WalkerError::Timeout(msg) => write!(f, "enumerator timed out: {msg}"),
        }
    }
}

impl std::error::Error for WalkerError {}

impl From<std::io::Error> for WalkerError {
    fn from(err: std::io::Error) -> Self {
        WalkerError::Io(err)
    }
}

#[derive(Debug)]
pub enum BlobError {
    Io(std::io::Error),
    Parquet(parquet::errors::ParquetError),
    MissingColumn(String),
    SchemaMismatch(String),
}

impl fmt::Display for BlobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlobError::Io(e) => write!(f, "I/O error: {e}"),
            BlobError::Parquet(e) => write!(f, "parquet error: {e}"),
            BlobError::MissingColumn(name) => write!(f, "blob missing column: {name}"),
            BlobError::SchemaMismatch(msg) => write!(f, "blob schema mismatch: {msg}"),
        }
    }
}

impl std::error::Error for BlobError {}

impl From<std::io::Error> for BlobError {
    fn from(err: std::io::Error) -> Self {
        BlobError::Io(err)
    }
}

impl From<parquet::errors::ParquetError> for BlobError {
    fn from(err: parquet::errors::ParquetError) -> Self {
        BlobError::Parquet(err)
    }
}

#[derive(Debug)]
pub enum CatalogError {
    Sqlite(rusqlite::Error),
    Io(std::io::Error),
    SchemaMismatch { expected: i64, found: i64 },
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogError::Sqlite(e) => write!(f, "sqlite error: {e}"),
            CatalogError::Io(e) => write!(f, "I/O error: {e}"),
            CatalogError::SchemaMismatch { expected, found } => {
                write!(f, "schema version mismatch: expected {expected}, found {found}")
            }
        }
    }
}

impl std::error::Error for CatalogError {}

impl From<rusqlite::Error> for CatalogError {
    fn from(err: rusqlite::Error) -> Self {
        CatalogError::Sqlite(err)
    }
}

impl From<std::io::Error> for CatalogError {
    fn from(err: std::io::Error) -> Self {
        CatalogError::Io(err)
    }
}

#[derive(Debug)]
pub enum QueryError {
    NotFound(String),
    BadRequest(String),
    Timeout(String),
    Catalog(CatalogError),
    Blob(BlobError),
    Walker(WalkerError),
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryError::NotFound(msg) => write!(f, "not found: {msg}"),
            QueryError::BadRequest(msg) => write!(f, "bad request: {msg}"),
            QueryError::Timeout(msg) => write!(f, "timeout: {msg}"),
            QueryError::Catalog(e) => write!(f, "{e}"),
            QueryError::Blob(e) => write!(f, "{e}"),
            QueryError::Walker(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for QueryError {}

impl From<CatalogError> for QueryError {
    fn from(err: CatalogError) -> Self {
        QueryError::Catalog(err)
    }
}

impl From<BlobError> for QueryError {
    fn from(err: BlobError) -> Self {
        QueryError::Blob(err)
    }
}

impl From<WalkerError> for QueryError {
    fn from(err: WalkerError) -> Self {
        QueryError::Walker(err)
    }
}

/// Error-kind classification from the error taxonomy, stable across
/// subsystem error types so a caller can map to a transport status
/// without matching on this crate's internal enums.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    BadRequest,
    Timeout,
    Internal,
}

impl QueryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            QueryError::NotFound(_) => ErrorKind::NotFound,
            QueryError::BadRequest(_) => ErrorKind::BadRequest,
            QueryError::Timeout(_) => ErrorKind::Timeout,
            QueryError::Catalog(_) | QueryError::Blob(_) | QueryError::Walker(_) => ErrorKind::Internal,
        }
    }
}
