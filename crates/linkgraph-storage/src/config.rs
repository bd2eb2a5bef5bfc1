//! Store configuration: picking a backend by URI.
//!
//! Supported URIs:
//! - `memory://`: a fresh [`InMemoryGraph`]
//! - `sqlite::memory:`: a private in-memory SQLite database
//! - `sqlite://<path>`: a SQLite database file, created if missing

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::StorageError;
use crate::memory::InMemoryGraph;
use crate::schema::DEFAULT_BUSY_TIMEOUT;
use crate::sqlite::SqliteGraph;
use crate::traits::Graph;

/// Rows fetched per round trip by SQLite range scans.
pub const DEFAULT_PAGE_SIZE: usize = 256;

/// Tuning knobs for the SQLite backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteOptions {
    /// How long a statement waits on a locked database before failing.
    pub busy_timeout: Duration,
    /// Rows fetched per page by `links` / `edges` iterators.
    pub page_size: usize,
}

impl Default for SqliteOptions {
    fn default() -> Self {
        SqliteOptions {
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// A parsed store location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreUri {
    Memory,
    SqliteMemory,
    SqliteFile(String),
}

impl FromStr for StoreUri {
    type Err = StorageError;

    fn from_str(uri: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| StorageError::InvalidStoreUri {
            uri: uri.to_string(),
            reason: reason.to_string(),
        };

        if uri == "memory://" {
            return Ok(StoreUri::Memory);
        }
        if uri == "sqlite::memory:" {
            return Ok(StoreUri::SqliteMemory);
        }
        if let Some(path) = uri.strip_prefix("sqlite://") {
            if path.is_empty() {
                return Err(invalid("missing database path"));
            }
            return Ok(StoreUri::SqliteFile(path.to_string()));
        }

        match uri.split_once("://") {
            Some((scheme, _)) => Err(invalid(&format!("unsupported scheme '{scheme}'"))),
            None => Err(invalid("expected <scheme>://<location>")),
        }
    }
}

impl fmt::Display for StoreUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreUri::Memory => f.write_str("memory://"),
            StoreUri::SqliteMemory => f.write_str("sqlite::memory:"),
            StoreUri::SqliteFile(path) => write!(f, "sqlite://{path}"),
        }
    }
}

/// Opens the store described by `uri`.
pub fn open_graph(uri: &StoreUri, options: &SqliteOptions) -> Result<Box<dyn Graph>, StorageError> {
    tracing::debug!(%uri, "opening link graph store");
    let graph: Box<dyn Graph> = match uri {
        StoreUri::Memory => Box::new(InMemoryGraph::new()),
        StoreUri::SqliteMemory => Box::new(SqliteGraph::in_memory_with(options)?),
        StoreUri::SqliteFile(path) => Box::new(SqliteGraph::open(path, options)?),
    };
    Ok(graph)
}
