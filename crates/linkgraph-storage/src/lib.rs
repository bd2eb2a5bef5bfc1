//! Storage abstraction for the link graph.
//!
//! Provides the [`Graph`] trait defining the contract every backend
//! implements, plus the [`InMemoryGraph`] and [`SqliteGraph`] backends.
//! Callers (crawler, rank calculator, query path) depend only on the trait;
//! either backend plugs in behind it with identical semantics.
//!
//! # Modules
//!
//! - [`error`]: StorageError and BackendError
//! - [`traits`]: Graph and GraphIterator trait definitions
//! - [`memory`]: InMemoryGraph implementation
//! - [`schema`]: SQL schema migrations and connection setup
//! - [`sqlite`]: SqliteGraph implementation
//! - [`config`]: store URIs and opening a backend by URI

pub mod config;
pub mod error;
pub mod memory;
pub mod schema;
pub mod sqlite;
pub mod traits;

mod ids;

// Re-export key types for ergonomic use.
pub use config::{open_graph, SqliteOptions, StoreUri};
pub use error::{BackendError, StorageError};
pub use ids::IdSource;
pub use memory::InMemoryGraph;
pub use sqlite::SqliteGraph;
pub use traits::{EdgeIterator, Graph, GraphIterator, LinkIterator};
