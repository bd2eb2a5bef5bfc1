//! Storage error types for linkgraph-storage.
//!
//! [`StorageError`] is the vocabulary shared by every backend. Expected
//! conditions (missing link, edge pointing at unknown links) have their own
//! variants; anything else is wrapped in [`StorageError::Backend`] together
//! with the name of the operation that failed. Backend-specific error codes
//! never leak past the translation function of each backend.

use thiserror::Error;

use linkgraph_core::LinkId;

/// Errors produced by graph store operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// No link with the given ID exists.
    #[error("link not found: {id}")]
    NotFound { id: LinkId },

    /// An edge references a source or destination link that does not exist.
    #[error("unknown edge links: src={src}, dst={dst}")]
    UnknownEdgeLinks { src: LinkId, dst: LinkId },

    /// The underlying backend failed while running `op`.
    #[error("{op}: {source}")]
    Backend {
        op: &'static str,
        #[source]
        source: BackendError,
    },

    /// A store URI could not be parsed or is not supported.
    #[error("invalid store uri '{uri}': {reason}")]
    InvalidStoreUri { uri: String, reason: String },
}

/// Failures originating inside a backend.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("migration error: {0}")]
    Migration(String),

    /// The bounded identifier retry loop ran out of attempts.
    #[error("no free identifier after {attempts} attempts")]
    IdSpaceExhausted { attempts: usize },

    /// A stored row could not be decoded.
    #[error("malformed row: {reason}")]
    MalformedRow { reason: String },
}

impl StorageError {
    /// Wraps a backend failure with the operation it happened in.
    pub fn backend(op: &'static str, source: impl Into<BackendError>) -> Self {
        StorageError::Backend {
            op,
            source: source.into(),
        }
    }

    /// Returns a closure suitable for `map_err` that tags errors with `op`.
    pub(crate) fn during<E: Into<BackendError>>(op: &'static str) -> impl FnOnce(E) -> Self {
        move |err| StorageError::backend(op, err)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }

    pub fn is_unknown_edge_links(&self) -> bool {
        matches!(self, StorageError::UnknownEdgeLinks { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_errors_carry_operation_name() {
        let err = StorageError::backend(
            "upsert link",
            BackendError::IdSpaceExhausted { attempts: 16 },
        );
        assert_eq!(
            err.to_string(),
            "upsert link: no free identifier after 16 attempts"
        );
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn predicates() {
        let id = LinkId::new_random();
        assert!(StorageError::NotFound { id }.is_not_found());
        let err = StorageError::UnknownEdgeLinks { src: id, dst: id };
        assert!(err.is_unknown_edge_links());
        assert!(!err.is_not_found());
    }
}
