//! The [`Graph`] trait defining the storage contract for the link graph,
//! and the [`GraphIterator`] trait returned by its range scans.
//!
//! All backends ([`InMemoryGraph`](crate::InMemoryGraph),
//! [`SqliteGraph`](crate::SqliteGraph)) implement these traits with the same
//! semantics, so callers never need to know which one they talk to.

use chrono::{DateTime, Utc};

use linkgraph_core::{Edge, Link, LinkId};

use crate::error::StorageError;

/// Boxed iterator over links returned by [`Graph::links`].
pub type LinkIterator<'a> = Box<dyn GraphIterator<Item = Link> + Send + 'a>;

/// Boxed iterator over edges returned by [`Graph::edges`].
pub type EdgeIterator<'a> = Box<dyn GraphIterator<Item = Edge> + Send + 'a>;

/// The storage contract for the link graph.
///
/// Stores are shared between concurrently running crawler workers, the rank
/// calculator and query handlers, so every method takes `&self` and
/// implementations must be `Send + Sync`.
pub trait Graph: Send + Sync {
    /// Creates a new link or updates the existing link with the same URL.
    ///
    /// On update the stored ID is kept and `retrieved_at` becomes the later
    /// of the stored and submitted values. Either way `link` is rewritten
    /// with the resolved ID and `retrieved_at`.
    fn upsert_link(&self, link: &mut Link) -> Result<(), StorageError>;

    /// Looks up a link by its ID.
    fn find_link(&self, id: LinkId) -> Result<Link, StorageError>;

    /// Returns an iterator over the links whose IDs fall in `[from, to)` and
    /// that were retrieved strictly before `retrieved_before`.
    fn links(
        &self,
        from: LinkId,
        to: LinkId,
        retrieved_before: DateTime<Utc>,
    ) -> Result<LinkIterator<'_>, StorageError>;

    /// Creates a new edge or refreshes `updated_at` of the existing edge with
    /// the same source and destination.
    ///
    /// Fails with [`StorageError::UnknownEdgeLinks`] if either endpoint does
    /// not exist. On success `edge` holds the resolved ID and `updated_at`.
    fn upsert_edge(&self, edge: &mut Edge) -> Result<(), StorageError>;

    /// Returns an iterator over the edges whose source IDs fall in
    /// `[from, to)` and that were updated strictly before `updated_before`.
    fn edges(
        &self,
        from: LinkId,
        to: LinkId,
        updated_before: DateTime<Utc>,
    ) -> Result<EdgeIterator<'_>, StorageError>;

    /// Removes every edge originating at `from` that was updated strictly
    /// before `updated_before`.
    fn remove_stale_edges(
        &self,
        from: LinkId,
        updated_before: DateTime<Utc>,
    ) -> Result<(), StorageError>;
}

/// A forward-only cursor over the results of one range scan.
///
/// ```text
/// while it.advance() {
///     let item = it.current();
/// }
/// if let Some(err) = it.error() { ... }
/// it.close()?;
/// ```
///
/// Implementations release their resources when dropped, so abandoning an
/// iterator halfway is always safe.
pub trait GraphIterator {
    type Item;

    /// Moves to the next item. Returns `false` once the iterator is
    /// exhausted, closed, or has failed; use [`error`](Self::error) to tell
    /// these apart.
    fn advance(&mut self) -> bool;

    /// Returns a copy of the item at the current position, or `None` if
    /// `advance` has not (successfully) been called.
    fn current(&self) -> Option<Self::Item>;

    /// The error that stopped iteration, if any.
    fn error(&self) -> Option<&StorageError>;

    /// Releases any resources held by the iterator. Closing more than once
    /// is a no-op.
    fn close(&mut self) -> Result<(), StorageError>;

    /// Drains the remaining items into a `Vec` and closes the iterator.
    ///
    /// Fails with the iterator's error if iteration stopped early.
    fn collect_remaining(&mut self) -> Result<Vec<Self::Item>, StorageError> {
        let mut items = Vec::new();
        while self.advance() {
            items.extend(self.current());
        }
        if let Some(err) = self.take_error() {
            // Still release resources; the iteration error wins.
            if let Err(close_err) = self.close() {
                tracing::debug!(error = %close_err, "close failed after iteration error");
            }
            return Err(err);
        }
        self.close()?;
        Ok(items)
    }

    /// Moves the stored error out of the iterator.
    fn take_error(&mut self) -> Option<StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendError;

    /// Yields `items`, then fails; closing also fails.
    struct Failing {
        items: Vec<u32>,
        current: Option<u32>,
        err: Option<StorageError>,
        closes: usize,
    }

    impl GraphIterator for Failing {
        type Item = u32;

        fn advance(&mut self) -> bool {
            self.current = self.items.pop();
            if self.current.is_none() && self.closes == 0 && self.err.is_none() {
                self.err = Some(StorageError::NotFound { id: LinkId::MIN });
            }
            self.current.is_some()
        }

        fn current(&self) -> Option<u32> {
            self.current
        }

        fn error(&self) -> Option<&StorageError> {
            self.err.as_ref()
        }

        fn close(&mut self) -> Result<(), StorageError> {
            self.closes += 1;
            Err(StorageError::backend(
                "close",
                BackendError::MalformedRow {
                    reason: "close failed".into(),
                },
            ))
        }

        fn take_error(&mut self) -> Option<StorageError> {
            self.err.take()
        }
    }

    #[test]
    fn collect_remaining_reports_iteration_error_over_close_error() {
        let mut it = Failing {
            items: vec![2, 1],
            current: None,
            err: None,
            closes: 0,
        };

        let err = it.collect_remaining().unwrap_err();
        assert!(err.is_not_found(), "{err}");
        assert_eq!(it.closes, 1);
    }
}
