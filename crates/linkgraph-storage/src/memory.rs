//! In-memory implementation of [`Graph`].
//!
//! [`InMemoryGraph`] keeps links, edges and their indexes in HashMaps behind
//! a single reader/writer lock. It has identical semantics to the SQLite
//! backend and is used by tests and by deployments that do not need
//! persistence.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use linkgraph_core::{Edge, EdgeId, Link, LinkId};

use crate::error::StorageError;
use crate::ids::IdSource;
use crate::traits::{EdgeIterator, Graph, GraphIterator, LinkIterator};

/// Everything guarded by the store lock. The four maps are always updated
/// together while the write lock is held.
#[derive(Debug, Default)]
struct GraphState {
    /// Links indexed by LinkId
    links: HashMap<LinkId, Link>,
    /// Edges indexed by EdgeId
    edges: HashMap<EdgeId, Edge>,
    /// URL to LinkId, for deduplicating upserts
    link_url_index: HashMap<String, LinkId>,
    /// Outgoing edge IDs per source link
    link_edge_map: HashMap<LinkId, Vec<EdgeId>>,
}

/// In-memory implementation of [`Graph`].
///
/// Safe to share between threads. Writers take the lock exclusively; readers
/// only hold it while copying data out, and the iterators it returns
/// re-acquire it per item, so a slow consumer never blocks writers for the
/// whole scan.
#[derive(Debug, Default)]
pub struct InMemoryGraph {
    state: RwLock<GraphState>,
    ids: IdSource,
}

impl InMemoryGraph {
    /// Creates a new empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new empty graph that draws identifiers from `ids`.
    pub fn with_id_source(ids: IdSource) -> Self {
        InMemoryGraph {
            state: RwLock::default(),
            ids,
        }
    }

    /// Number of stored links.
    pub fn link_count(&self) -> usize {
        self.state.read().links.len()
    }

    /// Number of stored edges.
    pub fn edge_count(&self) -> usize {
        self.state.read().edges.len()
    }
}

impl Graph for InMemoryGraph {
    fn upsert_link(&self, link: &mut Link) -> Result<(), StorageError> {
        let mut guard = self.state.write();
        let state = &mut *guard;

        // A link with the same URL turns this into an update: keep the
        // stored ID and the most recent retrieval time.
        let existing = state
            .link_url_index
            .get(&link.url)
            .and_then(|id| state.links.get_mut(id));
        if let Some(existing) = existing {
            existing.retrieved_at = existing.retrieved_at.max(link.retrieved_at);
            *link = existing.clone();
            return Ok(());
        }

        let id = self
            .ids
            .fresh("upsert link", |id| state.links.contains_key(&LinkId(id)))?;
        link.id = LinkId(id);

        state.link_url_index.insert(link.url.clone(), link.id);
        state.links.insert(link.id, link.clone());
        Ok(())
    }

    fn find_link(&self, id: LinkId) -> Result<Link, StorageError> {
        self.state
            .read()
            .links
            .get(&id)
            .cloned()
            .ok_or(StorageError::NotFound { id })
    }

    fn links(
        &self,
        from: LinkId,
        to: LinkId,
        retrieved_before: DateTime<Utc>,
    ) -> Result<LinkIterator<'_>, StorageError> {
        let keys: Vec<LinkId> = {
            let state = self.state.read();
            state
                .links
                .values()
                .filter(|link| link.id >= from && link.id < to)
                .filter(|link| link.retrieved_at < retrieved_before)
                .map(|link| link.id)
                .collect()
        };

        Ok(Box::new(SnapshotIterator::<Link>::new(&self.state, keys)))
    }

    fn upsert_edge(&self, edge: &mut Edge) -> Result<(), StorageError> {
        let mut guard = self.state.write();
        let state = &mut *guard;

        if !state.links.contains_key(&edge.source) || !state.links.contains_key(&edge.destination)
        {
            return Err(StorageError::UnknownEdgeLinks {
                src: edge.source,
                dst: edge.destination,
            });
        }

        let now = Utc::now();

        // Out-degree is small, so a linear scan of the source's edges is
        // cheaper than maintaining a (source, destination) index.
        let existing = state
            .link_edge_map
            .get(&edge.source)
            .and_then(|list| {
                list.iter().copied().find(|id| {
                    state
                        .edges
                        .get(id)
                        .is_some_and(|e| e.destination == edge.destination)
                })
            })
            .and_then(|id| state.edges.get_mut(&id));
        if let Some(existing) = existing {
            existing.updated_at = now;
            *edge = existing.clone();
            return Ok(());
        }

        let id = self
            .ids
            .fresh("upsert edge", |id| state.edges.contains_key(&EdgeId(id)))?;
        edge.id = EdgeId(id);
        edge.updated_at = now;

        state.edges.insert(edge.id, edge.clone());
        state
            .link_edge_map
            .entry(edge.source)
            .or_default()
            .push(edge.id);
        Ok(())
    }

    fn edges(
        &self,
        from: LinkId,
        to: LinkId,
        updated_before: DateTime<Utc>,
    ) -> Result<EdgeIterator<'_>, StorageError> {
        let keys: Vec<EdgeId> = {
            let state = self.state.read();
            state
                .link_edge_map
                .iter()
                .filter(|(source, _)| **source >= from && **source < to)
                .flat_map(|(_, list)| list.iter())
                .filter(|id| {
                    state
                        .edges
                        .get(*id)
                        .is_some_and(|e| e.updated_at < updated_before)
                })
                .copied()
                .collect()
        };

        Ok(Box::new(SnapshotIterator::<Edge>::new(&self.state, keys)))
    }

    fn remove_stale_edges(
        &self,
        from: LinkId,
        updated_before: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut guard = self.state.write();
        let state = &mut *guard;

        let Some(list) = state.link_edge_map.get_mut(&from) else {
            return Ok(());
        };

        let edges = &mut state.edges;
        list.retain(|id| {
            let stale = edges.get(id).map_or(true, |e| e.updated_at < updated_before);
            if stale {
                edges.remove(id);
            }
            !stale
        });

        if list.is_empty() {
            state.link_edge_map.remove(&from);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Iteration
// ---------------------------------------------------------------------------

/// An entity type that can be copied out of [`GraphState`] by key.
trait Snapshot: Sized {
    type Key: Copy;

    fn copy_out(state: &GraphState, key: Self::Key) -> Option<Self>;
}

impl Snapshot for Link {
    type Key = LinkId;

    fn copy_out(state: &GraphState, key: LinkId) -> Option<Self> {
        state.links.get(&key).cloned()
    }
}

impl Snapshot for Edge {
    type Key = EdgeId;

    fn copy_out(state: &GraphState, key: EdgeId) -> Option<Self> {
        state.edges.get(&key).cloned()
    }
}

/// Iterator over the keys matched at scan time.
///
/// Each advance takes the shared lock just long enough to copy one entity.
/// Entities deleted after the scan (pruned edges) are skipped.
struct SnapshotIterator<'a, T: Snapshot> {
    state: &'a RwLock<GraphState>,
    keys: std::vec::IntoIter<T::Key>,
    current: Option<T>,
}

impl<'a, T: Snapshot> SnapshotIterator<'a, T> {
    fn new(state: &'a RwLock<GraphState>, keys: Vec<T::Key>) -> Self {
        SnapshotIterator {
            state,
            keys: keys.into_iter(),
            current: None,
        }
    }
}

impl<T: Snapshot + Clone> GraphIterator for SnapshotIterator<'_, T> {
    type Item = T;

    fn advance(&mut self) -> bool {
        self.current = None;
        for key in self.keys.by_ref() {
            let item = T::copy_out(&self.state.read(), key);
            if let Some(item) = item {
                self.current = Some(item);
                return true;
            }
        }
        false
    }

    fn current(&self) -> Option<T> {
        self.current.clone()
    }

    fn error(&self) -> Option<&StorageError> {
        None
    }

    fn take_error(&mut self) -> Option<StorageError> {
        None
    }

    fn close(&mut self) -> Result<(), StorageError> {
        self.keys = Vec::new().into_iter();
        self.current = None;
        Ok(())
    }
}
