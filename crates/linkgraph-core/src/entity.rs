//! Link and edge records.
//!
//! These are plain value types. Stores hand out clones, so a record held by
//! a caller is never an alias of store-owned state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{EdgeId, LinkId};

/// A URL discovered by the crawler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// Assigned by the store on first upsert; never changes afterwards.
    pub id: LinkId,
    /// Unique across the graph.
    pub url: String,
    /// When the page was last retrieved. Only moves forward.
    pub retrieved_at: DateTime<Utc>,
}

impl Link {
    /// Builds a link that has not been stored yet (nil ID).
    pub fn new(url: impl Into<String>, retrieved_at: DateTime<Utc>) -> Self {
        Link {
            id: LinkId::default(),
            url: url.into(),
            retrieved_at,
        }
    }
}

/// A directed edge: the page at `source` links to the page at `destination`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub source: LinkId,
    pub destination: LinkId,
    /// Refreshed by the store every time the edge is upserted.
    pub updated_at: DateTime<Utc>,
}

impl Edge {
    /// Builds an edge that has not been stored yet (nil ID, epoch timestamp).
    pub fn new(source: LinkId, destination: LinkId) -> Self {
        Edge {
            id: EdgeId::default(),
            source,
            destination,
            updated_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }
}
