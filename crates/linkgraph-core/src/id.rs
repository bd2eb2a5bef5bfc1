//! Identifier newtypes for graph entities.
//!
//! Both IDs wrap a random 128-bit UUID. They are distinct types so that a
//! `LinkId` cannot be accidentally used where an `EdgeId` is expected.
//!
//! Ordering follows the UUID byte order, which is identical to the ordering
//! of the canonical lowercase hyphenated string form. Range scans and
//! partition extents rely on this.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a link (a graph vertex).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkId(pub Uuid);

/// Identifier of an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeId(pub Uuid);

impl LinkId {
    /// The smallest identifier (all zero bits).
    pub const MIN: LinkId = LinkId(Uuid::nil());
    /// The largest identifier (all one bits).
    pub const MAX: LinkId = LinkId(Uuid::from_u128(u128::MAX));

    /// Draws a fresh random identifier.
    pub fn new_random() -> Self {
        LinkId(Uuid::new_v4())
    }

    pub fn as_u128(&self) -> u128 {
        self.0.as_u128()
    }

    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl EdgeId {
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

// Display prints the canonical hyphenated form.

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for LinkId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(LinkId)
    }
}

impl FromStr for EdgeId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(EdgeId)
    }
}
