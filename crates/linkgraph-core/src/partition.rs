//! Splitting the identifier space into disjoint partitions.
//!
//! Crawler and rank workers each claim one extent of a [`PartitionRange`]
//! and pass its bounds to the store's range scans. Extents are half-open,
//! contiguous and cover the whole range, so no two workers see the same
//! link and no link is left unclaimed.

use thiserror::Error;
use uuid::Uuid;

use crate::id::LinkId;

/// Errors produced when building or querying a [`PartitionRange`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PartitionError {
    #[error("number of partitions must be greater than zero")]
    NoPartitions,

    #[error("range start {start} must be less than range end {end}")]
    EmptyRange { start: LinkId, end: LinkId },

    #[error("cannot split a range of {width} identifiers into {partitions} partitions")]
    TooManyPartitions { width: u128, partitions: usize },

    #[error("partition index {index} out of range (have {partitions})")]
    IndexOutOfRange { index: usize, partitions: usize },

    #[error("identifier {id} is outside the partitioned range")]
    IdOutOfRange { id: LinkId },
}

/// A half-open identifier range `[start, end)` split into equal extents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionRange {
    start: u128,
    end: u128,
    partitions: usize,
    width: u128,
}

impl PartitionRange {
    /// Splits `[start, end)` into `partitions` extents.
    ///
    /// Every extent has the same width except the last one, which absorbs
    /// the remainder and always ends exactly at `end`.
    pub fn new(start: LinkId, end: LinkId, partitions: usize) -> Result<Self, PartitionError> {
        if partitions == 0 {
            return Err(PartitionError::NoPartitions);
        }
        if start >= end {
            return Err(PartitionError::EmptyRange { start, end });
        }

        let (lo, hi) = (start.as_u128(), end.as_u128());
        let span = hi - lo;
        if (partitions as u128) > span {
            return Err(PartitionError::TooManyPartitions {
                width: span,
                partitions,
            });
        }

        Ok(PartitionRange {
            start: lo,
            end: hi,
            partitions,
            width: span / partitions as u128,
        })
    }

    /// Splits the whole identifier space, `[LinkId::MIN, LinkId::MAX)`.
    pub fn full(partitions: usize) -> Result<Self, PartitionError> {
        Self::new(LinkId::MIN, LinkId::MAX, partitions)
    }

    pub fn partitions(&self) -> usize {
        self.partitions
    }

    /// Returns the `[from, to)` bounds of the extent at `index`.
    pub fn extents(&self, index: usize) -> Result<(LinkId, LinkId), PartitionError> {
        if index >= self.partitions {
            return Err(PartitionError::IndexOutOfRange {
                index,
                partitions: self.partitions,
            });
        }

        let from = self.start + self.width * index as u128;
        let to = if index + 1 == self.partitions {
            self.end
        } else {
            from + self.width
        };
        Ok((to_id(from), to_id(to)))
    }

    /// Returns the index of the extent that contains `id`.
    pub fn partition_of(&self, id: LinkId) -> Result<usize, PartitionError> {
        let raw = id.as_u128();
        if raw < self.start || raw >= self.end {
            return Err(PartitionError::IdOutOfRange { id });
        }

        // The remainder lives in the last extent.
        let index = ((raw - self.start) / self.width) as usize;
        Ok(index.min(self.partitions - 1))
    }
}

fn to_id(raw: u128) -> LinkId {
    LinkId(Uuid::from_u128(raw))
}
