//! Identifier generation shared by both backends.

use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use crate::error::{BackendError, StorageError};

/// Upper bound on draws before identifier assignment gives up.
///
/// With random 128-bit identifiers a single collision is already
/// astronomically unlikely; running out of attempts means the id source is
/// broken.
pub(crate) const MAX_ID_ATTEMPTS: usize = 16;

/// Source of fresh identifiers for newly created links and edges.
///
/// Defaults to random v4 UUIDs. Tests inject deterministic sources to force
/// collisions.
#[derive(Clone)]
pub struct IdSource(Arc<dyn Fn() -> Uuid + Send + Sync>);

impl IdSource {
    pub fn random() -> Self {
        IdSource(Arc::new(Uuid::new_v4))
    }

    pub fn from_fn(f: impl Fn() -> Uuid + Send + Sync + 'static) -> Self {
        IdSource(Arc::new(f))
    }

    pub fn next_id(&self) -> Uuid {
        (self.0)()
    }

    /// Draws identifiers until `taken` rejects one, up to [`MAX_ID_ATTEMPTS`].
    pub(crate) fn fresh(
        &self,
        op: &'static str,
        mut taken: impl FnMut(Uuid) -> bool,
    ) -> Result<Uuid, StorageError> {
        for _ in 0..MAX_ID_ATTEMPTS {
            let id = self.next_id();
            if !taken(id) {
                return Ok(id);
            }
            tracing::warn!(%id, op, "identifier collision, drawing another");
        }
        Err(exhausted(op))
    }
}

pub(crate) fn exhausted(op: &'static str) -> StorageError {
    StorageError::backend(
        op,
        BackendError::IdSpaceExhausted {
            attempts: MAX_ID_ATTEMPTS,
        },
    )
}

impl Default for IdSource {
    fn default() -> Self {
        Self::random()
    }
}

impl fmt::Debug for IdSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("IdSource(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn fresh_skips_taken_ids() {
        let counter = Arc::new(AtomicU64::new(1));
        let ids = IdSource::from_fn(move || {
            Uuid::from_u128(u128::from(counter.fetch_add(1, Ordering::SeqCst)))
        });

        let id = ids.fresh("test", |id| id.as_u128() < 4).unwrap();
        assert_eq!(id.as_u128(), 4);
    }

    #[test]
    fn fresh_gives_up_after_bounded_attempts() {
        let ids = IdSource::from_fn(Uuid::nil);
        let mut calls = 0;
        let err = ids
            .fresh("upsert edge", |_| {
                calls += 1;
                true
            })
            .unwrap_err();
        assert_eq!(calls, MAX_ID_ATTEMPTS);
        assert!(matches!(
            err,
            StorageError::Backend {
                op: "upsert edge",
                source: BackendError::IdSpaceExhausted { .. }
            }
        ));
    }
}
