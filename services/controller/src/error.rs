//! Reconcile error taxonomy.

use kss_schedule::{KeyError, ObjectKey};
use thiserror::Error;

use crate::scale::ScaleError;

/// Errors returned by a reconcile pass.
///
/// Invalid schedule items and deleted schedules are not errors: they are
/// logged, recorded, and reported in the outcome.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The queue handed out a key that is not `namespace/name`.
    #[error("invalid resource key: {0}")]
    MalformedKey(#[from] KeyError),

    /// One or more scale calls failed.
    #[error("failed to scale {failed} of {attempted} target(s) for {key}: {source}")]
    Scale {
        key: ObjectKey,
        failed: usize,
        attempted: usize,
        #[source]
        source: ScaleError,
    },
}

impl ReconcileError {
    /// Returns true if retrying the key may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ReconcileError::Scale { .. })
    }
}
