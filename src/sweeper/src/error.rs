//! Error taxonomy for a sweep run.
//!
//! Errors fall into four classes with different propagation behavior:
//! a missing manifest ends the run early with an empty result, transient
//! store failures are retried with backoff before surfacing, per-group
//! reconciliation failures are isolated and never abort the run, and
//! configuration-class failures abort immediately.

use thiserror::Error;

/// Run-level errors surfaced by the sweep pipeline.
#[derive(Debug, Error)]
pub enum SweepError {
    /// No completed inventory manifest exists under the configured prefix.
    /// Callers must treat this as "nothing to reconcile", not as a failure.
    #[error("no inventory manifest found under '{prefix}'")]
    ManifestNotFound { prefix: String },

    /// An object-store call failed after exhausting its retry budget.
    #[error("object store operation '{operation}' failed after {attempts} attempts")]
    TransientStore {
        operation: &'static str,
        attempts: u32,
        #[source]
        source: object_store::Error,
    },

    /// Malformed manifest JSON. Aborts the run: a bad manifest means the
    /// export itself is unusable, not just one part.
    #[error("invalid inventory manifest '{key}'")]
    BadManifest {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Failure while computing or acting on one group's disposition.
///
/// Isolated per group: the runner logs it, commits the group's transaction
/// anyway, and moves on. The hash is not retried within the run.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("database error while reconciling '{hash}'")]
    Database {
        hash: String,
        #[source]
        source: sqlx::Error,
    },
}
