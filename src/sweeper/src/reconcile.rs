//! Per-group disposition decisions.
//!
//! The engine's contract is zero false positives: a key enters a deletion
//! set only after the locked checks prove it safe to remove. Everything runs
//! under the locks held by the group's transaction; the runner commits that
//! transaction unconditionally, whether or not the decision succeeded.

use std::time::Duration;

use chrono::Utc;

use crate::db::GroupTx;
use crate::error::ReconcileError;
use crate::grouping::Group;

/// The reconciliation outcome for one group. Never persisted, only acted on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Leave every copy untouched.
    Keep,
    /// Every copy is obsolete.
    DeleteAll(Vec<String>),
    /// Keep the canonical (shortest-key) copy, delete the rest.
    DeleteDuplicates(Vec<String>),
}

impl Disposition {
    /// Keys slated for removal.
    pub fn doomed_keys(&self) -> &[String] {
        match self {
            Disposition::Keep => &[],
            Disposition::DeleteAll(keys) | Disposition::DeleteDuplicates(keys) => keys,
        }
    }

    pub fn into_doomed_keys(self) -> Vec<String> {
        match self {
            Disposition::Keep => Vec::new(),
            Disposition::DeleteAll(keys) | Disposition::DeleteDuplicates(keys) => keys,
        }
    }
}

/// Decides the disposition for one group at a time.
pub struct ReconcileEngine {
    grace_period: chrono::Duration,
}

impl ReconcileEngine {
    pub fn new(grace_period: Duration) -> Self {
        // An unrepresentable grace window degrades to a century, which
        // suppresses deletion entirely — the conservative direction.
        let grace_period = chrono::Duration::from_std(grace_period)
            .unwrap_or_else(|_| chrono::Duration::days(36500));
        Self { grace_period }
    }

    /// Decide one group's disposition under the locks held by `tx`.
    ///
    /// Priority order: an in-flight upload keeps everything; an unreferenced
    /// and untouched hash loses every copy; anything still referenced (or
    /// touched inside the grace window) keeps exactly its shortest key.
    pub async fn decide(
        &self,
        tx: &mut GroupTx,
        group: &Group,
    ) -> Result<Disposition, ReconcileError> {
        let cutoff = Utc::now() - self.grace_period;

        // An upload in flight or very recent outranks every other signal:
        // the snapshot cannot reflect it yet.
        if tx
            .upload_pending(&group.hash, cutoff)
            .await
            .map_err(|source| ReconcileError::Database {
                hash: group.hash.clone(),
                source,
            })?
        {
            tracing::debug!(hash = %group.hash, "upload pending inside grace window, keeping");
            return Ok(Disposition::Keep);
        }

        let state = tx
            .reference_state(&group.hash)
            .await
            .map_err(|source| ReconcileError::Database {
                hash: group.hash.clone(),
                source,
            })?;

        // A reference dropped moments before the snapshot still counts: an
        // unreferenced row touched inside the window is treated as
        // referenced and only trimmed, never fully deleted.
        let recently_touched = state.last_touched.is_some_and(|t| t > cutoff);

        if !state.referenced && !recently_touched {
            return Ok(Disposition::DeleteAll(group.keys.clone()));
        }

        if group.keys.len() >= 2 {
            // Keep exactly the shortest key: the bare hash when present,
            // otherwise the shortest hash/filename variant. The sort is
            // stable, so the first of equally short keys wins.
            let mut keys = group.keys.clone();
            keys.sort_by_key(|key| key.len());
            let doomed = keys.split_off(1);
            return Ok(Disposition::DeleteDuplicates(doomed));
        }

        Ok(Disposition::Keep)
    }
}
