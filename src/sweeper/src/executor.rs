//! Deletion execution: audit record, database purge, batched object deletes.
//!
//! Ordering invariant: the database deletion is authoritative and happens
//! inside the group's transaction; the object-store deletion runs after
//! commit and is best-effort. A surviving object with no database row only
//! wastes space until a later run reclaims it, whereas a deleted object with
//! a surviving row would break the live system on next access — so a store
//! failure must never roll back or block the database side.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use futures::stream;
use object_store::{ObjectStore, path::Path as ObjectPath};

use crate::audit::AuditLog;
use crate::db::GroupTx;
use crate::error::ReconcileError;

const INITIAL_BACKOFF: Duration = Duration::from_millis(500);

/// Executes one group's deletion work.
pub struct DeletionExecutor {
    store: Arc<dyn ObjectStore>,
    audit: Option<AuditLog>,
    dry_run: bool,
    batch_size: usize,
    retry_attempts: u32,
}

impl DeletionExecutor {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        audit: Option<AuditLog>,
        dry_run: bool,
        batch_size: usize,
        retry_attempts: u32,
    ) -> Self {
        Self {
            store,
            audit,
            dry_run,
            batch_size,
            retry_attempts,
        }
    }

    /// Append the group's doomed keys to the audit log, when one is
    /// configured. Unconditional: runs in dry-run mode too, before any
    /// destructive action.
    pub async fn record(&mut self, keys: &[String]) -> anyhow::Result<()> {
        if let Some(audit) = &mut self.audit {
            audit.append_group(keys).await?;
        }
        Ok(())
    }

    /// Database side of a deletion, inside the group's transaction: archive
    /// the hash's unreferenced rows, then remove them from the active table.
    pub async fn purge_rows(&self, tx: &mut GroupTx, hash: &str) -> Result<u64, ReconcileError> {
        if self.dry_run {
            return Ok(0);
        }

        tx.archive_unreferenced(hash, Utc::now())
            .await
            .map_err(|source| ReconcileError::Database {
                hash: hash.to_string(),
                source,
            })
    }

    /// Object-store side, after the group's transaction has committed.
    /// Returns the number of keys deleted (or, in dry-run mode, the number
    /// that would have been).
    pub async fn delete_objects(&self, hash: &str, keys: &[String]) -> usize {
        if self.dry_run {
            tracing::info!(hash, keys = keys.len(), "[DRY-RUN] would delete object keys");
            return keys.len();
        }

        let mut deleted = 0;
        for chunk in keys.chunks(self.batch_size) {
            deleted += self.delete_chunk(hash, chunk).await;
        }

        tracing::info!(hash, deleted, doomed = keys.len(), "deleted object keys");
        deleted
    }

    /// One delete request, retried with backoff. Keys already gone count as
    /// deleted: idempotent re-runs hit that constantly.
    async fn delete_chunk(&self, hash: &str, chunk: &[String]) -> usize {
        let mut backoff = INITIAL_BACKOFF;
        let mut attempt = 1;
        loop {
            let locations = stream::iter(chunk.iter().map(|key| {
                Ok::<ObjectPath, object_store::Error>(ObjectPath::from(key.as_str()))
            }))
            .boxed();
            let results: Vec<_> = self.store.delete_stream(locations).collect().await;

            let mut failed = 0;
            for result in &results {
                match result {
                    Ok(_) | Err(object_store::Error::NotFound { .. }) => {}
                    Err(error) => {
                        failed += 1;
                        tracing::warn!(hash, attempt, %error, "object delete failed");
                    }
                }
            }

            if failed == 0 {
                return chunk.len();
            }
            if attempt >= self.retry_attempts {
                tracing::error!(
                    hash,
                    failed,
                    attempt,
                    "giving up on failed object deletes until a later run"
                );
                return chunk.len() - failed;
            }

            tokio::time::sleep(backoff).await;
            backoff *= 2;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use object_store::memory::InMemory;
    use tempfile::TempDir;

    const HASH: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

    async fn store_with_keys(keys: &[String]) -> Arc<dyn ObjectStore> {
        let store = Arc::new(InMemory::new());
        for key in keys {
            store
                .put(&ObjectPath::from(key.as_str()), Bytes::from_static(b"x").into())
                .await
                .unwrap();
        }
        store
    }

    async fn key_count(store: &Arc<dyn ObjectStore>) -> usize {
        store.list(None).collect::<Vec<_>>().await.len()
    }

    fn keys(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("{HASH}/file-{i:04}")).collect()
    }

    #[tokio::test]
    async fn test_live_deletion_removes_keys() {
        let doomed = keys(3);
        let store = store_with_keys(&doomed).await;
        let executor = DeletionExecutor::new(store.clone(), None, false, 1000, 1);

        let deleted = executor.delete_objects(HASH, &doomed).await;

        assert_eq!(deleted, 3);
        assert_eq!(key_count(&store).await, 0);
    }

    #[tokio::test]
    async fn test_dry_run_counts_without_deleting() {
        let doomed = keys(3);
        let store = store_with_keys(&doomed).await;
        let executor = DeletionExecutor::new(store.clone(), None, true, 1000, 1);

        let deleted = executor.delete_objects(HASH, &doomed).await;

        assert_eq!(deleted, 3);
        assert_eq!(key_count(&store).await, 3);
    }

    #[tokio::test]
    async fn test_deletion_splits_into_bounded_batches() {
        // 5 keys with a batch limit of 2 must still all go.
        let doomed = keys(5);
        let store = store_with_keys(&doomed).await;
        let executor = DeletionExecutor::new(store.clone(), None, false, 2, 1);

        let deleted = executor.delete_objects(HASH, &doomed).await;

        assert_eq!(deleted, 5);
        assert_eq!(key_count(&store).await, 0);
    }

    #[tokio::test]
    async fn test_missing_keys_count_as_deleted() {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        let executor = DeletionExecutor::new(store, None, false, 1000, 1);

        let deleted = executor.delete_objects(HASH, &keys(2)).await;

        assert_eq!(deleted, 2);
    }

    #[tokio::test]
    async fn test_record_writes_audit_even_in_dry_run() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doomed.log");
        let audit = AuditLog::open(&path, true).await.unwrap();
        let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        let mut executor = DeletionExecutor::new(store, Some(audit), true, 1000, 1);

        executor
            .record(&[format!("{HASH}/x.pdf"), format!("{HASH}/y.pdf")])
            .await
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, format!("{HASH}/x.pdf\n{HASH}/y.pdf\n\n"));
    }
}
