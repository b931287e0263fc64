//! Single-pass sweep orchestration.
//!
//! Manifest Resolver → Inventory Row Stream → Group Extractor →
//! Reconciliation Engine → Deletion Executor, strictly sequential: one part
//! is fully streamed and every group in it fully reconciled before the next
//! part begins. The progress tracker is observed from the side and gates
//! nothing.

use std::sync::Arc;

use anyhow::{Context, Result};
use common::config::SweepConfig;
use object_store::ObjectStore;

use crate::audit::AuditLog;
use crate::db::ReferenceDb;
use crate::error::SweepError;
use crate::executor::DeletionExecutor;
use crate::grouping::{Group, GroupExtractor};
use crate::inventory::{ManifestResolver, fetch_part};
use crate::progress::{RunSummary, SweepProgress, spawn_reporter};
use crate::reconcile::ReconcileEngine;

/// One reconciliation run over the latest inventory snapshot.
///
/// A terminated run leaves the database consistent (each group's transaction
/// is atomic) and is safe to rerun against the same manifest: every hash is
/// re-evaluated idempotently.
pub struct Sweeper {
    db: ReferenceDb,
    inventory_store: Arc<dyn ObjectStore>,
    inventory_prefix: String,
    engine: ReconcileEngine,
    executor: DeletionExecutor,
    progress: SweepProgress,
    config: SweepConfig,
}

impl Sweeper {
    pub async fn new(
        db: ReferenceDb,
        data_store: Arc<dyn ObjectStore>,
        inventory_store: Arc<dyn ObjectStore>,
        inventory_prefix: impl Into<String>,
        config: SweepConfig,
    ) -> Result<Self> {
        let audit = match &config.audit_log {
            Some(path) => Some(AuditLog::open(path, config.truncate_audit_log).await?),
            None => None,
        };

        let executor = DeletionExecutor::new(
            data_store,
            audit,
            config.dry_run,
            config.delete_batch_size,
            config.store_retry_attempts,
        );

        Ok(Self {
            engine: ReconcileEngine::new(config.grace_period),
            db,
            inventory_store,
            inventory_prefix: inventory_prefix.into(),
            executor,
            progress: SweepProgress::new(),
            config,
        })
    }

    /// Progress counters, observable while the run is in flight.
    pub fn progress(&self) -> SweepProgress {
        self.progress.clone()
    }

    pub async fn run(mut self) -> Result<RunSummary> {
        let resolver = ManifestResolver::new(
            self.inventory_store.clone(),
            self.inventory_prefix.clone(),
            self.config.store_retry_attempts,
        );

        let manifest = match resolver.resolve_latest().await {
            Ok(manifest) => manifest,
            Err(SweepError::ManifestNotFound { prefix }) => {
                log::info!("No inventory manifest under '{prefix}', nothing to reconcile");
                return Ok(self.progress.summary(self.config.dry_run));
            }
            Err(e) => return Err(e.into()),
        };

        log::info!("Inventory parts in manifest: {}", manifest.files.len());
        self.progress.set_parts_total(manifest.files.len());

        let reporter = spawn_reporter(self.progress.clone(), self.config.report_interval);

        let result = async {
            for (index, file) in manifest.files.iter().enumerate() {
                log::info!(
                    "Processing part {}/{}: {}",
                    index + 1,
                    manifest.files.len(),
                    file.key
                );
                self.process_part(&file.key)
                    .await
                    .with_context(|| format!("Failed processing inventory part '{}'", file.key))?;
            }
            Ok::<(), anyhow::Error>(())
        }
        .await;

        reporter.abort();
        result?;

        let summary = self.progress.summary(self.config.dry_run);
        Ok(summary)
    }

    /// Stream one part through grouping and reconciliation, in order.
    /// Part-level failures propagate and terminate the run.
    async fn process_part(&mut self, key: &str) -> Result<()> {
        self.progress.begin_part();

        let reader =
            fetch_part(&self.inventory_store, key, self.config.store_retry_attempts).await?;

        // Grouping restarts per part: a hash straddling two parts yields two
        // partial groups, each reconciled on its own.
        let mut extractor = GroupExtractor::new();
        for row in reader {
            let row = row.context("Malformed inventory row")?;
            self.progress.add_row();
            if let Some(group) = extractor.push(row.key) {
                self.process_group(group).await?;
            }
        }
        if let Some(group) = extractor.finish() {
            self.process_group(group).await?;
        }

        self.progress.finish_part();
        Ok(())
    }

    /// Reconcile one group: lock, decide, audit, purge, commit — then delete
    /// objects best-effort.
    ///
    /// The transaction commits even when the decision or the database purge
    /// fails; the hash is logged and simply not retried this run. Only
    /// transaction begin/commit failures abort the run, since they mean the
    /// database itself is gone.
    async fn process_group(&mut self, group: Group) -> Result<()> {
        let mut tx = self
            .db
            .begin_group()
            .await
            .context("Failed to begin group transaction")?;

        let mut committed: Option<Vec<String>> = None;
        match self.engine.decide(&mut tx, &group).await {
            Ok(disposition) => {
                let doomed = disposition.doomed_keys();
                if doomed.is_empty() {
                    self.progress.record_group();
                } else {
                    // The audit record precedes any destructive action and is
                    // written in dry-run mode too.
                    self.executor
                        .record(doomed)
                        .await
                        .context("Failed to write audit log")?;

                    match self.executor.purge_rows(&mut tx, &group.hash).await {
                        Ok(_) => {
                            self.progress.record_group();
                            committed = Some(disposition.into_doomed_keys());
                        }
                        Err(error) => {
                            // Database purge failed: skip the object-store
                            // side entirely. Removing objects whose rows
                            // survive is the one direction that loses data.
                            tracing::error!(
                                hash = %group.hash,
                                %error,
                                "database purge failed, group skipped"
                            );
                            self.progress.record_group_failure();
                        }
                    }
                }
            }
            Err(error) => {
                tracing::error!(
                    hash = %group.hash,
                    %error,
                    "reconciliation failed, group skipped"
                );
                self.progress.record_group_failure();
            }
        }

        // Committed regardless of the outcome above: forward progress over a
        // single hash's failure.
        tx.commit()
            .await
            .context("Failed to commit group transaction")?;

        if let Some(doomed) = committed {
            let deleted = self.executor.delete_objects(&group.hash, &doomed).await;
            self.progress.add_deleted(deleted as u64);
        }

        Ok(())
    }
}
