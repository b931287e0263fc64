//! Inventory manifest resolution.

use std::sync::Arc;

use futures::TryStreamExt;
use object_store::{ObjectStore, path::Path as ObjectPath};
use serde::Deserialize;

use crate::error::SweepError;
use crate::retry::retry_store;

/// A completed inventory export: the gzip CSV data-file parts to stream.
#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    pub files: Vec<ManifestFile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManifestFile {
    pub key: String,
}

/// Finds the most recent completed manifest under the inventory root prefix.
pub struct ManifestResolver {
    store: Arc<dyn ObjectStore>,
    prefix: String,
    retry_attempts: u32,
}

impl ManifestResolver {
    pub fn new(store: Arc<dyn ObjectStore>, prefix: impl Into<String>, retry_attempts: u32) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            retry_attempts,
        }
    }

    /// Resolve the most recent manifest, selected by reverse lexicographic
    /// key order — valid because export keys embed an ISO-like date prefix.
    ///
    /// Zero manifest keys under the prefix is [`SweepError::ManifestNotFound`];
    /// callers treat that as "nothing to reconcile", not as a failure.
    pub async fn resolve_latest(&self) -> Result<Manifest, SweepError> {
        let prefix = ObjectPath::from(self.prefix.as_str());

        let mut manifest_keys: Vec<String> =
            retry_store("list inventory", self.retry_attempts, || {
                let store = self.store.clone();
                let prefix = prefix.clone();
                async move {
                    store
                        .list(Some(&prefix))
                        .map_ok(|meta| meta.location.to_string())
                        .try_collect::<Vec<String>>()
                        .await
                }
            })
            .await?
            .into_iter()
            .filter(|key| key.ends_with("manifest.json"))
            .collect();

        manifest_keys.sort();
        let Some(key) = manifest_keys.pop() else {
            return Err(SweepError::ManifestNotFound {
                prefix: self.prefix.clone(),
            });
        };

        tracing::info!(manifest = %key, "resolved latest inventory manifest");

        let path = ObjectPath::from(key.as_str());
        let body = retry_store("fetch manifest", self.retry_attempts, || {
            let store = self.store.clone();
            let path = path.clone();
            async move { store.get(&path).await?.bytes().await }
        })
        .await?;

        serde_json::from_slice(&body).map_err(|source| SweepError::BadManifest { key, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use object_store::memory::InMemory;

    async fn put(store: &InMemory, key: &str, body: &str) {
        store
            .put(
                &ObjectPath::from(key),
                Bytes::from(body.to_string()).into(),
            )
            .await
            .unwrap();
    }

    fn resolver(store: Arc<InMemory>) -> ManifestResolver {
        ManifestResolver::new(store, "inventory/data", 1)
    }

    #[tokio::test]
    async fn test_resolves_latest_manifest_by_key_order() {
        let store = Arc::new(InMemory::new());
        put(
            &store,
            "inventory/data/2026-07-01T01-00Z/manifest.json",
            r#"{"files": [{"key": "inventory/data/old.csv.gz"}]}"#,
        )
        .await;
        put(
            &store,
            "inventory/data/2026-08-01T01-00Z/manifest.json",
            r#"{"files": [{"key": "inventory/data/new.csv.gz"}]}"#,
        )
        .await;
        // Sibling export files must not be picked up.
        put(
            &store,
            "inventory/data/2026-08-02T01-00Z/manifest.checksum",
            "deadbeef",
        )
        .await;

        let manifest = resolver(store).resolve_latest().await.unwrap();

        assert_eq!(manifest.files.len(), 1);
        assert_eq!(manifest.files[0].key, "inventory/data/new.csv.gz");
    }

    #[tokio::test]
    async fn test_empty_prefix_is_manifest_not_found() {
        let store = Arc::new(InMemory::new());

        let result = resolver(store).resolve_latest().await;

        assert!(matches!(
            result,
            Err(SweepError::ManifestNotFound { prefix }) if prefix == "inventory/data"
        ));
    }

    #[tokio::test]
    async fn test_malformed_manifest_is_fatal() {
        let store = Arc::new(InMemory::new());
        put(
            &store,
            "inventory/data/2026-08-01T01-00Z/manifest.json",
            "not json",
        )
        .await;

        let result = resolver(store).resolve_latest().await;

        assert!(matches!(result, Err(SweepError::BadManifest { .. })));
    }
}
