//! Append-only audit log of doomed keys.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs::{OpenOptions, create_dir_all};
use tokio::io::AsyncWriteExt;

/// Plain-text record of every key slated for deletion: one key per line,
/// groups separated by a blank line.
///
/// Written unconditionally, in dry-run mode too, so every run leaves a
/// durable record of what was — or would have been — deleted.
pub struct AuditLog {
    path: PathBuf,
    file: tokio::fs::File,
}

impl AuditLog {
    /// Open the log, truncating any previous run's record when `truncate` is
    /// set, appending otherwise.
    pub async fn open(path: &Path, truncate: bool) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create audit log directory {}", parent.display()))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(!truncate)
            .truncate(truncate)
            .open(path)
            .await
            .with_context(|| format!("Failed to open audit log {}", path.display()))?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Record one group's doomed keys and flush them to disk before any
    /// destructive action runs.
    pub async fn append_group(&mut self, keys: &[String]) -> Result<()> {
        let mut buf = String::new();
        for key in keys {
            buf.push_str(key);
            buf.push('\n');
        }
        buf.push('\n');

        self.file
            .write_all(buf.as_bytes())
            .await
            .with_context(|| format!("Failed to append to audit log {}", self.path.display()))?;
        self.file
            .flush()
            .await
            .with_context(|| format!("Failed to flush audit log {}", self.path.display()))?;

        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_groups_are_blank_line_separated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doomed.log");

        let mut log = AuditLog::open(&path, true).await.unwrap();
        log.append_group(&["a/1".to_string(), "a/2".to_string()])
            .await
            .unwrap();
        log.append_group(&["b/1".to_string()]).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "a/1\na/2\n\nb/1\n\n");
    }

    #[tokio::test]
    async fn test_truncate_discards_previous_run() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doomed.log");
        std::fs::write(&path, "stale\n\n").unwrap();

        let mut log = AuditLog::open(&path, true).await.unwrap();
        log.append_group(&["fresh".to_string()]).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "fresh\n\n");
    }

    #[tokio::test]
    async fn test_append_mode_preserves_previous_run() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doomed.log");
        std::fs::write(&path, "old\n\n").unwrap();

        let mut log = AuditLog::open(&path, false).await.unwrap();
        log.append_group(&["new".to_string()]).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "old\n\nnew\n\n");
    }

    #[tokio::test]
    async fn test_missing_parent_directory_is_created() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/dir/doomed.log");

        let mut log = AuditLog::open(&path, true).await.unwrap();
        log.append_group(&["k".to_string()]).await.unwrap();

        assert!(path.exists());
    }
}
