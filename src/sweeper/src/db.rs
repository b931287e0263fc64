//! Reference database access (PostgreSQL or SQLite).
//!
//! Owns the exact locked queries the reconciliation protocol needs and the
//! archive-then-delete write path. All per-group work happens inside a
//! [`GroupTx`]; nothing here is visible to other transactions until commit.
//!
//! Locking semantics differ by backend:
//! - **PostgreSQL**: exclusive row locks via `SELECT … FOR UPDATE`. Aggregates
//!   cannot carry a locking clause, so rows are locked first and aggregated
//!   second within the same transaction.
//! - **SQLite**: the pool is capped at a single connection, so transactions
//!   are serialized and a transaction holds the database exclusively for its
//!   duration. No locking clause exists or is needed.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{PgPool, Postgres, Row, Sqlite, SqlitePool, Transaction};

/// Reference state of one content hash, computed under row locks.
#[derive(Debug, Clone)]
pub struct ReferenceState {
    /// At least one library still holds the file.
    pub referenced: bool,
    /// Most recent `updated_at` across the hash's file rows, if any exist.
    pub last_touched: Option<DateTime<Utc>>,
}

/// Connection handle to the reference database.
#[derive(Clone)]
pub enum ReferenceDb {
    Postgres(PgPool),
    Sqlite(SqlitePool),
}

impl ReferenceDb {
    /// Connect and make sure the reconciliation tables exist.
    pub async fn connect(dsn: &str) -> Result<Self, sqlx::Error> {
        log::info!("Connecting to reference database with DSN: {dsn}");

        let db = if dsn.starts_with("sqlite:") {
            // Add mode=rwc to create the database file if it doesn't exist
            let dsn_with_create = if dsn.contains('?') {
                if dsn.contains("mode=") {
                    dsn.to_string()
                } else {
                    format!("{dsn}&mode=rwc")
                }
            } else {
                format!("{dsn}?mode=rwc")
            };

            // One connection: transactions serialize, which stands in for
            // row-level locking on this backend.
            let pool = SqlitePoolOptions::new()
                .max_connections(1)
                .connect(&dsn_with_create)
                .await
                .map_err(|e| {
                    log::error!("Failed to connect to SQLite database '{dsn_with_create}': {e}");
                    e
                })?;
            ReferenceDb::Sqlite(pool)
        } else {
            let pool = PgPool::connect(dsn).await.map_err(|e| {
                log::error!("Failed to connect to PostgreSQL database '{dsn}': {e}");
                e
            })?;
            ReferenceDb::Postgres(pool)
        };

        db.init().await?;
        Ok(db)
    }

    /// Create reconciliation tables if they do not exist.
    async fn init(&self) -> Result<(), sqlx::Error> {
        match self {
            ReferenceDb::Sqlite(pool) => {
                let create_files = r#"
                CREATE TABLE IF NOT EXISTS storage_files (
                    storage_file_id INTEGER PRIMARY KEY AUTOINCREMENT,
                    hash TEXT NOT NULL,
                    size INTEGER NOT NULL DEFAULT 0,
                    updated_at TEXT NOT NULL
                )"#;
                sqlx::query(create_files).execute(pool).await?;

                sqlx::query(
                    "CREATE INDEX IF NOT EXISTS idx_storage_files_hash ON storage_files (hash)",
                )
                .execute(pool)
                .await?;

                let create_libraries = r#"
                CREATE TABLE IF NOT EXISTS storage_file_libraries (
                    storage_file_id INTEGER NOT NULL,
                    library_id INTEGER NOT NULL,
                    PRIMARY KEY (storage_file_id, library_id)
                )"#;
                sqlx::query(create_libraries).execute(pool).await?;

                let create_queue = r#"
                CREATE TABLE IF NOT EXISTS storage_upload_queue (
                    hash TEXT NOT NULL,
                    queued_at TEXT NOT NULL
                )"#;
                sqlx::query(create_queue).execute(pool).await?;

                sqlx::query(
                    "CREATE INDEX IF NOT EXISTS idx_storage_upload_queue_hash \
                     ON storage_upload_queue (hash)",
                )
                .execute(pool)
                .await?;

                let create_deleted = r#"
                CREATE TABLE IF NOT EXISTS storage_files_deleted (
                    storage_file_id INTEGER NOT NULL,
                    hash TEXT NOT NULL,
                    size INTEGER NOT NULL DEFAULT 0,
                    updated_at TEXT NOT NULL,
                    deleted_at TEXT NOT NULL
                )"#;
                sqlx::query(create_deleted).execute(pool).await?;
            }
            ReferenceDb::Postgres(pool) => {
                let create_files = r#"
                CREATE TABLE IF NOT EXISTS storage_files (
                    storage_file_id BIGSERIAL PRIMARY KEY,
                    hash TEXT NOT NULL,
                    size BIGINT NOT NULL DEFAULT 0,
                    updated_at TIMESTAMPTZ NOT NULL
                )"#;
                sqlx::query(create_files).execute(pool).await?;

                sqlx::query(
                    "CREATE INDEX IF NOT EXISTS idx_storage_files_hash ON storage_files (hash)",
                )
                .execute(pool)
                .await?;

                let create_libraries = r#"
                CREATE TABLE IF NOT EXISTS storage_file_libraries (
                    storage_file_id BIGINT NOT NULL REFERENCES storage_files (storage_file_id),
                    library_id BIGINT NOT NULL,
                    PRIMARY KEY (storage_file_id, library_id)
                )"#;
                sqlx::query(create_libraries).execute(pool).await?;

                let create_queue = r#"
                CREATE TABLE IF NOT EXISTS storage_upload_queue (
                    hash TEXT NOT NULL,
                    queued_at TIMESTAMPTZ NOT NULL
                )"#;
                sqlx::query(create_queue).execute(pool).await?;

                sqlx::query(
                    "CREATE INDEX IF NOT EXISTS idx_storage_upload_queue_hash \
                     ON storage_upload_queue (hash)",
                )
                .execute(pool)
                .await?;

                let create_deleted = r#"
                CREATE TABLE IF NOT EXISTS storage_files_deleted (
                    storage_file_id BIGINT NOT NULL,
                    hash TEXT NOT NULL,
                    size BIGINT NOT NULL DEFAULT 0,
                    updated_at TIMESTAMPTZ NOT NULL,
                    deleted_at TIMESTAMPTZ NOT NULL
                )"#;
                sqlx::query(create_deleted).execute(pool).await?;
            }
        }

        Ok(())
    }

    /// Open the transaction that scopes one group's reconciliation.
    pub async fn begin_group(&self) -> Result<GroupTx, sqlx::Error> {
        match self {
            ReferenceDb::Postgres(pool) => Ok(GroupTx::Postgres(pool.begin().await?)),
            ReferenceDb::Sqlite(pool) => Ok(GroupTx::Sqlite(pool.begin().await?)),
        }
    }
}

/// One group's reconciliation transaction.
///
/// The lock-check-decide-delete sequence for a hash runs entirely inside one
/// of these, so it is atomic with respect to other transactions touching the
/// same hash. The runner commits unconditionally, even after a failed
/// decision.
pub enum GroupTx {
    Postgres(Transaction<'static, Postgres>),
    Sqlite(Transaction<'static, Sqlite>),
}

impl GroupTx {
    /// Lock all upload-queue rows for `hash` queued after `cutoff` and report
    /// whether any exist. A hit means an upload is in flight or very recent.
    pub async fn upload_pending(
        &mut self,
        hash: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        match self {
            GroupTx::Postgres(tx) => {
                let rows = sqlx::query(
                    "SELECT hash FROM storage_upload_queue \
                     WHERE hash = $1 AND queued_at > $2 \
                     FOR UPDATE",
                )
                .bind(hash)
                .bind(cutoff)
                .fetch_all(&mut **tx)
                .await?;
                Ok(!rows.is_empty())
            }
            GroupTx::Sqlite(tx) => {
                let rows = sqlx::query(
                    "SELECT hash FROM storage_upload_queue \
                     WHERE hash = ?1 AND queued_at > ?2",
                )
                .bind(hash)
                .bind(cutoff.to_rfc3339())
                .fetch_all(&mut **tx)
                .await?;
                Ok(!rows.is_empty())
            }
        }
    }

    /// Lock all file rows for `hash` and compute its reference state across
    /// the library relation.
    pub async fn reference_state(&mut self, hash: &str) -> Result<ReferenceState, sqlx::Error> {
        match self {
            GroupTx::Postgres(tx) => {
                // FOR UPDATE cannot sit on the nullable side of an outer join
                // or next to an aggregate, so lock first, aggregate second.
                sqlx::query("SELECT storage_file_id FROM storage_files WHERE hash = $1 FOR UPDATE")
                    .bind(hash)
                    .fetch_all(&mut **tx)
                    .await?;

                let row = sqlx::query(
                    "SELECT MAX(sfl.library_id) AS library_id, \
                            MAX(sf.updated_at) AS last_touched \
                     FROM storage_files sf \
                     LEFT JOIN storage_file_libraries sfl \
                       ON sfl.storage_file_id = sf.storage_file_id \
                     WHERE sf.hash = $1",
                )
                .bind(hash)
                .fetch_one(&mut **tx)
                .await?;

                Ok(ReferenceState {
                    referenced: row.try_get::<Option<i64>, _>("library_id")?.is_some(),
                    last_touched: row.try_get::<Option<DateTime<Utc>>, _>("last_touched")?,
                })
            }
            GroupTx::Sqlite(tx) => {
                let row = sqlx::query(
                    "SELECT MAX(sfl.library_id) AS library_id, \
                            MAX(sf.updated_at) AS last_touched \
                     FROM storage_files sf \
                     LEFT JOIN storage_file_libraries sfl \
                       ON sfl.storage_file_id = sf.storage_file_id \
                     WHERE sf.hash = ?1",
                )
                .bind(hash)
                .fetch_one(&mut **tx)
                .await?;

                let last_touched = row
                    .try_get::<Option<String>, _>("last_touched")?
                    .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                    .map(|t| t.with_timezone(&Utc));

                Ok(ReferenceState {
                    referenced: row.try_get::<Option<i64>, _>("library_id")?.is_some(),
                    last_touched,
                })
            }
        }
    }

    /// Copy every file row of `hash` that has no surviving library relation
    /// into the deleted-records archive, then remove it from the active
    /// table. Backup before delete, so a crash between the two statements
    /// (or a partial commit) leaves only archived-but-present rows, which a
    /// later run re-evaluates.
    ///
    /// Returns the number of rows removed from the active table.
    pub async fn archive_unreferenced(
        &mut self,
        hash: &str,
        deleted_at: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        match self {
            GroupTx::Postgres(tx) => {
                sqlx::query(
                    "INSERT INTO storage_files_deleted \
                         (storage_file_id, hash, size, updated_at, deleted_at) \
                     SELECT sf.storage_file_id, sf.hash, sf.size, sf.updated_at, $2 \
                     FROM storage_files sf \
                     WHERE sf.hash = $1 \
                       AND NOT EXISTS (SELECT 1 FROM storage_file_libraries sfl \
                                       WHERE sfl.storage_file_id = sf.storage_file_id)",
                )
                .bind(hash)
                .bind(deleted_at)
                .execute(&mut **tx)
                .await?;

                let result = sqlx::query(
                    "DELETE FROM storage_files \
                     WHERE hash = $1 \
                       AND storage_file_id NOT IN \
                           (SELECT storage_file_id FROM storage_file_libraries)",
                )
                .bind(hash)
                .execute(&mut **tx)
                .await?;

                Ok(result.rows_affected())
            }
            GroupTx::Sqlite(tx) => {
                sqlx::query(
                    "INSERT INTO storage_files_deleted \
                         (storage_file_id, hash, size, updated_at, deleted_at) \
                     SELECT sf.storage_file_id, sf.hash, sf.size, sf.updated_at, ?2 \
                     FROM storage_files sf \
                     WHERE sf.hash = ?1 \
                       AND NOT EXISTS (SELECT 1 FROM storage_file_libraries sfl \
                                       WHERE sfl.storage_file_id = sf.storage_file_id)",
                )
                .bind(hash)
                .bind(deleted_at.to_rfc3339())
                .execute(&mut **tx)
                .await?;

                let result = sqlx::query(
                    "DELETE FROM storage_files \
                     WHERE hash = ?1 \
                       AND storage_file_id NOT IN \
                           (SELECT storage_file_id FROM storage_file_libraries)",
                )
                .bind(hash)
                .execute(&mut **tx)
                .await?;

                Ok(result.rows_affected())
            }
        }
    }

    pub async fn commit(self) -> Result<(), sqlx::Error> {
        match self {
            GroupTx::Postgres(tx) => tx.commit().await,
            GroupTx::Sqlite(tx) => tx.commit().await,
        }
    }
}
