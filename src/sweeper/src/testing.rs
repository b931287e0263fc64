//! Test utilities for seeding and inspecting the reference database.
//!
//! The reconciliation tables are owned by the live upload/reference path;
//! this job only locks, reads, and removes rows. Tests still need to put the
//! database into known states, so the seed and inspection helpers live here
//! rather than on [`ReferenceDb`] itself.

use chrono::{DateTime, Utc};
use sqlx::Row;

use crate::db::ReferenceDb;

/// Insert one `storage_files` row and return its id.
pub async fn insert_file(
    db: &ReferenceDb,
    hash: &str,
    size: i64,
    updated_at: DateTime<Utc>,
) -> Result<i64, sqlx::Error> {
    match db {
        ReferenceDb::Postgres(pool) => {
            let row = sqlx::query(
                "INSERT INTO storage_files (hash, size, updated_at) \
                 VALUES ($1, $2, $3) RETURNING storage_file_id",
            )
            .bind(hash)
            .bind(size)
            .bind(updated_at)
            .fetch_one(pool)
            .await?;
            row.try_get("storage_file_id")
        }
        ReferenceDb::Sqlite(pool) => {
            let result = sqlx::query(
                "INSERT INTO storage_files (hash, size, updated_at) VALUES (?1, ?2, ?3)",
            )
            .bind(hash)
            .bind(size)
            .bind(updated_at.to_rfc3339())
            .execute(pool)
            .await?;
            Ok(result.last_insert_rowid())
        }
    }
}

/// Relate a file row to a library.
pub async fn link_library(
    db: &ReferenceDb,
    storage_file_id: i64,
    library_id: i64,
) -> Result<(), sqlx::Error> {
    match db {
        ReferenceDb::Postgres(pool) => {
            sqlx::query(
                "INSERT INTO storage_file_libraries (storage_file_id, library_id) VALUES ($1, $2)",
            )
            .bind(storage_file_id)
            .bind(library_id)
            .execute(pool)
            .await?;
        }
        ReferenceDb::Sqlite(pool) => {
            sqlx::query(
                "INSERT INTO storage_file_libraries (storage_file_id, library_id) VALUES (?1, ?2)",
            )
            .bind(storage_file_id)
            .bind(library_id)
            .execute(pool)
            .await?;
        }
    }
    Ok(())
}

/// Enqueue an in-flight upload marker for a hash.
pub async fn enqueue_upload(
    db: &ReferenceDb,
    hash: &str,
    queued_at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    match db {
        ReferenceDb::Postgres(pool) => {
            sqlx::query("INSERT INTO storage_upload_queue (hash, queued_at) VALUES ($1, $2)")
                .bind(hash)
                .bind(queued_at)
                .execute(pool)
                .await?;
        }
        ReferenceDb::Sqlite(pool) => {
            sqlx::query("INSERT INTO storage_upload_queue (hash, queued_at) VALUES (?1, ?2)")
                .bind(hash)
                .bind(queued_at.to_rfc3339())
                .execute(pool)
                .await?;
        }
    }
    Ok(())
}

/// Count active `storage_files` rows for a hash.
pub async fn file_count(db: &ReferenceDb, hash: &str) -> Result<i64, sqlx::Error> {
    let sql = "SELECT COUNT(*) AS n FROM storage_files WHERE hash = ";
    match db {
        ReferenceDb::Postgres(pool) => {
            let row = sqlx::query(&format!("{sql}$1"))
                .bind(hash)
                .fetch_one(pool)
                .await?;
            row.try_get("n")
        }
        ReferenceDb::Sqlite(pool) => {
            let row = sqlx::query(&format!("{sql}?1"))
                .bind(hash)
                .fetch_one(pool)
                .await?;
            row.try_get("n")
        }
    }
}

/// Count archived rows for a hash.
pub async fn archived_count(db: &ReferenceDb, hash: &str) -> Result<i64, sqlx::Error> {
    let sql = "SELECT COUNT(*) AS n FROM storage_files_deleted WHERE hash = ";
    match db {
        ReferenceDb::Postgres(pool) => {
            let row = sqlx::query(&format!("{sql}$1"))
                .bind(hash)
                .fetch_one(pool)
                .await?;
            row.try_get("n")
        }
        ReferenceDb::Sqlite(pool) => {
            let row = sqlx::query(&format!("{sql}?1"))
                .bind(hash)
                .fetch_one(pool)
                .await?;
            row.try_get("n")
        }
    }
}
