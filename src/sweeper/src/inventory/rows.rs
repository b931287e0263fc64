//! Inventory data-file parts: fetch, decompress, parse.

use std::io::Cursor;
use std::sync::Arc;

use bytes::Bytes;
use flate2::read::GzDecoder;
use object_store::{ObjectStore, path::Path as ObjectPath};

use crate::error::SweepError;
use crate::retry::retry_store;

/// One inventory listing entry.
///
/// Only `key` drives decision logic; the remaining export columns are
/// carried for operators reading logs and audit records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryRow {
    pub bucket: String,
    pub key: String,
    pub size: Option<u64>,
    pub last_modified: Option<String>,
    pub etag: Option<String>,
}

/// Fetch one gzip-compressed CSV inventory part and open it for streaming.
pub async fn fetch_part(
    store: &Arc<dyn ObjectStore>,
    key: &str,
    retry_attempts: u32,
) -> Result<InventoryPartReader, SweepError> {
    let path = ObjectPath::from(key);
    let body = retry_store("fetch inventory part", retry_attempts, || {
        let store = store.clone();
        let path = path.clone();
        async move { store.get(&path).await?.bytes().await }
    })
    .await?;

    Ok(InventoryPartReader::new(body))
}

/// Streaming row reader over one decompressed inventory part.
///
/// Rows come back in the part's on-disk order, which the export guarantees
/// to be lexicographic by key.
pub struct InventoryPartReader {
    records: csv::StringRecordsIntoIter<GzDecoder<Cursor<Bytes>>>,
}

impl InventoryPartReader {
    pub fn new(body: Bytes) -> Self {
        let reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(GzDecoder::new(Cursor::new(body)));
        Self {
            records: reader.into_records(),
        }
    }
}

impl Iterator for InventoryPartReader {
    type Item = anyhow::Result<InventoryRow>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = match self.records.next()? {
            Ok(record) => record,
            Err(e) => return Some(Err(e.into())),
        };

        let Some(key) = record.get(1) else {
            return Some(Err(anyhow::anyhow!(
                "inventory row has {} columns, expected at least 2",
                record.len()
            )));
        };

        Some(Ok(InventoryRow {
            bucket: record.get(0).unwrap_or_default().to_string(),
            key: key.to_string(),
            size: record.get(2).and_then(|s| s.parse().ok()),
            last_modified: record.get(3).map(str::to_string),
            etag: record.get(4).map(str::to_string),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    fn gzip_csv(csv: &str) -> Bytes {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(csv.as_bytes()).unwrap();
        Bytes::from(encoder.finish().unwrap())
    }

    #[test]
    fn test_part_parses_ordered_rows() {
        let body = gzip_csv(
            "\"data\",\"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa\",\"123\",\"2026-08-01T00:00:00.000Z\",\"etag1\"\n\
             \"data\",\"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa/x.pdf\",\"456\",\"2026-08-02T00:00:00.000Z\",\"etag2\"\n",
        );

        let rows: Vec<InventoryRow> = InventoryPartReader::new(body)
            .collect::<anyhow::Result<_>>()
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].bucket, "data");
        assert_eq!(rows[0].key, "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");
        assert_eq!(rows[0].size, Some(123));
        assert_eq!(rows[1].key, "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa/x.pdf");
        assert_eq!(rows[1].etag.as_deref(), Some("etag2"));
    }

    #[test]
    fn test_short_rows_carry_missing_columns_as_none() {
        let body = gzip_csv("data,aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa\n");

        let rows: Vec<InventoryRow> = InventoryPartReader::new(body)
            .collect::<anyhow::Result<_>>()
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].size, None);
        assert_eq!(rows[0].last_modified, None);
    }

    #[test]
    fn test_single_column_row_is_an_error() {
        let body = gzip_csv("just-a-bucket\n");

        let result: anyhow::Result<Vec<InventoryRow>> = InventoryPartReader::new(body).collect();

        assert!(result.is_err());
    }

    #[test]
    fn test_empty_part_yields_no_rows() {
        let body = gzip_csv("");

        let rows: Vec<InventoryRow> = InventoryPartReader::new(body)
            .collect::<anyhow::Result<_>>()
            .unwrap();

        assert!(rows.is_empty());
    }
}
