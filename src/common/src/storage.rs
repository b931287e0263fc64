use std::sync::Arc;

use anyhow::Result;
use object_store::{ObjectStore, aws::AmazonS3Builder, local::LocalFileSystem, memory::InMemory};
use url::Url;

/// Create an object store handle from a DSN string.
///
/// Supported schemes:
/// - `file:///path/to/dir` — local filesystem rooted at the path
/// - `memory://` — in-memory store (tests)
/// - `s3://[access_key:secret_key@]host[:port]/bucket` — S3 or an
///   S3-compatible endpoint (MinIO etc.)
pub fn object_store_from_dsn(dsn: &str) -> Result<Arc<dyn ObjectStore>> {
    let url = Url::parse(dsn).map_err(|e| anyhow::anyhow!("Invalid storage DSN '{dsn}': {e}"))?;

    match url.scheme() {
        "file" => {
            let path = url.path();
            if path.is_empty() || path == "/" {
                anyhow::bail!("File DSN must specify a path: file:///path/to/storage");
            }
            // file:///.data/storage is a relative path, file:///tmp/data an
            // absolute one.
            let path = if path.starts_with("/.") {
                &path[1..]
            } else {
                path
            };
            Ok(Arc::new(LocalFileSystem::new_with_prefix(path)?))
        }
        "memory" => Ok(Arc::new(InMemory::new())),
        "s3" => {
            let builder = s3_builder_from_dsn(&url)?;
            Ok(Arc::new(builder.build()?))
        }
        scheme => Err(anyhow::anyhow!(
            "Unsupported storage scheme: {scheme}. Supported: file, memory, s3"
        )),
    }
}

/// Build an S3 client configuration from a DSN.
///
/// Credentials come from the DSN userinfo when present, otherwise from the
/// standard AWS environment variables. A non-AWS host is treated as an
/// S3-compatible endpoint and switched to path-style requests.
pub fn s3_builder_from_dsn(dsn: &Url) -> Result<AmazonS3Builder> {
    let host = dsn
        .host_str()
        .ok_or_else(|| anyhow::anyhow!("Missing S3 host in DSN"))?;
    let bucket = dsn.path().trim_start_matches('/');

    if bucket.is_empty() {
        anyhow::bail!("S3 DSN must specify a bucket: s3://host/bucket");
    }

    let mut builder = AmazonS3Builder::new()
        .with_bucket_name(bucket)
        .with_region("us-east-1");

    let access_key = dsn.username();
    if !access_key.is_empty() {
        builder = builder
            .with_access_key_id(access_key)
            .with_secret_access_key(dsn.password().unwrap_or(""));
    } else {
        if let Ok(env_key) = std::env::var("AWS_ACCESS_KEY_ID") {
            builder = builder.with_access_key_id(env_key);
        }
        if let Ok(env_secret) = std::env::var("AWS_SECRET_ACCESS_KEY") {
            builder = builder.with_secret_access_key(env_secret);
        }
        if let Ok(env_region) = std::env::var("AWS_DEFAULT_REGION") {
            builder = builder.with_region(env_region);
        }
    }

    if !host.contains("amazonaws.com") {
        let port = dsn.port();
        let scheme = if port == Some(443) { "https" } else { "http" };
        let endpoint = match port {
            Some(p) => format!("{scheme}://{host}:{p}"),
            None => format!("{scheme}://{host}"),
        };
        builder = builder
            .with_endpoint(endpoint)
            .with_allow_http(true)
            .with_virtual_hosted_style_request(false);
    }

    Ok(builder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store() {
        let store = object_store_from_dsn("memory://").unwrap();
        assert_eq!(Arc::strong_count(&store), 1);
    }

    #[test]
    fn test_filesystem_store() {
        use tempfile::TempDir;

        let temp_dir = TempDir::new().unwrap();
        let dsn = format!("file://{}", temp_dir.path().to_string_lossy());

        let store = object_store_from_dsn(&dsn).unwrap();
        assert_eq!(Arc::strong_count(&store), 1);
    }

    #[test]
    fn test_invalid_dsn() {
        let result = object_store_from_dsn("not-a-url");
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Invalid storage DSN")
        );
    }

    #[test]
    fn test_unsupported_scheme() {
        let result = object_store_from_dsn("gcs://bucket/prefix");
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Unsupported storage scheme")
        );
    }

    #[test]
    fn test_file_dsn_without_path() {
        let result = object_store_from_dsn("file://");
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("must specify a path")
        );
    }

    #[test]
    fn test_s3_dsn_parsing() {
        let result =
            s3_builder_from_dsn(&Url::parse("s3://mybucket.s3.amazonaws.com/inventory").unwrap());
        assert!(result.is_ok());

        let result =
            s3_builder_from_dsn(&Url::parse("s3://access:secret@localhost:9000/bucket").unwrap());
        assert!(result.is_ok());

        let result = s3_builder_from_dsn(&Url::parse("s3://localhost:9000/").unwrap());
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("must specify a bucket")
        );
    }
}
