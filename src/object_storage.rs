//! Object storage gateway for listing images.
//!
//! A single trait seam covers the production S3 gateway and the in-memory
//! store the unit tests run against. Writes are atomic per object; deletes
//! are idempotent (removing a missing key succeeds).

use crate::config::S3Config;
use crate::error::{MarketError, MarketResult};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use rand::Rng;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::{debug, info, instrument, warn};

/// Random suffix length in bytes; 16 bytes = 128 bits, enough to make key
/// collisions negligible.
const KEY_RANDOM_BYTES: usize = 16;

/// Gateway contract for the image object store.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store one object and return its public URL. All-or-nothing per
    /// object; readers never observe partial writes.
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> MarketResult<String>;

    /// Remove one object. Deleting a nonexistent key is not an error.
    async fn delete(&self, key: &str) -> MarketResult<()>;

    /// Public URL for a key.
    fn url_for_key(&self, key: &str) -> String;

    /// Invert [`url_for_key`](Self::url_for_key); `None` for URLs this
    /// gateway did not produce.
    fn key_for_url(&self, url: &str) -> Option<String>;

    /// Delete the object behind a stored URL.
    async fn delete_by_url(&self, url: &str) -> MarketResult<()> {
        match self.key_for_url(url) {
            Some(key) => self.delete(&key).await,
            None => {
                warn!(url = %url, "URL does not belong to this storage, skipping delete");
                Ok(())
            }
        }
    }
}

/// Generate a storage key for a listing image: a sanitized
/// `{make}-{model}-{year}` path segment plus a 128-bit random suffix.
pub fn object_key(prefix: &str, make: &str, model: &str, year: i32) -> String {
    let mut suffix = [0u8; KEY_RANDOM_BYTES];
    rand::thread_rng().fill(&mut suffix[..]);

    format!(
        "{}/{}-{}-{}/{}",
        prefix.trim_matches('/'),
        sanitize_key_component(make),
        sanitize_key_component(model),
        year,
        hex::encode(suffix)
    )
}

/// Sanitize a key path component to prevent path traversal and odd chars.
fn sanitize_key_component(component: &str) -> String {
    component
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '-' | '_' => c,
            _ => '-',
        })
        .collect()
}

/// Compute the public URL prefix for a bucket, honoring an explicit
/// override (CDN, MinIO) when configured.
fn public_base(bucket: &str, region: &str, override_url: Option<&str>) -> String {
    match override_url {
        Some(base) => base.trim_end_matches('/').to_string(),
        None => format!("https://{bucket}.s3.{region}.amazonaws.com"),
    }
}

/// S3-backed image storage.
pub struct S3ObjectStorage {
    client: S3Client,
    bucket: String,
    base_url: String,
}

impl S3ObjectStorage {
    /// Create a new S3 gateway from configuration.
    pub async fn new(config: &S3Config) -> MarketResult<Self> {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);

        // Configure custom endpoint for MinIO/LocalStack
        if let Some(ref endpoint_url) = config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }

        // Force path-style access for MinIO compatibility
        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let s3_config = s3_config_builder.build();
        let client = S3Client::from_conf(s3_config);

        info!(
            bucket = %config.bucket,
            region = %config.region,
            "S3 image storage initialized"
        );

        Ok(Self {
            client,
            bucket: config.bucket.clone(),
            base_url: public_base(&config.bucket, &config.region, config.public_base_url.as_deref()),
        })
    }
}

#[async_trait]
impl ObjectStorage for S3ObjectStorage {
    #[instrument(skip(self, bytes), fields(key = %key, size_bytes = bytes.len()))]
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> MarketResult<String> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| MarketError::Storage(format!("failed to upload object {key}: {e}")))?;

        debug!(key = %key, "Object uploaded");
        Ok(self.url_for_key(key))
    }

    #[instrument(skip(self), fields(key = %key))]
    async fn delete(&self, key: &str) -> MarketResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| MarketError::Storage(format!("failed to delete object {key}: {e}")))?;

        debug!(key = %key, "Object deleted");
        Ok(())
    }

    fn url_for_key(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key)
    }

    fn key_for_url(&self, url: &str) -> Option<String> {
        url.strip_prefix(&format!("{}/", self.base_url))
            .map(str::to_string)
    }
}

/// In-memory object storage for tests and local development. Records every
/// delete so tests can assert the compensating-cleanup behavior.
#[derive(Default)]
pub struct MemoryObjectStorage {
    objects: RwLock<HashMap<String, Vec<u8>>>,
    puts: RwLock<Vec<String>>,
    deleted: RwLock<Vec<String>>,
}

impl MemoryObjectStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn object_count(&self) -> usize {
        self.objects.read().unwrap().len()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.objects.read().unwrap().contains_key(key)
    }

    pub fn contains_url(&self, url: &str) -> bool {
        self.key_for_url(url)
            .map(|key| self.contains_key(&key))
            .unwrap_or(false)
    }

    /// Keys in the order they were written.
    pub fn put_keys(&self) -> Vec<String> {
        self.puts.read().unwrap().clone()
    }

    /// Keys that have been deleted, in deletion order.
    pub fn deleted_keys(&self) -> Vec<String> {
        self.deleted.read().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStorage for MemoryObjectStorage {
    async fn put(&self, key: &str, bytes: Vec<u8>, _content_type: &str) -> MarketResult<String> {
        self.objects
            .write()
            .unwrap()
            .insert(key.to_string(), bytes);
        self.puts.write().unwrap().push(key.to_string());
        Ok(self.url_for_key(key))
    }

    async fn delete(&self, key: &str) -> MarketResult<()> {
        self.objects.write().unwrap().remove(key);
        self.deleted.write().unwrap().push(key.to_string());
        Ok(())
    }

    fn url_for_key(&self, key: &str) -> String {
        format!("memory://{key}")
    }

    fn key_for_url(&self, url: &str) -> Option<String> {
        url.strip_prefix("memory://").map(str::to_string)
    }
}
