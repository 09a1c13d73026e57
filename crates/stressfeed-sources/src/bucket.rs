//! Object-store adapter: polls a bucket prefix for the newest JSON object.
//!
//! Candidates are the keys under the prefix that end in `.json`. The
//! newest is the one with the greatest `last_modified`; equal times fall
//! back to the greatest key. The adapter remembers the `(key,
//! last_modified)` pair it last fetched and skips the download when the
//! newest object has not changed.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path;
use object_store::{ObjectMeta, ObjectStore};
use stressfeed_core::{FeedContext, extract_with_fallback};
use stressfeed_types::{EpochMillis, SourceTag};
use tracing::{debug, info, warn};

use crate::error::SourceError;
use crate::poll::{PollOutcome, PollingSource};

/// Default key prefix uplinks are stored under.
pub const DEFAULT_PREFIX: &str = "iot_data/";

/// Bucket connection settings.
#[derive(Debug, Clone)]
pub struct BucketConfig {
    /// Bucket name.
    pub bucket: String,
    /// AWS region.
    pub region: String,
    /// Static access key, if not using the ambient credential chain.
    pub access_key_id: Option<String>,
    /// Static secret key.
    pub secret_access_key: Option<String>,
    /// Custom endpoint for S3-compatible stores.
    pub endpoint: Option<String>,
    /// Key prefix to list.
    pub prefix: String,
}

/// Build an S3 client from `config`.
pub fn s3_store(config: &BucketConfig) -> Result<Arc<dyn ObjectStore>, SourceError> {
    let mut builder = AmazonS3Builder::from_env()
        .with_bucket_name(&config.bucket)
        .with_region(&config.region);

    if let (Some(key), Some(secret)) = (&config.access_key_id, &config.secret_access_key) {
        builder = builder
            .with_access_key_id(key)
            .with_secret_access_key(secret);
    }
    if let Some(endpoint) = &config.endpoint {
        builder = builder
            .with_endpoint(endpoint)
            .with_allow_http(endpoint.starts_with("http://"));
    }

    let store = builder.build()?;
    info!(bucket = %config.bucket, region = %config.region, "Object store client ready");
    Ok(Arc::new(store))
}

/// Pick the newest `.json` object: max `last_modified`, then max key.
pub fn newest_json(objects: impl IntoIterator<Item = ObjectMeta>) -> Option<ObjectMeta> {
    objects
        .into_iter()
        .filter(|meta| meta.location.as_ref().ends_with(".json"))
        .max_by(|a, b| {
            a.last_modified
                .cmp(&b.last_modified)
                .then_with(|| a.location.as_ref().cmp(b.location.as_ref()))
        })
}

/// Polls a bucket prefix and offers the newest object to the arbiter.
pub struct BucketAdapter {
    store: Arc<dyn ObjectStore>,
    prefix: Path,
    ctx: FeedContext,
    last_seen: Option<(Path, DateTime<Utc>)>,
}

impl BucketAdapter {
    /// Poll `prefix` in `store`.
    pub fn new(store: Arc<dyn ObjectStore>, prefix: &str, ctx: FeedContext) -> Self {
        Self {
            store,
            prefix: Path::from(prefix),
            ctx,
            last_seen: None,
        }
    }

    async fn newest(&self) -> Result<Option<ObjectMeta>, SourceError> {
        let listed: Vec<ObjectMeta> = self.store.list(Some(&self.prefix)).try_collect().await?;
        Ok(newest_json(listed))
    }
}

impl PollingSource for BucketAdapter {
    fn name(&self) -> &'static str {
        SourceTag::ObjectStore.as_str()
    }

    async fn poll_once(&mut self) -> Result<PollOutcome, SourceError> {
        let Some(meta) = self.newest().await? else {
            return Ok(PollOutcome::Empty);
        };

        let unchanged = self
            .last_seen
            .as_ref()
            .is_some_and(|(key, modified)| *key == meta.location && *modified == meta.last_modified);
        if unchanged {
            return Ok(PollOutcome::Unchanged);
        }

        let bytes = self.store.get(&meta.location).await?.bytes().await?;
        // Remember the object even if it does not parse, so a broken file
        // is not downloaded again every interval.
        self.last_seen = Some((meta.location.clone(), meta.last_modified));

        let raw = match serde_json::from_slice(&bytes) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key = %meta.location, error = %e, "Skipping unparseable object");
                return Ok(PollOutcome::Skipped);
            }
        };

        let stored_at = EpochMillis::from(meta.last_modified);
        let reading = extract_with_fallback(SourceTag::ObjectStore, &raw, Some(stored_at));
        let accepted = self.ctx.offer(reading);
        debug!(key = %meta.location, accepted, "Offered newest object");
        Ok(PollOutcome::Offered { accepted })
    }
}

impl core::fmt::Debug for BucketAdapter {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BucketAdapter")
            .field("store", &self.store.to_string())
            .field("prefix", &self.prefix)
            .field("last_seen", &self.last_seen)
            .finish_non_exhaustive()
    }
}
