//! Amazon S3 (and S3-compatible) object storage.

use async_trait::async_trait;
use aws_sdk_s3::{
    Client,
    config::{BehaviorVersion, Credentials, Region},
    error::DisplayErrorContext,
    primitives::ByteStream,
};
use kiln_config::StorageConfig;
use tracing::{debug, info};

use crate::store::{ObjectStore, StorageError};

/// Name reported for the static credentials taken from the configuration.
const CREDENTIALS_PROVIDER: &str = "kiln-config";

/// Puts objects into a single S3 bucket.
///
/// The client is built once and reused for every upload.
#[derive(Debug, Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
}

impl S3Store {
    /// Build a client for the region, credentials and bucket in `config`.
    ///
    /// A custom endpoint switches to path-style addressing, which is what
    /// self-hosted S3-compatible services expect.
    pub fn from_config(config: &StorageConfig) -> Self {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            CREDENTIALS_PROVIDER,
        );
        let mut builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials);
        if let Some(endpoint) = &config.endpoint {
            info!("Using custom storage endpoint {endpoint}");
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket.clone(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put_object(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<(), StorageError> {
        debug!("PUT s3://{}/{key} ({} bytes)", self.bucket, body.len());
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body));
        if let Some(content_type) = content_type {
            request = request.content_type(content_type);
        }
        request
            .send()
            .await
            .map_err(|err| StorageError::new(DisplayErrorContext(&err).to_string()))?;
        Ok(())
    }
}
