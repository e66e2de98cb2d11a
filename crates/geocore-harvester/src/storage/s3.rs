use async_trait::async_trait;
use aws_sdk_s3::{
    config::{Credentials, Region},
    primitives::ByteStream,
    Client,
};
use geocore_common::{HarvestError, Result};
use tracing::{debug, info, instrument};

use super::{content_type_for, ObjectStore, PutReceipt, StorageConfig};

/// [`ObjectStore`] over S3 or an S3-compatible endpoint
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    pub async fn new(config: &StorageConfig) -> Result<Self> {
        debug!(
            region = %config.region,
            endpoint = ?config.endpoint,
            path_style = config.path_style,
            "Initializing S3 object store"
        );

        let mut builder = match config.static_credentials() {
            Some((access, secret)) => aws_sdk_s3::Config::builder()
                .credentials_provider(Credentials::new(access, secret, None, None, "geocore-storage"))
                .region(Region::new(config.region.clone())),
            None => {
                let shared = aws_config::defaults(aws_config::BehaviorVersion::latest())
                    .region(Region::new(config.region.clone()))
                    .load()
                    .await;
                aws_sdk_s3::config::Builder::from(&shared)
            },
        };

        builder = builder.force_path_style(config.path_style);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        info!(region = %config.region, "S3 object store initialized");

        Ok(Self {
            client: Client::from_conf(builder.build()),
        })
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[instrument(skip(self))]
    async fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let response = match self.client.get_object().bucket(bucket).key(key).send().await {
            Ok(response) => response,
            Err(e) if e.as_service_error().is_some_and(|se| se.is_no_such_key()) => {
                debug!("Object s3://{}/{} not found", bucket, key);
                return Ok(None);
            },
            Err(e) => {
                return Err(HarvestError::Storage(format!(
                    "failed to get s3://{}/{}: {}",
                    bucket, key, e
                )))
            },
        };

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| {
                HarvestError::Storage(format!("failed to read s3://{}/{}: {}", bucket, key, e))
            })?
            .into_bytes()
            .to_vec();

        debug!("Downloaded {} bytes from s3://{}/{}", data.len(), bucket, key);
        Ok(Some(data))
    }

    #[instrument(skip(self, data))]
    async fn put(&self, bucket: &str, key: &str, data: Vec<u8>) -> Result<PutReceipt> {
        let receipt = PutReceipt::new(bucket, key, &data);

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type_for(key))
            .metadata("sha256", &receipt.checksum)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| {
                HarvestError::Storage(format!("failed to put s3://{}/{}: {}", bucket, key, e))
            })?;

        debug!("Uploaded {} bytes to s3://{}/{}", receipt.size, bucket, key);
        Ok(receipt)
    }

    #[instrument(skip(self))]
    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                HarvestError::Storage(format!("failed to delete s3://{}/{}: {}", bucket, key, e))
            })?;

        debug!("Deleted s3://{}/{}", bucket, key);
        Ok(())
    }
}
