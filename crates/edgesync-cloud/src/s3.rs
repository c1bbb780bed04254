//! S3-compatible object store adapter
//!
//! Wraps the AWS SDK for S3 and implements [`IObjectStore`]. Works with
//! Tencent COS through its S3-compatible endpoint as well as MinIO and AWS.
//!
//! Listings use `ListObjects` (v1) so that pagination is driven by a
//! `marker`, which the sync engine falls back to when a store omits
//! `NextMarker`. Bodies larger than the part-size hint go through a
//! multipart upload that is aborted if any part fails.

use std::collections::HashMap;
use std::path::Path;

use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    config::{Credentials as S3Credentials, Region},
    error::DisplayErrorContext,
    primitives::ByteStream,
    types::{CompletedMultipartUpload, CompletedPart},
    Client,
};
use chrono::DateTime;
use edgesync_core::{
    config::StoreConfig,
    domain::{newtypes::ObjectKey, records::RemoteObject},
    ports::object_store::{IObjectStore, ListPage, ListRequest, PutBody, PutOptions, PutReceipt},
};
use tokio::io::AsyncReadExt;
use tracing::{debug, info, instrument, warn};

use crate::{CloudError, Credentials};

/// Provider name attached to static credentials
const CREDENTIALS_PROVIDER: &str = "edgesync";

/// Default endpoint for a Tencent COS region
pub fn cos_endpoint(region: &str) -> String {
    format!("https://cos.{region}.myqcloud.com")
}

/// Object store over an S3-compatible API
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    /// Create a store from configuration
    ///
    /// # Errors
    /// Returns error if the bucket or credentials are missing, or the
    /// endpoint is not a valid URL
    pub fn new(config: &StoreConfig) -> Result<Self, CloudError> {
        if config.bucket.is_empty() {
            return Err(CloudError::MissingConfig("store.bucket"));
        }
        let creds = Credentials::from_store(config)?;

        let endpoint = config
            .endpoint
            .clone()
            .unwrap_or_else(|| cos_endpoint(&config.region));
        url::Url::parse(&endpoint).map_err(|e| CloudError::InvalidEndpoint {
            url: endpoint.clone(),
            reason: e.to_string(),
        })?;

        let credentials = S3Credentials::new(
            creds.secret_id,
            creds.secret_key,
            creds.session_token,
            None,
            CREDENTIALS_PROVIDER,
        );

        let s3_config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&endpoint)
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .force_path_style(config.force_path_style)
            .build();

        info!(%endpoint, bucket = %config.bucket, "Configured object store");
        Ok(Self {
            client: Client::from_conf(s3_config),
            bucket: config.bucket.clone(),
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put_single(
        &self,
        key: &ObjectKey,
        body: ByteStream,
        options: &PutOptions,
    ) -> Result<PutReceipt, CloudError> {
        let response = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key.as_str())
            .body(body)
            .set_metadata(metadata(options))
            .set_content_type(options.content_type.clone())
            .send()
            .await
            .map_err(|e| store_error("PutObject", key, e))?;

        Ok(PutReceipt {
            etag: response.e_tag().map(strip_quotes),
        })
    }

    async fn put_multipart(
        &self,
        key: &ObjectKey,
        mut source: PartSource,
        options: &PutOptions,
    ) -> Result<PutReceipt, CloudError> {
        let created = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key.as_str())
            .set_metadata(metadata(options))
            .set_content_type(options.content_type.clone())
            .send()
            .await
            .map_err(|e| store_error("CreateMultipartUpload", key, e))?;
        let upload_id = created
            .upload_id()
            .ok_or_else(|| CloudError::InvalidResponse("multipart upload without UploadId".into()))?
            .to_string();

        match self.upload_parts(key, &upload_id, &mut source, options.part_size).await {
            Ok(receipt) => Ok(receipt),
            Err(e) => {
                let aborted = self
                    .client
                    .abort_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key.as_str())
                    .upload_id(&upload_id)
                    .send()
                    .await;
                if let Err(abort) = aborted {
                    warn!(%key, error = %DisplayErrorContext(&abort), "Failed to abort multipart upload");
                }
                Err(e)
            }
        }
    }

    async fn upload_parts(
        &self,
        key: &ObjectKey,
        upload_id: &str,
        source: &mut PartSource,
        part_size: u64,
    ) -> Result<PutReceipt, CloudError> {
        let mut parts = Vec::new();
        let mut number = 1i32;

        loop {
            let chunk = source.next_part(part_size).await?;
            if chunk.is_empty() {
                break;
            }
            let uploaded = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(key.as_str())
                .upload_id(upload_id)
                .part_number(number)
                .body(ByteStream::from(chunk))
                .send()
                .await
                .map_err(|e| store_error("UploadPart", key, e))?;
            debug!(%key, part = number, "Uploaded part");

            parts.push(
                CompletedPart::builder()
                    .part_number(number)
                    .set_e_tag(uploaded.e_tag().map(str::to_string))
                    .build(),
            );
            number += 1;
        }

        let completed = self
            .client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key.as_str())
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| store_error("CompleteMultipartUpload", key, e))?;

        Ok(PutReceipt {
            etag: completed.e_tag().map(strip_quotes),
        })
    }
}

#[async_trait::async_trait]
impl IObjectStore for S3ObjectStore {
    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn list_objects(&self, request: &ListRequest) -> anyhow::Result<ListPage> {
        let response = self
            .client
            .list_objects()
            .bucket(&self.bucket)
            .prefix(&request.prefix)
            .set_delimiter(request.delimiter.clone())
            .set_marker(request.marker.clone())
            .max_keys(i32::try_from(request.max_keys).unwrap_or(i32::MAX))
            .send()
            .await
            .map_err(|e| CloudError::Store {
                op: "ListObjects",
                key: request.prefix.clone(),
                message: DisplayErrorContext(&e).to_string(),
            })?;

        let mut items = Vec::new();
        for object in response.contents() {
            let Some(raw) = object.key() else { continue };
            let key = match ObjectKey::new(raw.to_string()) {
                Ok(key) => key,
                Err(e) => {
                    warn!(key = raw, error = %e, "Skipping unaddressable object");
                    continue;
                }
            };
            let size = object.size().unwrap_or(0).max(0) as u64;
            let mut remote = RemoteObject::new(key, size);
            if let Some(etag) = object.e_tag() {
                remote = remote.with_etag(etag);
            }
            if let Some(at) = object
                .last_modified()
                .and_then(|dt| DateTime::from_timestamp(dt.secs(), dt.subsec_nanos()))
            {
                remote = remote.with_last_modified(at);
            }
            items.push(remote);
        }

        let common_prefixes = response
            .common_prefixes()
            .iter()
            .filter_map(|p| p.prefix().map(str::to_string))
            .collect();

        Ok(ListPage {
            items,
            truncated: response.is_truncated().unwrap_or(false),
            next_marker: response.next_marker().map(str::to_string),
            common_prefixes,
        })
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn get_object(&self, key: &ObjectKey) -> anyhow::Result<Option<Vec<u8>>> {
        let response = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key.as_str())
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                let missing = e.as_service_error().map_or(false, |s| s.is_no_such_key())
                    || e.raw_response().map_or(false, |r| r.status().as_u16() == 404);
                if missing {
                    return Ok(None);
                }
                return Err(store_error("GetObject", key, e).into());
            }
        };

        let body = response
            .body
            .collect()
            .await
            .map_err(|e| CloudError::Store {
                op: "GetObject",
                key: key.to_string(),
                message: e.to_string(),
            })?
            .into_bytes()
            .to_vec();
        Ok(Some(body))
    }

    #[instrument(skip(self, body, options), fields(bucket = %self.bucket))]
    async fn put_object(
        &self,
        key: &ObjectKey,
        body: PutBody,
        options: &PutOptions,
    ) -> anyhow::Result<PutReceipt> {
        let part_size = options.part_size.max(1);
        let receipt = match body {
            PutBody::Bytes(bytes) if bytes.len() as u64 <= part_size => {
                self.put_single(key, ByteStream::from(bytes), options).await?
            }
            PutBody::Bytes(bytes) => {
                self.put_multipart(key, PartSource::Bytes { data: bytes, offset: 0 }, options)
                    .await?
            }
            PutBody::File(path) => {
                let size = tokio::fs::metadata(&path).await?.len();
                if size <= part_size {
                    let stream = ByteStream::from_path(&path)
                        .await
                        .map_err(|e| CloudError::Store {
                            op: "PutObject",
                            key: key.to_string(),
                            message: e.to_string(),
                        })?;
                    self.put_single(key, stream, options).await?
                } else {
                    debug!(%key, size, part_size, "Using multipart upload");
                    self.put_multipart(key, PartSource::open(&path).await?, options)
                        .await?
                }
            }
        };
        Ok(receipt)
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn delete_object(&self, key: &ObjectKey) -> anyhow::Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key.as_str())
            .send()
            .await
            .map_err(|e| store_error("DeleteObject", key, e))?;
        Ok(())
    }
}

/// Sequential reader of multipart chunks
enum PartSource {
    File(tokio::fs::File),
    Bytes { data: Vec<u8>, offset: usize },
}

impl PartSource {
    async fn open(path: &Path) -> Result<Self, CloudError> {
        Ok(Self::File(tokio::fs::File::open(path).await?))
    }

    /// Next chunk of at most `size` bytes; empty at end of input
    async fn next_part(&mut self, size: u64) -> Result<Vec<u8>, CloudError> {
        match self {
            Self::File(file) => {
                let mut chunk = Vec::new();
                file.take(size).read_to_end(&mut chunk).await?;
                Ok(chunk)
            }
            Self::Bytes { data, offset } => {
                let end = (*offset).saturating_add(size as usize).min(data.len());
                let chunk = data[*offset..end].to_vec();
                *offset = end;
                Ok(chunk)
            }
        }
    }
}

fn metadata(options: &PutOptions) -> Option<HashMap<String, String>> {
    if options.metadata.is_empty() {
        None
    } else {
        Some(options.metadata.clone().into_iter().collect())
    }
}

fn strip_quotes(etag: &str) -> String {
    etag.trim_matches('"').to_string()
}

fn store_error<E>(op: &'static str, key: &ObjectKey, err: E) -> CloudError
where
    E: std::error::Error,
{
    CloudError::Store {
        op,
        key: key.to_string(),
        message: DisplayErrorContext(&err).to_string(),
    }
}
