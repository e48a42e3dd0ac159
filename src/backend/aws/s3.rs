//! S3 object store
//!
//! Objects up to one part go up in a single `PutObject`. Larger objects are
//! streamed as a multipart upload, one part at a time, so at most one part
//! is held in memory; a failed multipart upload is aborted.

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

use crate::backend::{ByteReader, ObjectBody, ObjectStore, ServiceError, ServiceResult};
use crate::request::ObjectLocation;

/// Default multipart part size (8 MiB)
pub const DEFAULT_PART_SIZE: usize = 8 * 1024 * 1024;

/// Smallest part size S3 accepts for all but the last part
pub const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: Client,
    part_size: usize,
}

impl S3ObjectStore {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            part_size: DEFAULT_PART_SIZE,
        }
    }

    pub fn from_config(config: &SdkConfig) -> Self {
        Self::new(Client::new(config))
    }

    /// Override the part size (clamped to the S3 minimum)
    pub fn with_part_size(mut self, part_size: usize) -> Self {
        self.part_size = part_size.max(MIN_PART_SIZE);
        self
    }

    pub fn part_size(&self) -> usize {
        self.part_size
    }

    async fn put_single(
        &self,
        location: &ObjectLocation,
        mut body: ByteReader,
        length: u64,
    ) -> ServiceResult<()> {
        let mut buffer = Vec::with_capacity(length as usize);
        body.read_to_end(&mut buffer).await?;
        if buffer.len() as u64 != length {
            return Err(ServiceError::InvalidResponse(format!(
                "expected {} bytes for {} but read {}",
                length,
                location,
                buffer.len()
            )));
        }

        self.client
            .put_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .content_length(buffer.len() as i64)
            .body(ByteStream::from(buffer))
            .send()
            .await?;

        Ok(())
    }

    async fn put_multipart(
        &self,
        location: &ObjectLocation,
        body: ByteReader,
        length: u64,
    ) -> ServiceResult<()> {
        let created = self
            .client
            .create_multipart_upload()
            .bucket(&location.bucket)
            .key(&location.key)
            .send()
            .await?;
        let upload_id = created
            .upload_id()
            .ok_or_else(|| ServiceError::InvalidResponse("No upload ID returned".to_string()))?
            .to_string();

        match self.upload_parts(location, &upload_id, body, length).await {
            Ok(parts) => {
                let completed = CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build();
                let result = self
                    .client
                    .complete_multipart_upload()
                    .bucket(&location.bucket)
                    .key(&location.key)
                    .upload_id(&upload_id)
                    .multipart_upload(completed)
                    .send()
                    .await;
                if let Err(e) = result {
                    self.abort(location, &upload_id).await;
                    return Err(e.into());
                }
                Ok(())
            }
            Err(e) => {
                self.abort(location, &upload_id).await;
                Err(e)
            }
        }
    }

    /// Upload parts in sequence, streaming from `body`
    async fn upload_parts(
        &self,
        location: &ObjectLocation,
        upload_id: &str,
        mut body: ByteReader,
        length: u64,
    ) -> ServiceResult<Vec<CompletedPart>> {
        let mut parts = Vec::new();
        let mut part_number = 1i32;
        let mut uploaded = 0u64;

        loop {
            let chunk = read_part(&mut body, self.part_size).await?;
            if chunk.is_empty() {
                break;
            }

            let size = chunk.len();
            let response = self
                .client
                .upload_part()
                .bucket(&location.bucket)
                .key(&location.key)
                .upload_id(upload_id)
                .part_number(part_number)
                .content_length(size as i64)
                .body(ByteStream::from(chunk))
                .send()
                .await?;

            let etag = response.e_tag().ok_or_else(|| {
                ServiceError::InvalidResponse(format!("No ETag returned for part {}", part_number))
            })?;
            parts.push(
                CompletedPart::builder()
                    .part_number(part_number)
                    .e_tag(etag)
                    .build(),
            );

            uploaded += size as u64;
            debug!(part_number, bytes = size, uploaded, "Uploaded part");
            part_number += 1;
        }

        if uploaded != length {
            return Err(ServiceError::InvalidResponse(format!(
                "expected {} bytes for {} but read {}",
                length, location, uploaded
            )));
        }

        Ok(parts)
    }

    async fn abort(&self, location: &ObjectLocation, upload_id: &str) {
        let result = self
            .client
            .abort_multipart_upload()
            .bucket(&location.bucket)
            .key(&location.key)
            .upload_id(upload_id)
            .send()
            .await;
        if let Err(e) = result {
            warn!(
                destination = %location,
                upload_id,
                error = %ServiceError::from(e),
                "Failed to abort multipart upload"
            );
        }
    }
}

/// Read up to `part_size` bytes; a short result means end of stream
async fn read_part(reader: &mut ByteReader, part_size: usize) -> ServiceResult<Bytes> {
    let mut chunk = Vec::with_capacity(part_size);
    let mut limited = (&mut *reader).take(part_size as u64);
    limited.read_to_end(&mut chunk).await?;
    Ok(Bytes::from(chunk))
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn object_size(&self, location: &ObjectLocation) -> ServiceResult<u64> {
        let output = self
            .client
            .head_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .send()
            .await?;

        output
            .content_length()
            .filter(|len| *len >= 0)
            .map(|len| len as u64)
            .ok_or_else(|| {
                ServiceError::InvalidResponse(format!("No content length for {}", location))
            })
    }

    async fn fetch(&self, location: &ObjectLocation) -> ServiceResult<ObjectBody> {
        let output = self
            .client
            .get_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .send()
            .await?;

        let size = output.content_length().unwrap_or(0).max(0) as u64;
        Ok(ObjectBody {
            size,
            reader: Box::new(output.body.into_async_read()),
        })
    }

    async fn put(
        &self,
        location: &ObjectLocation,
        body: ByteReader,
        length: u64,
    ) -> ServiceResult<()> {
        if length <= self.part_size as u64 {
            self.put_single(location, body, length).await
        } else {
            self.put_multipart(location, body, length).await
        }
    }
}
