use super::UploadService;
use crate::models::S3Settings;
use crate::{Error, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::{config::Region, types::ObjectCannedAcl, Client as S3Client};
use uuid::Uuid;

/// Uploads source images to an S3-compatible bucket with public-read ACL.
pub struct S3Uploader {
    client: S3Client,
    bucket: String,
    base_url: String,
}

impl S3Uploader {
    pub async fn new(settings: &S3Settings) -> Result<Self> {
        let credentials = aws_sdk_s3::config::Credentials::new(
            settings.access_key_id.clone(),
            settings.secret_access_key.clone(),
            None,
            None,
            "aidraw-upload",
        );

        // S3-compatible providers ignore the region but the SDK requires one
        let config = aws_config::defaults(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new("us-east-1"))
            .endpoint_url(&settings.endpoint)
            .load()
            .await;

        Ok(Self {
            client: S3Client::new(&config),
            bucket: settings.bucket.clone(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn object_key(file_name: &str) -> String {
        format!("uploads/{}_{}", Uuid::new_v4(), file_name)
    }
}

#[async_trait]
impl UploadService for S3Uploader {
    async fn upload(&self, data: &[u8], content_type: &str, file_name: &str) -> Result<String> {
        let key = Self::object_key(file_name);
        tracing::debug!("Uploading {} bytes to s3://{}/{}", data.len(), self.bucket, key);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(data.to_vec()))
            .content_type(content_type)
            .acl(ObjectCannedAcl::PublicRead)
            .send()
            .await
            .map_err(|e| Error::S3(format!("Failed to upload {}: {}", key, e)))?;

        Ok(format!("{}/{}", self.base_url, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_key_is_unique_and_keeps_name() {
        let first = S3Uploader::object_key("image.png");
        let second = S3Uploader::object_key("image.png");

        assert!(first.starts_with("uploads/"));
        assert!(first.ends_with("_image.png"));
        assert_ne!(first, second);
    }
}
