//! Remote object storage for oversized source images
//!
//! An uploader takes raw bytes and returns a publicly fetchable URL. The FAL
//! storage service is the default; any S3-compatible bucket can stand in.

pub mod fal;
pub mod mock;
pub mod s3;

pub use fal::FalStorageClient;
pub use mock::MockUploader;
pub use s3::S3Uploader;

use crate::Result;
use async_trait::async_trait;

#[async_trait]
pub trait UploadService: Send + Sync {
    async fn upload(&self, data: &[u8], content_type: &str, file_name: &str) -> Result<String>;
}
