use super::mime::extension_for;
use super::InlineImage;
use crate::upload::UploadService;
use crate::{Error, Result};
use tracing::{debug, info};

/// Decoded size above which an image is uploaded instead of inlined (1.5 MiB).
pub const INLINE_SIZE_THRESHOLD: usize = 1_572_864;

/// How a source image is referenced in an outbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageRepresentation {
    /// The original data URL, forwarded unmodified.
    Inline(String),
    /// A fetchable URL returned by the upload collaborator.
    Remote(String),
}

impl ImageRepresentation {
    /// The string placed into the wire payload in either case.
    pub fn as_url(&self) -> &str {
        match self {
            ImageRepresentation::Inline(data_url) => data_url,
            ImageRepresentation::Remote(url) => url,
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, ImageRepresentation::Remote(_))
    }
}

/// Chooses inline vs uploaded representation from decoded byte size alone.
pub struct ImageEncoder<'a> {
    uploader: &'a dyn UploadService,
}

impl<'a> ImageEncoder<'a> {
    pub fn new(uploader: &'a dyn UploadService) -> Self {
        Self { uploader }
    }

    pub async fn encode(&self, image: &InlineImage) -> Result<ImageRepresentation> {
        let bytes = image.decode()?;
        debug!(
            "Source image is {:.2} MiB ({} bytes)",
            bytes.len() as f64 / 1024.0 / 1024.0,
            bytes.len()
        );

        if bytes.len() <= INLINE_SIZE_THRESHOLD {
            return Ok(ImageRepresentation::Inline(image.as_str().to_string()));
        }

        info!(
            "Source image exceeds {} bytes, uploading to remote storage",
            INLINE_SIZE_THRESHOLD
        );
        let file_name = format!("image.{}", extension_for(image.media_type()));
        let url = self
            .uploader
            .upload(&bytes, image.media_type(), &file_name)
            .await
            .map_err(|e| Error::UploadFailed(Box::new(e)))?;

        Ok(ImageRepresentation::Remote(url))
    }
}
