use crate::{Error, Result};
use base64::Engine as _;

/// An image carried as a base64 data URL (`data:<media-type>;base64,<payload>`).
///
/// Parsing only checks the envelope; the payload is decoded lazily so the
/// original text can be forwarded untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    data_url: String,
    media_type_end: usize,
    payload_start: usize,
}

impl InlineImage {
    pub fn parse(data_url: impl Into<String>) -> Result<Self> {
        let data_url = data_url.into();

        let rest = data_url.strip_prefix("data:").ok_or_else(|| {
            Error::InvalidImageEncoding("Missing 'data:' prefix".to_string())
        })?;
        let (header, _) = rest.split_once(',').ok_or_else(|| {
            Error::InvalidImageEncoding("Missing payload separator ','".to_string())
        })?;
        let media_type = header.strip_suffix(";base64").ok_or_else(|| {
            Error::InvalidImageEncoding(format!("Unsupported data URL header '{}'", header))
        })?;
        if media_type.is_empty() || !media_type.contains('/') {
            return Err(Error::InvalidImageEncoding(format!(
                "Invalid media type '{}'",
                media_type
            )));
        }

        let media_type_end = "data:".len() + media_type.len();
        let payload_start = "data:".len() + header.len() + 1;

        Ok(Self {
            data_url,
            media_type_end,
            payload_start,
        })
    }

    /// Wrap raw bytes as a data URL.
    pub fn from_bytes(bytes: &[u8], media_type: &str) -> Self {
        let payload = base64::engine::general_purpose::STANDARD.encode(bytes);
        let data_url = format!("data:{};base64,{}", media_type, payload);
        let media_type_end = "data:".len() + media_type.len();
        let payload_start = media_type_end + ";base64,".len();
        Self {
            data_url,
            media_type_end,
            payload_start,
        }
    }

    pub fn media_type(&self) -> &str {
        &self.data_url["data:".len()..self.media_type_end]
    }

    pub fn payload(&self) -> &str {
        &self.data_url[self.payload_start..]
    }

    pub fn as_str(&self) -> &str {
        &self.data_url
    }

    pub fn decode(&self) -> Result<Vec<u8>> {
        base64::engine::general_purpose::STANDARD
            .decode(self.payload().trim())
            .map_err(|e| Error::InvalidImageEncoding(format!("Invalid base64 payload: {}", e)))
    }
}
