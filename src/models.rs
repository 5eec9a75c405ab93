//! Data models and structures
//!
//! Defines the normalized generation request, the model catalog entries,
//! the persisted credential/history records, and runtime configuration.

use crate::image::InlineImage;
use crate::{Error, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Backend protocol family a model is served by.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BackendFamily {
    /// Job-style queue API.
    #[serde(rename = "fal")]
    Fal,
    /// OpenAI-compatible chat completions, consumed in streaming mode.
    #[serde(rename = "openai")]
    ChatCompatible,
}

impl fmt::Display for BackendFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendFamily::Fal => f.write_str("fal"),
            BackendFamily::ChatCompatible => f.write_str("openai"),
        }
    }
}

impl FromStr for BackendFamily {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "fal" => Ok(BackendFamily::Fal),
            "openai" | "chat" => Ok(BackendFamily::ChatCompatible),
            other => Err(format!("Unknown backend family '{}'", other)),
        }
    }
}

/// Capability tag attached to a catalog model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ModelTag {
    TextToImage,
    ImageToImage,
    TextToVideo,
    ImageToVideo,
}

impl ModelTag {
    pub fn accepts_images(self) -> bool {
        matches!(self, ModelTag::ImageToImage | ModelTag::ImageToVideo)
    }

    pub fn is_video(self) -> bool {
        matches!(self, ModelTag::TextToVideo | ModelTag::ImageToVideo)
    }

    pub fn label(self) -> &'static str {
        match self {
            ModelTag::TextToImage => "text-to-image",
            ModelTag::ImageToImage => "image-to-image",
            ModelTag::TextToVideo => "text-to-video",
            ModelTag::ImageToVideo => "image-to-video",
        }
    }
}

impl FromStr for ModelTag {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.replace('-', "_").as_str() {
            "text_to_image" => Ok(ModelTag::TextToImage),
            "image_to_image" => Ok(ModelTag::ImageToImage),
            "text_to_video" => Ok(ModelTag::TextToVideo),
            "image_to_video" => Ok(ModelTag::ImageToVideo),
            _ => Err(format!("Unknown model tag '{}'", s)),
        }
    }
}

/// Output aspect ratio; `Original` defers to the server default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AspectRatio {
    Original,
    #[default]
    Square,
    Landscape16x9,
    Portrait9x16,
    Portrait2x3,
    Landscape3x2,
    Portrait4x5,
    Landscape5x4,
    Portrait3x4,
    Landscape4x3,
    Ultrawide21x9,
    Ultratall9x21,
}

impl AspectRatio {
    const ALL: [AspectRatio; 12] = [
        AspectRatio::Original,
        AspectRatio::Square,
        AspectRatio::Landscape16x9,
        AspectRatio::Portrait9x16,
        AspectRatio::Portrait2x3,
        AspectRatio::Landscape3x2,
        AspectRatio::Portrait4x5,
        AspectRatio::Landscape5x4,
        AspectRatio::Portrait3x4,
        AspectRatio::Landscape4x3,
        AspectRatio::Ultrawide21x9,
        AspectRatio::Ultratall9x21,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AspectRatio::Original => "original",
            AspectRatio::Square => "1:1",
            AspectRatio::Landscape16x9 => "16:9",
            AspectRatio::Portrait9x16 => "9:16",
            AspectRatio::Portrait2x3 => "2:3",
            AspectRatio::Landscape3x2 => "3:2",
            AspectRatio::Portrait4x5 => "4:5",
            AspectRatio::Landscape5x4 => "5:4",
            AspectRatio::Portrait3x4 => "3:4",
            AspectRatio::Landscape4x3 => "4:3",
            AspectRatio::Ultrawide21x9 => "21:9",
            AspectRatio::Ultratall9x21 => "9:21",
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AspectRatio {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|ratio| ratio.as_str() == s)
            .ok_or_else(|| format!("Unknown aspect ratio '{}'", s))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    #[default]
    Auto,
    High,
    Medium,
    Low,
    Hd,
    Standard,
}

impl Quality {
    pub fn as_str(self) -> &'static str {
        match self {
            Quality::Auto => "auto",
            Quality::High => "high",
            Quality::Medium => "medium",
            Quality::Low => "low",
            Quality::Hd => "hd",
            Quality::Standard => "standard",
        }
    }
}

impl FromStr for Quality {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "auto" => Ok(Quality::Auto),
            "high" => Ok(Quality::High),
            "medium" => Ok(Quality::Medium),
            "low" => Ok(Quality::Low),
            "hd" => Ok(Quality::Hd),
            "standard" => Ok(Quality::Standard),
            other => Err(format!("Unknown quality '{}'", other)),
        }
    }
}

/// Output dimensions for masked edits on OpenAI-compatible gateways.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum ImageSize {
    #[default]
    #[serde(rename = "auto")]
    Auto,
    #[serde(rename = "1024x1024")]
    Square1024,
    #[serde(rename = "1536x1024")]
    Landscape1536,
    #[serde(rename = "1024x1536")]
    Portrait1536,
    #[serde(rename = "1792x1024")]
    Wide1792,
}

impl ImageSize {
    pub fn as_str(self) -> &'static str {
        match self {
            ImageSize::Auto => "auto",
            ImageSize::Square1024 => "1024x1024",
            ImageSize::Landscape1536 => "1536x1024",
            ImageSize::Portrait1536 => "1024x1536",
            ImageSize::Wide1792 => "1792x1024",
        }
    }
}

impl FromStr for ImageSize {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "auto" => Ok(ImageSize::Auto),
            "1024x1024" => Ok(ImageSize::Square1024),
            "1536x1024" => Ok(ImageSize::Landscape1536),
            "1024x1536" => Ok(ImageSize::Portrait1536),
            "1792x1024" => Ok(ImageSize::Wide1792),
            other => Err(format!("Unknown image size '{}'", other)),
        }
    }
}

/// FAL safety tolerance, 1 (strictest) through 6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SafetyTolerance(u8);

impl SafetyTolerance {
    pub fn new(level: u8) -> Result<Self> {
        if (1..=6).contains(&level) {
            Ok(Self(level))
        } else {
            Err(Error::InvalidRequest(format!(
                "Safety tolerance must be between 1 and 6, got {}",
                level
            )))
        }
    }

    pub fn level(self) -> u8 {
        self.0
    }
}

impl Default for SafetyTolerance {
    fn default() -> Self {
        Self(2)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VideoDuration {
    #[default]
    Five,
    Ten,
}

impl VideoDuration {
    pub fn seconds(self) -> u32 {
        match self {
            VideoDuration::Five => 5,
            VideoDuration::Ten => 10,
        }
    }
}

impl FromStr for VideoDuration {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "5" => Ok(VideoDuration::Five),
            "10" => Ok(VideoDuration::Ten),
            other => Err(format!("Duration must be 5 or 10, got '{}'", other)),
        }
    }
}

pub const MAX_SOURCE_IMAGES: usize = 4;
pub const MAX_IMAGE_COUNT: u8 = 4;

/// A single normalized generation request, consumed by one orchestration call.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub family: BackendFamily,
    pub model: String,
    /// Capability tag of `model`; `None` means text-only and not video.
    pub model_tag: Option<ModelTag>,
    pub source_images: Vec<InlineImage>,
    pub mask: Option<InlineImage>,
    pub aspect_ratio: AspectRatio,
    pub n: u8,
    pub quality: Quality,
    /// Only sent with masked edits.
    pub size: Option<ImageSize>,
    pub enable_safety_checker: bool,
    pub safety_tolerance: SafetyTolerance,
    pub duration: VideoDuration,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, family: BackendFamily, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            family,
            model: model.into(),
            model_tag: None,
            source_images: Vec::new(),
            mask: None,
            aspect_ratio: AspectRatio::default(),
            n: 1,
            quality: Quality::default(),
            size: None,
            enable_safety_checker: true,
            safety_tolerance: SafetyTolerance::default(),
            duration: VideoDuration::default(),
        }
    }

    /// Build a request targeting a catalog entry, inheriting its family and tag.
    pub fn for_model(prompt: impl Into<String>, model: &CustomModel) -> Self {
        Self::new(prompt, model.model_type, model.value.clone()).with_tag(model.tag)
    }

    pub fn with_tag(mut self, tag: Option<ModelTag>) -> Self {
        self.model_tag = tag;
        self
    }

    pub fn with_source_images(mut self, images: Vec<InlineImage>) -> Self {
        self.source_images = images;
        self
    }

    pub fn with_mask(mut self, mask: InlineImage) -> Self {
        self.mask = Some(mask);
        self
    }

    pub fn with_size(mut self, size: Option<ImageSize>) -> Self {
        self.size = size;
        self
    }

    pub fn with_aspect_ratio(mut self, aspect_ratio: AspectRatio) -> Self {
        self.aspect_ratio = aspect_ratio;
        self
    }

    pub fn with_count(mut self, n: u8) -> Self {
        self.n = n;
        self
    }

    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_safety_checker(mut self, enabled: bool) -> Self {
        self.enable_safety_checker = enabled;
        self
    }

    pub fn with_safety_tolerance(mut self, tolerance: SafetyTolerance) -> Self {
        self.safety_tolerance = tolerance;
        self
    }

    pub fn with_duration(mut self, duration: VideoDuration) -> Self {
        self.duration = duration;
        self
    }

    pub fn accepts_images(&self) -> bool {
        self.model_tag.is_some_and(ModelTag::accepts_images)
    }

    pub fn is_video_model(&self) -> bool {
        self.model_tag.is_some_and(ModelTag::is_video)
    }

    /// Checks every precondition that can be decided without the network.
    pub fn validate(&self) -> Result<()> {
        if self.prompt.trim().is_empty() {
            return Err(Error::MissingInput("Prompt must not be empty".to_string()));
        }
        if self.accepts_images() && self.source_images.is_empty() {
            return Err(Error::MissingInput(format!(
                "Model '{}' requires at least one source image",
                self.model
            )));
        }
        if self.source_images.len() > MAX_SOURCE_IMAGES {
            return Err(Error::InvalidRequest(format!(
                "At most {} source images are supported, got {}",
                MAX_SOURCE_IMAGES,
                self.source_images.len()
            )));
        }
        if !(1..=MAX_IMAGE_COUNT).contains(&self.n) {
            return Err(Error::InvalidRequest(format!(
                "Image count must be between 1 and {}, got {}",
                MAX_IMAGE_COUNT, self.n
            )));
        }
        Ok(())
    }
}

/// Persisted API credential record, shared by both backend families.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApiConfig {
    pub key: String,
    #[serde(default)]
    pub base_url: String,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used: Option<String>,
}

impl ApiConfig {
    pub fn new(key: String, base_url: String) -> Self {
        Self {
            key,
            base_url,
            created_at: Utc::now().to_rfc3339(),
            last_used: None,
        }
    }
}

/// One entry of the generation history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedImage {
    pub id: String,
    pub prompt: String,
    pub url: String,
    pub model: String,
    pub created_at: String,
    pub aspect_ratio: String,
}

/// A model catalog entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CustomModel {
    pub id: String,
    pub name: String,
    /// Identifier sent to the backend.
    pub value: String,
    #[serde(rename = "type")]
    pub model_type: BackendFamily,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<ModelTag>,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_default: Option<bool>,
}

/// Partial update applied to a stored catalog entry.
#[derive(Debug, Clone, Default)]
pub struct CustomModelUpdate {
    pub name: Option<String>,
    pub value: Option<String>,
    pub model_type: Option<BackendFamily>,
    pub tag: Option<Option<ModelTag>>,
}

impl CustomModelUpdate {
    pub fn apply(&self, model: &mut CustomModel) {
        if let Some(name) = &self.name {
            model.name = name.clone();
        }
        if let Some(value) = &self.value {
            model.value = value.clone();
        }
        if let Some(model_type) = self.model_type {
            model.model_type = model_type;
        }
        if let Some(tag) = self.tag {
            model.tag = tag;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadBackend {
    Fal,
    S3,
}

#[derive(Debug, Clone)]
pub struct S3Settings {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub endpoint: String,
    pub bucket: String,
    pub base_url: String,
}

// Configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub store_path: PathBuf,
    pub fal_queue_url: String,
    pub fal_storage_url: String,
    pub fal_poll_interval: Duration,
    pub fal_default_key: Option<String>,
    pub upload_backend: UploadBackend,
    pub s3: Option<S3Settings>,
}

impl Config {
    pub fn from_env() -> crate::Result<Self> {
        dotenvy::dotenv().ok();

        let upload_backend = match std::env::var("UPLOAD_BACKEND").as_deref() {
            Ok("s3") => UploadBackend::S3,
            Ok("fal") | Err(_) => UploadBackend::Fal,
            Ok(other) => {
                return Err(Error::Config(format!(
                    "UPLOAD_BACKEND must be 'fal' or 's3', got '{}'",
                    other
                )))
            }
        };

        let s3 = if upload_backend == UploadBackend::S3 {
            Some(S3Settings {
                access_key_id: required_var("CDN_ACCESS_KEY_ID")?,
                secret_access_key: required_var("CDN_SECRET_ACCESS_KEY")?,
                endpoint: required_var("CDN_ENDPOINT")?,
                bucket: required_var("CDN_BUCKET")?,
                base_url: required_var("CDN_BASE_URL")?,
            })
        } else {
            None
        };

        let poll_ms = match std::env::var("FAL_POLL_INTERVAL_MS") {
            Ok(raw) => raw.parse::<u64>().map_err(|_| {
                Error::Config(format!("FAL_POLL_INTERVAL_MS is not a number: '{}'", raw))
            })?,
            Err(_) => 500,
        };

        Ok(Self {
            store_path: std::env::var("AIDRAW_STORE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(".aidraw").join("store.json")),
            fal_queue_url: std::env::var("FAL_QUEUE_URL")
                .unwrap_or_else(|_| "https://queue.fal.run".to_string()),
            fal_storage_url: std::env::var("FAL_STORAGE_URL")
                .unwrap_or_else(|_| "https://rest.alpha.fal.ai".to_string()),
            fal_poll_interval: Duration::from_millis(poll_ms),
            fal_default_key: std::env::var("FAL_DEFAULT_KEY")
                .ok()
                .filter(|key| !key.is_empty()),
            upload_backend,
            s3,
        })
    }
}

fn required_var(name: &str) -> crate::Result<String> {
    std::env::var(name).map_err(|_| Error::Config(format!("{} not set", name)))
}
