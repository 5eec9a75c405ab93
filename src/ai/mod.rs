//! Generation backends.
//!
//! Two families are supported: FAL queue jobs, which resolve to a single
//! asset URL, and OpenAI-compatible chat gateways, which stream text deltas
//! and announce the asset as a markdown link.

pub mod callbacks;
pub mod fal;
pub mod mock;
pub mod openai;

pub use callbacks::{FnCallbacks, StreamCallbacks};
pub use fal::{FalJob, FalQueueClient};
pub use mock::{MockChatStreamClient, MockFalClient, MockImageEditClient};
pub use openai::{ImageEditRequest, OpenAiImageClient, OpenAiStreamClient};

use crate::models::ApiConfig;
use crate::Result;
use async_trait::async_trait;
use openai::types::ChatCompletionRequest;

/// Where and how to reach an OpenAI-compatible gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatEndpoint {
    pub base_url: String,
    pub api_key: String,
}

impl From<&ApiConfig> for ChatEndpoint {
    fn from(config: &ApiConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            api_key: config.key.clone(),
        }
    }
}

#[async_trait]
pub trait JobService: Send + Sync {
    /// Run a job to completion and return its asset URL.
    async fn submit(&self, credential: &str, job: &FalJob) -> Result<String>;
}

#[async_trait]
pub trait ChatStreamService: Send + Sync {
    /// Stream a completion into `callbacks`.
    ///
    /// Failures go to `on_error`, never to the return value. Returns the
    /// asset URL that was passed to `on_complete`, if any.
    async fn stream(
        &self,
        endpoint: &ChatEndpoint,
        request: &ChatCompletionRequest,
        callbacks: &mut dyn StreamCallbacks,
    ) -> Option<String>;
}

#[async_trait]
pub trait ImageEditService: Send + Sync {
    async fn edit_image(
        &self,
        endpoint: &ChatEndpoint,
        request: &ImageEditRequest,
    ) -> Result<Vec<String>>;
}
