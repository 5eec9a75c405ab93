use super::client::{rejection, OpenAiHttpClient, CHAT_COMPLETIONS_PATH};
use super::sse::drive_stream;
use super::types::ChatCompletionRequest;
use crate::ai::{ChatEndpoint, ChatStreamService, StreamCallbacks};
use crate::Error;
use async_trait::async_trait;
use tracing::info;

/// Streams chat completions and turns them into callback invocations.
pub struct OpenAiStreamClient {
    http: OpenAiHttpClient,
}

impl OpenAiStreamClient {
    pub fn new() -> Self {
        Self::new_with_client(reqwest::Client::new())
    }

    pub fn new_with_client(client: reqwest::Client) -> Self {
        Self {
            http: OpenAiHttpClient::new_with_client(client),
        }
    }
}

impl Default for OpenAiStreamClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatStreamService for OpenAiStreamClient {
    async fn stream(
        &self,
        endpoint: &ChatEndpoint,
        request: &ChatCompletionRequest,
        callbacks: &mut dyn StreamCallbacks,
    ) -> Option<String> {
        info!("Streaming chat completion from model {}", request.model);

        let response = match self
            .http
            .post_json(endpoint, CHAT_COMPLETIONS_PATH, request)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                callbacks.on_error(e);
                return None;
            }
        };

        if !response.status().is_success() {
            callbacks.on_error(rejection(response, "Image generation failed").await);
            return None;
        }

        if response.content_length() == Some(0) {
            tracing::error!("Chat completion response has no body");
            callbacks.on_error(Error::NoResponseBody);
            return None;
        }

        drive_stream(response.bytes_stream(), callbacks).await
    }
}
