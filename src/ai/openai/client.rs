use super::types::ApiErrorBody;
use crate::ai::ChatEndpoint;
use crate::error::remote_message;
use crate::{Error, Result};
use reqwest::{Client, Response};
use serde::Serialize;

pub const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";
pub const IMAGE_EDITS_PATH: &str = "/v1/images/edits";

/// Join a base URL and endpoint path.
///
/// A base URL ending in `#` is taken verbatim (minus the `#`) so gateways
/// with non-standard routes can be addressed directly.
pub fn request_url(base_url: &str, path: &str) -> String {
    match base_url.strip_suffix('#') {
        Some(full_url) => full_url.to_string(),
        None => format!("{}{}", base_url.trim_end_matches('/'), path),
    }
}

/// Turn a non-success response into `RequestRejected`, preferring the
/// gateway's structured error message over `fallback`.
pub async fn rejection(response: Response, fallback: &str) -> Error {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    tracing::error!("OpenAI-compatible API error (status {}): {}", status, body);

    let message = serde_json::from_str::<ApiErrorBody>(&body)
        .ok()
        .and_then(|parsed| {
            parsed
                .message()
                .map(|message| remote_message(message, parsed.code().as_deref()))
        })
        .unwrap_or_else(|| format!("{} (status {})", fallback, status));

    Error::RequestRejected(message)
}

/// Thin authenticated wrapper over a shared connection pool.
#[derive(Clone)]
pub struct OpenAiHttpClient {
    pub(crate) client: Client,
}

impl OpenAiHttpClient {
    pub fn new() -> Self {
        Self::new_with_client(Client::new())
    }

    pub fn new_with_client(client: Client) -> Self {
        Self { client }
    }

    pub async fn post_json<Req: Serialize>(
        &self,
        endpoint: &ChatEndpoint,
        path: &str,
        request: &Req,
    ) -> Result<Response> {
        let url = request_url(&endpoint.base_url, path);
        tracing::debug!("POST {}", url);

        self.client
            .post(&url)
            .header("Authorization", format!("Bearer {}", endpoint.api_key))
            .json(request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to send request to {}: {}", url, e);
                e.into()
            })
    }

    pub async fn post_multipart(
        &self,
        endpoint: &ChatEndpoint,
        path: &str,
        form: reqwest::multipart::Form,
    ) -> Result<Response> {
        let url = request_url(&endpoint.base_url, path);
        tracing::debug!("POST (multipart) {}", url);

        self.client
            .post(&url)
            .header("Authorization", format!("Bearer {}", endpoint.api_key))
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to send multipart request to {}: {}", url, e);
                e.into()
            })
    }
}

impl Default for OpenAiHttpClient {
    fn default() -> Self {
        Self::new()
    }
}
