use super::UploadService;
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://rest.alpha.fal.ai";

#[derive(Debug, Serialize)]
struct InitiateUploadRequest<'a> {
    content_type: &'a str,
    file_name: &'a str,
}

#[derive(Debug, Deserialize)]
struct InitiateUploadResponse {
    upload_url: String,
    file_url: String,
}

/// Two-step upload into FAL's CDN: reserve a signed URL, then PUT the bytes.
pub struct FalStorageClient {
    client: Client,
    credential: String,
    base_url: String,
}

impl FalStorageClient {
    pub fn new(credential: String) -> Self {
        Self::new_with_client(credential, Client::new())
    }

    pub fn new_with_client(credential: String, client: Client) -> Self {
        Self {
            client,
            credential,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    async fn initiate(&self, content_type: &str, file_name: &str) -> Result<InitiateUploadResponse> {
        let url = format!(
            "{}/storage/upload/initiate?storage_type=fal-cdn-v3",
            self.base_url
        );
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Key {}", self.credential))
            .json(&InitiateUploadRequest {
                content_type,
                file_name,
            })
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to reach FAL storage: {}", e);
                e
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            tracing::error!("FAL storage error (status {}): {}", status, error_text);
            return Err(Error::Storage(format!(
                "Upload initiation rejected (status {}): {}",
                status, error_text
            )));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl UploadService for FalStorageClient {
    async fn upload(&self, data: &[u8], content_type: &str, file_name: &str) -> Result<String> {
        let target = self.initiate(content_type, file_name).await?;

        let response = self
            .client
            .put(&target.upload_url)
            .header("Content-Type", content_type)
            .body(data.to_vec())
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(Error::Storage(format!(
                "Upload of {} bytes failed (status {})",
                data.len(),
                status
            )));
        }

        tracing::info!("Uploaded {} ({} bytes) to {}", file_name, data.len(), target.file_url);
        Ok(target.file_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_bytes, body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_upload_initiates_then_puts_bytes() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/storage/upload/initiate"))
            .and(query_param("storage_type", "fal-cdn-v3"))
            .and(header("Authorization", "Key id:secret"))
            .and(body_partial_json(serde_json::json!({
                "content_type": "image/png",
                "file_name": "image.png"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "upload_url": format!("{}/signed/abc", server.uri()),
                "file_url": "https://v3.fal.media/files/abc/image.png"
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("PUT"))
            .and(path("/signed/abc"))
            .and(header("Content-Type", "image/png"))
            .and(body_bytes(vec![1u8, 2, 3]))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = FalStorageClient::new("id:secret".to_string()).with_base_url(server.uri());

        let url = client
            .upload(&[1, 2, 3], "image/png", "image.png")
            .await
            .unwrap();
        assert_eq!(url, "https://v3.fal.media/files/abc/image.png");
    }

    #[tokio::test]
    async fn test_initiate_rejection_is_storage_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/storage/upload/initiate"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let client = FalStorageClient::new("bad".to_string()).with_base_url(server.uri());

        let err = client
            .upload(&[1], "image/png", "image.png")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
    }

    #[tokio::test]
    async fn test_put_failure_is_storage_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/storage/upload/initiate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "upload_url": format!("{}/signed/xyz", server.uri()),
                "file_url": "https://v3.fal.media/files/xyz/image.png"
            })))
            .mount(&server)
            .await;

        Mock::given(method("PUT"))
            .and(path("/signed/xyz"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let client = FalStorageClient::new("key".to_string()).with_base_url(server.uri());

        let err = client
            .upload(&[1], "image/png", "image.png")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
    }
}
