use super::shapes::resolve_asset_url;
use super::types::{FalErrorBody, FalJob, QueueStatus, QueueSubmission};
use crate::ai::JobService;
use crate::error::remote_message;
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, info};

const DEFAULT_BASE_URL: &str = "https://queue.fal.run";

/// Submits jobs to the FAL queue and polls them to completion.
pub struct FalQueueClient {
    client: Client,
    base_url: String,
    poll_interval: Duration,
}

impl FalQueueClient {
    pub fn new() -> Self {
        Self::new_with_client(Client::new())
    }

    pub fn new_with_client(client: Client) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            poll_interval: Duration::from_millis(500),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, credential: &str) -> Result<T> {
        let response = request
            .header("Authorization", format!("Key {}", credential))
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to reach FAL queue: {}", e);
                Error::GenerationFailed(format!("Network error: {}", e))
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::GenerationFailed(format!("Failed to read FAL response: {}", e)))?;

        if !status.is_success() {
            tracing::error!("FAL API error (status {}): {}", status, body);
            let parsed = serde_json::from_str::<FalErrorBody>(&body).unwrap_or_default();
            let message = parsed
                .message()
                .unwrap_or_else(|| format!("FAL request failed with status {}", status));
            return Err(Error::GenerationFailed(remote_message(
                &message,
                parsed.code.as_deref(),
            )));
        }

        serde_json::from_str(&body).map_err(|e| {
            tracing::error!("Failed to parse FAL response: {}\nBody: {}", e, body);
            Error::GenerationFailed(format!("Failed to parse FAL response: {}", e))
        })
    }

    async fn enqueue(&self, credential: &str, job: &FalJob) -> Result<QueueSubmission> {
        let url = format!("{}/{}", self.base_url, job.model);
        debug!("Submitting FAL job to {}", url);
        self.send(self.client.post(&url).json(&job.input), credential)
            .await
    }

    async fn wait_for_completion(&self, credential: &str, status_url: &str) -> Result<()> {
        loop {
            let status: QueueStatus = self
                .send(
                    self.client.get(status_url).query(&[("logs", "1")]),
                    credential,
                )
                .await?;

            match status.status.as_str() {
                "COMPLETED" => {
                    if let Some(error) = status.error.filter(|e| !e.is_empty()) {
                        return Err(Error::GenerationFailed(error));
                    }
                    return Ok(());
                }
                "IN_QUEUE" => info!(
                    "FAL job queued (position {})",
                    status
                        .queue_position
                        .map(|p| p.to_string())
                        .unwrap_or_else(|| "unknown".to_string())
                ),
                "IN_PROGRESS" => {
                    info!("FAL job in progress");
                    for log in status.logs.unwrap_or_default() {
                        debug!("FAL: {}", log.message);
                    }
                }
                other => debug!("FAL job reported status {}", other),
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

impl Default for FalQueueClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobService for FalQueueClient {
    async fn submit(&self, credential: &str, job: &FalJob) -> Result<String> {
        let submission = self.enqueue(credential, job).await?;
        info!("FAL job {} accepted for {}", submission.request_id, job.model);

        let request_base = format!(
            "{}/{}/requests/{}",
            self.base_url, job.model, submission.request_id
        );
        let status_url = submission
            .status_url
            .unwrap_or_else(|| format!("{}/status", request_base));
        let response_url = submission.response_url.unwrap_or(request_base);

        self.wait_for_completion(credential, &status_url).await?;

        let payload: serde_json::Value = self.send(self.client.get(&response_url), credential).await?;
        resolve_asset_url(&payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::fal::FalInput;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const MODEL: &str = "fal-ai/flux-pro";

    fn job() -> FalJob {
        FalJob {
            model: MODEL.to_string(),
            input: FalInput {
                prompt: "a cat".to_string(),
                image_url: None,
                num_images: 1,
                aspect_ratio: Some("1:1".to_string()),
                duration: None,
                output_format: "png".to_string(),
                enable_safety_checker: true,
                safety_tolerance: "2".to_string(),
            },
        }
    }

    fn make_client(server: &MockServer) -> FalQueueClient {
        FalQueueClient::new()
            .with_base_url(server.uri())
            .with_poll_interval(Duration::from_millis(5))
    }

    async fn mount_submission(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/fal-ai/flux-pro"))
            .and(header("Authorization", "Key id:secret"))
            .and(body_partial_json(serde_json::json!({
                "prompt": "a cat",
                "output_format": "png"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "request_id": "req-1",
                "status_url": format!("{}/fal-ai/flux-pro/requests/req-1/status", server.uri()),
                "response_url": format!("{}/fal-ai/flux-pro/requests/req-1", server.uri())
            })))
            .expect(1)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_submit_polls_until_completed() {
        let server = MockServer::start().await;
        mount_submission(&server).await;

        Mock::given(method("GET"))
            .and(path("/fal-ai/flux-pro/requests/req-1/status"))
            .and(query_param("logs", "1"))
            .respond_with(ResponseTemplate::new(202).set_body_json(serde_json::json!({
                "status": "IN_QUEUE", "queue_position": 3
            })))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/fal-ai/flux-pro/requests/req-1/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "IN_PROGRESS", "logs": [{"message": "step 1/28"}]
            })))
            .up_to_n_times(1)
            .with_priority(2)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/fal-ai/flux-pro/requests/req-1/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "COMPLETED"
            })))
            .with_priority(3)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/fal-ai/flux-pro/requests/req-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "images": [{"url": "https://fal.media/files/cat.png"}],
                "seed": 7
            })))
            .expect(1)
            .mount(&server)
            .await;

        let url = make_client(&server).submit("id:secret", &job()).await.unwrap();
        assert_eq!(url, "https://fal.media/files/cat.png");
    }

    #[tokio::test]
    async fn test_submit_resolves_video_shape_with_derived_urls() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/fal-ai/flux-pro"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "request_id": "req-2"
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/fal-ai/flux-pro/requests/req-2/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "COMPLETED"
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/fal-ai/flux-pro/requests/req-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "video": {"url": "https://fal.media/files/clip.mp4"}
            })))
            .mount(&server)
            .await;

        let url = make_client(&server).submit("k", &job()).await.unwrap();
        assert_eq!(url, "https://fal.media/files/clip.mp4");
    }

    #[tokio::test]
    async fn test_rejected_submission_is_generation_failed_with_detail() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/fal-ai/flux-pro"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "detail": "Invalid key", "code": "unauthorized"
            })))
            .mount(&server)
            .await;

        let err = make_client(&server).submit("bad", &job()).await.unwrap_err();

        assert!(
            matches!(err, Error::GenerationFailed(ref msg) if msg == "Invalid key\nError code: unauthorized")
        );
    }

    #[tokio::test]
    async fn test_completed_with_error_is_generation_failed() {
        let server = MockServer::start().await;
        mount_submission(&server).await;

        Mock::given(method("GET"))
            .and(path("/fal-ai/flux-pro/requests/req-1/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "COMPLETED", "error": "NSFW content detected"
            })))
            .mount(&server)
            .await;

        let err = make_client(&server)
            .submit("id:secret", &job())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::GenerationFailed(ref msg) if msg.contains("NSFW")));
    }

    #[tokio::test]
    async fn test_unrecognized_result_is_invalid_shape() {
        let server = MockServer::start().await;
        mount_submission(&server).await;

        Mock::given(method("GET"))
            .and(path("/fal-ai/flux-pro/requests/req-1/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "COMPLETED"
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/fal-ai/flux-pro/requests/req-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "timings": {"inference": 1.2}
            })))
            .mount(&server)
            .await;

        let err = make_client(&server)
            .submit("id:secret", &job())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidResponseShape(_)));
    }

    #[tokio::test]
    async fn test_unreachable_queue_is_generation_failed() {
        let client = FalQueueClient::new().with_base_url("http://127.0.0.1:9".to_string());

        let err = client.submit("k", &job()).await.unwrap_err();
        assert!(matches!(err, Error::GenerationFailed(_)));
    }
}
