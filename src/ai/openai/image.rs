use super::client::{rejection, OpenAiHttpClient, IMAGE_EDITS_PATH};
use super::types::ImageGenerationResponse;
use crate::ai::{ChatEndpoint, ImageEditService};
use crate::image::InlineImage;
use crate::models::{ImageSize, Quality};
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};

/// A masked edit of one source image.
#[derive(Debug, Clone)]
pub struct ImageEditRequest {
    pub model: String,
    pub prompt: String,
    pub image: InlineImage,
    pub mask: InlineImage,
    pub n: u8,
    pub quality: Quality,
    pub size: Option<ImageSize>,
}

pub struct OpenAiImageClient {
    http: OpenAiHttpClient,
}

impl OpenAiImageClient {
    pub fn new() -> Self {
        Self::new_with_client(reqwest::Client::new())
    }

    pub fn new_with_client(client: reqwest::Client) -> Self {
        Self {
            http: OpenAiHttpClient::new_with_client(client),
        }
    }

    fn image_part(image: &InlineImage, file_name: &str) -> Result<Part> {
        Ok(Part::bytes(image.decode()?)
            .file_name(file_name.to_string())
            .mime_str(image.media_type())?)
    }

    fn build_form(request: &ImageEditRequest) -> Result<Form> {
        let mut form = Form::new()
            .text("prompt", request.prompt.clone())
            .part("image", Self::image_part(&request.image, "image.png")?)
            .part("mask", Self::image_part(&request.mask, "mask.png")?)
            .text("model", request.model.clone());
        if let Some(size) = request.size {
            form = form.text("size", size.as_str());
        }
        form = form.text("n", request.n.to_string());
        if request.quality != Quality::Auto {
            form = form.text("quality", request.quality.as_str());
        }
        Ok(form)
    }
}

impl Default for OpenAiImageClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageEditService for OpenAiImageClient {
    async fn edit_image(
        &self,
        endpoint: &ChatEndpoint,
        request: &ImageEditRequest,
    ) -> Result<Vec<String>> {
        let form = Self::build_form(request)?;
        let response = self
            .http
            .post_multipart(endpoint, IMAGE_EDITS_PATH, form)
            .await?;

        if !response.status().is_success() {
            return Err(rejection(response, "Image edit failed").await);
        }

        let body: ImageGenerationResponse = response.json().await?;
        let urls: Vec<String> = body
            .data
            .into_iter()
            .filter_map(|item| match (item.url, item.b64_json) {
                (Some(url), _) => Some(url),
                (None, Some(b64)) => Some(format!("data:image/png;base64,{}", b64)),
                (None, None) => None,
            })
            .collect();

        if urls.is_empty() {
            return Err(Error::InvalidResponseShape(
                "Image edit response contained no url or b64_json".to_string(),
            ));
        }

        Ok(urls)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn edit_request() -> ImageEditRequest {
        ImageEditRequest {
            model: "gpt-image-1".to_string(),
            prompt: "add a hat".to_string(),
            image: InlineImage::from_bytes(b"source-pixels", "image/png"),
            mask: InlineImage::from_bytes(b"mask-pixels", "image/png"),
            n: 2,
            quality: Quality::High,
            size: Some(ImageSize::Square1024),
        }
    }

    fn endpoint(server: &MockServer) -> ChatEndpoint {
        ChatEndpoint {
            base_url: server.uri(),
            api_key: "key".to_string(),
        }
    }

    #[tokio::test]
    async fn test_edit_sends_multipart_and_collects_urls() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/images/edits"))
            .and(header("Authorization", "Bearer key"))
            .and(body_string_contains("name=\"mask\"; filename=\"mask.png\""))
            .and(body_string_contains("name=\"quality\""))
            .and(body_string_contains("source-pixels"))
            .and(body_string_contains("1024x1024"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "created": 1700000000,
                "data": [
                    {"url": "https://img.example.com/1.png"},
                    {"b64_json": "iVBORw0KGgo="}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenAiImageClient::new();
        let urls = client
            .edit_image(&endpoint(&server), &edit_request())
            .await
            .unwrap();

        assert_eq!(
            urls,
            vec![
                "https://img.example.com/1.png".to_string(),
                "data:image/png;base64,iVBORw0KGgo=".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_edit_without_size_field() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/images/edits"))
            .and(body_string_contains("name=\"size\""))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/images/edits"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"url": "https://img.example.com/plain.png"}]
            })))
            .mount(&server)
            .await;

        let request = ImageEditRequest {
            size: None,
            ..edit_request()
        };
        let urls = OpenAiImageClient::new()
            .edit_image(&endpoint(&server), &request)
            .await
            .unwrap();

        assert_eq!(urls, vec!["https://img.example.com/plain.png".to_string()]);
    }

    #[tokio::test]
    async fn test_edit_rejection_is_request_rejected() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/images/edits"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": {"message": "mask size mismatch"}
            })))
            .mount(&server)
            .await;

        let client = OpenAiImageClient::new();
        let err = client
            .edit_image(&endpoint(&server), &edit_request())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::RequestRejected(ref msg) if msg == "mask size mismatch"));
    }

    #[tokio::test]
    async fn test_edit_without_images_is_invalid_shape() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/images/edits"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{}]
            })))
            .mount(&server)
            .await;

        let client = OpenAiImageClient::new();
        let err = client
            .edit_image(&endpoint(&server), &edit_request())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InvalidResponseShape(_)));
    }
}
