//! Turns a [`GenerationRequest`] into the wire payload of its backend family.

use crate::ai::fal::{FalInput, FalJob};
use crate::ai::openai::types::{
    ChatCompletionRequest, ChatMessage, ChatMessageContent, ImageUrl, MessagePart,
};
use crate::image::ImageEncoder;
use crate::models::{AspectRatio, BackendFamily, GenerationRequest};
use crate::prompts::annotate_reference_images;
use crate::upload::UploadService;
use crate::{Error, Result};
use tracing::debug;

const OUTPUT_FORMAT: &str = "png";

#[derive(Debug, Clone, PartialEq)]
pub enum WirePayload {
    Fal(FalJob),
    Chat(ChatCompletionRequest),
}

pub struct RequestNormalizer<'a> {
    encoder: ImageEncoder<'a>,
}

impl<'a> RequestNormalizer<'a> {
    pub fn new(uploader: &'a dyn UploadService) -> Self {
        Self {
            encoder: ImageEncoder::new(uploader),
        }
    }

    pub async fn normalize(&self, request: &GenerationRequest) -> Result<WirePayload> {
        if !request.source_images.is_empty() && !request.accepts_images() {
            return Err(Error::UnsupportedModality(format!(
                "Model '{}' is not tagged as accepting images",
                request.model
            )));
        }

        match request.family {
            BackendFamily::Fal => self.fal_job(request).await.map(WirePayload::Fal),
            BackendFamily::ChatCompatible => {
                self.chat_request(request).await.map(WirePayload::Chat)
            }
        }
    }

    /// Only the first source image is forwarded; the rest are mentioned in
    /// the prompt text.
    pub async fn fal_job(&self, request: &GenerationRequest) -> Result<FalJob> {
        let image_url = match request.source_images.first() {
            Some(image) => Some(self.encoder.encode(image).await?.as_url().to_string()),
            None => None,
        };

        let aspect_ratio = match request.aspect_ratio {
            AspectRatio::Original => None,
            ratio => Some(ratio.as_str().to_string()),
        };

        let duration = request
            .is_video_model()
            .then(|| request.duration.seconds());

        debug!(
            "Normalized FAL job for {} ({} source images)",
            request.model,
            request.source_images.len()
        );

        Ok(FalJob {
            model: request.model.clone(),
            input: FalInput {
                prompt: annotate_reference_images(&request.prompt, request.source_images.len()),
                image_url,
                num_images: request.n,
                aspect_ratio,
                duration,
                output_format: OUTPUT_FORMAT.to_string(),
                enable_safety_checker: request.enable_safety_checker,
                safety_tolerance: request.safety_tolerance.level().to_string(),
            },
        })
    }

    pub async fn chat_request(&self, request: &GenerationRequest) -> Result<ChatCompletionRequest> {
        let content = if request.accepts_images() && !request.source_images.is_empty() {
            let mut parts = Vec::with_capacity(request.source_images.len() + 1);
            parts.push(MessagePart::Text {
                text: request.prompt.clone(),
            });
            for image in &request.source_images {
                let representation = self.encoder.encode(image).await?;
                parts.push(MessagePart::ImageUrl {
                    image_url: ImageUrl {
                        url: representation.as_url().to_string(),
                    },
                });
            }
            ChatMessageContent::Parts(parts)
        } else {
            ChatMessageContent::Text(request.prompt.clone())
        };

        Ok(ChatCompletionRequest {
            model: request.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content,
            }],
            stream: true,
        })
    }
}
