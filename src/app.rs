//! Generation orchestration: validate, normalize, route to a backend and
//! record the result in history.

use crate::ai::openai::types::ChatCompletionRequest;
use crate::ai::{
    ChatEndpoint, ChatStreamService, FalJob, FalQueueClient, ImageEditRequest, ImageEditService,
    JobService, OpenAiImageClient, OpenAiStreamClient, StreamCallbacks,
};
use crate::models::{BackendFamily, Config, GeneratedImage, GenerationRequest, UploadBackend};
use crate::normalize::RequestNormalizer;
use crate::store::{FileStore, Storage};
use crate::upload::{FalStorageClient, S3Uploader, UploadService};
use crate::{Error, Result};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Routes generation requests to the FAL queue or a chat gateway.
pub struct App {
    fal: Box<dyn JobService>,
    chat: Box<dyn ChatStreamService>,
    image_edit: Box<dyn ImageEditService>,
    uploader: Box<dyn UploadService>,
    storage: Storage,
    fal_default_key: Option<String>,
}

/// Injectable service bundle used to construct [`App`] in tests/harnesses.
pub struct AppServices {
    pub fal: Box<dyn JobService>,
    pub chat: Box<dyn ChatStreamService>,
    pub image_edit: Box<dyn ImageEditService>,
    pub uploader: Box<dyn UploadService>,
    pub storage: Storage,
}

impl App {
    pub fn with_services(services: AppServices, fal_default_key: Option<String>) -> Self {
        Self {
            fal: services.fal,
            chat: services.chat,
            image_edit: services.image_edit,
            uploader: services.uploader,
            storage: services.storage,
            fal_default_key,
        }
    }

    /// Construct an app from environment configuration (`Config::from_env`).
    pub async fn new(config: &Config) -> Result<Self> {
        let storage = Storage::new(Arc::new(FileStore::open(&config.store_path)?));
        info!("Using store at {}", config.store_path.display());

        // Reuse one HTTP connection pool across backend clients.
        let http_client = reqwest::Client::new();

        let uploader: Box<dyn UploadService> = match config.upload_backend {
            UploadBackend::Fal => {
                let credential = Self::resolve_fal_credential(
                    &storage,
                    config.fal_default_key.as_deref(),
                )
                .unwrap_or_default();
                Box::new(
                    FalStorageClient::new_with_client(credential, http_client.clone())
                        .with_base_url(config.fal_storage_url.clone()),
                )
            }
            UploadBackend::S3 => {
                let settings = config.s3.as_ref().ok_or_else(|| {
                    Error::Config("UPLOAD_BACKEND=s3 requires CDN_* settings".to_string())
                })?;
                info!("Uploading oversized images to {}", settings.base_url);
                Box::new(S3Uploader::new(settings).await?)
            }
        };

        let fal = FalQueueClient::new_with_client(http_client.clone())
            .with_base_url(config.fal_queue_url.clone())
            .with_poll_interval(config.fal_poll_interval);

        Ok(Self::with_services(
            AppServices {
                fal: Box::new(fal),
                chat: Box::new(OpenAiStreamClient::new_with_client(http_client.clone())),
                image_edit: Box::new(OpenAiImageClient::new_with_client(http_client)),
                uploader,
                storage,
            },
            config.fal_default_key.clone(),
        ))
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Run one generation.
    ///
    /// Validation and configuration problems are returned as `Err` before
    /// any network call. FAL and masked-edit failures are returned as `Err`
    /// too. The streaming path reports progress and failures only through
    /// `callbacks` and returns an empty list when it failed.
    pub async fn generate(
        &self,
        request: &GenerationRequest,
        callbacks: &mut dyn StreamCallbacks,
    ) -> Result<Vec<String>> {
        request.validate()?;
        if !request.source_images.is_empty() && !request.accepts_images() {
            return Err(Error::UnsupportedModality(format!(
                "Model '{}' does not take source images",
                request.model
            )));
        }

        info!(
            "Generating with {} model {} ({} source images)",
            request.family,
            request.model,
            request.source_images.len()
        );

        let urls = match request.family {
            BackendFamily::Fal => self.generate_fal(request).await?,
            BackendFamily::ChatCompatible => {
                let endpoint = self.chat_endpoint()?;
                if request.mask.is_some()
                    && !request.source_images.is_empty()
                    && request.accepts_images()
                {
                    self.edit_image(&endpoint, request).await?
                } else {
                    self.generate_stream(&endpoint, request, callbacks).await?
                }
            }
        };

        if let Some(url) = urls.first() {
            self.record_history(request, url);
        }
        Ok(urls)
    }

    async fn generate_fal(&self, request: &GenerationRequest) -> Result<Vec<String>> {
        let credential =
            Self::resolve_fal_credential(&self.storage, self.fal_default_key.as_deref())?;
        let job: FalJob = self.normalizer().fal_job(request).await?;

        let url = self.fal.submit(&credential, &job).await.map_err(|e| {
            error!("FAL generation failed: {}", e);
            e
        })?;
        info!("FAL generation finished: {}", url);
        Ok(vec![url])
    }

    async fn generate_stream(
        &self,
        endpoint: &ChatEndpoint,
        request: &GenerationRequest,
        callbacks: &mut dyn StreamCallbacks,
    ) -> Result<Vec<String>> {
        let chat: ChatCompletionRequest = match self.normalizer().chat_request(request).await {
            Ok(chat) => chat,
            Err(e) => {
                error!("Failed to prepare chat request: {}", e);
                callbacks.on_error(e);
                return Ok(Vec::new());
            }
        };

        match self.chat.stream(endpoint, &chat, callbacks).await {
            Some(url) => {
                self.mark_credential_used();
                Ok(vec![url])
            }
            None => {
                warn!("Streaming generation ended without an asset");
                Ok(Vec::new())
            }
        }
    }

    async fn edit_image(
        &self,
        endpoint: &ChatEndpoint,
        request: &GenerationRequest,
    ) -> Result<Vec<String>> {
        let (Some(image), Some(mask)) = (request.source_images.first(), request.mask.as_ref())
        else {
            return Err(Error::MissingInput(
                "Masked edit needs a source image and a mask".to_string(),
            ));
        };

        debug!("Using masked edit endpoint for {}", request.model);
        let urls = self
            .image_edit
            .edit_image(
                endpoint,
                &ImageEditRequest {
                    model: request.model.clone(),
                    prompt: request.prompt.clone(),
                    image: image.clone(),
                    mask: mask.clone(),
                    n: request.n,
                    quality: request.quality,
                    size: request.size,
                },
            )
            .await?;
        self.mark_credential_used();
        Ok(urls)
    }

    fn normalizer(&self) -> RequestNormalizer<'_> {
        RequestNormalizer::new(self.uploader.as_ref())
    }

    /// The stored key, or the shared fallback credential when none is stored.
    fn resolve_fal_credential(storage: &Storage, default_key: Option<&str>) -> Result<String> {
        let stored = storage
            .get_api_config()?
            .map(|config| config.key)
            .filter(|key| !key.is_empty());

        match (stored, default_key) {
            (Some(key), _) => Ok(key),
            (None, Some(key)) => {
                debug!("No FAL key stored, using the shared default credential");
                Ok(key.to_string())
            }
            (None, None) => Err(Error::Config(
                "No FAL credential stored and FAL_DEFAULT_KEY is not set".to_string(),
            )),
        }
    }

    fn chat_endpoint(&self) -> Result<ChatEndpoint> {
        let config = self.storage.get_api_config()?.ok_or_else(|| {
            Error::Config("API credentials are not configured; run `aidraw config set`".to_string())
        })?;
        if config.key.is_empty() || config.base_url.is_empty() {
            return Err(Error::Config(
                "API configuration is incomplete; both key and base URL are required".to_string(),
            ));
        }
        Ok(ChatEndpoint::from(&config))
    }

    fn mark_credential_used(&self) {
        if let Err(e) = self.storage.mark_api_config_used() {
            warn!("Failed to update credential usage time: {}", e);
        }
    }

    fn record_history(&self, request: &GenerationRequest, url: &str) {
        let record = GeneratedImage {
            id: Uuid::new_v4().to_string(),
            prompt: request.prompt.clone(),
            url: url.to_string(),
            model: request.model.clone(),
            created_at: Utc::now().to_rfc3339(),
            aspect_ratio: request.aspect_ratio.as_str().to_string(),
        };

        match self.storage.add_to_history(record) {
            Ok(()) => debug!("Recorded {} in history", url),
            Err(e) => warn!("Failed to record generation in history: {}", e),
        }
    }
}
