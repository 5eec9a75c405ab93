use super::openai::types::ChatCompletionRequest;
use super::{
    ChatEndpoint, ChatStreamService, FalJob, ImageEditRequest, ImageEditService, JobService,
    StreamCallbacks,
};
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// One observed callback invocation. Errors are kept as their display text.
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackEvent {
    Message(String),
    Complete(String),
    Error(String),
}

/// Records every callback in order.
#[derive(Debug, Clone, Default)]
pub struct RecordingCallbacks {
    events: Arc<Mutex<Vec<CallbackEvent>>>,
}

impl RecordingCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<CallbackEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn completions(&self) -> usize {
        self.count(|e| matches!(e, CallbackEvent::Complete(_)))
    }

    pub fn errors(&self) -> usize {
        self.count(|e| matches!(e, CallbackEvent::Error(_)))
    }

    fn count(&self, predicate: impl Fn(&CallbackEvent) -> bool) -> usize {
        self.events.lock().unwrap().iter().filter(|e| predicate(e)).count()
    }
}

impl StreamCallbacks for RecordingCallbacks {
    fn on_message(&mut self, content: &str) {
        self.events
            .lock()
            .unwrap()
            .push(CallbackEvent::Message(content.to_string()));
    }

    fn on_complete(&mut self, url: &str) {
        self.events
            .lock()
            .unwrap()
            .push(CallbackEvent::Complete(url.to_string()));
    }

    fn on_error(&mut self, error: Error) {
        self.events
            .lock()
            .unwrap()
            .push(CallbackEvent::Error(error.to_string()));
    }
}

#[derive(Clone)]
pub struct MockFalClient {
    responses: Arc<Mutex<Vec<String>>>,
    failure: Option<String>,
    jobs: Arc<Mutex<Vec<(String, FalJob)>>>,
}

impl MockFalClient {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(Vec::new())),
            failure: None,
            jobs: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_response(self, url: String) -> Self {
        self.responses.lock().unwrap().push(url);
        self
    }

    pub fn with_failure(mut self, message: String) -> Self {
        self.failure = Some(message);
        self
    }

    pub fn get_call_count(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }

    /// Submitted jobs with the credential each was sent with.
    pub fn get_jobs(&self) -> Vec<(String, FalJob)> {
        self.jobs.lock().unwrap().clone()
    }
}

impl Default for MockFalClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobService for MockFalClient {
    async fn submit(&self, credential: &str, job: &FalJob) -> Result<String> {
        let mut jobs = self.jobs.lock().unwrap();
        jobs.push((credential.to_string(), job.clone()));

        if let Some(message) = &self.failure {
            return Err(Error::GenerationFailed(message.clone()));
        }

        let responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(format!("https://fal.media/files/mock/{}.png", jobs.len()))
        } else {
            let index = (jobs.len() - 1) % responses.len();
            Ok(responses[index].clone())
        }
    }
}

/// Replays a scripted stream: every delta, then either the completion URL or
/// the configured failure.
#[derive(Clone)]
pub struct MockChatStreamClient {
    deltas: Vec<String>,
    completion: Option<String>,
    failure: Option<String>,
    requests: Arc<Mutex<Vec<(ChatEndpoint, ChatCompletionRequest)>>>,
}

impl MockChatStreamClient {
    pub fn new() -> Self {
        Self {
            deltas: Vec::new(),
            completion: None,
            failure: None,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_delta(mut self, delta: &str) -> Self {
        self.deltas.push(delta.to_string());
        self
    }

    pub fn with_completion(mut self, url: &str) -> Self {
        self.completion = Some(url.to_string());
        self
    }

    pub fn with_failure(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    pub fn get_call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn get_requests(&self) -> Vec<(ChatEndpoint, ChatCompletionRequest)> {
        self.requests.lock().unwrap().clone()
    }
}

impl Default for MockChatStreamClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatStreamService for MockChatStreamClient {
    async fn stream(
        &self,
        endpoint: &ChatEndpoint,
        request: &ChatCompletionRequest,
        callbacks: &mut dyn StreamCallbacks,
    ) -> Option<String> {
        self.requests
            .lock()
            .unwrap()
            .push((endpoint.clone(), request.clone()));

        for delta in &self.deltas {
            callbacks.on_message(delta);
        }

        if let Some(message) = &self.failure {
            callbacks.on_error(Error::RequestRejected(message.clone()));
            return None;
        }

        match &self.completion {
            Some(url) => {
                callbacks.on_complete(url);
                Some(url.clone())
            }
            None => {
                callbacks.on_error(Error::InvalidResponseShape(
                    "Stream ended without an asset link".to_string(),
                ));
                None
            }
        }
    }
}

#[derive(Clone)]
pub struct MockImageEditClient {
    urls: Vec<String>,
    failure: Option<String>,
    requests: Arc<Mutex<Vec<ImageEditRequest>>>,
}

impl MockImageEditClient {
    pub fn new() -> Self {
        Self {
            urls: vec!["https://img.example.com/edit/1.png".to_string()],
            failure: None,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_urls(mut self, urls: Vec<String>) -> Self {
        self.urls = urls;
        self
    }

    pub fn with_failure(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    pub fn get_call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn get_requests(&self) -> Vec<ImageEditRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Default for MockImageEditClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageEditService for MockImageEditClient {
    async fn edit_image(
        &self,
        _endpoint: &ChatEndpoint,
        request: &ImageEditRequest,
    ) -> Result<Vec<String>> {
        self.requests.lock().unwrap().push(request.clone());

        match &self.failure {
            Some(message) => Err(Error::RequestRejected(message.clone())),
            None => Ok(self.urls.clone()),
        }
    }
}
