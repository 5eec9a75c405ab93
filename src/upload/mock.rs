use super::UploadService;
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub struct MockUploader {
    base_url: String,
    uploaded_sizes: Arc<Mutex<Vec<usize>>>,
    should_fail: Arc<Mutex<bool>>,
}

impl MockUploader {
    pub fn new() -> Self {
        Self {
            base_url: "https://mock-storage.example.com".to_string(),
            uploaded_sizes: Arc::new(Mutex::new(Vec::new())),
            should_fail: Arc::new(Mutex::new(false)),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    pub fn with_failure(self, should_fail: bool) -> Self {
        self.set_failure(should_fail);
        self
    }

    /// Flips failure mode on a mock already handed to a service.
    pub fn set_failure(&self, should_fail: bool) {
        *self.should_fail.lock().unwrap() = should_fail;
    }

    pub fn get_upload_count(&self) -> usize {
        self.uploaded_sizes.lock().unwrap().len()
    }

    pub fn get_uploaded_sizes(&self) -> Vec<usize> {
        self.uploaded_sizes.lock().unwrap().clone()
    }
}

impl Default for MockUploader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UploadService for MockUploader {
    async fn upload(&self, data: &[u8], _content_type: &str, file_name: &str) -> Result<String> {
        if *self.should_fail.lock().unwrap() {
            return Err(Error::Storage("Mock upload failure".to_string()));
        }

        let mut sizes = self.uploaded_sizes.lock().unwrap();
        sizes.push(data.len());
        Ok(format!("{}/{}/{}", self.base_url, sizes.len(), file_name))
    }
}
