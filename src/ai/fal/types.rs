//! FAL queue payloads.

use serde::{Deserialize, Serialize};

/// Flat input object submitted to a FAL model endpoint.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FalInput {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub num_images: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    pub output_format: String,
    pub enable_safety_checker: bool,
    pub safety_tolerance: String,
}

/// A normalized job: which model to run and with what input.
#[derive(Debug, Clone, PartialEq)]
pub struct FalJob {
    pub model: String,
    pub input: FalInput,
}

#[derive(Debug, Deserialize)]
pub(crate) struct QueueSubmission {
    pub request_id: String,
    #[serde(default)]
    pub status_url: Option<String>,
    #[serde(default)]
    pub response_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct QueueStatus {
    pub status: String,
    #[serde(default)]
    pub queue_position: Option<u32>,
    #[serde(default)]
    pub logs: Option<Vec<QueueLog>>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct QueueLog {
    pub message: String,
}

/// Error body shapes FAL uses for rejected requests.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct FalErrorBody {
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

impl FalErrorBody {
    pub fn message(&self) -> Option<String> {
        if let Some(message) = self.message.as_ref().filter(|m| !m.is_empty()) {
            return Some(message.clone());
        }
        match self.detail.as_ref()? {
            serde_json::Value::String(detail) => Some(detail.clone()),
            serde_json::Value::Array(items) => {
                let messages: Vec<&str> = items
                    .iter()
                    .filter_map(|item| item.get("msg").and_then(|m| m.as_str()))
                    .collect();
                (!messages.is_empty()).then(|| messages.join("; "))
            }
            _ => None,
        }
    }
}
