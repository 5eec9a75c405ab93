//! Error handling and custom error types
//!
//! Provides unified error handling across the crate using thiserror. Every
//! failure a generation request can end in maps onto one variant here.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Missing input: {0}")]
    MissingInput(String),

    #[error("Invalid image encoding: {0}")]
    InvalidImageEncoding(String),

    #[error("Image upload failed: {0}")]
    UploadFailed(#[source] Box<Error>),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unsupported modality: {0}")]
    UnsupportedModality(String),

    #[error("Invalid response shape: {0}")]
    InvalidResponseShape(String),

    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    #[error("Request rejected: {0}")]
    RequestRejected(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("No response body")]
    NoResponseBody,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("S3 error: {0}")]
    S3(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Environment variable error: {0}")]
    EnvVar(#[from] dotenvy::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Join a remote error message with its optional error code.
pub(crate) fn remote_message(message: &str, code: Option<&str>) -> String {
    match code {
        Some(code) => format!("{}\nError code: {}", message, code),
        None => message.to_string(),
    }
}
