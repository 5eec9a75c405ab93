//! aidraw - image and video generation against FAL queues and
//! OpenAI-compatible chat gateways
//!
//! Normalizes a generation request for the selected backend, inlines or
//! uploads source images by size, streams chat completions until an asset
//! link appears, and keeps credentials, history and a model catalog in a
//! local key-value store.

pub mod ai;
pub mod app;
pub mod error;
pub mod image;
pub mod models;
pub mod normalize;
pub mod prompts;
pub mod store;
pub mod upload;

pub use error::{Error, Result};
