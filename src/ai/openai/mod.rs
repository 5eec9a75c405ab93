pub mod chat;
pub mod client;
pub mod image;
pub mod sse;
pub mod types;

pub use chat::OpenAiStreamClient;
pub use image::{ImageEditRequest, OpenAiImageClient};
