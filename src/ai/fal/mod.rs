pub mod client;
pub mod shapes;
pub mod types;

pub use client::FalQueueClient;
pub use shapes::resolve_asset_url;
pub use types::{FalInput, FalJob};
