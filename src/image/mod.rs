//! Source image handling
//!
//! Parses inline (data URL) images and decides, per image, whether it is
//! forwarded inline or uploaded to remote storage first.

pub mod encoder;
pub mod inline;
pub mod mime;

pub use encoder::{ImageEncoder, ImageRepresentation, INLINE_SIZE_THRESHOLD};
pub use inline::InlineImage;
