//! Resolution of the asset URL from a completed FAL result.
//!
//! Model families put their output in different places. Matchers are tried
//! in order and the first hit wins; a new shape is one more table row.

use crate::{Error, Result};
use serde_json::Value;

type ShapeMatcher = fn(&Value) -> Option<&str>;

fn images_array(payload: &Value) -> Option<&str> {
    payload.get("images")?.get(0)?.get("url")?.as_str()
}

fn video_object(payload: &Value) -> Option<&str> {
    payload.get("video")?.get("url")?.as_str()
}

fn bare_url(payload: &Value) -> Option<&str> {
    payload.get("url")?.as_str()
}

const RESPONSE_SHAPES: &[(&str, ShapeMatcher)] = &[
    ("images", images_array),
    ("video", video_object),
    ("url", bare_url),
];

pub fn resolve_asset_url(payload: &Value) -> Result<String> {
    RESPONSE_SHAPES
        .iter()
        .find_map(|(name, matcher)| {
            matcher(payload)
                .filter(|url| !url.is_empty())
                .map(|url| {
                    tracing::debug!("Resolved FAL asset via '{}' shape", name);
                    url.to_string()
                })
        })
        .ok_or_else(|| {
            tracing::error!("Unrecognized FAL result payload: {}", payload);
            Error::InvalidResponseShape(
                "Result carries no images[0].url, video.url or url".to_string(),
            )
        })
}
