//! Stateless backend queries used before a download is submitted.

use crate::backend::{Answer, Backend};
use crate::core::error::LookupError;
use crate::core::model::{Validation, VideoInfo, Vod};
use crate::core::platform::Platform;
use tracing::debug;

const MAX_SEGMENT_NAME: usize = 30;

pub async fn validate_url(backend: &dyn Backend, url: &str, platform: Platform) -> Result<Validation, LookupError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(LookupError::EmptyInput);
    }
    if !platform.is_plausible_url(url) {
        debug!(%url, %platform, "url does not look like this platform; asking server anyway");
    }
    Ok(backend.validate_url(url, platform).await?)
}

/// Always a server round-trip; there is no locally guessed metadata.
pub async fn fetch_video_info(backend: &dyn Backend, url: &str, platform: Platform) -> Result<VideoInfo, LookupError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(LookupError::EmptyInput);
    }
    match backend.video_info(url, platform).await? {
        Answer::Ok(info) => Ok(info),
        Answer::Rejected(message) => Err(LookupError::Rejected(message)),
    }
}

pub async fn search_vods(backend: &dyn Backend, username: &str, max_vods: u32) -> Result<Vec<Vod>, LookupError> {
    let username = username.trim();
    if username.is_empty() {
        return Err(LookupError::EmptyInput);
    }
    match backend.search_vods(username, max_vods.max(1)).await? {
        Answer::Ok(vods) => Ok(vods),
        Answer::Rejected(message) => Err(LookupError::Rejected(message)),
    }
}

/// File name proposed for a clipped VOD: ASCII letters, digits, spaces,
/// `-` and `_` only, cut to 30 characters.
pub fn suggest_segment_name(title: &str) -> String {
    let kept: String = title
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .take(MAX_SEGMENT_NAME)
        .collect();
    kept.trim().to_string()
}
