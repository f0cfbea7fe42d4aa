pub mod http;
pub mod wire;

#[cfg(test)]
pub mod fake;

use crate::core::error::TransportError;
use crate::core::model::{DownloadRequest, FileRef, JobId, Validation, VideoInfo, Vod};
use crate::core::platform::Platform;
use async_trait::async_trait;
use std::collections::HashMap;
use url::Url;

#[derive(Debug, Clone)]
pub struct BackendContext {
    pub base_url: Url,
    pub user_agent: String,
    pub timeout_secs: u64,
    pub retries: u32,
    pub retry_backoff_ms: u64,
    pub headers: HashMap<String, String>,
}

impl Default for BackendContext {
    fn default() -> Self {
        Self {
            base_url: Url::parse("http://localhost:5000/").expect("static url"),
            user_agent: "UniversalDownloader/0.1".to_string(),
            timeout_secs: 60,
            retries: 2,
            retry_backoff_ms: 400,
            headers: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Accepted { id: JobId, message: String, files: Vec<FileRef> },
    Rejected { message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatusReport {
    Processing {
        status: String,
        percent: Option<f64>,
        message: Option<String>,
    },
    Completed {
        files: Vec<FileRef>,
        filename: Option<String>,
        size_bytes: Option<u64>,
    },
    Failed { message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Answer<T> {
    Ok(T),
    Rejected(String),
}

/// Everything the client needs from the download server.
#[async_trait]
pub trait Backend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Creates a job; segment requests go to the VOD clipping endpoint.
    async fn create_download(&self, req: &DownloadRequest) -> Result<SubmitOutcome, TransportError>;

    async fn status(&self, id: &str) -> Result<StatusReport, TransportError>;

    /// Where the artifact of a finished job can be fetched.
    fn file_url(&self, id: &str) -> String;

    async fn validate_url(&self, url: &str, platform: Platform) -> Result<Validation, TransportError>;

    async fn video_info(&self, url: &str, platform: Platform) -> Result<Answer<VideoInfo>, TransportError>;

    async fn search_vods(&self, username: &str, max_vods: u32) -> Result<Answer<Vec<Vod>>, TransportError>;
}
