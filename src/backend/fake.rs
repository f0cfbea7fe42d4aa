//! Scripted in-memory backend for tests.

use crate::backend::{Answer, Backend, StatusReport, SubmitOutcome};
use crate::core::error::TransportError;
use crate::core::model::{DownloadRequest, Validation, VideoInfo, Vod};
use crate::core::platform::Platform;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub struct FakeBackend {
    pub submits: Mutex<VecDeque<Result<SubmitOutcome, TransportError>>>,
    pub statuses: Mutex<VecDeque<Result<StatusReport, TransportError>>>,
    pub submit_delay: Mutex<Option<Duration>>,
    pub status_delay: Mutex<Option<Duration>>,
    pub submit_calls: AtomicUsize,
    pub status_calls: AtomicUsize,
    pub lookup_calls: AtomicUsize,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            submits: Mutex::new(VecDeque::new()),
            statuses: Mutex::new(VecDeque::new()),
            submit_delay: Mutex::new(None),
            status_delay: Mutex::new(None),
            submit_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
            lookup_calls: AtomicUsize::new(0),
        }
    }

    pub fn accepting(id: &str) -> Self {
        let b = Self::new();
        b.push_submit(Ok(SubmitOutcome::Accepted { id: id.to_string(), message: "started".into(), files: vec![] }));
        b
    }

    pub fn push_submit(&self, r: Result<SubmitOutcome, TransportError>) {
        self.submits.lock().unwrap().push_back(r);
    }

    pub fn push_status(&self, r: Result<StatusReport, TransportError>) {
        self.statuses.lock().unwrap().push_back(r);
    }

    pub fn processing() -> StatusReport {
        StatusReport::Processing { status: "downloading".into(), percent: Some(50.0), message: None }
    }

    pub fn submit_count(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    pub fn status_count(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Backend for FakeBackend {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn create_download(&self, _req: &DownloadRequest) -> Result<SubmitOutcome, TransportError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.submit_delay.lock().unwrap();
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        self.submits
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Network("no scripted submit".into())))
    }

    /// Once the script runs dry the job stays in processing forever.
    async fn status(&self, _id: &str) -> Result<StatusReport, TransportError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.status_delay.lock().unwrap();
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        self.statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Self::processing()))
    }

    fn file_url(&self, id: &str) -> String {
        format!("http://fake/file/{id}")
    }

    async fn validate_url(&self, url: &str, platform: Platform) -> Result<Validation, TransportError> {
        self.lookup_calls.fetch_add(1, Ordering::SeqCst);
        let valid = platform.is_plausible_url(url);
        Ok(Validation { valid, message: if valid { "ok".into() } else { "invalid".into() } })
    }

    async fn video_info(&self, url: &str, _platform: Platform) -> Result<Answer<VideoInfo>, TransportError> {
        self.lookup_calls.fetch_add(1, Ordering::SeqCst);
        if url.contains("private") {
            return Ok(Answer::Rejected("private video".into()));
        }
        Ok(Answer::Ok(VideoInfo { title: "Clip".into(), uploader: "someone".into(), duration: Some(45.0), ..VideoInfo::default() }))
    }

    async fn search_vods(&self, username: &str, max_vods: u32) -> Result<Answer<Vec<Vod>>, TransportError> {
        self.lookup_calls.fetch_add(1, Ordering::SeqCst);
        if username == "nobody" {
            return Ok(Answer::Rejected("streamer not found".into()));
        }
        Ok(Answer::Ok(
            (1..=max_vods)
                .map(|i| Vod {
                    index: i,
                    title: format!("Stream #{i}"),
                    url: format!("https://www.twitch.tv/videos/{i}"),
                    ..Vod::default()
                })
                .collect(),
        ))
    }
}
