use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE, USER_AGENT};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::time::sleep;
use tracing::{debug, warn};
use url::Url;

use crate::backend::wire::{
    DownloadBody, InfoWire, ProbeBody, SegmentBody, StatusWire, SubmitWire, ValidateWire, VodSearchBody, VodsWire,
};
use crate::backend::{Answer, Backend, BackendContext, StatusReport, SubmitOutcome};
use crate::core::error::TransportError;
use crate::core::model::{DownloadRequest, FileRef, Validation, VideoInfo, Vod};
use crate::core::platform::Platform;

pub struct HttpBackend {
    client: reqwest::Client,
    ctx: BackendContext,
}

impl HttpBackend {
    pub fn new(ctx: BackendContext) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .default_headers(Self::build_headers(&ctx)?)
            .timeout(Duration::from_secs(ctx.timeout_secs.max(1)))
            .build()?;
        Ok(Self { client, ctx })
    }

    fn build_headers(ctx: &BackendContext) -> anyhow::Result<HeaderMap> {
        let mut h = HeaderMap::new();
        h.insert(USER_AGENT, HeaderValue::from_str(&ctx.user_agent)?);
        for (k, v) in &ctx.headers {
            let name = HeaderName::from_bytes(k.as_bytes())?;
            let value = HeaderValue::from_str(v)?;
            h.insert(name, value);
        }
        Ok(h)
    }

    fn endpoint(&self, path: &str) -> Result<Url, TransportError> {
        self.ctx
            .base_url
            .join(path)
            .map_err(|e| TransportError::InvalidEndpoint(format!("{path}: {e}")))
    }

    /// `{base}/{kind}/{id}` with the server-assigned id percent-encoded as one segment.
    fn job_endpoint(&self, kind: &str, id: &str) -> Result<Url, TransportError> {
        let mut url = self.ctx.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| TransportError::InvalidEndpoint(format!("{} cannot be a base", self.ctx.base_url)))?
            .pop_if_empty()
            .push(kind)
            .push(id);
        Ok(url)
    }

    fn is_json(resp: &reqwest::Response) -> bool {
        resp.headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_ascii_lowercase().contains("json"))
            .unwrap_or(false)
    }

    fn should_retry_status(status: StatusCode) -> bool {
        status == StatusCode::TOO_MANY_REQUESTS
            || status == StatusCode::REQUEST_TIMEOUT
            || status.is_server_error()
    }

    async fn sleep_backoff(&self, attempt: u32) {
        let base = self.ctx.retry_backoff_ms.max(1);
        let shift = attempt.min(16);
        let mul = 1u64 << shift;
        let ms = base.saturating_mul(mul).min(30_000);
        sleep(Duration::from_millis(ms)).await;
    }

    /// Turns a response into `T`, treating any non-2xx status or non-JSON body
    /// as a transport failure. The server's message is kept when it sent one.
    async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, TransportError> {
        let status = resp.status();
        let json = Self::is_json(&resp);
        if !status.is_success() {
            let message = if json {
                resp.json::<serde_json::Value>().await.ok().and_then(|v| {
                    ["message", "error"]
                        .iter()
                        .find_map(|k| v.get(*k).and_then(|m| m.as_str()).map(str::to_string))
                })
            } else {
                None
            };
            return Err(TransportError::Status { code: status.as_u16(), message });
        }
        if !json {
            let ct = resp
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("<none>")
                .to_string();
            return Err(TransportError::UnexpectedContentType(ct));
        }
        let bytes = resp.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| TransportError::Decode(e.to_string()))
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, TransportError> {
        let url = self.endpoint(path)?;
        debug!(%url, "POST");
        let resp = self.client.post(url).json(body).send().await?;
        Self::decode(resp).await
    }

    /// Streams a produced file to `dest`, retrying transient statuses with
    /// exponential backoff. Returns the number of bytes written.
    pub async fn fetch_file(
        &self,
        file: &FileRef,
        dest: &Path,
        mut on_progress: impl FnMut(u64, Option<u64>),
    ) -> anyhow::Result<u64> {
        let mut last_err: Option<anyhow::Error> = None;
        for attempt in 0..=self.ctx.retries {
            if attempt > 0 {
                self.sleep_backoff(attempt - 1).await;
            }

            let resp = match self.client.get(&file.retrieval_url).send().await {
                Ok(r) => r,
                Err(e) => {
                    warn!(url = %file.retrieval_url, attempt, "fetch failed: {e}");
                    last_err = Some(e.into());
                    continue;
                }
            };

            let status = resp.status();
            if Self::should_retry_status(status) {
                warn!(url = %file.retrieval_url, attempt, %status, "transient status");
                last_err = Some(TransportError::Status { code: status.as_u16(), message: None }.into());
                continue;
            }
            if !status.is_success() {
                return Err(TransportError::Status { code: status.as_u16(), message: None }.into());
            }

            let partial = partial_path(dest);
            let written = match Self::write_body(resp, &partial, &mut on_progress).await {
                Ok(n) => n,
                Err(e) => {
                    let _ = tokio::fs::remove_file(&partial).await;
                    warn!(url = %file.retrieval_url, attempt, "transfer interrupted: {e:#}");
                    last_err = Some(e);
                    continue;
                }
            };

            if tokio::fs::metadata(dest).await.is_ok() {
                let _ = tokio::fs::remove_file(dest).await;
            }
            tokio::fs::rename(&partial, dest).await?;
            return Ok(written);
        }

        Err(last_err.unwrap_or_else(|| TransportError::Status { code: StatusCode::REQUEST_TIMEOUT.as_u16(), message: None }.into()))
    }

    async fn write_body(
        resp: reqwest::Response,
        partial: &Path,
        on_progress: &mut impl FnMut(u64, Option<u64>),
    ) -> anyhow::Result<u64> {
        let total = resp
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok());

        let mut out = tokio::fs::File::create(partial).await?;
        let mut written = 0u64;
        let mut body = resp.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            out.write_all(&chunk).await?;
            written += chunk.len() as u64;
            on_progress(written, total);
        }
        out.flush().await?;
        Ok(written)
    }
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".partial");
    PathBuf::from(name)
}

#[async_trait]
impl Backend for HttpBackend {
    fn name(&self) -> &'static str {
        "http-backend"
    }

    async fn create_download(&self, req: &DownloadRequest) -> Result<SubmitOutcome, TransportError> {
        let wire: SubmitWire = match &req.segment {
            Some(seg) => {
                let body = SegmentBody {
                    vod_url: &req.source_url,
                    start_time: &seg.start,
                    end_time: &seg.end,
                    custom_name: seg.custom_name.as_deref(),
                };
                self.post_json("api/twitch/download_segment", &body).await?
            }
            None => {
                let body = DownloadBody {
                    url: &req.source_url,
                    platform: req.platform,
                    quality: req.quality.as_deref(),
                    format: req.format.as_deref(),
                };
                self.post_json("download", &body).await?
            }
        };
        Ok(wire.into_outcome(&self.ctx.base_url))
    }

    async fn status(&self, id: &str) -> Result<StatusReport, TransportError> {
        let url = self.job_endpoint("status", id)?;
        let resp = self.client.get(url).send().await?;

        // An unknown id comes back as 404 with a structured body; that is an
        // answer, not a transport problem.
        if resp.status() == StatusCode::NOT_FOUND && Self::is_json(&resp) {
            let bytes = resp.bytes().await?;
            return match serde_json::from_slice::<StatusWire>(&bytes) {
                Ok(w) if w.status == "not_found" => Ok(w.into_report(&self.ctx.base_url)),
                _ => Err(TransportError::Status { code: 404, message: None }),
            };
        }

        let wire: StatusWire = Self::decode(resp).await?;
        let mut report = wire.into_report(&self.ctx.base_url);
        if let StatusReport::Processing { percent, .. } = &mut report {
            *percent = percent.map(|p| p.clamp(0.0, 100.0));
        }
        Ok(report)
    }

    fn file_url(&self, id: &str) -> String {
        self.job_endpoint("file", id)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| format!("{}file/{}", self.ctx.base_url, id))
    }

    async fn validate_url(&self, url: &str, platform: Platform) -> Result<Validation, TransportError> {
        let wire: ValidateWire = self.post_json("api/validate_url", &ProbeBody { url, platform }).await?;
        Ok(wire.into())
    }

    async fn video_info(&self, url: &str, platform: Platform) -> Result<Answer<VideoInfo>, TransportError> {
        let wire: InfoWire = self.post_json("api/get_video_info", &ProbeBody { url, platform }).await?;
        Ok(wire.into_answer())
    }

    async fn search_vods(&self, username: &str, max_vods: u32) -> Result<Answer<Vec<Vod>>, TransportError> {
        let wire: VodsWire = self
            .post_json("api/twitch/search_vods", &VodSearchBody { username, max_vods })
            .await?;
        Ok(wire.into_answer())
    }
}
