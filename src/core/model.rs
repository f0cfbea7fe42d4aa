use crate::core::platform::Platform;
use serde::{Deserialize, Deserializer};

pub type JobId = String;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub source_url: String,
    pub platform: Platform,
    pub quality: Option<String>,
    pub format: Option<String>,
    pub segment: Option<SegmentSpec>,
}

impl DownloadRequest {
    pub fn new(source_url: impl Into<String>, platform: Platform) -> Self {
        Self {
            source_url: source_url.into(),
            platform,
            quality: None,
            format: None,
            segment: None,
        }
    }

    pub fn with_quality(mut self, quality: impl Into<String>) -> Self {
        self.quality = Some(quality.into());
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// Clip a Twitch VOD instead of downloading the whole video.
    pub fn with_segment(mut self, segment: SegmentSpec) -> Self {
        self.segment = Some(segment);
        self
    }
}

/// Start/end offsets as typed by the user (`MM:SS` or `HH:MM:SS`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentSpec {
    pub start: String,
    pub end: String,
    pub custom_name: Option<String>,
}

impl SegmentSpec {
    pub fn validate(&self) -> Result<(), String> {
        let start = parse_timestamp(&self.start)
            .ok_or_else(|| format!("start time '{}' is not MM:SS or HH:MM:SS", self.start))?;
        let end = parse_timestamp(&self.end)
            .ok_or_else(|| format!("end time '{}' is not MM:SS or HH:MM:SS", self.end))?;
        if end <= start {
            return Err(format!("end time {} is not after start time {}", self.end, self.start));
        }
        Ok(())
    }
}

/// Seconds in `MM:SS` or `HH:MM:SS`. The leading field takes one or two
/// digits, the others exactly two in `00..=59`.
pub fn parse_timestamp(s: &str) -> Option<u64> {
    let parts: Vec<&str> = s.trim().split(':').collect();
    if parts.len() != 2 && parts.len() != 3 {
        return None;
    }
    let field = |p: &str, leading: bool| -> Option<u64> {
        let len_ok = if leading { (1..=2).contains(&p.len()) } else { p.len() == 2 };
        if !len_ok || !p.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let v: u64 = p.parse().ok()?;
        if !leading && v > 59 {
            return None;
        }
        Some(v)
    };
    let first = field(parts[0], true)?;
    parts[1..]
        .iter()
        .try_fold(first, |acc, p| field(p, false).map(|v| acc * 60 + v))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Submitting,
    Processing,
    Completed,
    Failed,
    TimedOut,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed | JobState::TimedOut)
    }

    pub fn is_active(self) -> bool {
        matches!(self, JobState::Submitting | JobState::Processing)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRef {
    pub name: String,
    pub size_bytes: u64,
    pub retrieval_url: String,
}

#[derive(Debug, Clone)]
pub struct DownloadJob {
    pub id: JobId,
    pub request: DownloadRequest,
    pub state: JobState,
    pub produced_files: Vec<FileRef>,
    pub error_detail: Option<String>,
}

impl DownloadJob {
    pub(crate) fn accepted(id: JobId, request: DownloadRequest) -> Self {
        Self {
            id,
            request,
            state: JobState::Processing,
            produced_files: vec![],
            error_detail: None,
        }
    }

    pub(crate) fn complete(&mut self, files: Vec<FileRef>) {
        self.state = JobState::Completed;
        self.produced_files = files;
        self.error_detail = None;
    }

    pub(crate) fn fail(&mut self, state: JobState, detail: String) {
        debug_assert!(matches!(state, JobState::Failed | JobState::TimedOut));
        self.state = state;
        self.produced_files.clear();
        self.error_detail = Some(detail);
    }
}

/// Metadata returned by `/api/get_video_info`. Platform-specific fields are optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct VideoInfo {
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub uploader: String,
    /// Absent for live streams and premieres.
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub view_count: Option<u64>,
    #[serde(default)]
    pub like_count: Option<u64>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub post_type: Option<String>,
    #[serde(default)]
    pub carousel_count: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Vod {
    #[serde(default, deserialize_with = "null_as_default")]
    pub index: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub url: String,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub upload_date: String,
    #[serde(default)]
    pub view_count: Option<u64>,
    #[serde(default)]
    pub thumbnail: Option<String>,
}

/// Reads an explicit `null` as the type's default; yt-dlp leaves many fields null.
pub(crate) fn null_as_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validation {
    pub valid: bool,
    pub message: String,
}
