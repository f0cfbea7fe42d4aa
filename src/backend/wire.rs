//! JSON bodies exchanged with the download server, and their mapping onto
//! the client's own types.

use crate::backend::{Answer, StatusReport, SubmitOutcome};
use crate::core::error::GENERIC_FAILURE;
use crate::core::model::{null_as_default, FileRef, Validation, VideoInfo, Vod};
use crate::core::platform::Platform;
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Serialize)]
pub struct DownloadBody<'a> {
    pub url: &'a str,
    pub platform: Platform,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub struct SegmentBody<'a> {
    pub vod_url: &'a str,
    pub start_time: &'a str,
    pub end_time: &'a str,
    pub custom_name: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub struct ProbeBody<'a> {
    pub url: &'a str,
    pub platform: Platform,
}

#[derive(Debug, Serialize)]
pub struct VodSearchBody<'a> {
    pub username: &'a str,
    pub max_vods: u32,
}

#[derive(Debug, Deserialize)]
pub struct FileWire {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, rename = "sizeBytes", alias = "size", alias = "size_bytes")]
    pub size_bytes: Option<u64>,
    pub download_url: String,
}

#[derive(Debug, Deserialize)]
pub struct SubmitWire {
    #[serde(default)]
    pub success: bool,
    pub download_id: Option<String>,
    pub message: Option<String>,
    pub error: Option<String>,
    #[serde(default)]
    pub files: Option<Vec<FileWire>>,
}

#[derive(Debug, Deserialize)]
pub struct StatusWire {
    #[serde(default)]
    pub status: String,
    pub progress: Option<f64>,
    pub message: Option<String>,
    pub error: Option<String>,
    pub filename: Option<String>,
    pub file_size: Option<u64>,
    #[serde(default)]
    pub files: Option<Vec<FileWire>>,
}

#[derive(Debug, Deserialize)]
pub struct ValidateWire {
    #[serde(default)]
    pub valid: bool,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct InfoWire {
    #[serde(default)]
    pub success: bool,
    pub info: Option<VideoInfo>,
    pub message: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VodsWire {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub vods: Vec<Vod>,
    pub message: Option<String>,
    pub error: Option<String>,
}

/// First non-blank of the candidates, else the generic fallback.
pub fn failure_message(candidates: [Option<String>; 2]) -> String {
    candidates
        .into_iter()
        .flatten()
        .map(|s| s.trim().to_string())
        .find(|s| !s.is_empty())
        .unwrap_or_else(|| GENERIC_FAILURE.to_string())
}

fn files_from_wire(files: Option<Vec<FileWire>>, base: &Url) -> Vec<FileRef> {
    files
        .unwrap_or_default()
        .into_iter()
        .map(|f| FileRef {
            retrieval_url: base
                .join(&f.download_url)
                .map(|u| u.to_string())
                .unwrap_or(f.download_url),
            name: f.name,
            size_bytes: f.size_bytes.unwrap_or(0),
        })
        .collect()
}

impl SubmitWire {
    pub fn into_outcome(self, base: &Url) -> SubmitOutcome {
        match (self.success, self.download_id) {
            (true, Some(id)) if !id.trim().is_empty() => SubmitOutcome::Accepted {
                id,
                message: self.message.unwrap_or_default(),
                files: files_from_wire(self.files, base),
            },
            (true, _) => SubmitOutcome::Rejected {
                message: "server accepted the request without a download id".to_string(),
            },
            (false, _) => SubmitOutcome::Rejected {
                message: failure_message([self.message, self.error]),
            },
        }
    }
}

impl StatusWire {
    pub fn into_report(self, base: &Url) -> StatusReport {
        match self.status.as_str() {
            "completed" => StatusReport::Completed {
                files: files_from_wire(self.files, base),
                filename: self.filename,
                size_bytes: self.file_size,
            },
            "error" => StatusReport::Failed {
                message: failure_message([self.error, self.message]),
            },
            "not_found" => StatusReport::Failed {
                message: "download not found on server".to_string(),
            },
            _ => StatusReport::Processing {
                status: self.status,
                percent: self.progress,
                message: self.message,
            },
        }
    }
}

impl From<ValidateWire> for Validation {
    fn from(w: ValidateWire) -> Self {
        Validation { valid: w.valid, message: w.message }
    }
}

impl InfoWire {
    pub fn into_answer(self) -> Answer<VideoInfo> {
        match (self.success, self.info) {
            (true, Some(info)) => Answer::Ok(info),
            (_, _) => Answer::Rejected(failure_message([self.error, self.message])),
        }
    }
}

impl VodsWire {
    pub fn into_answer(self) -> Answer<Vec<Vod>> {
        if self.success {
            Answer::Ok(self.vods)
        } else {
            Answer::Rejected(failure_message([self.message, self.error]))
        }
    }
}
