use crate::core::error::PollError;
use crate::core::model::{FileRef, JobId, JobState};
use std::time::Duration;

/// One item of a status poll, in the order the backend answered.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Progress {
        job_id: JobId,
        status: String,
        percent: Option<f64>,
        message: Option<String>,
    },
    /// A status check failed at the transport level; polling continues.
    Retrying { job_id: JobId, attempt: u32, detail: String },
    Completed { job_id: JobId, files: Vec<FileRef> },
    Failed { job_id: JobId, error: PollError },
    TimedOut { job_id: JobId, elapsed: Duration },
}

impl ProgressEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProgressEvent::Completed { .. } | ProgressEvent::Failed { .. } | ProgressEvent::TimedOut { .. }
        )
    }

    pub fn job_id(&self) -> &str {
        match self {
            ProgressEvent::Progress { job_id, .. }
            | ProgressEvent::Retrying { job_id, .. }
            | ProgressEvent::Completed { job_id, .. }
            | ProgressEvent::Failed { job_id, .. }
            | ProgressEvent::TimedOut { job_id, .. } => job_id,
        }
    }
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    StateChanged { job_id: Option<JobId>, state: JobState },
    Info { scope: String, message: String },
}
