use crate::backend::{Backend, StatusReport, SubmitOutcome};
use crate::core::error::{PollError, RetrievalError, SubmissionError};
use crate::core::events::{ProgressEvent, SessionEvent};
use crate::core::model::{DownloadJob, DownloadRequest, FileRef, JobId, JobState};
use futures::stream::{self, Stream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio::time::{sleep, Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2_000);
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(300_000);
pub const DEFAULT_MAX_TRANSPORT_FAILURES: u32 = 5;

/// Name the server gives an artifact when it does not report one.
const FALLBACK_FILE_NAME: &str = "video.mp4";

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub poll_interval: Duration,
    /// Measured from the first status check, not from submission.
    pub poll_timeout: Duration,
    pub max_transport_failures: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            max_transport_failures: DEFAULT_MAX_TRANSPORT_FAILURES,
        }
    }
}

struct Slot {
    state: JobState,
    job: Option<DownloadJob>,
    /// Files listed in the submit response, used if the final status has none.
    announced_files: Vec<FileRef>,
    cancel: CancellationToken,
    /// Set while a `StatusPoll` for this job is alive.
    polling: Arc<AtomicBool>,
}

impl Default for Slot {
    fn default() -> Self {
        Self {
            state: JobState::Idle,
            job: None,
            announced_files: vec![],
            cancel: CancellationToken::default(),
            polling: Arc::new(AtomicBool::new(false)),
        }
    }
}

/// Drives at most one download at a time from submission to a terminal state.
#[derive(Clone)]
pub struct DownloadSession {
    backend: Arc<dyn Backend>,
    config: SessionConfig,
    slot: Arc<Mutex<Slot>>,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl DownloadSession {
    pub fn new(backend: Arc<dyn Backend>, config: SessionConfig) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            backend,
            config,
            slot: Arc::new(Mutex::new(Slot::default())),
            event_tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    fn emit_state(&self, job_id: Option<JobId>, state: JobState) {
        let _ = self.event_tx.send(SessionEvent::StateChanged { job_id, state });
    }

    pub async fn state(&self) -> JobState {
        self.slot.lock().await.state
    }

    /// Snapshot of the current (or last terminal) job.
    pub async fn current_job(&self) -> Option<DownloadJob> {
        self.slot.lock().await.job.clone()
    }

    pub async fn submit(&self, request: DownloadRequest) -> Result<DownloadJob, SubmissionError> {
        if request.source_url.trim().is_empty() {
            return Err(SubmissionError::EmptyUrl);
        }
        if let Some(segment) = &request.segment {
            segment.validate().map_err(SubmissionError::InvalidSegment)?;
        }

        let cancel = {
            let mut slot = self.slot.lock().await;
            if slot.state.is_active() {
                return Err(SubmissionError::AlreadyActive);
            }
            // Any previous terminal job is discarded here.
            *slot = Slot { state: JobState::Submitting, ..Slot::default() };
            slot.cancel.clone()
        };
        self.emit_state(None, JobState::Submitting);
        info!(
            platform = %request.platform,
            url = %request.source_url,
            backend = self.backend.name(),
            "submitting download"
        );

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            r = self.backend.create_download(&request) => Some(r),
        };

        let mut slot = self.slot.lock().await;
        // cancel() already reset the slot; it may even belong to a newer submit by now.
        let outcome = match outcome {
            Some(o) if !cancel.is_cancelled() => o,
            _ => return Err(SubmissionError::Cancelled),
        };

        match outcome {
            Ok(SubmitOutcome::Accepted { id, message, files }) => {
                info!(job_id = %id, "accepted: {}", message);
                let job = DownloadJob::accepted(id.clone(), request);
                slot.state = JobState::Processing;
                slot.job = Some(job.clone());
                slot.announced_files = files;
                drop(slot);
                self.emit_state(Some(id.clone()), JobState::Processing);
                if !message.is_empty() {
                    let _ = self.event_tx.send(SessionEvent::Info { scope: format!("job:{id}"), message });
                }
                Ok(job)
            }
            Ok(SubmitOutcome::Rejected { message }) => {
                warn!("submission rejected: {}", message);
                slot.state = JobState::Idle;
                drop(slot);
                self.emit_state(None, JobState::Idle);
                Err(SubmissionError::Rejected(message))
            }
            Err(e) => {
                warn!("submission failed: {}", e);
                slot.state = JobState::Idle;
                drop(slot);
                self.emit_state(None, JobState::Idle);
                Err(SubmissionError::TransportFailure(e))
            }
        }
    }

    /// Starts the status loop for the active job. The returned poll is lazy:
    /// nothing is requested until it is driven.
    ///
    /// The job stays `Processing` until a poll reaches a terminal event or
    /// `cancel` is called, and `submit` is refused meanwhile. Dropping an
    /// unfinished poll releases the job so it can be polled again; the new
    /// poll measures its timeout from its own first check.
    pub async fn poll_until_terminal(&self, job_id: &str) -> Result<StatusPoll, PollError> {
        let slot = self.slot.lock().await;
        let is_active_job = slot.state == JobState::Processing
            && slot.job.as_ref().map(|j| j.id == job_id).unwrap_or(false);
        if !is_active_job {
            return Err(PollError::NotActive(job_id.to_string()));
        }
        if slot.polling.swap(true, Ordering::SeqCst) {
            return Err(PollError::AlreadyPolling(job_id.to_string()));
        }
        Ok(StatusPoll {
            session: self.clone(),
            job_id: job_id.to_string(),
            cancel: slot.cancel.clone(),
            polling: slot.polling.clone(),
            started: None,
            checks: 0,
            failures: 0,
            done: false,
        })
    }

    /// Stops an in-flight submission or poll and discards the job client-side.
    /// The server-side job is left alone. Returns false when nothing was active.
    pub async fn cancel(&self) -> bool {
        let mut slot = self.slot.lock().await;
        if !slot.state.is_active() {
            return false;
        }
        slot.cancel.cancel();
        let job_id = slot.job.as_ref().map(|j| j.id.clone());
        *slot = Slot::default();
        drop(slot);
        info!(job_id = ?job_id, "download cancelled");
        self.emit_state(job_id, JobState::Idle);
        true
    }

    /// First produced file, in the order the server listed them.
    pub fn retrieve_file(job: &DownloadJob) -> Result<FileRef, RetrievalError> {
        if job.state != JobState::Completed {
            return Err(RetrievalError::NotReady);
        }
        job.produced_files.first().cloned().ok_or(RetrievalError::NotReady)
    }
}

enum Terminal {
    Completed {
        files: Vec<FileRef>,
        filename: Option<String>,
        size_bytes: Option<u64>,
    },
    Failed(PollError),
    TimedOut(Duration),
}

/// Status loop of one job. Finite, yields exactly one terminal event unless
/// cancelled, and cannot be restarted once finished.
pub struct StatusPoll {
    session: DownloadSession,
    job_id: JobId,
    cancel: CancellationToken,
    polling: Arc<AtomicBool>,
    started: Option<Instant>,
    checks: u32,
    failures: u32,
    done: bool,
}

impl StatusPoll {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub async fn next_event(&mut self) -> Option<ProgressEvent> {
        if self.done || self.cancel.is_cancelled() {
            self.done = true;
            return None;
        }
        let started = *self.started.get_or_insert_with(Instant::now);
        let cancel = self.cancel.clone();

        if self.checks > 0 {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.done = true;
                    return None;
                }
                _ = sleep(self.session.config.poll_interval) => {}
            }
        }

        let elapsed = started.elapsed();
        if elapsed > self.session.config.poll_timeout {
            return self.finish(Terminal::TimedOut(elapsed)).await;
        }

        self.checks += 1;
        let backend = self.session.backend.clone();
        let report = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            r = backend.status(&self.job_id) => Some(r),
        };
        let report = match report {
            Some(r) if !cancel.is_cancelled() => r,
            _ => {
                self.done = true;
                return None;
            }
        };

        match report {
            Ok(StatusReport::Processing { status, percent, message }) => {
                self.failures = 0;
                debug!(job_id = %self.job_id, %status, ?percent, "still processing");
                Some(ProgressEvent::Progress { job_id: self.job_id.clone(), status, percent, message })
            }
            Ok(StatusReport::Completed { files, filename, size_bytes }) => {
                self.finish(Terminal::Completed { files, filename, size_bytes }).await
            }
            Ok(StatusReport::Failed { message }) => self.finish(Terminal::Failed(PollError::Rejected(message))).await,
            Err(e) => {
                self.failures += 1;
                let max = self.session.config.max_transport_failures.max(1);
                warn!(job_id = %self.job_id, attempt = self.failures, max, "status check failed: {}", e);
                if self.failures >= max {
                    let error = PollError::TransientTransport { attempts: self.failures, detail: e.to_string() };
                    self.finish(Terminal::Failed(error)).await
                } else {
                    Some(ProgressEvent::Retrying {
                        job_id: self.job_id.clone(),
                        attempt: self.failures,
                        detail: e.to_string(),
                    })
                }
            }
        }
    }

    async fn finish(&mut self, terminal: Terminal) -> Option<ProgressEvent> {
        self.done = true;
        let mut slot = self.session.slot.lock().await;
        // Checked under the lock so a concurrent cancel() either fully wins or fully loses.
        if self.cancel.is_cancelled() {
            return None;
        }
        let announced = std::mem::take(&mut slot.announced_files);
        let job = slot.job.as_mut().filter(|j| j.id == self.job_id)?;
        let job_id = self.job_id.clone();

        let (state, event) = match terminal {
            Terminal::Completed { files, filename, size_bytes } => {
                let files = if !files.is_empty() {
                    files
                } else if !announced.is_empty() {
                    announced
                } else {
                    vec![FileRef {
                        name: filename
                            .filter(|n| !n.trim().is_empty())
                            .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string()),
                        size_bytes: size_bytes.unwrap_or(0),
                        retrieval_url: self.session.backend.file_url(&job_id),
                    }]
                };
                job.complete(files.clone());
                info!(job_id = %job_id, files = files.len(), "download completed");
                (JobState::Completed, ProgressEvent::Completed { job_id: job_id.clone(), files })
            }
            Terminal::Failed(error) => {
                job.fail(JobState::Failed, error.to_string());
                warn!(job_id = %job_id, "download failed: {}", error);
                (JobState::Failed, ProgressEvent::Failed { job_id: job_id.clone(), error })
            }
            Terminal::TimedOut(elapsed) => {
                job.fail(JobState::TimedOut, PollError::Timeout { elapsed }.to_string());
                warn!(job_id = %job_id, elapsed_secs = elapsed.as_secs(), "gave up waiting for download");
                (JobState::TimedOut, ProgressEvent::TimedOut { job_id: job_id.clone(), elapsed })
            }
        };

        slot.state = state;
        drop(slot);
        self.session.emit_state(Some(job_id), state);
        Some(event)
    }

    pub fn into_stream(self) -> impl Stream<Item = ProgressEvent> {
        stream::unfold(self, |mut poll| async move {
            let event = poll.next_event().await?;
            Some((event, poll))
        })
    }
}

impl Drop for StatusPoll {
    fn drop(&mut self) {
        // The flag belongs to this job's slot; a newer submit has its own.
        self.polling.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fake::FakeBackend;
    use crate::core::error::TransportError;
    use crate::core::model::SegmentSpec;
    use crate::core::platform::Platform;
    use futures::StreamExt;

    fn request() -> DownloadRequest {
        DownloadRequest::new("https://www.youtube.com/watch?v=abc", Platform::YouTube)
    }

    fn session_with(backend: Arc<FakeBackend>) -> DownloadSession {
        DownloadSession::new(backend, SessionConfig::default())
    }

    fn a_mp4() -> FileRef {
        FileRef { name: "a.mp4".into(), size_bytes: 1_048_576, retrieval_url: "http://fake/file/job1".into() }
    }

    fn completed(files: Vec<FileRef>) -> StatusReport {
        StatusReport::Completed { files, filename: None, size_bytes: None }
    }

    async fn drain(poll: StatusPoll) -> Vec<ProgressEvent> {
        poll.into_stream().collect().await
    }

    #[tokio::test]
    async fn empty_url_fails_without_network() {
        let backend = Arc::new(FakeBackend::accepting("job1"));
        let session = session_with(backend.clone());

        let err = session.submit(DownloadRequest::new("   ", Platform::TikTok)).await.unwrap_err();
        assert!(matches!(err, SubmissionError::EmptyUrl));
        assert_eq!(backend.submit_count(), 0);
        assert_eq!(session.state().await, JobState::Idle);
    }

    #[tokio::test]
    async fn bad_segment_fails_without_network() {
        let backend = Arc::new(FakeBackend::accepting("job1"));
        let session = session_with(backend.clone());
        let req = DownloadRequest::new("https://www.twitch.tv/videos/1", Platform::Twitch).with_segment(SegmentSpec {
            start: "1:75".into(),
            end: "2:00".into(),
            custom_name: None,
        });

        let err = session.submit(req).await.unwrap_err();
        assert!(matches!(err, SubmissionError::InvalidSegment(_)));
        assert_eq!(backend.submit_count(), 0);
    }

    #[tokio::test]
    async fn accepted_job_is_processing_before_any_poll() {
        let backend = Arc::new(FakeBackend::accepting("job1"));
        let session = session_with(backend.clone());

        let job = session.submit(request()).await.unwrap();
        assert_eq!(job.id, "job1");
        assert_eq!(job.state, JobState::Processing);
        assert!(job.produced_files.is_empty());
        assert!(job.error_detail.is_none());
        assert_eq!(session.state().await, JobState::Processing);
        assert_eq!(backend.status_count(), 0);
    }

    #[tokio::test]
    async fn second_submit_while_processing_is_refused() {
        let backend = Arc::new(FakeBackend::accepting("job1"));
        backend.push_submit(Ok(SubmitOutcome::Accepted { id: "job2".into(), message: String::new(), files: vec![] }));
        let session = session_with(backend.clone());

        session.submit(request()).await.unwrap();
        let err = session.submit(request()).await.unwrap_err();
        assert!(matches!(err, SubmissionError::AlreadyActive));
        assert_eq!(backend.submit_count(), 1);
        assert_eq!(session.current_job().await.unwrap().id, "job1");
    }

    #[tokio::test]
    async fn rejected_and_failed_submissions_leave_no_job() {
        let backend = Arc::new(FakeBackend::new());
        backend.push_submit(Ok(SubmitOutcome::Rejected { message: "URL é obrigatória".into() }));
        backend.push_submit(Err(TransportError::Status { code: 500, message: None }));
        let session = session_with(backend.clone());

        match session.submit(request()).await {
            Err(SubmissionError::Rejected(m)) => assert_eq!(m, "URL é obrigatória"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(session.state().await, JobState::Idle);
        assert!(session.current_job().await.is_none());

        match session.submit(request()).await {
            Err(SubmissionError::TransportFailure(TransportError::Status { code: 500, .. })) => {}
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(session.state().await, JobState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn completed_status_yields_one_terminal_event_with_files() {
        let backend = Arc::new(FakeBackend::accepting("job1"));
        backend.push_status(Ok(FakeBackend::processing()));
        backend.push_status(Ok(FakeBackend::processing()));
        backend.push_status(Ok(completed(vec![a_mp4()])));
        let session = session_with(backend.clone());

        let job = session.submit(request()).await.unwrap();
        let events = drain(session.poll_until_terminal(&job.id).await.unwrap()).await;

        assert_eq!(events.len(), 3);
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
        assert_eq!(events[2], ProgressEvent::Completed { job_id: "job1".into(), files: vec![a_mp4()] });
        assert_eq!(backend.status_count(), 3);

        let job = session.current_job().await.unwrap();
        assert_eq!(job.state, JobState::Completed);
        assert!(job.error_detail.is_none());
        assert_eq!(DownloadSession::retrieve_file(&job).unwrap(), a_mp4());
    }

    #[tokio::test(start_paused = true)]
    async fn error_status_fails_with_server_message() {
        let backend = Arc::new(FakeBackend::accepting("job1"));
        backend.push_status(Ok(FakeBackend::processing()));
        backend.push_status(Ok(StatusReport::Failed { message: "Erro no download".into() }));
        let session = session_with(backend.clone());

        let job = session.submit(request()).await.unwrap();
        let events = drain(session.poll_until_terminal(&job.id).await.unwrap()).await;

        assert_eq!(
            events.last(),
            Some(&ProgressEvent::Failed { job_id: "job1".into(), error: PollError::Rejected("Erro no download".into()) })
        );
        let job = session.current_job().await.unwrap();
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.error_detail.as_deref(), Some("Erro no download"));
        assert!(job.produced_files.is_empty());
        assert_eq!(DownloadSession::retrieve_file(&job), Err(RetrievalError::NotReady));
    }

    #[tokio::test(start_paused = true)]
    async fn never_finishing_job_times_out_once_and_stops_polling() {
        let backend = Arc::new(FakeBackend::accepting("job1"));
        let session = session_with(backend.clone());
        let job = session.submit(request()).await.unwrap();

        let t0 = Instant::now();
        let events = drain(session.poll_until_terminal(&job.id).await.unwrap()).await;

        assert!(t0.elapsed() > DEFAULT_POLL_TIMEOUT);
        let terminals: Vec<_> = events.iter().filter(|e| e.is_terminal()).collect();
        assert_eq!(terminals.len(), 1);
        assert!(matches!(events.last(), Some(ProgressEvent::TimedOut { .. })));
        // one check every 2s over 300s
        assert!(backend.status_count() >= 150, "only {} checks", backend.status_count());

        let calls = backend.status_count();
        sleep(Duration::from_secs(60)).await;
        assert_eq!(backend.status_count(), calls);

        let job = session.current_job().await.unwrap();
        assert_eq!(job.state, JobState::TimedOut);
        assert!(job.error_detail.is_some());
        assert_eq!(session.state().await, JobState::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn single_transport_error_is_transient() {
        let backend = Arc::new(FakeBackend::accepting("job1"));
        backend.push_status(Err(TransportError::Network("connection reset".into())));
        backend.push_status(Ok(completed(vec![a_mp4()])));
        let session = session_with(backend.clone());

        let job = session.submit(request()).await.unwrap();
        let events = drain(session.poll_until_terminal(&job.id).await.unwrap()).await;

        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], ProgressEvent::Retrying { attempt: 1, .. }));
        assert!(matches!(&events[1], ProgressEvent::Completed { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn sustained_transport_errors_terminate_after_limit() {
        let backend = Arc::new(FakeBackend::accepting("job1"));
        for _ in 0..10 {
            backend.push_status(Err(TransportError::Network("unreachable".into())));
        }
        let session = session_with(backend.clone());

        let job = session.submit(request()).await.unwrap();
        let events = drain(session.poll_until_terminal(&job.id).await.unwrap()).await;

        assert_eq!(events.len(), DEFAULT_MAX_TRANSPORT_FAILURES as usize);
        assert!(events[..4].iter().all(|e| matches!(e, ProgressEvent::Retrying { .. })));
        match events.last() {
            Some(ProgressEvent::Failed { error: PollError::TransientTransport { attempts, .. }, .. }) => {
                assert_eq!(*attempts, 5)
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(backend.status_count(), 5);
        assert_eq!(session.state().await, JobState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn successful_check_resets_failure_count() {
        let backend = Arc::new(FakeBackend::accepting("job1"));
        for _ in 0..4 {
            backend.push_status(Err(TransportError::Network("flaky".into())));
        }
        backend.push_status(Ok(FakeBackend::processing()));
        for _ in 0..4 {
            backend.push_status(Err(TransportError::Network("flaky".into())));
        }
        backend.push_status(Ok(completed(vec![a_mp4()])));
        let session = session_with(backend.clone());

        let job = session.submit(request()).await.unwrap();
        let events = drain(session.poll_until_terminal(&job.id).await.unwrap()).await;
        assert!(matches!(events.last(), Some(ProgressEvent::Completed { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_between_checks_stops_polling() {
        let backend = Arc::new(FakeBackend::accepting("job1"));
        let session = session_with(backend.clone());
        let job = session.submit(request()).await.unwrap();
        let mut poll = session.poll_until_terminal(&job.id).await.unwrap();

        assert!(matches!(poll.next_event().await, Some(ProgressEvent::Progress { .. })));
        assert_eq!(backend.status_count(), 1);

        let canceller = session.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(500)).await;
            assert!(canceller.cancel().await);
        });

        assert_eq!(poll.next_event().await, None);
        assert_eq!(poll.next_event().await, None);
        sleep(Duration::from_secs(30)).await;
        assert_eq!(backend.status_count(), 1);
        assert_eq!(session.state().await, JobState::Idle);
        assert!(session.current_job().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_status_call_emits_nothing() {
        let backend = Arc::new(FakeBackend::accepting("job1"));
        *backend.status_delay.lock().unwrap() = Some(Duration::from_secs(10));
        backend.push_status(Ok(completed(vec![a_mp4()])));
        let session = session_with(backend.clone());
        let job = session.submit(request()).await.unwrap();
        let poll = session.poll_until_terminal(&job.id).await.unwrap();

        let consumer = tokio::spawn(drain(poll));
        sleep(Duration::from_secs(1)).await;
        assert!(session.cancel().await);

        let events = consumer.await.unwrap();
        assert!(events.is_empty(), "got {events:?}");
        sleep(Duration::from_secs(60)).await;
        assert_eq!(backend.status_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_submission_discards_job() {
        let backend = Arc::new(FakeBackend::accepting("job1"));
        *backend.submit_delay.lock().unwrap() = Some(Duration::from_secs(5));
        let session = session_with(backend.clone());

        let submitter = session.clone();
        let pending = tokio::spawn(async move { submitter.submit(request()).await });
        sleep(Duration::from_secs(1)).await;
        assert_eq!(session.state().await, JobState::Submitting);
        assert!(session.cancel().await);

        assert!(matches!(pending.await.unwrap(), Err(SubmissionError::Cancelled)));
        assert_eq!(session.state().await, JobState::Idle);
        assert!(session.current_job().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn completion_without_files_falls_back() {
        let announced = FileRef { name: "b.mp4".into(), size_bytes: 10, retrieval_url: "http://fake/b".into() };
        let backend = Arc::new(FakeBackend::new());
        backend.push_submit(Ok(SubmitOutcome::Accepted {
            id: "job1".into(),
            message: String::new(),
            files: vec![announced.clone()],
        }));
        backend.push_status(Ok(completed(vec![])));
        backend.push_submit(Ok(SubmitOutcome::Accepted { id: "job2".into(), message: String::new(), files: vec![] }));
        backend.push_status(Ok(StatusReport::Completed {
            files: vec![],
            filename: Some("clip.mp4".into()),
            size_bytes: None,
        }));
        let session = session_with(backend.clone());

        let job = session.submit(request()).await.unwrap();
        drain(session.poll_until_terminal(&job.id).await.unwrap()).await;
        let done = session.current_job().await.unwrap();
        assert_eq!(DownloadSession::retrieve_file(&done).unwrap(), announced);

        // terminal state allows a fresh submit
        let job = session.submit(request()).await.unwrap();
        assert_eq!(job.id, "job2");
        drain(session.poll_until_terminal(&job.id).await.unwrap()).await;
        let done = session.current_job().await.unwrap();
        let file = DownloadSession::retrieve_file(&done).unwrap();
        assert_eq!(file.name, "clip.mp4");
        assert_eq!(file.retrieval_url, "http://fake/file/job2");
    }

    #[tokio::test]
    async fn polling_requires_the_active_job_and_happens_once() {
        let backend = Arc::new(FakeBackend::accepting("job1"));
        let session = session_with(backend.clone());

        assert!(matches!(session.poll_until_terminal("job1").await, Err(PollError::NotActive(_))));
        let job = session.submit(request()).await.unwrap();
        assert!(matches!(session.poll_until_terminal("other").await, Err(PollError::NotActive(_))));

        let _poll = session.poll_until_terminal(&job.id).await.unwrap();
        assert!(matches!(session.poll_until_terminal(&job.id).await, Err(PollError::AlreadyPolling(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_poll_releases_the_job_for_a_new_poll() {
        let backend = Arc::new(FakeBackend::accepting("job1"));
        let session = session_with(backend.clone());
        let job = session.submit(request()).await.unwrap();

        let mut first = session.poll_until_terminal(&job.id).await.unwrap();
        assert!(matches!(first.next_event().await, Some(ProgressEvent::Progress { .. })));
        drop(first);

        assert_eq!(session.state().await, JobState::Processing);
        assert!(matches!(session.submit(request()).await, Err(SubmissionError::AlreadyActive)));

        backend.push_status(Ok(StatusReport::Completed { files: vec![a_mp4()], filename: None, size_bytes: None }));
        let events: Vec<_> = session.poll_until_terminal(&job.id).await.unwrap().into_stream().collect().await;
        assert!(matches!(events.last(), Some(ProgressEvent::Completed { .. })));
        assert_eq!(session.state().await, JobState::Completed);
    }

    #[test]
    fn retrieve_file_needs_a_completed_job_with_files() {
        let mut job = DownloadJob::accepted("job1".into(), request());
        assert_eq!(DownloadSession::retrieve_file(&job), Err(RetrievalError::NotReady));

        job.complete(vec![]);
        assert_eq!(DownloadSession::retrieve_file(&job), Err(RetrievalError::NotReady));

        let second = FileRef { name: "b.mp4".into(), size_bytes: 1, retrieval_url: "u".into() };
        job.complete(vec![a_mp4(), second]);
        assert_eq!(DownloadSession::retrieve_file(&job).unwrap(), a_mp4());
    }

    #[tokio::test]
    async fn state_changes_are_broadcast() {
        let backend = Arc::new(FakeBackend::accepting("job1"));
        let session = session_with(backend);
        let mut rx = session.subscribe();

        session.submit(request()).await.unwrap();

        let first = rx.recv().await.unwrap();
        assert!(matches!(first, SessionEvent::StateChanged { job_id: None, state: JobState::Submitting }));
        match rx.recv().await.unwrap() {
            SessionEvent::StateChanged { job_id, state } => {
                assert_eq!(job_id.as_deref(), Some("job1"));
                assert_eq!(state, JobState::Processing);
            }
            other => panic!("unexpected {other:?}"),
        }
        match rx.recv().await.unwrap() {
            SessionEvent::Info { scope, message } => {
                assert_eq!(scope, "job:job1");
                assert_eq!(message, "started");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
