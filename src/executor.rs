//! Managed job execution
//!
//! The [`JobExecutor`] runs one fetch job per submission on a bounded pool of
//! blocking workers, racing the opaque external fetch against a hard deadline.
//! Whatever happens — completion, fetch error, size violation, worker panic,
//! deadline expiry — every job reaches exactly one terminal state, performs
//! exactly one stats update, and leaves no temporary artifact behind except
//! the one transferred to the caller on success.
//!
//! Timed-out workers are abandoned, not awaited: the blocking fetch may not be
//! interruptible, so a detached reaper consumes its eventual completion,
//! deletes any late artifact, and never touches statistics (the job was
//! already finalized as timed out).

use crate::config::Config;
use crate::error::{Error, Result};
use crate::fetcher::Fetcher;
use crate::stats::StatsStore;
use crate::types::{Event, FailureReason, JobId, JobStatus, Platform, UserId};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Semaphore, broadcast};
use tokio_util::sync::CancellationToken;
use url::Url;

/// Buffer size of the lifecycle event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Outcome of a submitted job
///
/// A tagged outcome rather than an error: timeouts and fetch failures are
/// expected, recordable results, and callers must handle all of them.
#[derive(Debug)]
pub enum JobOutcome {
    /// The fetch completed and the artifact passed validation;
    /// artifact ownership transfers to the caller
    Success(JobSuccess),
    /// The job terminated without a deliverable artifact
    Failure(FailureReason),
}

impl JobOutcome {
    /// Whether this outcome is a success
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Success(_))
    }
}

/// The success half of a [`JobOutcome`]
#[derive(Debug)]
pub struct JobSuccess {
    /// The job that produced this artifact
    pub id: JobId,
    /// Classified source platform
    pub platform: Platform,
    /// The fetched artifact; deleting it is now the caller's responsibility
    /// (dropping the guard deletes the file)
    pub artifact: TempArtifact,
}

/// Owning guard for a temporary artifact
///
/// The artifact is deleted when the guard drops, on every exit path, unless
/// ownership is explicitly released with [`into_path`](TempArtifact::into_path).
/// This replaces cleanup-if-a-variable-happens-to-be-bound with explicit,
/// scoped ownership.
#[derive(Debug)]
pub struct TempArtifact {
    path: PathBuf,
    owned: bool,
}

impl TempArtifact {
    fn new(path: PathBuf) -> Self {
        Self { path, owned: true }
    }

    /// Location of the artifact on disk
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release ownership without deleting; the caller takes over cleanup
    pub fn into_path(mut self) -> PathBuf {
        self.owned = false;
        std::mem::take(&mut self.path)
    }

    /// Delete the artifact now instead of waiting for drop
    pub async fn delete(mut self) {
        self.owned = false;
        let path = std::mem::take(&mut self.path);
        if let Err(e) = tokio::fs::remove_file(&path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %path.display(), error = %e, "Failed to delete artifact");
            }
        }
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        if self.owned {
            // Synchronous best-effort removal; drop sites are not async
            if let Err(e) = std::fs::remove_file(&self.path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(
                        path = %self.path.display(),
                        error = %e,
                        "Failed to delete artifact on drop"
                    );
                }
            }
        }
    }
}

/// One fetch attempt, tracked from acceptance to its single terminal state
struct Job {
    id: JobId,
    url: Url,
    platform: Platform,
    user: UserId,
    status: JobStatus,
}

impl Job {
    fn new(url: Url, platform: Platform, user: UserId) -> Self {
        Self {
            id: JobId::new(),
            url,
            platform,
            user,
            status: JobStatus::Pending,
        }
    }

    /// Move to a new status; a terminal state may be set only once
    fn advance(&mut self, status: JobStatus) {
        debug_assert!(
            !self.status.is_terminal(),
            "job {} already terminal as {:?}, cannot become {:?}",
            self.id,
            self.status,
            status
        );
        self.status = status;
    }
}

/// Bounded, deadline-enforcing executor for external fetch jobs
/// (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct JobExecutor {
    /// Configuration (wrapped in Arc for sharing across tasks)
    config: Arc<Config>,
    /// Durable usage counters, updated exactly once per terminal job
    stats: Arc<StatsStore>,
    /// The opaque external fetch collaborator
    fetcher: Arc<dyn Fetcher>,
    /// Bounds concurrent fetches; acquisition order is FIFO
    worker_slots: Arc<Semaphore>,
    /// Event broadcast channel sender (multiple subscribers supported)
    event_tx: broadcast::Sender<Event>,
    /// Cleared during shutdown so new submissions are rejected
    accepting_new: Arc<AtomicBool>,
}

impl JobExecutor {
    /// Create a new executor
    ///
    /// Ensures the temp directory exists; fails only on unusable configuration.
    pub async fn new(
        config: Config,
        stats: Arc<StatsStore>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self> {
        if config.download.max_concurrent_fetches == 0 {
            return Err(Error::Config {
                message: "max_concurrent_fetches must be at least 1".to_string(),
                key: Some("max_concurrent_fetches".to_string()),
            });
        }

        tokio::fs::create_dir_all(config.temp_dir())
            .await
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create temp directory '{}': {}",
                        config.temp_dir().display(),
                        e
                    ),
                ))
            })?;

        let worker_slots = Arc::new(Semaphore::new(config.download.max_concurrent_fetches));
        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        tracing::info!(
            fetcher = fetcher.name(),
            max_concurrent = config.download.max_concurrent_fetches,
            timeout_ms = config.download.fetch_timeout_ms,
            size_limit = config.download.max_artifact_size_bytes,
            "Job executor initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            stats,
            fetcher,
            worker_slots,
            event_tx,
            accepting_new: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Subscribe to job lifecycle events
    ///
    /// Multiple subscribers are supported; each receives all events
    /// independently. With no subscribers, events are dropped.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Immutable copy of the current usage counters
    ///
    /// Never blocks on in-flight jobs; safe to call from a health endpoint.
    pub async fn stats_snapshot(&self) -> crate::types::StatsSnapshot {
        self.stats.snapshot().await
    }

    /// Zero all usage counters
    pub async fn reset_stats(&self) {
        self.stats.reset().await;
        self.emit_event(Event::StatsReset);
    }

    /// Stop accepting new jobs
    ///
    /// In-flight jobs run to their own deadlines; queued submissions waiting
    /// for a worker slot fail with a shutting-down outcome.
    pub fn shutdown(&self) {
        self.accepting_new.store(false, Ordering::SeqCst);
        self.worker_slots.close();
        self.emit_event(Event::Shutdown);
        tracing::info!("Executor shutting down, no longer accepting jobs");
    }

    /// Run one fetch job to a terminal outcome
    ///
    /// Validates the URL (rejecting without consuming a worker slot or
    /// touching stats), classifies the platform, then runs the blocking fetch
    /// on a pooled worker under the configured deadline. Suspends until the
    /// job is terminal; exactly one of success/failure is recorded in the
    /// stats store for every dispatched job.
    pub async fn submit(&self, url_text: &str, user: UserId) -> JobOutcome {
        if !self.accepting_new.load(Ordering::SeqCst) {
            return JobOutcome::Failure(FailureReason::ShuttingDown);
        }

        let url = match parse_request_url(url_text) {
            Some(url) => url,
            None => {
                tracing::debug!(input = url_text, user_id = %user, "Rejected invalid input");
                return JobOutcome::Failure(FailureReason::InvalidInput);
            }
        };

        let platform = Platform::classify(&url);
        let mut job = Job::new(url, platform, user);
        tracing::info!(
            job_id = %job.id,
            platform = %platform,
            user_id = %user,
            "Job accepted"
        );
        self.emit_event(Event::Accepted {
            id: job.id,
            platform,
            user_id: user,
        });

        // Blocks here if the pool is saturated; FIFO by semaphore fairness.
        // The deadline starts at dispatch, so queue wait does not eat into it.
        let permit = match Arc::clone(&self.worker_slots).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return JobOutcome::Failure(FailureReason::ShuttingDown),
        };

        let template = self
            .config
            .temp_dir()
            .join(format!("{}_{}", job.platform, job.id));
        let cancel = CancellationToken::new();

        let fetcher = Arc::clone(&self.fetcher);
        let fetch_url = job.url.clone();
        let fetch_template = template.clone();
        let fetch_cancel = cancel.clone();
        let mut worker =
            tokio::task::spawn_blocking(move || fetcher.fetch(&fetch_url, &fetch_template, &fetch_cancel));

        job.advance(JobStatus::Running);
        self.emit_event(Event::Fetching { id: job.id });

        match tokio::time::timeout(self.config.fetch_timeout(), &mut worker).await {
            Ok(join_result) => {
                drop(permit);
                self.finish_completed(&mut job, join_result, &template).await
            }
            Err(_elapsed) => {
                cancel.cancel();
                self.finish_timed_out(&mut job, worker, permit, template).await
            }
        }
    }

    /// Finalize a job whose worker finished before the deadline
    async fn finish_completed(
        &self,
        job: &mut Job,
        join_result: std::result::Result<
            std::result::Result<PathBuf, crate::error::FetchError>,
            tokio::task::JoinError,
        >,
        template: &Path,
    ) -> JobOutcome {
        match join_result {
            Ok(Ok(path)) => self.finish_fetched(job, path, template).await,
            Ok(Err(fetch_err)) => {
                tracing::warn!(
                    job_id = %job.id,
                    platform = %job.platform,
                    error = %fetch_err,
                    "Fetch failed"
                );
                self.fail(job, FailureReason::Fetch(fetch_err.to_string()), template)
                    .await
            }
            Err(join_err) => {
                // A panicking fetcher must not take the executor down with it
                tracing::error!(job_id = %job.id, error = %join_err, "Fetch worker panicked");
                self.fail(
                    job,
                    FailureReason::Fetch(format!("fetch worker panicked: {join_err}")),
                    template,
                )
                .await
            }
        }
    }

    /// Validate a fetched artifact and finalize success or a size/emptiness failure
    async fn finish_fetched(&self, job: &mut Job, path: PathBuf, template: &Path) -> JobOutcome {
        let artifact = TempArtifact::new(path);

        let size = match tokio::fs::metadata(artifact.path()).await {
            Ok(meta) => meta.len(),
            Err(e) => {
                tracing::warn!(
                    job_id = %job.id,
                    path = %artifact.path().display(),
                    error = %e,
                    "Fetcher reported an artifact that does not exist"
                );
                drop(artifact);
                return self
                    .fail(job, FailureReason::Fetch("artifact missing".to_string()), template)
                    .await;
            }
        };

        if size == 0 {
            tracing::warn!(job_id = %job.id, "Fetcher produced an empty artifact");
            artifact.delete().await;
            return self
                .fail(job, FailureReason::Fetch("artifact is empty".to_string()), template)
                .await;
        }

        let limit = self.config.download.max_artifact_size_bytes;
        if size > limit {
            tracing::warn!(
                job_id = %job.id,
                size_bytes = size,
                limit_bytes = limit,
                "Artifact exceeds size limit, discarding"
            );
            artifact.delete().await;
            return self
                .fail(
                    job,
                    FailureReason::SizeLimitExceeded {
                        size_bytes: size,
                        limit_bytes: limit,
                    },
                    template,
                )
                .await;
        }

        // Remove any sidecar droppings the fetcher left next to the artifact
        cleanup_template_files(template, Some(artifact.path())).await;

        job.advance(JobStatus::Succeeded);
        self.stats.record_success(job.user, job.platform).await;
        self.emit_event(Event::Succeeded {
            id: job.id,
            size_bytes: size,
        });
        tracing::info!(
            job_id = %job.id,
            platform = %job.platform,
            size_bytes = size,
            "Job succeeded"
        );

        JobOutcome::Success(JobSuccess {
            id: job.id,
            platform: job.platform,
            artifact,
        })
    }

    /// Finalize a failed job: cleanup, single stats update, event
    async fn fail(&self, job: &mut Job, reason: FailureReason, template: &Path) -> JobOutcome {
        cleanup_template_files(template, None).await;
        job.advance(JobStatus::Failed);
        self.stats.record_failure().await;
        self.emit_event(Event::Failed {
            id: job.id,
            error: reason.to_string(),
        });
        JobOutcome::Failure(reason)
    }

    /// Finalize a timed-out job and abandon its worker
    ///
    /// The job is terminal the moment the deadline fires; the still-running
    /// worker is handed to a detached reaper that keeps the pool slot until
    /// the blocking call actually returns, deletes whatever artifact it
    /// eventually produced, and never touches the stats store.
    async fn finish_timed_out(
        &self,
        job: &mut Job,
        worker: tokio::task::JoinHandle<std::result::Result<PathBuf, crate::error::FetchError>>,
        permit: tokio::sync::OwnedSemaphorePermit,
        template: PathBuf,
    ) -> JobOutcome {
        job.advance(JobStatus::TimedOut);
        self.stats.record_failure().await;
        self.emit_event(Event::TimedOut { id: job.id });
        // An expected outcome, not an error
        tracing::info!(
            job_id = %job.id,
            platform = %job.platform,
            timeout_ms = self.config.download.fetch_timeout_ms,
            "Job timed out, abandoning worker"
        );

        let job_id = job.id;
        tokio::spawn(async move {
            // The abandoned worker keeps consuming its pool slot until the
            // blocking call really exits
            let _permit = permit;
            match worker.await {
                Ok(Ok(late_path)) => {
                    tracing::debug!(
                        job_id = %job_id,
                        path = %late_path.display(),
                        "Abandoned fetch completed after timeout, discarding artifact"
                    );
                    if let Err(e) = tokio::fs::remove_file(&late_path).await {
                        if e.kind() != std::io::ErrorKind::NotFound {
                            tracing::warn!(
                                job_id = %job_id,
                                error = %e,
                                "Failed to delete late artifact"
                            );
                        }
                    }
                }
                Ok(Err(_)) | Err(_) => {}
            }
            cleanup_template_files(&template, None).await;
        });

        JobOutcome::Failure(FailureReason::Timeout)
    }

    /// Emit an event to all subscribers
    ///
    /// send() returns Err if there are no receivers, which is fine - the
    /// event is just dropped.
    fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }
}

/// Parse and validate a request URL; only absolute http/https URLs qualify
fn parse_request_url(text: &str) -> Option<Url> {
    let url = Url::parse(text.trim()).ok()?;
    match url.scheme() {
        "http" | "https" => Some(url),
        _ => None,
    }
}

/// Delete every file derived from a job's output template, except `keep`
///
/// The template file name embeds the job's UUID, so the prefix scan can only
/// ever match this job's own files.
async fn cleanup_template_files(template: &Path, keep: Option<&Path>) {
    let Some(dir) = template.parent() else { return };
    let Some(stem) = template.file_name().and_then(|n| n.to_str()) else {
        return;
    };

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(_) => return,
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !name.starts_with(stem) {
            continue;
        }
        let path = entry.path();
        if keep.is_some_and(|k| k == path) {
            continue;
        }
        if let Err(e) = tokio::fs::remove_file(&path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %path.display(), error = %e, "Failed to clean up temp file");
            }
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Test fetcher that writes `size_bytes` to `<template>.mp4` after
    /// sleeping `delay`, counting invocations. Ignores cancellation, like an
    /// uninterruptible external call.
    struct FileFetcher {
        size_bytes: usize,
        delay: Duration,
        calls: Arc<AtomicUsize>,
    }

    impl FileFetcher {
        fn instant(size_bytes: usize) -> (Self, Arc<AtomicUsize>) {
            Self::delayed(size_bytes, Duration::ZERO)
        }

        fn delayed(size_bytes: usize, delay: Duration) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    size_bytes,
                    delay,
                    calls: Arc::clone(&calls),
                },
                calls,
            )
        }
    }

    impl Fetcher for FileFetcher {
        fn fetch(
            &self,
            _url: &Url,
            output_template: &Path,
            _cancel: &CancellationToken,
        ) -> std::result::Result<PathBuf, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                std::thread::sleep(self.delay);
            }
            let path = output_template.with_extension("mp4");
            std::fs::write(&path, vec![0u8; self.size_bytes])
                .map_err(|e| FetchError::Launch(e.to_string()))?;
            Ok(path)
        }

        fn name(&self) -> &'static str {
            "test-file-fetcher"
        }
    }

    /// Test fetcher that always fails
    struct FailFetcher;

    impl Fetcher for FailFetcher {
        fn fetch(
            &self,
            _url: &Url,
            _output_template: &Path,
            _cancel: &CancellationToken,
        ) -> std::result::Result<PathBuf, FetchError> {
            Err(FetchError::Failed {
                code: Some(1),
                detail: "simulated failure".to_string(),
            })
        }
    }

    /// Test fetcher that panics, simulating a buggy external library
    struct PanicFetcher;

    impl Fetcher for PanicFetcher {
        fn fetch(
            &self,
            _url: &Url,
            _output_template: &Path,
            _cancel: &CancellationToken,
        ) -> std::result::Result<PathBuf, FetchError> {
            panic!("fetcher exploded");
        }
    }

    struct TestEnv {
        executor: JobExecutor,
        temp_dir: PathBuf,
        _dir: TempDir,
    }

    async fn env_with(fetcher: Arc<dyn Fetcher>, tweak: impl FnOnce(&mut Config)) -> TestEnv {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.download.temp_dir = dir.path().join("tmp");
        config.persistence.stats_path = dir.path().join("stats.json");
        tweak(&mut config);
        let temp_dir = config.download.temp_dir.clone();
        let stats = Arc::new(StatsStore::load(config.stats_path().clone()).await);
        let executor = JobExecutor::new(config, stats, fetcher).await.unwrap();
        TestEnv {
            executor,
            temp_dir,
            _dir: dir,
        }
    }

    fn temp_file_count(dir: &Path) -> usize {
        std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
    }

    /// Poll until the temp dir is empty or the deadline passes
    async fn wait_for_empty_temp(dir: &Path, deadline: Duration) -> bool {
        let start = std::time::Instant::now();
        while start.elapsed() < deadline {
            if temp_file_count(dir) == 0 {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        temp_file_count(dir) == 0
    }

    #[tokio::test]
    async fn invalid_input_is_rejected_without_dispatch_or_stats() {
        let (fetcher, calls) = FileFetcher::instant(10);
        let env = env_with(Arc::new(fetcher), |_| {}).await;

        let outcome = env.executor.submit("not-a-url", UserId::new(1)).await;
        assert!(matches!(
            outcome,
            JobOutcome::Failure(FailureReason::InvalidInput)
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0, "no worker may be dispatched");
        assert!(
            env.executor.stats_snapshot().await.is_zeroed(),
            "invalid input must not mutate stats"
        );
    }

    #[tokio::test]
    async fn non_http_scheme_is_invalid_input() {
        let (fetcher, calls) = FileFetcher::instant(10);
        let env = env_with(Arc::new(fetcher), |_| {}).await;

        let outcome = env
            .executor
            .submit("ftp://example.com/file", UserId::new(1))
            .await;
        assert!(matches!(
            outcome,
            JobOutcome::Failure(FailureReason::InvalidInput)
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn youtube_success_updates_all_buckets_and_transfers_artifact() {
        let (fetcher, _) = FileFetcher::instant(10 * 1024 * 1024);
        let env = env_with(Arc::new(fetcher), |_| {}).await;

        let outcome = env
            .executor
            .submit("https://youtu.be/abc", UserId::new(1))
            .await;

        let success = match outcome {
            JobOutcome::Success(s) => s,
            other => panic!("expected success, got {other:?}"),
        };
        assert_eq!(success.platform, Platform::Youtube);
        let meta = std::fs::metadata(success.artifact.path()).unwrap();
        assert_eq!(meta.len(), 10 * 1024 * 1024, "artifact must exist and be non-empty");

        let snap = env.executor.stats_snapshot().await;
        assert_eq!(snap.total_downloads, 1);
        assert_eq!(snap.failed_downloads, 0);
        assert_eq!(snap.platforms.get(&Platform::Youtube), Some(&1));
        assert_eq!(snap.users.get("1"), Some(&1));

        // Ownership transferred: dropping the guard deletes the artifact
        let path = success.artifact.path().to_path_buf();
        drop(success);
        assert!(!path.exists(), "dropping the success artifact must delete it");
        assert_eq!(temp_file_count(&env.temp_dir), 0);
    }

    #[tokio::test]
    async fn fetch_error_records_one_failure_and_leaves_no_files() {
        let env = env_with(Arc::new(FailFetcher), |_| {}).await;

        let outcome = env
            .executor
            .submit("https://example.com/video", UserId::new(2))
            .await;
        match outcome {
            JobOutcome::Failure(FailureReason::Fetch(detail)) => {
                assert!(detail.contains("simulated failure"), "cause preserved: {detail}");
            }
            other => panic!("expected fetch failure, got {other:?}"),
        }

        let snap = env.executor.stats_snapshot().await;
        assert_eq!(snap.failed_downloads, 1);
        assert_eq!(snap.total_downloads, 0);
        assert_eq!(temp_file_count(&env.temp_dir), 0);
    }

    #[tokio::test]
    async fn panicking_fetcher_becomes_a_failure_not_a_crash() {
        let env = env_with(Arc::new(PanicFetcher), |_| {}).await;

        let outcome = env
            .executor
            .submit("https://example.com/video", UserId::new(2))
            .await;
        assert!(matches!(
            outcome,
            JobOutcome::Failure(FailureReason::Fetch(_))
        ));
        assert_eq!(env.executor.stats_snapshot().await.failed_downloads, 1);

        // The pool must still work after a worker panic
        let outcome = env
            .executor
            .submit("https://example.com/other", UserId::new(2))
            .await;
        assert!(matches!(outcome, JobOutcome::Failure(_)));
        assert_eq!(env.executor.stats_snapshot().await.failed_downloads, 2);
    }

    #[tokio::test]
    async fn oversized_artifact_is_discarded_and_reported_distinctly() {
        let (fetcher, _) = FileFetcher::instant(2048);
        let env = env_with(Arc::new(fetcher), |c| {
            c.download.max_artifact_size_bytes = 1024;
        })
        .await;

        let outcome = env
            .executor
            .submit("https://www.tiktok.com/@u/video/1", UserId::new(3))
            .await;
        match outcome {
            JobOutcome::Failure(FailureReason::SizeLimitExceeded {
                size_bytes,
                limit_bytes,
            }) => {
                assert_eq!(size_bytes, 2048);
                assert_eq!(limit_bytes, 1024);
            }
            other => panic!("expected size limit violation, got {other:?}"),
        }

        let snap = env.executor.stats_snapshot().await;
        assert_eq!(snap.failed_downloads, 1);
        assert_eq!(snap.total_downloads, 0, "a size violation is never a success");
        assert_eq!(
            temp_file_count(&env.temp_dir),
            0,
            "oversized artifact must not remain on disk"
        );
    }

    #[tokio::test]
    async fn empty_artifact_is_a_fetch_failure() {
        let (fetcher, _) = FileFetcher::instant(0);
        let env = env_with(Arc::new(fetcher), |_| {}).await;

        let outcome = env
            .executor
            .submit("https://example.com/video", UserId::new(1))
            .await;
        assert!(matches!(
            outcome,
            JobOutcome::Failure(FailureReason::Fetch(_))
        ));
        assert_eq!(temp_file_count(&env.temp_dir), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn slow_fetch_times_out_within_slack_and_reaper_cleans_up() {
        let (fetcher, _) = FileFetcher::delayed(64, Duration::from_millis(400));
        let env = env_with(Arc::new(fetcher), |c| {
            c.download.fetch_timeout_ms = 100;
        })
        .await;

        let started = std::time::Instant::now();
        let outcome = env
            .executor
            .submit("https://youtu.be/slow", UserId::new(4))
            .await;
        let elapsed = started.elapsed();

        assert!(matches!(
            outcome,
            JobOutcome::Failure(FailureReason::Timeout)
        ));
        assert!(
            elapsed < Duration::from_millis(1000),
            "timeout must fire near the deadline, not wait out the fetch ({elapsed:?})"
        );

        let snap = env.executor.stats_snapshot().await;
        assert_eq!(snap.failed_downloads, 1);
        assert_eq!(snap.total_downloads, 0);

        // The abandoned worker finishes ~300ms later and writes its file;
        // the reaper must delete it without touching the stats again
        assert!(
            wait_for_empty_temp(&env.temp_dir, Duration::from_secs(3)).await,
            "late artifact from the abandoned fetch must be reaped"
        );
        let snap = env.executor.stats_snapshot().await;
        assert_eq!(
            snap.failed_downloads, 1,
            "the abandoned completion must not be double-counted"
        );
        assert_eq!(snap.total_downloads, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_submissions_beyond_pool_size_keep_counters_consistent() {
        let (fetcher, calls) = FileFetcher::delayed(128, Duration::from_millis(30));
        let env = env_with(Arc::new(fetcher), |c| {
            c.download.max_concurrent_fetches = 2;
        })
        .await;

        let mut handles = Vec::new();
        for i in 0..6_i64 {
            let executor = env.executor.clone();
            handles.push(tokio::spawn(async move {
                // Distinct URLs; two of them invalid
                let url = if i % 3 == 2 {
                    format!("not a url {i}")
                } else {
                    format!("https://youtu.be/video{i}")
                };
                executor.submit(&url, UserId::new(i)).await
            }));
        }

        let mut successes = 0;
        let mut invalid = 0;
        for handle in handles {
            match handle.await.unwrap() {
                JobOutcome::Success(s) => {
                    successes += 1;
                    s.artifact.delete().await;
                }
                JobOutcome::Failure(FailureReason::InvalidInput) => invalid += 1,
                other => panic!("unexpected outcome {other:?}"),
            }
        }
        assert_eq!(successes, 4);
        assert_eq!(invalid, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 4, "invalid inputs never dispatch");

        let snap = env.executor.stats_snapshot().await;
        assert_eq!(snap.total_downloads, 4);
        assert_eq!(snap.failed_downloads, 0);
        let platform_sum: u64 = snap.platforms.values().sum();
        assert_eq!(platform_sum, 4, "platform buckets must sum to the successes");
        assert_eq!(temp_file_count(&env.temp_dir), 0);
    }

    #[tokio::test]
    async fn submit_after_shutdown_is_rejected_without_stats() {
        let (fetcher, calls) = FileFetcher::instant(10);
        let env = env_with(Arc::new(fetcher), |_| {}).await;

        env.executor.shutdown();
        let outcome = env
            .executor
            .submit("https://youtu.be/abc", UserId::new(1))
            .await;
        assert!(matches!(
            outcome,
            JobOutcome::Failure(FailureReason::ShuttingDown)
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(env.executor.stats_snapshot().await.is_zeroed());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn shutdown_fails_submissions_queued_for_a_worker_slot() {
        let (fetcher, calls) = FileFetcher::delayed(64, Duration::from_millis(300));
        let env = env_with(Arc::new(fetcher), |c| {
            c.download.max_concurrent_fetches = 1;
        })
        .await;

        let executor = env.executor.clone();
        let running = tokio::spawn(async move {
            executor.submit("https://youtu.be/first", UserId::new(1)).await
        });
        // Let the first job claim the only worker slot
        tokio::time::sleep(Duration::from_millis(50)).await;

        let executor = env.executor.clone();
        let queued = tokio::spawn(async move {
            executor.submit("https://youtu.be/second", UserId::new(2)).await
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        env.executor.shutdown();

        // The parked submission fails without ever dispatching a worker
        assert!(matches!(
            queued.await.unwrap(),
            JobOutcome::Failure(FailureReason::ShuttingDown)
        ));

        // The in-flight job runs to its own terminal outcome
        match running.await.unwrap() {
            JobOutcome::Success(s) => s.artifact.delete().await,
            other => panic!("expected the in-flight job to finish, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1, "the queued job never dispatches");

        let snap = env.executor.stats_snapshot().await;
        assert_eq!(snap.total_downloads, 1);
        assert_eq!(
            snap.failed_downloads, 0,
            "an undispatched rejection must not count as a failure"
        );
    }

    #[tokio::test]
    async fn lifecycle_events_are_broadcast_in_order() {
        let (fetcher, _) = FileFetcher::instant(10);
        let env = env_with(Arc::new(fetcher), |_| {}).await;
        let mut events = env.executor.subscribe();

        let outcome = env
            .executor
            .submit("https://youtu.be/abc", UserId::new(1))
            .await;
        assert!(outcome.is_success());

        match events.recv().await.unwrap() {
            Event::Accepted { platform, user_id, .. } => {
                assert_eq!(platform, Platform::Youtube);
                assert_eq!(user_id, UserId::new(1));
            }
            other => panic!("expected Accepted first, got {other:?}"),
        }
        assert!(matches!(events.recv().await.unwrap(), Event::Fetching { .. }));
        match events.recv().await.unwrap() {
            Event::Succeeded { size_bytes, .. } => assert_eq!(size_bytes, 10),
            other => panic!("expected Succeeded, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn into_path_releases_ownership() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("artifact.mp4");
        std::fs::write(&file, b"data").unwrap();

        let guard = TempArtifact::new(file.clone());
        let released = guard.into_path();
        assert_eq!(released, file);
        assert!(file.exists(), "into_path must not delete the file");

        let guard = TempArtifact::new(file.clone());
        drop(guard);
        assert!(!file.exists(), "dropping an owned guard must delete the file");
    }
}
