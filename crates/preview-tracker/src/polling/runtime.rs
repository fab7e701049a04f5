//! Background supervisor that polls active jobs.
//!
//! The supervisor is a single tokio task. It watches the store and keeps one
//! interval alive exactly while some job is active. Each tick computes the due
//! set and spawns one status check per due job; an in-flight set shared
//! through the ownership registry keeps a job from being checked twice at once.
//! Unmounting aborts the supervisor and every check it spawned.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use super::backoff::backoff;
use super::classify::{classify, StatusOutcome};
use super::client::StatusClient;
use super::lease::{OwnershipLease, OwnershipRegistry};
use crate::config::TrackerConfig;
use crate::diagnostics::Diagnostics;
use crate::error::StatusCheckError;
use crate::job::{ErrorCode, JobPatch, JobPhase, NextPoll, Patch, TerminalPhase};
use crate::store::{JobSnapshot, JobStore, DEFAULT_POLL_INTERVAL_MS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeOptions {
    pub poll_interval: Duration,
    pub max_backoff: Duration,
    /// Consecutive transport failures tolerated before a job fails.
    pub max_retries: u32,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::milliseconds(DEFAULT_POLL_INTERVAL_MS as i64),
            max_backoff: Duration::seconds(60),
            max_retries: 4,
        }
    }
}

impl RuntimeOptions {
    pub fn from_config(config: &TrackerConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            max_backoff: config.max_backoff(),
            max_retries: config.max_retries,
        }
    }
}

/// Removes its id from the in-flight set when the check resolves.
struct InFlightGuard {
    in_flight: Arc<Mutex<HashSet<String>>>,
    preview_id: String,
}

fn lock_or_recover<'a, T>(mutex: &'a Mutex<T>, name: &str) -> MutexGuard<'a, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::warn!("{} lock was poisoned, recovering", name);
            poisoned.into_inner()
        }
    }
}

fn lock_in_flight(set: &Mutex<HashSet<String>>) -> MutexGuard<'_, HashSet<String>> {
    lock_or_recover(set, "In-flight set")
}

impl InFlightGuard {
    fn claim(in_flight: &Arc<Mutex<HashSet<String>>>, preview_id: &str) -> Option<Self> {
        if !lock_in_flight(in_flight).insert(preview_id.to_string()) {
            return None;
        }
        Some(Self {
            in_flight: Arc::clone(in_flight),
            preview_id: preview_id.to_string(),
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        lock_in_flight(&self.in_flight).remove(&self.preview_id);
    }
}

struct Poller {
    store: Arc<JobStore>,
    client: Arc<dyn StatusClient>,
    options: RuntimeOptions,
    in_flight: Arc<Mutex<HashSet<String>>>,
    checks: Mutex<Vec<JoinHandle<()>>>,
    stopped: AtomicBool,
    intervals_created: Arc<AtomicUsize>,
}

impl Poller {
    /// One pass over the current snapshot.
    fn run_pass(self: &Arc<Self>) {
        let now = self.store.now();
        let snapshot = self.store.snapshot();

        for job in snapshot.jobs().iter().filter(|j| j.is_active()) {
            if job.is_past_expiry(now) {
                log::info!("Preview '{}' expired before completing", job.preview_id);
                self.store.mark_terminal(
                    &job.preview_id,
                    TerminalPhase::Expired,
                    JobPatch {
                        error: Patch::Set("Preview has expired".to_string()),
                        error_code: Patch::Set(ErrorCode::PreviewExpired.as_str().to_string()),
                        ..Default::default()
                    },
                );
                continue;
            }
            if !job.next_poll_at.is_due(now) {
                continue;
            }
            let Some(guard) = InFlightGuard::claim(&self.in_flight, &job.preview_id) else {
                log::debug!("Preview '{}' is already being checked", job.preview_id);
                continue;
            };

            let poller = Arc::clone(self);
            let preview_id = job.preview_id.clone();
            let status_token = job.status_token.clone();
            let handle = tokio::spawn(async move {
                let _guard = guard;
                poller.check_job(&preview_id, &status_token).await;
            });
            self.track_check(handle);
        }
    }

    fn track_check(&self, handle: JoinHandle<()>) {
        let mut checks = lock_or_recover(&self.checks, "Status check list");
        if self.stopped.load(Ordering::SeqCst) {
            handle.abort();
            return;
        }
        checks.retain(|check| !check.is_finished());
        checks.push(handle);
    }

    /// Cancels every outstanding check. Their in-flight entries are released
    /// as the aborted tasks drop.
    fn abort_checks(&self) {
        let mut checks = lock_or_recover(&self.checks, "Status check list");
        self.stopped.store(true, Ordering::SeqCst);
        for check in checks.drain(..) {
            check.abort();
        }
    }

    async fn check_job(&self, preview_id: &str, status_token: &str) {
        match self.client.check(preview_id, status_token).await {
            Ok(reply) => self.apply(preview_id, classify(&reply)),
            Err(e) => self.record_failure(preview_id, e),
        }
    }

    fn apply(&self, preview_id: &str, outcome: StatusOutcome) {
        let next_poll = NextPoll::after(self.store.now(), self.options.poll_interval);
        match outcome {
            StatusOutcome::Ready { preview_url } => {
                log::info!("Preview '{}' is ready", preview_id);
                let patch = JobPatch {
                    preview_url: preview_url.map(Patch::Set).unwrap_or_default(),
                    ..Default::default()
                };
                self.store
                    .mark_terminal(preview_id, TerminalPhase::Ready, patch.clearing_errors());
            }
            StatusOutcome::Failed {
                phase,
                error,
                error_code,
                error_stage,
            } => {
                log::warn!(
                    "Preview '{}' ended as {} ({})",
                    preview_id,
                    JobPhase::from(phase),
                    error_code.as_deref().unwrap_or("no code")
                );
                let patch = JobPatch {
                    error: error.into(),
                    error_code: error_code.into(),
                    error_stage: error_stage.into(),
                    ..Default::default()
                };
                self.store.mark_terminal(preview_id, phase, patch);
            }
            StatusOutcome::Transient => {
                log::debug!("Status service busy for '{}', will retry", preview_id);
                let patch = JobPatch {
                    status: Some(JobPhase::Processing),
                    retry_count: Some(0),
                    next_poll_at: Some(next_poll),
                    ..Default::default()
                };
                self.store.patch_job(preview_id, patch.clearing_errors());
            }
            StatusOutcome::InProgress {
                status,
                stage,
                preview_url,
            } => {
                let patch = JobPatch {
                    status: Some(status),
                    stage: stage.map(Patch::Set).unwrap_or_default(),
                    preview_url: preview_url.map(Patch::Set).unwrap_or_default(),
                    retry_count: Some(0),
                    next_poll_at: Some(next_poll),
                    ..Default::default()
                };
                self.store.patch_job(preview_id, patch);
            }
        }
    }

    fn record_failure(&self, preview_id: &str, error: StatusCheckError) {
        let Some(job) = self.store.get(preview_id) else {
            return;
        };
        if job.is_terminal() {
            return;
        }

        let attempts = job.retry_count.saturating_add(1);
        if attempts > self.options.max_retries {
            log::warn!(
                "Giving up on preview '{}' after {} failed checks: {}",
                preview_id,
                job.retry_count,
                error
            );
            self.store.mark_terminal(
                preview_id,
                TerminalPhase::Failed,
                JobPatch {
                    error: Patch::Set(error.to_string()),
                    error_code: Patch::Set(ErrorCode::UnknownError.as_str().to_string()),
                    ..Default::default()
                },
            );
            return;
        }

        let delay = backoff(attempts, self.options.poll_interval, self.options.max_backoff);
        log::debug!(
            "Status check {} for '{}' failed, retrying in {}ms: {}",
            attempts,
            preview_id,
            delay.num_milliseconds(),
            error
        );
        self.store.set_retry(
            preview_id,
            attempts,
            NextPoll::after(self.store.now(), delay),
        );
    }

    fn new_interval(&self) -> Interval {
        let period = self
            .options
            .poll_interval
            .to_std()
            .unwrap_or(std::time::Duration::from_millis(DEFAULT_POLL_INTERVAL_MS));
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.intervals_created.fetch_add(1, Ordering::SeqCst);
        interval
    }

    async fn supervise(self: Arc<Self>, mut changes: watch::Receiver<Arc<JobSnapshot>>) {
        let mut ticker: Option<Interval> = None;
        loop {
            let has_active = changes.borrow_and_update().has_active();
            match (has_active, ticker.is_some()) {
                (true, false) => {
                    log::debug!("Active preview jobs present, starting status polling");
                    ticker = Some(self.new_interval());
                    self.run_pass();
                }
                (false, true) => {
                    log::debug!("No active preview jobs, stopping status polling");
                    ticker = None;
                }
                _ => {}
            }

            tokio::select! {
                changed = changes.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = next_tick(&mut ticker) => self.run_pass(),
            }
        }
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

pub struct PollingRuntime;

impl PollingRuntime {
    /// Starts polling if `registry` is free. A second mount while another
    /// runtime owns the registry reports one warning and stays idle.
    ///
    /// Must be called from within a tokio runtime.
    pub fn mount(
        store: Arc<JobStore>,
        client: Arc<dyn StatusClient>,
        registry: &OwnershipRegistry,
        options: RuntimeOptions,
        diagnostics: Arc<dyn Diagnostics>,
    ) -> MountedRuntime {
        let intervals_created = Arc::new(AtomicUsize::new(0));
        let Some(lease) = registry.acquire() else {
            diagnostics.warn(
                "Another polling runtime already owns status checks; this instance will stay idle",
            );
            return MountedRuntime {
                lease: None,
                poller: None,
                task: None,
                intervals_created,
            };
        };

        let changes = store.watch();
        let poller = Arc::new(Poller {
            store,
            client,
            options,
            in_flight: registry.in_flight(),
            checks: Mutex::new(Vec::new()),
            stopped: AtomicBool::new(false),
            intervals_created: Arc::clone(&intervals_created),
        });
        log::info!("Polling runtime mounted (lease {})", lease.id());
        let task = tokio::spawn(Arc::clone(&poller).supervise(changes));

        MountedRuntime {
            lease: Some(lease),
            poller: Some(poller),
            task: Some(task),
            intervals_created,
        }
    }
}

/// Handle to a mounted runtime. Dropping it unmounts.
pub struct MountedRuntime {
    lease: Option<OwnershipLease>,
    poller: Option<Arc<Poller>>,
    task: Option<JoinHandle<()>>,
    intervals_created: Arc<AtomicUsize>,
}

impl MountedRuntime {
    pub fn is_owner(&self) -> bool {
        self.lease.is_some()
    }

    /// Number of polling intervals this instance has created.
    pub fn intervals_created(&self) -> usize {
        self.intervals_created.load(Ordering::SeqCst)
    }

    pub fn unmount(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if let Some(poller) = self.poller.take() {
            poller.abort_checks();
        }
        if let Some(lease) = self.lease.take() {
            log::info!("Polling runtime unmounted (lease {})", lease.id());
        }
    }
}

impl Drop for MountedRuntime {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Clock;
    use crate::diagnostics::RecordingDiagnostics;
    use crate::job::{JobInput, PipelineStage};
    use crate::polling::client::StatusReply;
    use crate::storage::MemoryStorage;
    use crate::store::{MigrationState, StoreOptions};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use serde_json::json;
    use std::collections::VecDeque;

    /// Wall clock that follows tokio's (paused) time.
    struct TokioClock {
        wall_start: DateTime<Utc>,
        start: Instant,
    }

    impl TokioClock {
        fn new() -> Self {
            Self {
                wall_start: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
                start: Instant::now(),
            }
        }
    }

    impl Clock for TokioClock {
        fn now(&self) -> DateTime<Utc> {
            let elapsed = Instant::now() - self.start;
            self.wall_start + Duration::from_std(elapsed).unwrap()
        }
    }

    type Scripted = Result<StatusReply, String>;

    #[derive(Default)]
    struct ScriptedClient {
        replies: Mutex<VecDeque<Scripted>>,
        calls: AtomicUsize,
    }

    impl ScriptedClient {
        fn with(replies: Vec<Scripted>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl StatusClient for ScriptedClient {
        async fn check(
            &self,
            preview_id: &str,
            _status_token: &str,
        ) -> Result<StatusReply, StatusCheckError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.replies.lock().unwrap().pop_front();
            match next {
                Some(Ok(reply)) => Ok(reply),
                Some(Err(reason)) => Err(StatusCheckError::Unavailable {
                    preview_id: preview_id.to_string(),
                    reason,
                }),
                None => Err(StatusCheckError::Unavailable {
                    preview_id: preview_id.to_string(),
                    reason: "connection refused".to_string(),
                }),
            }
        }
    }

    /// Answers `ready` after a fixed delay and records overlapping calls.
    struct SlowClient {
        delay: std::time::Duration,
        calls: AtomicUsize,
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    struct ActiveCall<'a>(&'a AtomicUsize);

    impl Drop for ActiveCall<'_> {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl SlowClient {
        fn new(delay: std::time::Duration) -> Arc<Self> {
            Arc::new(Self {
                delay,
                calls: AtomicUsize::new(0),
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn max_active(&self) -> usize {
            self.max_active.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl StatusClient for SlowClient {
        async fn check(
            &self,
            _preview_id: &str,
            _status_token: &str,
        ) -> Result<StatusReply, StatusCheckError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(active, Ordering::SeqCst);
            let _call = ActiveCall(&self.active);
            tokio::time::sleep(self.delay).await;
            Ok(StatusReply::new(
                200,
                Some(json!({"status": "ready", "previewUrl": "https://cdn.example/slow"})),
            ))
        }
    }

    fn store() -> Arc<JobStore> {
        let options = StoreOptions::default().with_clock(Arc::new(TokioClock::new()));
        Arc::new(JobStore::new(
            Arc::new(MemoryStorage::new()),
            options,
            MigrationState::Migrated,
        ))
    }

    fn due_job(store: &JobStore, id: &str) {
        let mut input = JobInput::new(id, "tok", JobPhase::Pending).with_request(
            "https://example.com/a",
            "en",
            "fr",
            None,
        );
        input.next_poll_at = Some(NextPoll::At(store.now()));
        store.upsert_job(input);
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    fn ok(body: serde_json::Value) -> Scripted {
        Ok(StatusReply::new(200, Some(body)))
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_mount_stays_idle() {
        let store = store();
        due_job(&store, "p-1");
        let registry = OwnershipRegistry::new();
        let diagnostics = Arc::new(RecordingDiagnostics::new());
        let client = ScriptedClient::with(vec![]);

        let first = PollingRuntime::mount(
            store.clone(),
            client.clone(),
            &registry,
            RuntimeOptions::default(),
            diagnostics.clone(),
        );
        let second = PollingRuntime::mount(
            store.clone(),
            client.clone(),
            &registry,
            RuntimeOptions::default(),
            diagnostics.clone(),
        );
        settle().await;

        assert!(first.is_owner());
        assert!(!second.is_owner());
        assert_eq!(first.intervals_created() + second.intervals_created(), 1);
        assert_eq!(diagnostics.warning_count(), 1);

        first.unmount();
        drop(second);
        assert!(!registry.is_held());

        let again = PollingRuntime::mount(
            store.clone(),
            client,
            &registry,
            RuntimeOptions::default(),
            diagnostics.clone(),
        );
        settle().await;
        assert!(again.is_owner());
        assert_eq!(again.intervals_created(), 1);
        assert_eq!(diagnostics.warning_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_interval_without_active_jobs() {
        let store = store();
        let registry = OwnershipRegistry::new();
        let client = ScriptedClient::with(vec![]);
        let runtime = PollingRuntime::mount(
            store.clone(),
            client.clone(),
            &registry,
            RuntimeOptions::default(),
            Arc::new(RecordingDiagnostics::new()),
        );
        tokio::time::sleep(std::time::Duration::from_secs(30)).await;
        assert_eq!(runtime.intervals_created(), 0);
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_progresses_to_ready() {
        let store = store();
        due_job(&store, "p-1");
        let client = ScriptedClient::with(vec![
            ok(json!({"status": "processing", "stage": "translating"})),
            ok(json!({"status": "ready", "previewUrl": "https://cdn.example/p-1"})),
        ]);
        let registry = OwnershipRegistry::new();
        let runtime = PollingRuntime::mount(
            store.clone(),
            client.clone(),
            &registry,
            RuntimeOptions::default(),
            Arc::new(RecordingDiagnostics::new()),
        );

        settle().await;
        let job = store.get("p-1").unwrap();
        assert_eq!(job.status, JobPhase::Processing);
        assert_eq!(job.stage, Some(PipelineStage::Translating));

        tokio::time::sleep(std::time::Duration::from_secs(10)).await;
        let job = store.get("p-1").unwrap();
        assert_eq!(job.status, JobPhase::Ready);
        assert_eq!(job.preview_url.as_deref(), Some("https://cdn.example/p-1"));
        assert_eq!(client.calls(), 2);

        // Nothing active: the interval is gone and no more checks happen.
        tokio::time::sleep(std::time::Duration::from_secs(30)).await;
        assert_eq!(client.calls(), 2);
        assert_eq!(runtime.intervals_created(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failures_back_off_then_fail() {
        let store = store();
        due_job(&store, "p-1");
        let client = ScriptedClient::with(vec![]);
        let registry = OwnershipRegistry::new();
        let _runtime = PollingRuntime::mount(
            store.clone(),
            client.clone(),
            &registry,
            RuntimeOptions::default(),
            Arc::new(RecordingDiagnostics::new()),
        );

        settle().await;
        let job = store.get("p-1").unwrap();
        assert_eq!(job.retry_count, 1);
        assert_eq!(
            job.next_poll_at,
            NextPoll::At(store.now() + Duration::milliseconds(6000))
        );

        tokio::time::sleep(std::time::Duration::from_secs(200)).await;
        let job = store.get("p-1").unwrap();
        assert_eq!(job.status, JobPhase::Failed);
        assert_eq!(job.error_code.as_deref(), Some("unknown_error"));
        assert_eq!(client.calls(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_retry_count() {
        let store = store();
        due_job(&store, "p-1");
        let client = ScriptedClient::with(vec![
            Err("reset".to_string()),
            Ok(StatusReply::new(503, None)),
        ]);
        let registry = OwnershipRegistry::new();
        let _runtime = PollingRuntime::mount(
            store.clone(),
            client.clone(),
            &registry,
            RuntimeOptions::default(),
            Arc::new(RecordingDiagnostics::new()),
        );

        settle().await;
        assert_eq!(store.get("p-1").unwrap().retry_count, 1);

        tokio::time::sleep(std::time::Duration::from_millis(6500)).await;
        let job = store.get("p-1").unwrap();
        assert_eq!(client.calls(), 2);
        assert_eq!(job.retry_count, 0);
        assert_eq!(job.status, JobPhase::Processing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_job_is_closed_without_fetch() {
        let store = store();
        let mut input = JobInput::new("p-1", "tok", JobPhase::Processing);
        input.expires_at = Some(store.now() - Duration::seconds(1));
        input.next_poll_at = Some(NextPoll::At(store.now()));
        store.upsert_job(input);

        let client = ScriptedClient::with(vec![]);
        let registry = OwnershipRegistry::new();
        let _runtime = PollingRuntime::mount(
            store.clone(),
            client.clone(),
            &registry,
            RuntimeOptions::default(),
            Arc::new(RecordingDiagnostics::new()),
        );
        settle().await;

        let job = store.get("p-1").unwrap();
        assert_eq!(job.status, JobPhase::Expired);
        assert_eq!(job.error_code.as_deref(), Some("preview_expired"));
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_check_is_skipped_on_later_ticks() {
        let store = store();
        due_job(&store, "p-1");
        let client = SlowClient::new(std::time::Duration::from_secs(10));
        let registry = OwnershipRegistry::new();
        let _runtime = PollingRuntime::mount(
            store.clone(),
            client.clone(),
            &registry,
            RuntimeOptions::default(),
            Arc::new(RecordingDiagnostics::new()),
        );

        // Ticks at 3s, 6s and 9s find the job still due but already in flight.
        tokio::time::sleep(std::time::Duration::from_millis(9500)).await;
        assert_eq!(client.calls(), 1);
        assert!(store.get("p-1").unwrap().is_active());

        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        assert_eq!(store.get("p-1").unwrap().status, JobPhase::Ready);
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remount_does_not_overlap_pending_check() {
        let store = store();
        due_job(&store, "p-1");
        let client = SlowClient::new(std::time::Duration::from_secs(10));
        let registry = OwnershipRegistry::new();
        let diagnostics = Arc::new(RecordingDiagnostics::new());

        let first = PollingRuntime::mount(
            store.clone(),
            client.clone(),
            &registry,
            RuntimeOptions::default(),
            diagnostics.clone(),
        );
        settle().await;
        assert_eq!(client.calls(), 1);

        first.unmount();
        let second = PollingRuntime::mount(
            store.clone(),
            client.clone(),
            &registry,
            RuntimeOptions::default(),
            diagnostics.clone(),
        );
        assert!(second.is_owner());
        settle().await;

        tokio::time::sleep(std::time::Duration::from_secs(30)).await;
        assert_eq!(client.max_active(), 1);
        assert_eq!(client.calls(), 2);
        assert_eq!(store.get("p-1").unwrap().status, JobPhase::Ready);
        assert_eq!(diagnostics.warning_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmount_stops_pending_check_from_writing() {
        let store = store();
        due_job(&store, "p-1");
        let client = SlowClient::new(std::time::Duration::from_secs(10));
        let registry = OwnershipRegistry::new();
        let runtime = PollingRuntime::mount(
            store.clone(),
            client.clone(),
            &registry,
            RuntimeOptions::default(),
            Arc::new(RecordingDiagnostics::new()),
        );
        settle().await;
        runtime.unmount();

        tokio::time::sleep(std::time::Duration::from_secs(30)).await;
        assert_eq!(client.calls(), 1);
        assert_eq!(store.get("p-1").unwrap().status, JobPhase::Pending);
        assert!(registry.in_flight().lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_restarts_after_remove_and_readd() {
        let store = store();
        due_job(&store, "p-1");
        let client = ScriptedClient::with(vec![
            ok(json!({"status": "processing"})),
            ok(json!({"status": "processing"})),
        ]);
        let registry = OwnershipRegistry::new();
        let runtime = PollingRuntime::mount(
            store.clone(),
            client.clone(),
            &registry,
            RuntimeOptions::default(),
            Arc::new(RecordingDiagnostics::new()),
        );
        settle().await;
        assert_eq!(client.calls(), 1);
        assert_eq!(runtime.intervals_created(), 1);

        store.remove_job("p-1");
        settle().await;
        due_job(&store, "p-1");
        settle().await;

        // No time has passed: the second check comes from the immediate pass.
        assert_eq!(runtime.intervals_created(), 2);
        assert_eq!(client.calls(), 2);
    }
}
