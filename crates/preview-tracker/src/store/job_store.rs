//! Job store with durable persistence.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::watch;

use super::codec::{self, ParsedJobs};
use super::selection;
use super::snapshot::JobSnapshot;
use crate::clock::{Clock, SystemClock};
use crate::config::TrackerConfig;
use crate::diagnostics::{Diagnostics, LogDiagnostics};
use crate::job::{
    reduce, JobEvent, JobInput, JobPatch, NextPoll, PreviewJob, ReduceContext, TerminalPhase,
};
use crate::storage::{KeyValueStorage, JOBS_KEY, LEGACY_JOBS_KEY, LEGACY_PENDING_KEY};

pub const DEFAULT_STALE_AFTER_MS: u64 = 24 * 60 * 60 * 1000;
pub const DEFAULT_MAX_JOBS: usize = 20;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 3_000;

/// Whether legacy storage keys still need to be folded into the current key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MigrationState {
    #[default]
    NotStarted,
    Migrated,
}

/// Outcome of one hydration pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HydrationReport {
    pub loaded: usize,
    pub dropped_unknown_status: usize,
    pub dropped_malformed: usize,
    pub migrated_legacy: bool,
}

/// Tunables and collaborators of a [`JobStore`].
#[derive(Clone)]
pub struct StoreOptions {
    pub clock: Arc<dyn Clock>,
    pub diagnostics: Arc<dyn Diagnostics>,
    pub stale_after: Duration,
    pub max_jobs: usize,
    pub default_poll_interval: Duration,
}

impl StoreOptions {
    pub fn from_config(config: &TrackerConfig) -> Self {
        Self {
            stale_after: config.stale_after(),
            max_jobs: config.max_jobs,
            default_poll_interval: config.poll_interval(),
            ..Self::default()
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn Diagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            diagnostics: Arc::new(LogDiagnostics),
            stale_after: Duration::milliseconds(DEFAULT_STALE_AFTER_MS as i64),
            max_jobs: DEFAULT_MAX_JOBS,
            default_poll_interval: Duration::milliseconds(DEFAULT_POLL_INTERVAL_MS as i64),
        }
    }
}

/// Handle returned by [`JobStore::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Arc<dyn Fn() + Send + Sync>;

struct StoreState {
    hydrated: bool,
    migration: MigrationState,
    snapshot: Arc<JobSnapshot>,
}

/// Authoritative collection of preview jobs.
///
/// Every mutation runs through the reducer, then a single commit that prunes,
/// persists and publishes. The commit happens under one lock, so mutations
/// never interleave. Listeners run after the lock is released.
pub struct JobStore {
    storage: Arc<dyn KeyValueStorage>,
    options: StoreOptions,
    state: Mutex<StoreState>,
    listeners: RwLock<Vec<(SubscriptionId, Listener)>>,
    next_listener: AtomicU64,
    publisher: watch::Sender<Arc<JobSnapshot>>,
}

impl JobStore {
    pub fn new(
        storage: Arc<dyn KeyValueStorage>,
        options: StoreOptions,
        migration: MigrationState,
    ) -> Self {
        let (publisher, _) = watch::channel(JobSnapshot::empty());
        Self {
            storage,
            options,
            state: Mutex::new(StoreState {
                hydrated: false,
                migration,
                snapshot: JobSnapshot::empty(),
            }),
            listeners: RwLock::new(Vec::new()),
            next_listener: AtomicU64::new(1),
            publisher,
        }
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.options.clock.now()
    }

    fn lock_state(&self) -> MutexGuard<'_, StoreState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job store state lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn reduce_context(&self) -> ReduceContext {
        ReduceContext {
            now: self.now(),
            default_poll_interval: self.options.default_poll_interval,
        }
    }

    // ─── Snapshot access ────────────────────────────────────────────────────

    /// Current snapshot. The `Arc` only changes when the job list changes.
    pub fn snapshot(&self) -> Arc<JobSnapshot> {
        self.hydrate();
        Arc::clone(&self.lock_state().snapshot)
    }

    pub fn jobs(&self) -> Vec<PreviewJob> {
        self.snapshot().jobs().to_vec()
    }

    /// Snapshot for contexts without durable storage: always empty.
    pub fn server_snapshot(&self) -> Arc<JobSnapshot> {
        JobSnapshot::empty()
    }

    pub fn server_jobs(&self) -> Vec<PreviewJob> {
        Vec::new()
    }

    pub fn migration_state(&self) -> MigrationState {
        self.lock_state().migration
    }

    pub fn latest_active_job(&self) -> Option<PreviewJob> {
        selection::select_latest_active(self.snapshot().jobs()).cloned()
    }

    pub fn preferred_job(&self) -> Option<PreviewJob> {
        selection::select_preferred(self.snapshot().jobs()).cloned()
    }

    pub fn latest_job_for_request_key(&self, request_key: &str) -> Option<PreviewJob> {
        selection::select_latest_for_request_key(self.snapshot().jobs(), request_key).cloned()
    }

    pub fn get(&self, preview_id: &str) -> Option<PreviewJob> {
        self.snapshot().get(preview_id).cloned()
    }

    // ─── Observers ──────────────────────────────────────────────────────────

    /// Registers a listener called after every change to the job list.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        match self.listeners.write() {
            Ok(mut listeners) => listeners.push((id, Arc::new(listener))),
            Err(poisoned) => poisoned.into_inner().push((id, Arc::new(listener))),
        }
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        let mut listeners = match self.listeners.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        listeners.retain(|(existing, _)| *existing != id);
    }

    /// Receiver that always holds the latest snapshot.
    pub fn watch(&self) -> watch::Receiver<Arc<JobSnapshot>> {
        self.hydrate();
        self.publisher.subscribe()
    }

    fn notify(&self) {
        let listeners: Vec<Listener> = match self.listeners.read() {
            Ok(guard) => guard.iter().map(|(_, l)| Arc::clone(l)).collect(),
            Err(poisoned) => poisoned
                .into_inner()
                .iter()
                .map(|(_, l)| Arc::clone(l))
                .collect(),
        };
        for listener in listeners {
            listener();
        }
    }

    // ─── Hydration ──────────────────────────────────────────────────────────

    fn read_key(&self, key: &str) -> Option<Vec<u8>> {
        match self.storage.get(key) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("Failed to read '{}' from tracker storage: {}", key, e);
                None
            }
        }
    }

    /// Loads stored jobs, migrating legacy keys first if needed. Only the first
    /// call does any work; later calls return `None`.
    pub fn hydrate(&self) -> Option<HydrationReport> {
        let (report, changed) = {
            let mut state = self.lock_state();
            if state.hydrated {
                return None;
            }
            self.hydrate_locked(&mut state)
        };
        if changed {
            self.notify();
        }
        Some(report)
    }

    fn hydrate_locked(&self, state: &mut StoreState) -> (HydrationReport, bool) {
        state.hydrated = true;
        let now = self.now();

        let stored_bytes = self.read_key(JOBS_KEY);
        let current = stored_bytes
            .as_deref()
            .map(codec::decode_jobs)
            .unwrap_or_default();
        let mut report = HydrationReport {
            dropped_unknown_status: current.unknown_status,
            dropped_malformed: current.malformed,
            ..Default::default()
        };
        let stored_count = current.jobs.len();
        let mut jobs = current.jobs;

        if state.migration == MigrationState::NotStarted {
            if let Some(legacy) = self.collect_legacy(now) {
                report.dropped_unknown_status += legacy.parsed.unknown_status;
                report.dropped_malformed += legacy.parsed.malformed;
                jobs = self.merge_legacy(jobs, legacy);
                report.migrated_legacy = true;
            }
            state.migration = MigrationState::Migrated;
        }

        let jobs = self.prune(jobs, now);
        report.loaded = jobs.len();

        let needs_write = report.migrated_legacy
            || jobs.len() != stored_count
            || report.dropped_unknown_status + report.dropped_malformed > 0
            || !Self::matches_encoding(stored_bytes.as_deref(), &jobs);
        let persisted = needs_write && self.persist(&jobs);
        if report.migrated_legacy && persisted {
            for key in [LEGACY_JOBS_KEY, LEGACY_PENDING_KEY] {
                if let Err(e) = self.storage.remove(key) {
                    log::warn!("Failed to remove migrated key '{}': {}", key, e);
                }
            }
            log::info!("Migrated legacy preview jobs into '{}'", JOBS_KEY);
        }

        if report.dropped_unknown_status > 0 {
            self.options.diagnostics.warn(&format!(
                "Dropped {} stored preview job(s) with an unrecognized status",
                report.dropped_unknown_status
            ));
        }

        let changed = self.publish(state, jobs);
        (report, changed)
    }

    /// Whether `stored` already holds the encoding of `jobs`. Normalized
    /// records (canonical keys, repaired schedules) differ from what was read.
    fn matches_encoding(stored: Option<&[u8]>, jobs: &[PreviewJob]) -> bool {
        match (stored, codec::encode_jobs(jobs)) {
            (None, _) => jobs.is_empty(),
            (Some(raw), Ok(encoded)) => raw == encoded.as_slice(),
            (Some(_), Err(_)) => true,
        }
    }

    fn collect_legacy(&self, now: DateTime<Utc>) -> Option<LegacyData> {
        let jobs_bytes = self.read_key(LEGACY_JOBS_KEY);
        let pending_bytes = self.read_key(LEGACY_PENDING_KEY);
        if jobs_bytes.is_none() && pending_bytes.is_none() {
            return None;
        }
        Some(LegacyData {
            parsed: jobs_bytes
                .map(|bytes| codec::decode_legacy_jobs(&bytes, now))
                .unwrap_or_default(),
            pending: pending_bytes.and_then(|bytes| codec::decode_legacy_pending(&bytes)),
        })
    }

    /// Current-key records win over v1 records with the same id; the pending
    /// record is then merged on top through the reducer.
    fn merge_legacy(&self, mut jobs: Vec<PreviewJob>, legacy: LegacyData) -> Vec<PreviewJob> {
        let known: HashSet<String> = jobs.iter().map(|j| j.preview_id.clone()).collect();
        jobs.extend(
            legacy
                .parsed
                .jobs
                .into_iter()
                .filter(|j| !known.contains(&j.preview_id)),
        );

        if let Some(pending) = legacy.pending {
            let ctx = self.reduce_context();
            let position = jobs.iter().position(|j| j.preview_id == pending.preview_id);
            let existing = position.map(|i| &jobs[i]);
            let event = JobEvent::Upsert(pending.to_input());
            if let Some(mut merged) = reduce(existing, &event, &ctx) {
                match position {
                    Some(i) => jobs[i] = merged,
                    None => {
                        if let Some(created_at) = pending.created_at() {
                            merged.created_at = created_at;
                        }
                        jobs.push(merged);
                    }
                }
            }
        }
        jobs
    }

    // ─── Commit ─────────────────────────────────────────────────────────────

    /// Drops stale jobs, orders by the selection comparator, removes duplicate
    /// ids and caps the list.
    fn prune(&self, mut jobs: Vec<PreviewJob>, now: DateTime<Utc>) -> Vec<PreviewJob> {
        let cutoff = now - self.options.stale_after;
        jobs.retain(|j| j.updated_at >= cutoff);
        selection::sort_jobs(&mut jobs);
        let mut seen = HashSet::new();
        jobs.retain(|j| seen.insert(j.preview_id.clone()));
        jobs.truncate(self.options.max_jobs);
        jobs
    }

    /// Writes the list to durable storage. Failures are logged and swallowed:
    /// the in-memory state stays authoritative for this session.
    fn persist(&self, jobs: &[PreviewJob]) -> bool {
        let bytes = match codec::encode_jobs(jobs) {
            Ok(bytes) => bytes,
            Err(e) => {
                log::error!("Failed to encode preview jobs: {}", e);
                return false;
            }
        };
        match self.storage.set(JOBS_KEY, &bytes) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Failed to persist preview jobs: {}", e);
                false
            }
        }
    }

    /// Swaps in a new snapshot when the list differs from the current one.
    fn publish(&self, state: &mut StoreState, jobs: Vec<PreviewJob>) -> bool {
        if state.snapshot.jobs() == jobs.as_slice() {
            return false;
        }
        let snapshot = Arc::new(JobSnapshot::new(jobs));
        state.snapshot = Arc::clone(&snapshot);
        self.publisher.send_replace(snapshot);
        true
    }

    fn commit(&self, state: &mut StoreState, jobs: Vec<PreviewJob>) -> bool {
        let jobs = self.prune(jobs, self.now());
        if state.snapshot.jobs() == jobs.as_slice() {
            return false;
        }
        self.persist(&jobs);
        self.publish(state, jobs)
    }

    /// Reduces one event against the job with `preview_id` and commits.
    /// Returns the job as stored, or `None` if it is not in the committed list.
    fn dispatch(&self, preview_id: &str, event: JobEvent) -> Option<PreviewJob> {
        self.hydrate();
        let (result, changed) = {
            let mut state = self.lock_state();
            let ctx = self.reduce_context();
            let mut jobs = state.snapshot.jobs().to_vec();
            let position = jobs.iter().position(|j| j.preview_id == preview_id);
            let result = reduce(position.map(|i| &jobs[i]), &event, &ctx);

            match (position, &result) {
                (Some(i), Some(job)) => jobs[i] = job.clone(),
                (Some(i), None) => {
                    jobs.remove(i);
                }
                (None, Some(job)) => jobs.push(job.clone()),
                (None, None) => {
                    log::debug!("Ignoring event for unknown preview job '{}'", preview_id);
                }
            }
            let changed = self.commit(&mut state, jobs);
            // Pruning may have dropped the job; report what was committed.
            let committed = result.and_then(|job| state.snapshot.get(&job.preview_id).cloned());
            (committed, changed)
        };
        if changed {
            self.notify();
        }
        result
    }

    // ─── Mutations ──────────────────────────────────────────────────────────

    /// Creates the job or merges the input into the existing one.
    pub fn upsert_job(&self, input: JobInput) -> Option<PreviewJob> {
        if input.preview_id.trim().is_empty() {
            log::warn!("Refusing to track a preview job without an id");
            return None;
        }
        let preview_id = input.preview_id.clone();
        self.dispatch(&preview_id, JobEvent::Upsert(input))
    }

    pub fn patch_job(&self, preview_id: &str, patch: JobPatch) -> Option<PreviewJob> {
        self.dispatch(preview_id, JobEvent::Patch(patch))
    }

    pub fn mark_terminal(
        &self,
        preview_id: &str,
        status: TerminalPhase,
        patch: JobPatch,
    ) -> Option<PreviewJob> {
        self.dispatch(preview_id, JobEvent::Terminal { status, patch })
    }

    pub fn remove_job(&self, preview_id: &str) {
        self.dispatch(preview_id, JobEvent::Remove);
    }

    pub fn set_retry(
        &self,
        preview_id: &str,
        retry_count: u32,
        next_poll_at: NextPoll,
    ) -> Option<PreviewJob> {
        self.dispatch(
            preview_id,
            JobEvent::SetRetry {
                retry_count,
                next_poll_at,
            },
        )
    }

    pub fn reset_retry(&self, preview_id: &str, next_poll_at: NextPoll) -> Option<PreviewJob> {
        self.dispatch(preview_id, JobEvent::ResetRetry { next_poll_at })
    }

    /// Re-runs pruning without any other change.
    pub fn cleanup(&self) {
        self.hydrate();
        let changed = {
            let mut state = self.lock_state();
            let jobs = state.snapshot.jobs().to_vec();
            self.commit(&mut state, jobs)
        };
        if changed {
            self.notify();
        }
    }
}

struct LegacyData {
    parsed: ParsedJobs,
    pending: Option<codec::LegacyPendingPreview>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::diagnostics::RecordingDiagnostics;
    use crate::error::StorageError;
    use crate::job::{JobPhase, Patch, PipelineStage};
    use crate::storage::MemoryStorage;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    struct Harness {
        storage: Arc<MemoryStorage>,
        clock: ManualClock,
        diagnostics: Arc<RecordingDiagnostics>,
        store: JobStore,
    }

    fn harness_with(storage: MemoryStorage) -> Harness {
        let storage = Arc::new(storage);
        let clock = ManualClock::default();
        let diagnostics = Arc::new(RecordingDiagnostics::new());
        let options = StoreOptions::default()
            .with_clock(Arc::new(clock.clone()))
            .with_diagnostics(diagnostics.clone());
        let store = JobStore::new(storage.clone(), options, MigrationState::NotStarted);
        Harness {
            storage,
            clock,
            diagnostics,
            store,
        }
    }

    fn harness() -> Harness {
        harness_with(MemoryStorage::new())
    }

    fn pending(id: &str) -> JobInput {
        JobInput::new(id, &format!("tok-{}", id), JobPhase::Pending).with_request(
            "https://example.com/article",
            "en",
            "de",
            None,
        )
    }

    fn stored_entry(id: &str, status: &str, updated_ms: i64) -> serde_json::Value {
        json!({
            "previewId": id,
            "requestKey": "https://example.com|en|fr",
            "statusToken": "tok",
            "sourceUrl": "https://example.com",
            "sourceLang": "en",
            "targetLang": "fr",
            "status": status,
            "createdAt": updated_ms,
            "updatedAt": updated_ms,
            "nextPollAt": updated_ms
        })
    }

    fn now_ms(h: &Harness) -> i64 {
        h.clock.now().timestamp_millis()
    }

    fn stored_jobs(h: &Harness) -> Vec<PreviewJob> {
        let raw = h.storage.get_string(JOBS_KEY).unwrap();
        serde_json::from_str(&raw).unwrap()
    }

    #[test]
    fn test_upsert_persists_and_notifies() {
        let h = harness();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        h.store.subscribe(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let job = h.store.upsert_job(pending("p-1")).unwrap();
        assert_eq!(job.status, JobPhase::Pending);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(stored_jobs(&h), vec![job]);
    }

    #[test]
    fn test_snapshot_identity_is_stable_without_changes() {
        let h = harness();
        h.store.upsert_job(pending("p-1"));
        let before = h.store.snapshot();

        // Stale status: reducer leaves the job untouched.
        h.store.patch_job("p-1", JobPatch::status(JobPhase::Pending));
        h.store.patch_job("missing", JobPatch::status(JobPhase::Processing));
        h.store.cleanup();
        assert!(Arc::ptr_eq(&before, &h.store.snapshot()));

        h.store.patch_job("p-1", JobPatch::status(JobPhase::Processing));
        assert!(!Arc::ptr_eq(&before, &h.store.snapshot()));
    }

    #[test]
    fn test_server_snapshot_is_shared_empty_value() {
        let h = harness();
        h.store.upsert_job(pending("p-1"));
        assert!(h.store.server_snapshot().jobs().is_empty());
        assert!(Arc::ptr_eq(&h.store.server_snapshot(), &JobSnapshot::empty()));
        assert!(h.store.server_jobs().is_empty());
    }

    #[test]
    fn test_unsubscribe_stops_notifications() {
        let h = harness();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let id = h.store.subscribe(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        h.store.upsert_job(pending("p-1"));
        h.store.unsubscribe(id);
        h.store.upsert_job(pending("p-2"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_mutations_on_unknown_id_are_no_ops() {
        let h = harness();
        assert!(h.store.patch_job("nope", JobPatch::default()).is_none());
        assert!(h
            .store
            .mark_terminal("nope", TerminalPhase::Ready, JobPatch::default())
            .is_none());
        assert!(h.store.set_retry("nope", 1, NextPoll::Never).is_none());
        assert!(h.store.reset_retry("nope", NextPoll::Never).is_none());
        h.store.remove_job("nope");
        assert!(h.store.jobs().is_empty());
        assert!(!h.storage.contains(JOBS_KEY));
    }

    #[test]
    fn test_remove_job() {
        let h = harness();
        h.store.upsert_job(pending("p-1"));
        h.store.upsert_job(pending("p-2"));
        h.store.remove_job("p-1");
        let ids: Vec<String> = h.store.jobs().into_iter().map(|j| j.preview_id).collect();
        assert_eq!(ids, vec!["p-2"]);
        assert_eq!(stored_jobs(&h).len(), 1);
    }

    #[test]
    fn test_stale_jobs_are_pruned_on_cleanup() {
        let h = harness();
        h.store.upsert_job(pending("old"));
        h.clock.advance(Duration::hours(23));
        h.store.upsert_job(pending("fresh"));

        h.clock.advance(Duration::hours(2));
        h.store.cleanup();
        let ids: Vec<String> = h.store.jobs().into_iter().map(|j| j.preview_id).collect();
        assert_eq!(ids, vec!["fresh"]);
    }

    #[test]
    fn test_list_is_capped_keeping_best_ranked() {
        let h = harness();
        for i in 0..25 {
            h.clock.advance(Duration::seconds(1));
            h.store.upsert_job(pending(&format!("p-{:02}", i)));
        }
        let jobs = h.store.jobs();
        assert_eq!(jobs.len(), DEFAULT_MAX_JOBS);
        assert_eq!(jobs[0].preview_id, "p-24");
        assert!(jobs.iter().all(|j| j.preview_id.as_str() >= "p-05"));
    }

    #[test]
    fn test_upsert_dropped_by_cap_returns_none() {
        let h = harness();
        for i in 0..DEFAULT_MAX_JOBS {
            h.store.upsert_job(pending(&format!("p-{:02}", i)));
        }

        // Terminal jobs rank after every active one, so this falls off the cap.
        let mut done = pending("done");
        done.status = JobPhase::Ready;
        assert!(h.store.upsert_job(done).is_none());
        assert!(h.store.get("done").is_none());
        assert_eq!(h.store.jobs().len(), DEFAULT_MAX_JOBS);
    }

    #[test]
    fn test_terminal_job_reports_ready_and_sorts_last() {
        let h = harness();
        h.store.upsert_job(pending("p-1"));
        h.clock.advance(Duration::seconds(5));
        h.store.upsert_job(pending("p-2"));

        h.store.mark_terminal(
            "p-2",
            TerminalPhase::Ready,
            JobPatch {
                preview_url: Patch::Set("https://cdn.example/p-2".to_string()),
                ..Default::default()
            },
        );
        let jobs = h.store.jobs();
        assert_eq!(jobs[0].preview_id, "p-1");
        assert_eq!(jobs[1].status, JobPhase::Ready);
        assert_eq!(h.store.preferred_job().unwrap().preview_id, "p-1");
        assert_eq!(h.store.latest_active_job().unwrap().preview_id, "p-1");
    }

    #[test]
    fn test_latest_job_for_request_key() {
        let h = harness();
        h.store.upsert_job(pending("p-1"));
        h.clock.advance(Duration::seconds(1));
        h.store.upsert_job(pending("p-2"));
        let found = h
            .store
            .latest_job_for_request_key("https://example.com/article|EN|de")
            .unwrap();
        assert_eq!(found.preview_id, "p-2");
    }

    #[test]
    fn test_hydrate_drops_unknown_status_with_one_warning() {
        let now = ManualClock::default().now().timestamp_millis();
        let payload = json!([
            stored_entry("good", "processing", now),
            stored_entry("bad", "queued", now)
        ]);
        let h = harness_with(MemoryStorage::new().with_entry(JOBS_KEY, &payload.to_string()));

        let report = h.store.hydrate().unwrap();
        assert_eq!(report.loaded, 1);
        assert_eq!(report.dropped_unknown_status, 1);
        assert_eq!(h.store.jobs().len(), 1);
        assert_eq!(h.diagnostics.warning_count(), 1);

        // Later access does not hydrate (or warn) again.
        assert!(h.store.hydrate().is_none());
        h.store.snapshot();
        assert_eq!(h.diagnostics.warning_count(), 1);
    }

    #[test]
    fn test_hydrate_canonicalizes_stored_keys() {
        let now = ManualClock::default().now().timestamp_millis();
        let payload = json!([stored_entry("a", "pending", now)]);
        let h = harness_with(MemoryStorage::new().with_entry(JOBS_KEY, &payload.to_string()));
        let job = h.store.get("a").unwrap();
        assert!(job.request_key.starts_with("v1:"));

        let raw = h.storage.get_string(JOBS_KEY).unwrap();
        assert!(!raw.contains("https://example.com|en|fr"));
        assert_eq!(stored_jobs(&h), vec![job]);
    }

    #[test]
    fn test_hydrate_malformed_payload_is_empty_and_silent() {
        let h = harness_with(MemoryStorage::new().with_entry(JOBS_KEY, "{{{{"));
        assert!(h.store.jobs().is_empty());
        assert_eq!(h.diagnostics.warning_count(), 0);
    }

    #[test]
    fn test_legacy_migration_merges_pending_record() {
        let h0 = ManualClock::default().now().timestamp_millis();
        let legacy_jobs = json!([{
            "id": "p-9",
            "token": "old-token",
            "url": "https://example.com/post",
            "sourceLanguage": "en",
            "targetLanguage": "ja",
            "status": "pending",
            "createdAt": h0 - 1000
        }]);
        let legacy_pending = json!({
            "previewId": "p-9",
            "statusToken": "new-token",
            "sourceUrl": "https://example.com/post",
            "sourceLang": "en",
            "targetLang": "ja"
        });
        let storage = MemoryStorage::new()
            .with_entry(LEGACY_JOBS_KEY, &legacy_jobs.to_string())
            .with_entry(LEGACY_PENDING_KEY, &legacy_pending.to_string());
        let h = harness_with(storage);

        let jobs = h.store.jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].status, JobPhase::Processing);
        assert_eq!(jobs[0].status_token, "new-token");
        assert!(!h.storage.contains(LEGACY_JOBS_KEY));
        assert!(!h.storage.contains(LEGACY_PENDING_KEY));
        assert_eq!(stored_jobs(&h).len(), 1);
        assert_eq!(h.store.migration_state(), MigrationState::Migrated);
    }

    #[test]
    fn test_legacy_pending_without_match_is_synthesized() {
        let storage = MemoryStorage::new().with_entry(
            LEGACY_PENDING_KEY,
            r#"{"previewId": "solo", "statusToken": "t", "sourceUrl": "https://a.example", "sourceLang": "en", "targetLang": "it"}"#,
        );
        let h = harness_with(storage);
        let job = h.store.get("solo").unwrap();
        assert_eq!(job.status, JobPhase::Processing);
        assert!(job.request_key.starts_with("v1:"));
        assert!(!h.storage.contains(LEGACY_PENDING_KEY));
    }

    #[test]
    fn test_migrated_state_skips_legacy_keys() {
        let storage = Arc::new(MemoryStorage::new().with_entry(
            LEGACY_PENDING_KEY,
            r#"{"previewId": "solo", "statusToken": "t"}"#,
        ));
        let store = JobStore::new(
            storage.clone(),
            StoreOptions::default().with_clock(Arc::new(ManualClock::default())),
            MigrationState::Migrated,
        );
        assert!(store.jobs().is_empty());
        assert!(storage.contains(LEGACY_PENDING_KEY));
    }

    #[test]
    fn test_watch_receives_new_snapshots() {
        let h = harness();
        let mut rx = h.store.watch();
        assert!(rx.borrow_and_update().jobs().is_empty());
        h.store.upsert_job(pending("p-1"));
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().jobs().len(), 1);
    }

    struct RejectingStorage;

    impl KeyValueStorage for RejectingStorage {
        fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, StorageError> {
            Ok(None)
        }

        fn set(&self, key: &str, _value: &[u8]) -> Result<(), StorageError> {
            Err(StorageError::WriteRejected {
                key: key.to_string(),
                reason: "quota exceeded".to_string(),
            })
        }

        fn remove(&self, _key: &str) -> Result<(), StorageError> {
            Ok(())
        }
    }

    #[test]
    fn test_write_failures_keep_memory_state() {
        let store = JobStore::new(
            Arc::new(RejectingStorage),
            StoreOptions::default(),
            MigrationState::NotStarted,
        );
        store.upsert_job(pending("p-1"));
        let patched = store.patch_job(
            "p-1",
            JobPatch {
                status: Some(JobPhase::Processing),
                stage: Patch::Set(PipelineStage::FetchingContent),
                ..Default::default()
            },
        );
        assert_eq!(patched.unwrap().stage, Some(PipelineStage::FetchingContent));
        assert_eq!(store.jobs().len(), 1);
    }
}
