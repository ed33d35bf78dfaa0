//! Background task manager for a batch of tracks.
//!
//! One [`TaskManager`] owns one job. A single worker task drives the
//! job's items through the [`ProcessingPipeline`], one transition at a
//! time and strictly one item at a time, so the catalog rate limiter and
//! the error log never see concurrent writers.
//!
//! # Control
//!
//! Callers interact only through the manager:
//! - `pause` / `resume` / `cancel` flip flags the worker checks between
//!   transitions; an in-flight step always finishes
//! - `select_candidate` / `apply_strategy` answer items parked in
//!   `AwaitingSelection`; the worker sleeps on a [`Notify`] until then
//! - `status` copies the job into a [`JobSnapshot`]; readers never block
//!   the worker for longer than that copy
//!
//! # Usage
//!
//! ```ignore
//! let manager = TaskManager::new(pipeline, None);
//! manager.enqueue(paths)?;
//! manager.start()?;
//! let snapshot = manager.wait_settled().await;
//! ```

use std::collections::BTreeMap;
use std::fmt::{self, Write as _};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Notify;

use crate::error::Classify;
use crate::model::{
    ArtworkCandidate, ErrorCategory, ErrorRecord, Selection, Severity, TrackId, TrackItem,
    TrackStatus,
};
use crate::pipeline::{ProcessingPipeline, Step};
use crate::resolver::SelectionStrategy;

static NEXT_JOB_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier of a job, unique within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// Lifecycle of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobState {
    Idle,
    Running,
    Paused,
    Cancelled,
    Completed,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Idle => "idle",
            JobState::Running => "running",
            JobState::Paused => "paused",
            JobState::Cancelled => "cancelled",
            JobState::Completed => "completed",
        };
        f.write_str(s)
    }
}

/// Misuse of the task manager API.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TaskError {
    #[error("Cannot {action} while the job is {state}")]
    InvalidState { action: &'static str, state: JobState },

    #[error("No track {0} in this job")]
    UnknownItem(TrackId),

    #[error("Track {0} is not awaiting an artwork selection")]
    NotAwaitingSelection(TrackId),

    #[error("Track {item} has no candidate {candidate}")]
    UnknownCandidate { item: TrackId, candidate: String },

    #[error("Track {0} has no embedded artwork to keep")]
    NoEmbeddedArtwork(TrackId),

    #[error("Unknown job {0}")]
    UnknownJob(JobId),
}

/// Mutable job state. Lives behind the manager's mutex.
struct Job {
    id: JobId,
    items: Vec<TrackItem>,
    state: JobState,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    current_operation: Option<String>,
    /// Errors that concern the job rather than one track
    errors: Vec<ErrorRecord>,
    auto_strategy: Option<SelectionStrategy>,
    /// Item whose step is running outside the lock
    in_flight: Option<TrackId>,
    worker_active: bool,
    /// Worker is idle because every remaining item awaits a selection
    waiting: bool,
}

impl Job {
    fn item_mut(&mut self, id: TrackId) -> Result<&mut TrackItem, TaskError> {
        self.items
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or(TaskError::UnknownItem(id))
    }

    fn abort(&mut self, record: ErrorRecord) {
        tracing::error!(target: "tasks", "{} aborted: {}", self.id, record.message);
        self.errors.push(record);
        for item in self.items.iter_mut().filter(|i| !i.status.is_terminal()) {
            item.status = TrackStatus::Cancelled;
        }
        self.state = JobState::Cancelled;
        self.finish();
    }

    fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
        self.current_operation = None;
        self.in_flight = None;
        self.waiting = false;
        self.worker_active = false;
    }

    /// Every record in the job: item errors, item warnings, job errors.
    fn records(&self) -> impl Iterator<Item = (Option<&TrackItem>, &ErrorRecord)> {
        let item_records = self.items.iter().flat_map(|item| {
            item.errors
                .iter()
                .chain(item.warnings.iter())
                .map(move |r| (Some(item), r))
        });
        item_records.chain(self.errors.iter().map(|r| (None, r)))
    }
}

/// Copy of a job's state at one moment.
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub job_id: JobId,
    pub state: JobState,
    pub total_count: usize,
    /// Items in a terminal state
    pub processed_count: usize,
    pub by_status: BTreeMap<TrackStatus, usize>,
    pub by_severity: BTreeMap<Severity, usize>,
    pub by_category: BTreeMap<ErrorCategory, usize>,
    pub current_operation: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub elapsed: Duration,
    /// Linear estimate from the average time per processed item
    pub estimated_remaining: Option<Duration>,
    pub auto_strategy: Option<SelectionStrategy>,
    pub in_flight: Option<TrackId>,
    pub worker_active: bool,
    pub waiting_for_selection: bool,
    pub items: Vec<TrackItem>,
}

impl JobSnapshot {
    fn capture(job: &Job) -> Self {
        let mut by_status: BTreeMap<TrackStatus, usize> =
            TrackStatus::ALL.iter().map(|s| (*s, 0)).collect();
        for item in &job.items {
            *by_status.entry(item.status).or_default() += 1;
        }

        let mut by_severity: BTreeMap<Severity, usize> =
            Severity::ALL.iter().map(|s| (*s, 0)).collect();
        let mut by_category: BTreeMap<ErrorCategory, usize> =
            ErrorCategory::ALL.iter().map(|c| (*c, 0)).collect();
        for (_, record) in job.records() {
            *by_severity.entry(record.severity).or_default() += 1;
            *by_category.entry(record.category).or_default() += 1;
        }

        let total_count = job.items.len();
        let processed_count = job.items.iter().filter(|i| i.status.is_terminal()).count();

        let elapsed = job
            .started_at
            .map(|start| {
                let end = job.finished_at.unwrap_or_else(Utc::now);
                (end - start).to_std().unwrap_or_default()
            })
            .unwrap_or_default();
        let remaining = total_count - processed_count;
        let estimated_remaining = (job.state == JobState::Running
            && processed_count > 0
            && remaining > 0)
            .then(|| elapsed / processed_count as u32 * remaining as u32);

        Self {
            job_id: job.id,
            state: job.state,
            total_count,
            processed_count,
            by_status,
            by_severity,
            by_category,
            current_operation: job.current_operation.clone(),
            started_at: job.started_at,
            elapsed,
            estimated_remaining,
            auto_strategy: job.auto_strategy,
            in_flight: job.in_flight,
            worker_active: job.worker_active,
            waiting_for_selection: job.waiting,
            items: job.items.clone(),
        }
    }

    pub fn count(&self, status: TrackStatus) -> usize {
        self.by_status.get(&status).copied().unwrap_or(0)
    }

    pub fn item(&self, id: TrackId) -> Option<&TrackItem> {
        self.items.iter().find(|i| i.id == id)
    }

    /// Nothing will change without a call into the manager.
    pub fn is_settled(&self) -> bool {
        !self.worker_active
            || (self.state == JobState::Running && self.waiting_for_selection)
            || (self.state == JobState::Paused && self.in_flight.is_none())
    }
}

struct Shared {
    job: Mutex<Job>,
    pipeline: ProcessingPipeline,
    /// Wakes a parked or paused worker
    wake: Notify,
    /// Fired after every visible change, for `wait_for`
    changed: Notify,
}

/// Runs one job's items through the pipeline in the background.
pub struct TaskManager {
    shared: Arc<Shared>,
    next_track: AtomicU64,
}

impl TaskManager {
    pub fn new(pipeline: ProcessingPipeline, auto_strategy: Option<SelectionStrategy>) -> Self {
        let job = Job {
            id: JobId(NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed)),
            items: Vec::new(),
            state: JobState::Idle,
            started_at: None,
            finished_at: None,
            current_operation: None,
            errors: Vec::new(),
            auto_strategy,
            in_flight: None,
            worker_active: false,
            waiting: false,
        };
        Self {
            shared: Arc::new(Shared {
                job: Mutex::new(job),
                pipeline,
                wake: Notify::new(),
                changed: Notify::new(),
            }),
            next_track: AtomicU64::new(1),
        }
    }

    pub fn job_id(&self) -> JobId {
        self.shared.job.lock().id
    }

    /// Add tracks to the job, in order. Returns their ids.
    pub fn enqueue<I, P>(&self, paths: I) -> Result<Vec<TrackId>, TaskError>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut job = self.shared.job.lock();
        if job.state == JobState::Cancelled {
            return Err(TaskError::InvalidState {
                action: "enqueue",
                state: job.state,
            });
        }

        let ids: Vec<TrackId> = paths
            .into_iter()
            .map(|path| {
                let id = TrackId(self.next_track.fetch_add(1, Ordering::Relaxed));
                job.items.push(TrackItem::new(id, path));
                id
            })
            .collect();

        if !ids.is_empty() {
            job.waiting = false;
        }
        tracing::info!(target: "tasks", "Queued {} track(s) in {}", ids.len(), job.id);
        drop(job);
        self.shared.wake.notify_one();
        self.notify_changed();
        Ok(ids)
    }

    /// Begin processing. Must be called from within a Tokio runtime.
    ///
    /// Valid from `Idle`, and from `Completed` to pick up tracks queued
    /// after the job finished.
    pub fn start(&self) -> Result<(), TaskError> {
        let mut job = self.shared.job.lock();
        match job.state {
            JobState::Idle | JobState::Completed => {}
            state => {
                return Err(TaskError::InvalidState {
                    action: "start",
                    state,
                });
            }
        }

        job.state = JobState::Running;
        if job.started_at.is_none() {
            job.started_at = Some(Utc::now());
        }
        job.finished_at = None;
        tracing::info!(target: "tasks", "Starting {} ({} tracks)", job.id, job.items.len());
        self.spawn_worker(&mut job);
        drop(job);
        self.notify_changed();
        Ok(())
    }

    /// Stop taking new steps once the current one finishes.
    pub fn pause(&self) -> Result<(), TaskError> {
        let mut job = self.shared.job.lock();
        if job.state != JobState::Running {
            return Err(TaskError::InvalidState {
                action: "pause",
                state: job.state,
            });
        }
        job.state = JobState::Paused;
        tracing::info!(target: "tasks", "Paused {}", job.id);
        drop(job);
        self.notify_changed();
        Ok(())
    }

    pub fn resume(&self) -> Result<(), TaskError> {
        let mut job = self.shared.job.lock();
        if job.state != JobState::Paused {
            return Err(TaskError::InvalidState {
                action: "resume",
                state: job.state,
            });
        }
        job.state = JobState::Running;
        tracing::info!(target: "tasks", "Resumed {}", job.id);
        drop(job);
        self.shared.wake.notify_one();
        self.notify_changed();
        Ok(())
    }

    /// Cancel every track that has not finished. Completed tracks keep
    /// their output; the in-flight track is cancelled after its step.
    pub fn cancel(&self) -> Result<(), TaskError> {
        let mut job = self.shared.job.lock();
        match job.state {
            JobState::Cancelled => return Ok(()),
            JobState::Completed => {
                return Err(TaskError::InvalidState {
                    action: "cancel",
                    state: job.state,
                });
            }
            _ => {}
        }

        let in_flight = job.in_flight;
        let mut cancelled = 0;
        for item in job
            .items
            .iter_mut()
            .filter(|i| !i.status.is_terminal() && Some(i.id) != in_flight)
        {
            item.status = TrackStatus::Cancelled;
            cancelled += 1;
        }
        job.state = JobState::Cancelled;
        if !job.worker_active {
            job.finish();
        }
        tracing::info!(target: "tasks", "Cancelled {} ({} tracks)", job.id, cancelled);
        drop(job);
        self.shared.wake.notify_one();
        self.notify_changed();
        Ok(())
    }

    /// Reset failed tracks to `Pending` and process them again.
    ///
    /// Returns the number of tracks reset. Restarts the worker if it had
    /// finished; a paused job stays paused.
    pub fn retry_failed(&self) -> Result<usize, TaskError> {
        let mut job = self.shared.job.lock();
        if job.state == JobState::Cancelled {
            return Err(TaskError::InvalidState {
                action: "retry",
                state: job.state,
            });
        }

        let mut count = 0;
        for item in job
            .items
            .iter_mut()
            .filter(|i| i.status == TrackStatus::Failed)
        {
            item.reset_for_retry();
            count += 1;
        }
        tracing::info!(target: "tasks", "Retrying {} failed track(s) in {}", count, job.id);
        if count > 0 {
            job.waiting = false;
        }

        if count > 0 && matches!(job.state, JobState::Completed | JobState::Running) {
            job.state = JobState::Running;
            job.finished_at = None;
            if !job.worker_active {
                self.spawn_worker(&mut job);
            }
        }
        drop(job);
        self.shared.wake.notify_one();
        self.notify_changed();
        Ok(count)
    }

    pub fn status(&self) -> JobSnapshot {
        JobSnapshot::capture(&self.shared.job.lock())
    }

    pub fn list_candidates(&self, id: TrackId) -> Result<Vec<ArtworkCandidate>, TaskError> {
        let mut job = self.shared.job.lock();
        Ok(job.item_mut(id)?.candidates.clone())
    }

    /// Answer a track parked in `AwaitingSelection`.
    pub fn select_candidate(&self, id: TrackId, selection: Selection) -> Result<(), TaskError> {
        let mut job = self.shared.job.lock();
        let item = job.item_mut(id)?;
        if item.status != TrackStatus::AwaitingSelection {
            return Err(TaskError::NotAwaitingSelection(id));
        }
        match selection {
            Selection::Candidate(ref candidate) if item.candidate(candidate).is_none() => {
                return Err(TaskError::UnknownCandidate {
                    item: id,
                    candidate: candidate.clone(),
                });
            }
            Selection::Embedded if item.current_artwork.is_none() => {
                return Err(TaskError::NoEmbeddedArtwork(id));
            }
            _ => {}
        }

        tracing::debug!(target: "tasks", "{} {}: selected {:?}", id, item.file_name(), selection);
        item.selection = Some(selection);
        job.waiting = false;
        drop(job);
        self.shared.wake.notify_one();
        self.notify_changed();
        Ok(())
    }

    /// Select for every track currently awaiting a decision. Returns how
    /// many tracks were answered.
    pub fn apply_strategy(&self, strategy: SelectionStrategy) -> usize {
        let mut job = self.shared.job.lock();
        let count = apply_to_parked(&mut job, strategy);
        tracing::info!(target: "tasks", "Applied {} to {} track(s)", strategy, count);
        drop(job);
        if count > 0 {
            self.shared.wake.notify_one();
            self.notify_changed();
        }
        count
    }

    /// Select automatically from now on (`None` to park again). Tracks
    /// already waiting are answered too.
    pub fn set_auto_strategy(&self, strategy: Option<SelectionStrategy>) {
        let mut job = self.shared.job.lock();
        job.auto_strategy = strategy;
        if let Some(strategy) = strategy {
            apply_to_parked(&mut job, strategy);
        }
        drop(job);
        self.shared.wake.notify_one();
        self.notify_changed();
    }

    /// Every error and warning of the job as text, oldest first, after a
    /// summary of totals per severity.
    pub fn export_error_log(&self, job_id: JobId) -> Result<String, TaskError> {
        let job = self.shared.job.lock();
        if job.id != job_id {
            return Err(TaskError::UnknownJob(job_id));
        }

        let mut records: Vec<_> = job.records().collect();
        records.sort_by_key(|(_, r)| r.timestamp);

        let mut totals: BTreeMap<Severity, usize> = BTreeMap::new();
        for (_, record) in &records {
            *totals.entry(record.severity).or_default() += 1;
        }

        let mut out = String::new();
        let _ = writeln!(out, "Error log for {}", job.id);
        let _ = writeln!(out, "Generated: {}", Utc::now().to_rfc3339());
        let _ = writeln!(out, "Total records: {}", records.len());
        for severity in Severity::ALL {
            let _ = writeln!(
                out,
                "  {:<8} {}",
                severity.to_string(),
                totals.get(&severity).copied().unwrap_or(0)
            );
        }
        out.push('\n');

        for (item, record) in records {
            let source = item.map(|i| format!("{} {}", i.id, i.file_name()));
            let _ = writeln!(
                out,
                "{} [{}] [{}] retries={} {}: {}",
                record.timestamp.to_rfc3339(),
                record.severity.to_string().to_uppercase(),
                record.category,
                record.retry_count,
                source.as_deref().unwrap_or("job"),
                record.message
            );
            let _ = writeln!(out, "    {}", record.user_message);
        }

        Ok(out)
    }

    /// Wait until `done` holds for the job's state.
    pub async fn wait_for(&self, mut done: impl FnMut(&JobSnapshot) -> bool) -> JobSnapshot {
        loop {
            let notified = self.shared.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let snapshot = self.status();
            if done(&snapshot) {
                return snapshot;
            }
            notified.await;
        }
    }

    /// Wait until the worker finished, paused, or has nothing to do but
    /// wait for selections.
    pub async fn wait_settled(&self) -> JobSnapshot {
        self.wait_for(JobSnapshot::is_settled).await
    }

    fn spawn_worker(&self, job: &mut Job) {
        job.worker_active = true;
        tokio::spawn(run_worker(self.shared.clone()));
    }

    fn notify_changed(&self) {
        self.shared.changed.notify_waiters();
    }
}

fn apply_to_parked(job: &mut Job, strategy: SelectionStrategy) -> usize {
    let mut count = 0;
    for item in job
        .items
        .iter_mut()
        .filter(|i| i.status == TrackStatus::AwaitingSelection && i.selection.is_none())
    {
        let embedded = item.current_artwork.as_ref().map(|a| &a.info);
        item.selection = Some(strategy.select(embedded, &item.candidates));
        count += 1;
    }
    if count > 0 {
        job.waiting = false;
    }
    count
}

/// What the worker does next, decided under the lock.
enum Next {
    Step(usize, TrackItem, Option<SelectionStrategy>),
    Wait,
    Again,
    Exit,
}

fn next_action(job: &mut Job) -> Next {
    match job.state {
        JobState::Cancelled => {
            job.finish();
            return Next::Exit;
        }
        JobState::Paused => {
            job.current_operation = Some("Paused".to_string());
            return Next::Wait;
        }
        _ => {}
    }

    let next = job.items.iter().position(|i| {
        !i.status.is_terminal()
            && !(i.status == TrackStatus::AwaitingSelection && i.selection.is_none())
    });

    match next {
        Some(idx) if job.items[idx].status == TrackStatus::AwaitingSelection => {
            // A selection arrived; moving on needs no I/O
            ProcessingPipeline::take_selection(&mut job.items[idx]);
            Next::Again
        }
        Some(idx) => {
            let item = job.items[idx].clone();
            job.waiting = false;
            job.in_flight = Some(item.id);
            job.current_operation = Some(format!("{}: {}", item.status.label(), item.file_name()));
            Next::Step(idx, item, job.auto_strategy)
        }
        None if job
            .items
            .iter()
            .any(|i| i.status == TrackStatus::AwaitingSelection) =>
        {
            if !job.waiting {
                tracing::info!(target: "tasks", "{} waiting for artwork selection", job.id);
            }
            job.waiting = true;
            job.current_operation = Some("Waiting for artwork selection".to_string());
            Next::Wait
        }
        None => {
            job.state = JobState::Completed;
            job.finish();
            tracing::info!(target: "tasks", "{} completed", job.id);
            Next::Exit
        }
    }
}

async fn run_worker(shared: Arc<Shared>) {
    let id = shared.job.lock().id;
    tracing::debug!(target: "tasks", "Worker for {} started", id);

    if let Err(e) = shared.pipeline.output().ensure_ready() {
        shared.job.lock().abort(e.to_record());
        shared.changed.notify_waiters();
        return;
    }

    loop {
        let next = next_action(&mut shared.job.lock());
        shared.changed.notify_waiters();

        match next {
            Next::Exit => break,
            Next::Again => continue,
            Next::Wait => shared.wake.notified().await,
            Next::Step(idx, mut item, auto) => {
                let step = shared.pipeline.advance(&mut item, auto).await;

                let mut job = shared.job.lock();
                job.in_flight = None;
                if job.state == JobState::Cancelled && !item.status.is_terminal() {
                    item.status = TrackStatus::Cancelled;
                }
                job.items[idx] = item;
                if let Step::Abort(record) = step {
                    job.abort(record);
                }
            }
        }
    }

    tracing::debug!(target: "tasks", "Worker for {} stopped", id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artwork::ArtworkOptimizer;
    use crate::catalog::traits::CatalogApi;
    use crate::catalog::traits::mocks::MockCatalog;
    use crate::catalog::{CatalogError, SearchQuery};
    use crate::config::ResolverConfig;
    use crate::metadata::mocks::MockTags;
    use crate::output::OutputDir;
    use crate::test_utils::{mock_candidate, mock_tags, solid_png};
    use std::path::Path;
    use tempfile::TempDir;

    struct Fixture {
        manager: TaskManager,
        tags: Arc<MockTags>,
        catalog: Arc<MockCatalog>,
        _dir: TempDir,
    }

    fn fixture_at(tags: MockTags, catalog: MockCatalog, output: impl FnOnce(&Path) -> PathBuf) -> Fixture {
        let dir = TempDir::new().unwrap();
        let tags = Arc::new(tags);
        let catalog = Arc::new(catalog);
        let pipeline = ProcessingPipeline::new(
            tags.clone(),
            catalog.clone(),
            ArtworkOptimizer::default(),
            ResolverConfig::default(),
            OutputDir::new(output(dir.path()), "{Artist} - {Title}.{ext}"),
        );
        Fixture {
            manager: TaskManager::new(pipeline, None),
            tags,
            catalog,
            _dir: dir,
        }
    }

    fn fixture(tags: MockTags, catalog: MockCatalog) -> Fixture {
        fixture_at(tags, catalog, |root| root.join("out"))
    }

    fn plain(artist: &str, title: &str) -> crate::metadata::TrackTags {
        mock_tags(Some(artist), None, Some(title), None)
    }

    /// Catalog with one downloadable front cover for every listed title.
    fn catalog_with(titles: &[&str]) -> MockCatalog {
        titles.iter().fold(MockCatalog::no_matches(), |catalog, title| {
            let id = format!("cover-{title}");
            catalog
                .with_results(title, vec![mock_candidate(&id, true, true, Some(1000))])
                .with_image(&id, solid_png(1000, 1000, [40, 80, 120, 255]))
        })
    }

    /// Catalog whose first search blocks until released.
    struct GatedCatalog {
        inner: MockCatalog,
        gated: Mutex<bool>,
        /// Fired when the blocked search has started
        entered: Notify,
        release: Notify,
    }

    impl GatedCatalog {
        fn new(inner: MockCatalog) -> Self {
            Self {
                inner,
                gated: Mutex::new(true),
                entered: Notify::new(),
                release: Notify::new(),
            }
        }
    }

    #[async_trait::async_trait]
    impl CatalogApi for GatedCatalog {
        async fn search(&self, query: &SearchQuery) -> Result<Vec<ArtworkCandidate>, CatalogError> {
            let gated = std::mem::replace(&mut *self.gated.lock(), false);
            if gated {
                self.entered.notify_one();
                self.release.notified().await;
            }
            self.inner.search(query).await
        }

        async fn fetch(&self, candidate: &ArtworkCandidate) -> Result<Vec<u8>, CatalogError> {
            self.inner.fetch(candidate).await
        }
    }

    fn gated_fixture(tags: MockTags, catalog: MockCatalog) -> (Fixture, Arc<GatedCatalog>) {
        let dir = TempDir::new().unwrap();
        let tags = Arc::new(tags);
        let gate = Arc::new(GatedCatalog::new(catalog));
        let pipeline = ProcessingPipeline::new(
            tags.clone(),
            gate.clone(),
            ArtworkOptimizer::default(),
            ResolverConfig::default(),
            OutputDir::new(dir.path().join("out"), "{Artist} - {Title}.{ext}"),
        );
        let fixture = Fixture {
            manager: TaskManager::new(pipeline, None),
            tags,
            catalog: Arc::new(MockCatalog::no_matches()),
            _dir: dir,
        };
        (fixture, gate)
    }

    fn statuses(snapshot: &JobSnapshot) -> Vec<TrackStatus> {
        snapshot.items.iter().map(|i| i.status).collect()
    }

    #[tokio::test]
    async fn test_failed_item_does_not_stop_the_job() {
        let f = fixture(
            MockTags::new()
                .with_track("/in/1.mp3", plain("X", "One"))
                .with_corrupt("/in/2.mp3")
                .with_track("/in/3.mp3", plain("X", "Three")),
            MockCatalog::no_matches(),
        );
        let ids = f.manager.enqueue(["/in/1.mp3", "/in/2.mp3", "/in/3.mp3"]).unwrap();
        f.manager.start().unwrap();

        let snapshot = f.manager.wait_settled().await;

        assert_eq!(snapshot.state, JobState::Completed);
        assert_eq!(
            statuses(&snapshot),
            vec![TrackStatus::Completed, TrackStatus::Failed, TrackStatus::Completed]
        );
        let failed = snapshot.item(ids[1]).unwrap();
        assert_eq!(failed.errors.len(), 1);
        assert_eq!(failed.errors[0].category, ErrorCategory::FileError);
        assert!(snapshot.item(ids[0]).unwrap().output_path.is_some());
        assert!(snapshot.item(ids[2]).unwrap().output_path.is_some());
    }

    #[tokio::test]
    async fn test_retry_failed_only_reattempts_failed_items() {
        let f = fixture(
            MockTags::new()
                .with_track("/in/1.mp3", plain("X", "One"))
                .with_corrupt("/in/2.mp3")
                .with_track("/in/3.mp3", plain("X", "Three")),
            MockCatalog::no_matches(),
        );
        let ids = f.manager.enqueue(["/in/1.mp3", "/in/2.mp3", "/in/3.mp3"]).unwrap();
        f.manager.start().unwrap();
        f.manager.wait_settled().await;

        f.tags.set("/in/2.mp3", Ok(plain("X", "Two")));
        assert_eq!(f.manager.retry_failed().unwrap(), 1);
        let snapshot = f.manager.wait_settled().await;

        assert_eq!(snapshot.state, JobState::Completed);
        assert_eq!(snapshot.count(TrackStatus::Completed), 3);
        assert_eq!(f.tags.read_count(Path::new("/in/1.mp3")), 1);
        assert_eq!(f.tags.read_count(Path::new("/in/2.mp3")), 2);
        assert_eq!(f.tags.read_count(Path::new("/in/3.mp3")), 1);

        // History survives the retry
        let retried = snapshot.item(ids[1]).unwrap();
        assert_eq!(retried.errors.len(), 1);
        assert_eq!(retried.errors[0].retry_count, 1);
        assert!(retried.terminal_error.is_none());
    }

    #[tokio::test]
    async fn test_selection_round_trip() {
        let f = fixture(
            MockTags::new().with_track("/in/a.mp3", plain("X", "Y")),
            catalog_with(&["Y"]),
        );
        let ids = f.manager.enqueue(["/in/a.mp3"]).unwrap();
        let id = ids[0];
        f.manager.start().unwrap();

        let snapshot = f.manager.wait_settled().await;
        assert!(snapshot.waiting_for_selection);
        assert_eq!(snapshot.item(id).unwrap().status, TrackStatus::AwaitingSelection);

        let candidates = f.manager.list_candidates(id).unwrap();
        assert_eq!(candidates.len(), 1);
        assert!(matches!(
            f.manager.select_candidate(id, Selection::Candidate("missing".into())),
            Err(TaskError::UnknownCandidate { .. })
        ));
        assert!(matches!(
            f.manager.select_candidate(id, Selection::Embedded),
            Err(TaskError::NoEmbeddedArtwork(_))
        ));

        f.manager
            .select_candidate(id, Selection::Candidate(candidates[0].id.clone()))
            .unwrap();
        let snapshot = f.manager.wait_settled().await;

        assert_eq!(snapshot.state, JobState::Completed);
        let item = snapshot.item(id).unwrap();
        assert_eq!(item.status, TrackStatus::Completed);
        assert!(item.output_path.as_ref().unwrap().exists());
        assert_eq!(f.catalog.fetch_count(), 1);
        assert!(matches!(
            f.manager.select_candidate(id, Selection::Skip),
            Err(TaskError::NotAwaitingSelection(_))
        ));
        assert!(matches!(
            f.manager.list_candidates(TrackId(999)),
            Err(TaskError::UnknownItem(_))
        ));
    }

    #[tokio::test]
    async fn test_parked_item_does_not_block_later_items() {
        let f = fixture(
            MockTags::new()
                .with_track("/in/a.mp3", plain("X", "Y"))
                .with_track("/in/b.mp3", plain("X", "Nothing")),
            catalog_with(&["Y"]),
        );
        f.manager.enqueue(["/in/a.mp3", "/in/b.mp3"]).unwrap();
        f.manager.start().unwrap();

        let snapshot = f.manager.wait_settled().await;

        assert_eq!(
            statuses(&snapshot),
            vec![TrackStatus::AwaitingSelection, TrackStatus::Completed]
        );
        assert_eq!(snapshot.state, JobState::Running);
        assert_eq!(
            snapshot.current_operation.as_deref(),
            Some("Waiting for artwork selection")
        );
    }

    #[tokio::test]
    async fn test_cancel_keeps_completed_items() {
        let f = fixture(
            MockTags::new()
                .with_track("/in/a.mp3", plain("X", "Y"))
                .with_track("/in/b.mp3", plain("X", "Nothing")),
            catalog_with(&["Y"]),
        );
        let ids = f.manager.enqueue(["/in/a.mp3", "/in/b.mp3"]).unwrap();
        f.manager.start().unwrap();
        f.manager.wait_settled().await;

        f.manager.cancel().unwrap();
        let snapshot = f.manager.wait_for(|s| !s.worker_active).await;

        assert_eq!(snapshot.state, JobState::Cancelled);
        assert_eq!(snapshot.item(ids[0]).unwrap().status, TrackStatus::Cancelled);
        let done = snapshot.item(ids[1]).unwrap();
        assert_eq!(done.status, TrackStatus::Completed);
        assert!(done.output_path.is_some());

        assert!(matches!(
            f.manager.select_candidate(ids[0], Selection::Skip),
            Err(TaskError::NotAwaitingSelection(_))
        ));
        assert!(f.manager.start().is_err());
        assert!(f.manager.enqueue(["/in/c.mp3"]).is_err());
        assert_eq!(f.catalog.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_during_step_cancels_in_flight_item() {
        let (f, gate) = gated_fixture(
            MockTags::new()
                .with_track("/in/a.mp3", plain("X", "Y"))
                .with_track("/in/b.mp3", plain("X", "Nothing")),
            catalog_with(&["Y"]),
        );
        let ids = f.manager.enqueue(["/in/a.mp3", "/in/b.mp3"]).unwrap();
        f.manager.start().unwrap();

        gate.entered.notified().await;
        let during = f.manager.status();
        assert_eq!(during.in_flight, Some(ids[0]));
        assert_eq!(during.item(ids[0]).unwrap().status, TrackStatus::SearchingArtwork);

        f.manager.cancel().unwrap();
        // The in-flight item is left to its step
        let cancelled = f.manager.status();
        assert_eq!(cancelled.item(ids[0]).unwrap().status, TrackStatus::SearchingArtwork);
        assert_eq!(cancelled.item(ids[1]).unwrap().status, TrackStatus::Cancelled);

        gate.release.notify_one();
        let snapshot = f.manager.wait_for(|s| !s.worker_active).await;

        assert_eq!(snapshot.state, JobState::Cancelled);
        assert_eq!(
            statuses(&snapshot),
            vec![TrackStatus::Cancelled, TrackStatus::Cancelled]
        );
        assert!(snapshot.items.iter().all(|i| i.output_path.is_none()));
        assert!(snapshot.in_flight.is_none());
        // The step itself ran to completion
        assert_eq!(snapshot.item(ids[0]).unwrap().candidates.len(), 1);
        assert_eq!(gate.inner.queries.lock().len(), 1);
        assert_eq!(f.tags.read_count(Path::new("/in/b.mp3")), 0);
    }

    #[tokio::test]
    async fn test_pause_during_step_lets_it_finish() {
        let (f, gate) = gated_fixture(
            MockTags::new()
                .with_track("/in/a.mp3", plain("X", "Y"))
                .with_track("/in/b.mp3", plain("X", "Nothing")),
            catalog_with(&["Y"]),
        );
        let ids = f.manager.enqueue(["/in/a.mp3", "/in/b.mp3"]).unwrap();
        f.manager.start().unwrap();

        gate.entered.notified().await;
        f.manager.pause().unwrap();
        assert!(!f.manager.status().is_settled());

        gate.release.notify_one();
        let held = f.manager.wait_settled().await;

        assert_eq!(held.state, JobState::Paused);
        assert!(held.in_flight.is_none());
        let first = held.item(ids[0]).unwrap();
        assert_eq!(first.status, TrackStatus::AwaitingSelection);
        assert_eq!(first.candidates.len(), 1);
        assert_eq!(held.item(ids[1]).unwrap().status, TrackStatus::Pending);
        assert_eq!(f.tags.read_count(Path::new("/in/b.mp3")), 0);

        f.manager.resume().unwrap();
        let snapshot = f.manager.wait_settled().await;

        assert_eq!(
            statuses(&snapshot),
            vec![TrackStatus::AwaitingSelection, TrackStatus::Completed]
        );
        assert_eq!(f.tags.read_count(Path::new("/in/b.mp3")), 1);
    }

    #[tokio::test]
    async fn test_cancel_before_start() {
        let f = fixture(MockTags::new(), MockCatalog::no_matches());
        f.manager.enqueue(["/in/a.mp3", "/in/b.mp3"]).unwrap();

        f.manager.cancel().unwrap();

        let snapshot = f.manager.status();
        assert_eq!(snapshot.count(TrackStatus::Cancelled), 2);
        assert!(f.manager.retry_failed().is_err());
        assert!(f.manager.cancel().is_ok());
    }

    #[tokio::test]
    async fn test_pause_then_resume_matches_uninterrupted_run() {
        let build = || {
            fixture(
                MockTags::new()
                    .with_track("/in/a.mp3", plain("X", "Nothing"))
                    .with_track("/in/b.mp3", plain("X", "Y"))
                    .with_corrupt("/in/c.mp3"),
                catalog_with(&["Y"]),
            )
        };
        let paths = ["/in/a.mp3", "/in/b.mp3", "/in/c.mp3"];

        let reference = build();
        reference.manager.enqueue(paths).unwrap();
        reference.manager.start().unwrap();
        let expected = reference.manager.wait_settled().await;

        let paused = build();
        paused.manager.enqueue(paths).unwrap();
        paused.manager.start().unwrap();
        paused.manager.pause().unwrap();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        let held = paused.manager.wait_settled().await;
        assert_eq!(held.state, JobState::Paused);
        assert_eq!(held.count(TrackStatus::Pending), 3);

        paused.manager.resume().unwrap();
        let actual = paused.manager.wait_settled().await;

        assert_eq!(actual.state, expected.state);
        assert_eq!(statuses(&actual), statuses(&expected));
        for (a, e) in actual.items.iter().zip(&expected.items) {
            assert_eq!(a.id, e.id);
            assert_eq!(a.metadata, e.metadata);
            assert_eq!(a.candidates, e.candidates);
            assert_eq!(a.selection, e.selection);
            assert_eq!(a.errors.len(), e.errors.len());
            assert_eq!(a.warnings.len(), e.warnings.len());
            assert_eq!(
                a.output_path.as_ref().map(|p| p.file_name().map(|n| n.to_owned())),
                e.output_path.as_ref().map(|p| p.file_name().map(|n| n.to_owned()))
            );
        }
    }

    #[tokio::test]
    async fn test_apply_strategy_answers_all_parked_items() {
        let f = fixture(
            MockTags::new()
                .with_track("/in/a.mp3", plain("X", "One"))
                .with_track("/in/b.mp3", plain("X", "Two")),
            catalog_with(&["One", "Two"]),
        );
        f.manager.enqueue(["/in/a.mp3", "/in/b.mp3"]).unwrap();
        f.manager.start().unwrap();
        let snapshot = f.manager.wait_settled().await;
        assert_eq!(snapshot.count(TrackStatus::AwaitingSelection), 2);

        assert_eq!(f.manager.apply_strategy(SelectionStrategy::PreferBestCandidate), 2);
        let snapshot = f.manager.wait_settled().await;

        assert_eq!(snapshot.state, JobState::Completed);
        assert_eq!(snapshot.count(TrackStatus::Completed), 2);
        assert_eq!(f.catalog.fetch_count(), 2);
        assert_eq!(f.manager.apply_strategy(SelectionStrategy::SmallestFile), 0);
    }

    #[tokio::test]
    async fn test_auto_strategy_never_parks() {
        let f = fixture(
            MockTags::new().with_track("/in/a.mp3", plain("X", "Y")),
            catalog_with(&["Y"]),
        );
        f.manager.set_auto_strategy(Some(SelectionStrategy::PreferEmbedded));
        f.manager.enqueue(["/in/a.mp3"]).unwrap();
        f.manager.start().unwrap();

        let snapshot = f.manager.wait_settled().await;

        assert_eq!(snapshot.state, JobState::Completed);
        assert_eq!(snapshot.auto_strategy, Some(SelectionStrategy::PreferEmbedded));
        assert_eq!(
            snapshot.items[0].selection,
            Some(Selection::Candidate("cover-Y".to_string()))
        );
    }

    #[tokio::test]
    async fn test_unusable_output_aborts_job() {
        let f = fixture_at(
            MockTags::new()
                .with_track("/in/a.mp3", plain("X", "Y"))
                .with_track("/in/b.mp3", plain("X", "Z")),
            MockCatalog::no_matches(),
            |root| {
                let blocker = root.join("out");
                std::fs::write(&blocker, b"not a directory").unwrap();
                blocker
            },
        );
        f.manager.enqueue(["/in/a.mp3", "/in/b.mp3"]).unwrap();
        f.manager.start().unwrap();

        let snapshot = f.manager.wait_settled().await;

        assert_eq!(snapshot.state, JobState::Cancelled);
        assert_eq!(snapshot.count(TrackStatus::Cancelled), 2);
        assert_eq!(snapshot.by_severity[&Severity::Critical], 1);
        assert_eq!(snapshot.by_category[&ErrorCategory::SystemError], 1);
        assert_eq!(f.tags.read_count(Path::new("/in/a.mp3")), 0);
    }

    #[tokio::test]
    async fn test_status_snapshot_counts() {
        let f = fixture(
            MockTags::new()
                .with_track("/in/a.mp3", plain("X", "Y"))
                .with_corrupt("/in/b.mp3"),
            MockCatalog::no_matches(),
        );
        f.manager.enqueue(["/in/a.mp3", "/in/b.mp3"]).unwrap();

        let idle = f.manager.status();
        assert_eq!(idle.state, JobState::Idle);
        assert_eq!(idle.total_count, 2);
        assert_eq!(idle.count(TrackStatus::Pending), 2);
        assert_eq!(idle.processed_count, 0);
        assert_eq!(idle.elapsed, Duration::ZERO);
        assert!(idle.estimated_remaining.is_none());
        assert!(idle.is_settled());

        f.manager.start().unwrap();
        let done = f.manager.wait_settled().await;

        assert_eq!(done.processed_count, 2);
        assert!(done.started_at.is_some());
        assert_eq!(done.by_severity[&Severity::High], 1);
        assert_eq!(done.by_severity[&Severity::Medium], 1);
        assert_eq!(done.by_category[&ErrorCategory::FileError], 1);
        assert_eq!(done.by_category[&ErrorCategory::ApiError], 1);
        assert!(done.current_operation.is_none());

        let json = serde_json::to_value(&done).unwrap();
        assert_eq!(json["state"], "Completed");
    }

    #[tokio::test]
    async fn test_export_error_log() {
        let f = fixture(
            MockTags::new()
                .with_corrupt("/in/bad.mp3")
                .with_track("/in/ok.mp3", plain("X", "Y")),
            MockCatalog::no_matches(),
        );
        f.manager.enqueue(["/in/bad.mp3", "/in/ok.mp3"]).unwrap();
        f.manager.start().unwrap();
        f.manager.wait_settled().await;

        let log = f.manager.export_error_log(f.manager.job_id()).unwrap();

        assert!(log.starts_with(&format!("Error log for {}", f.manager.job_id())));
        assert!(log.contains("Total records: 2"));
        assert!(log.contains("  critical 0"));
        assert!(log.contains("  high     1"));
        assert!(log.contains("  medium   1"));
        let high = log.find("[HIGH] [file] retries=0 #1 bad.mp3").unwrap();
        let medium = log.find("[MEDIUM] [api] retries=0 #2 ok.mp3").unwrap();
        assert!(high < medium);

        assert!(matches!(
            f.manager.export_error_log(JobId(u64::MAX)),
            Err(TaskError::UnknownJob(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_transitions() {
        let f = fixture(MockTags::new(), MockCatalog::no_matches());

        assert!(matches!(
            f.manager.pause(),
            Err(TaskError::InvalidState { action: "pause", state: JobState::Idle })
        ));
        assert!(f.manager.resume().is_err());

        f.manager.start().unwrap();
        assert!(f.manager.start().is_err());
        assert!(f.manager.resume().is_err());
        let snapshot = f.manager.wait_settled().await;
        assert_eq!(snapshot.state, JobState::Completed);
    }

    #[tokio::test]
    async fn test_enqueue_after_completion() {
        let f = fixture(
            MockTags::new()
                .with_track("/in/a.mp3", plain("X", "One"))
                .with_track("/in/b.mp3", plain("X", "Two")),
            MockCatalog::no_matches(),
        );
        f.manager.enqueue(["/in/a.mp3"]).unwrap();
        f.manager.start().unwrap();
        f.manager.wait_settled().await;

        f.manager.enqueue(["/in/b.mp3"]).unwrap();
        f.manager.start().unwrap();
        let snapshot = f.manager.wait_settled().await;

        assert_eq!(snapshot.count(TrackStatus::Completed), 2);
        assert_eq!(snapshot.items[1].id, TrackId(2));
    }
}
