use crate::error::IngestError;
use crate::orchestrator::{IngestRequest, IngestionOrchestrator, RunPhase};
use crate::report::RunReport;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    Ingest,
    Clear,
}

/// Snapshot of a background run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunStatus {
    pub id: Uuid,
    pub kind: RunKind,
    pub phase: RunPhase,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub report: Option<RunReport>,
    pub deleted: Option<u64>,
    pub error: Option<String>,
}

impl RunStatus {
    fn new(id: Uuid, kind: RunKind) -> Self {
        Self {
            id,
            kind,
            phase: RunPhase::Idle,
            started_at: Utc::now(),
            finished_at: None,
            report: None,
            deleted: None,
            error: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }
}

/// Finished runs kept for status queries before the oldest are evicted.
pub const DEFAULT_RUN_HISTORY: usize = 64;

/// Runs ingestion and clear operations in the background, one at a time.
///
/// A clear racing a rebuild could delete documents the rebuild just wrote, so
/// every kind of run shares the same single slot.
#[derive(Clone)]
pub struct RunManager {
    orchestrator: Arc<IngestionOrchestrator>,
    active: Arc<Mutex<Option<Uuid>>>,
    runs: Arc<RwLock<RunRegistry>>,
    history: usize,
}

/// Statuses of admitted runs, with their admission order for eviction.
#[derive(Default)]
struct RunRegistry {
    statuses: HashMap<Uuid, watch::Receiver<RunStatus>>,
    order: VecDeque<Uuid>,
}

impl RunRegistry {
    fn insert(&mut self, id: Uuid, status: watch::Receiver<RunStatus>) {
        self.statuses.insert(id, status);
        self.order.push_back(id);
    }

    fn get(&self, id: &Uuid) -> Option<&watch::Receiver<RunStatus>> {
        self.statuses.get(id)
    }

    /// Drops finished runs, oldest first, until at most `keep` remain.
    fn evict_finished(&mut self, keep: usize) {
        let finished = self
            .statuses
            .values()
            .filter(|status| status.borrow().is_finished())
            .count();
        let mut excess = finished.saturating_sub(keep);
        if excess == 0 {
            return;
        }
        debug!(evicted = excess, "evicting finished runs");

        let statuses = &mut self.statuses;
        self.order.retain(|id| {
            let done = statuses
                .get(id)
                .map_or(true, |status| status.borrow().is_finished());
            if excess > 0 && done {
                statuses.remove(id);
                excess -= 1;
                return false;
            }
            true
        });
    }
}

/// Holds the active slot and the status sender of one background run.
///
/// Dropping it without [`RunGuard::complete`], which happens when the task
/// panics, frees the slot and marks the run failed.
struct RunGuard {
    active: Arc<Mutex<Option<Uuid>>>,
    id: Uuid,
    status: watch::Sender<RunStatus>,
}

impl RunGuard {
    fn release(&self) {
        let mut active = self.active.lock();
        if *active == Some(self.id) {
            *active = None;
        }
    }

    /// Frees the slot, then publishes the final status.
    fn complete(self, update: impl FnOnce(&mut RunStatus)) {
        self.release();
        self.status.send_modify(|current| {
            update(current);
            current.finished_at = Some(Utc::now());
        });
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.release();
        if self.status.borrow().is_finished() {
            return;
        }

        error!(run = %self.id, "run ended without reporting an outcome");
        self.status.send_modify(|current| {
            current.phase = RunPhase::Failed;
            current.error = Some("run ended unexpectedly".to_string());
            current.finished_at = Some(Utc::now());
        });
    }
}

impl RunManager {
    pub fn new(orchestrator: Arc<IngestionOrchestrator>) -> Self {
        Self {
            orchestrator,
            active: Arc::new(Mutex::new(None)),
            runs: Arc::new(RwLock::new(RunRegistry::default())),
            history: DEFAULT_RUN_HISTORY,
        }
    }

    /// Caps how many finished runs stay queryable.
    pub fn with_history(mut self, history: usize) -> Self {
        self.history = history;
        self
    }

    pub fn active(&self) -> Option<Uuid> {
        *self.active.lock()
    }

    pub fn start_ingest(&self, request: IngestRequest) -> Result<Uuid, IngestError> {
        let guard = self.admit(RunKind::Ingest)?;
        let id = guard.id;
        let orchestrator = self.orchestrator.clone();

        tokio::spawn(async move {
            let outcome = orchestrator
                .run_observed(&request, |phase| {
                    guard.status.send_modify(|current| current.phase = phase);
                })
                .await;

            guard.complete(|current| match outcome {
                Ok(report) => {
                    info!(run = %id, indexed = report.indexed(), failed = report.failures.len(), "ingestion run finished");
                    current.report = Some(report);
                }
                Err(failure) => {
                    error!(run = %id, error = %failure, "ingestion run failed");
                    current.phase = RunPhase::Failed;
                    current.error = Some(failure.to_string());
                }
            });
        });

        Ok(id)
    }

    pub fn start_clear(&self) -> Result<Uuid, IngestError> {
        let guard = self.admit(RunKind::Clear)?;
        let id = guard.id;
        let orchestrator = self.orchestrator.clone();

        tokio::spawn(async move {
            guard
                .status
                .send_modify(|current| current.phase = RunPhase::Clearing);
            let outcome = orchestrator.lifecycle().clear().await;

            guard.complete(|current| match outcome {
                Ok(deleted) => {
                    current.phase = RunPhase::Completed;
                    current.deleted = Some(deleted);
                }
                Err(failure) => {
                    error!(run = %id, error = %failure, "clear run failed");
                    current.phase = RunPhase::Failed;
                    current.error = Some(failure.to_string());
                }
            });
        });

        Ok(id)
    }

    pub fn status(&self, id: Uuid) -> Option<RunStatus> {
        self.runs.read().get(&id).map(|status| status.borrow().clone())
    }

    /// Waits until the run has finished and returns its final status.
    pub async fn wait(&self, id: Uuid) -> Option<RunStatus> {
        let mut receiver = self.runs.read().get(&id).cloned()?;
        // A closed channel means the task is gone; report what it left behind.
        let _ = receiver.wait_for(RunStatus::is_finished).await;

        let status = receiver.borrow().clone();
        Some(status)
    }

    fn admit(&self, kind: RunKind) -> Result<RunGuard, IngestError> {
        let mut active = self.active.lock();
        if let Some(current) = *active {
            return Err(IngestError::RunInProgress(current));
        }

        let id = Uuid::new_v4();
        *active = Some(id);
        drop(active);

        let (sender, receiver) = watch::channel(RunStatus::new(id, kind));
        let mut runs = self.runs.write();
        runs.evict_finished(self.history);
        runs.insert(id, receiver);
        drop(runs);
        info!(run = %id, ?kind, "run admitted");

        Ok(RunGuard {
            active: self.active.clone(),
            id,
            status: sender,
        })
    }
}
