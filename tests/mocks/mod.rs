//! Simulated collaborators for driving the batch controller end to end.
//!
//! All three share one [`ManualClock`]: runs appear and finish as virtual time
//! passes, comments become visible at their creation time, and the host can be
//! scheduled to report its own cancellation.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use batch_orchestrator::error::{OrchestratorError, Result};
use batch_orchestrator::models::{Actor, Comment, RemoteRun, RunConclusion, RunStatus};
use batch_orchestrator::orchestration::{
    Clock, CollaborationSurface, DispatchRequest, HostMonitor, HostRunState, JobExecutor,
    ManualClock, RunListQuery,
};

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
}

pub fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(start_time()))
}

/// How the executor treats the dispatch of one batch
#[derive(Debug, Clone)]
pub enum RunBehavior {
    /// Run appears after `appear_after` and completes `run_for` later
    Completes {
        appear_after: Duration,
        run_for: Duration,
        conclusion: RunConclusion,
    },
    /// Dispatch accepted, but no run is ever created
    NeverAppears,
    /// Run appears and never finishes
    RunsForever { appear_after: Duration },
    /// Dispatch rejected with an HTTP status
    RejectDispatch { status: u16 },
}

impl RunBehavior {
    pub fn succeeds_after(run_for: Duration) -> Self {
        Self::Completes {
            appear_after: Duration::from_secs(10),
            run_for,
            conclusion: RunConclusion::Success,
        }
    }
}

impl Default for RunBehavior {
    fn default() -> Self {
        Self::succeeds_after(Duration::from_secs(300))
    }
}

#[derive(Debug, Clone)]
struct SimulatedRun {
    id: u64,
    name: String,
    created_at: DateTime<Utc>,
    completes_at: Option<DateTime<Utc>>,
    conclusion: RunConclusion,
    cancelled_at: Option<DateTime<Utc>>,
}

impl SimulatedRun {
    fn view(&self, now: DateTime<Utc>) -> RemoteRun {
        let cancelled = self.cancelled_at.is_some_and(|at| at <= now);
        let finished = self.completes_at.is_some_and(|at| at <= now);
        let (status, conclusion) = if cancelled {
            (RunStatus::Completed, Some(RunConclusion::Cancelled))
        } else if finished {
            (RunStatus::Completed, Some(self.conclusion))
        } else if now - self.created_at < chrono::Duration::seconds(30) {
            (RunStatus::Queued, None)
        } else {
            (RunStatus::InProgress, None)
        };

        RemoteRun {
            id: self.id,
            name: Some(self.name.clone()),
            status,
            conclusion,
            html_url: format!("https://github.com/acme/migrations/actions/runs/{}", self.id),
            created_at: Some(self.created_at),
        }
    }
}

#[derive(Debug, Default)]
pub struct ExecutorState {
    pub dispatched: Vec<DispatchRequest>,
    pub cancelled: Vec<u64>,
    pub list_calls: u32,
    runs: Vec<SimulatedRun>,
}

/// Executor whose runs follow scripted behaviors on virtual time
pub struct SimulatedExecutor {
    clock: Arc<ManualClock>,
    behaviors: HashMap<usize, RunBehavior>,
    fail_listing: bool,
    state: Mutex<ExecutorState>,
}

impl SimulatedExecutor {
    pub fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            clock,
            behaviors: HashMap::new(),
            fail_listing: false,
            state: Mutex::new(ExecutorState::default()),
        }
    }

    pub fn with_behavior(mut self, batch_number: usize, behavior: RunBehavior) -> Self {
        self.behaviors.insert(batch_number, behavior);
        self
    }

    /// Every listing call fails
    pub fn with_failing_listing(mut self) -> Self {
        self.fail_listing = true;
        self
    }

    /// Add a run that has nothing to do with this orchestration
    pub fn with_foreign_run(self, name: &str, status: RunStatus) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let id = 10_000 + state.runs.len() as u64;
            let now = self.clock.now();
            state.runs.push(SimulatedRun {
                id,
                name: name.to_string(),
                created_at: now - chrono::Duration::minutes(5),
                completes_at: (status == RunStatus::Completed).then_some(now),
                conclusion: RunConclusion::Success,
                cancelled_at: None,
            });
        }
        self
    }

    pub fn dispatched_batches(&self) -> Vec<usize> {
        self.state
            .lock()
            .unwrap()
            .dispatched
            .iter()
            .map(|request| request.client_payload.batch.batch_number)
            .collect()
    }

    pub fn cancelled_runs(&self) -> Vec<u64> {
        self.state.lock().unwrap().cancelled.clone()
    }

    /// Run id created for a batch, if any
    pub fn run_id_for(&self, batch_number: usize) -> Option<u64> {
        let state = self.state.lock().unwrap();
        state
            .runs
            .iter()
            .find(|run| run.name.starts_with(&format!("Migration Batch {batch_number} ")))
            .map(|run| run.id)
    }
}

#[async_trait]
impl JobExecutor for SimulatedExecutor {
    fn executor_name(&self) -> &'static str {
        "simulated"
    }

    async fn dispatch(&self, request: &DispatchRequest) -> Result<()> {
        let batch = &request.client_payload.batch;
        let behavior = self
            .behaviors
            .get(&batch.batch_number)
            .cloned()
            .unwrap_or_default();

        if let RunBehavior::RejectDispatch { status } = behavior {
            return Err(OrchestratorError::api_error(status, "Server Error"));
        }

        let now = self.clock.now();
        let mut state = self.state.lock().unwrap();
        state.dispatched.push(request.clone());

        let (appear_after, completes_after, conclusion) = match behavior {
            RunBehavior::Completes {
                appear_after,
                run_for,
                conclusion,
            } => (appear_after, Some(appear_after + run_for), conclusion),
            RunBehavior::RunsForever { appear_after } => {
                (appear_after, None, RunConclusion::Success)
            }
            RunBehavior::NeverAppears | RunBehavior::RejectDispatch { .. } => return Ok(()),
        };

        let to_chrono = |d: Duration| chrono::Duration::from_std(d).unwrap();
        let id = 1_000 + state.runs.len() as u64;
        state.runs.push(SimulatedRun {
            id,
            name: batch.correlation_token.run_name(batch.batch_number),
            created_at: now + to_chrono(appear_after),
            completes_at: completes_after.map(|d| now + to_chrono(d)),
            conclusion,
            cancelled_at: None,
        });
        Ok(())
    }

    async fn list_runs(&self, query: &RunListQuery) -> Result<Vec<RemoteRun>> {
        let now = self.clock.now();
        let mut state = self.state.lock().unwrap();
        state.list_calls += 1;

        if self.fail_listing {
            return Err(OrchestratorError::api_error(502, "Bad Gateway"));
        }

        let mut runs: Vec<RemoteRun> = state
            .runs
            .iter()
            .filter(|run| run.created_at <= now)
            .map(|run| run.view(now))
            .filter(|run| query.status.map_or(true, |status| run.status == status))
            .collect();
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        runs.truncate(query.per_page as usize);
        Ok(runs)
    }

    async fn cancel_run(&self, run_id: u64) -> Result<()> {
        let now = self.clock.now();
        let mut state = self.state.lock().unwrap();
        state.cancelled.push(run_id);
        if let Some(run) = state.runs.iter_mut().find(|run| run.id == run_id) {
            run.cancelled_at = Some(now);
        }
        Ok(())
    }
}

/// Host of the orchestrator, optionally cancelled at a point in virtual time
pub struct SimulatedHost {
    clock: Arc<ManualClock>,
    cancelled_at: Mutex<Option<DateTime<Utc>>>,
    failing: bool,
}

impl SimulatedHost {
    pub fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            clock,
            cancelled_at: Mutex::new(None),
            failing: false,
        }
    }

    pub fn cancel_at(&self, at: DateTime<Utc>) {
        *self.cancelled_at.lock().unwrap() = Some(at);
    }

    pub fn with_failures(mut self) -> Self {
        self.failing = true;
        self
    }
}

#[async_trait]
impl HostMonitor for SimulatedHost {
    async fn own_run_state(&self) -> Result<HostRunState> {
        if self.failing {
            return Err(OrchestratorError::api_error(500, "host unavailable"));
        }
        let cancelled = self
            .cancelled_at
            .lock()
            .unwrap()
            .is_some_and(|at| at <= self.clock.now());
        Ok(HostRunState {
            status: if cancelled { "cancelled" } else { "in_progress" }.to_string(),
            conclusion: None,
        })
    }
}

/// Issue thread: records posted notices, serves scripted requester comments
pub struct SimulatedSurface {
    clock: Arc<ManualClock>,
    incoming: Mutex<Vec<Comment>>,
    posted: Mutex<Vec<String>>,
    fail_posts: bool,
}

impl SimulatedSurface {
    pub fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            clock,
            incoming: Mutex::new(Vec::new()),
            posted: Mutex::new(Vec::new()),
            fail_posts: false,
        }
    }

    /// Posting always fails
    pub fn with_failing_posts(mut self) -> Self {
        self.fail_posts = true;
        self
    }

    /// A comment by `author` that becomes visible at `at`
    pub fn comment_at(&self, at: DateTime<Utc>, author: Actor, body: &str) {
        let mut incoming = self.incoming.lock().unwrap();
        let id = incoming.len() as u64 + 1;
        incoming.push(Comment {
            id,
            body: body.to_string(),
            user: author,
            created_at: at,
        });
    }

    pub fn posted(&self) -> Vec<String> {
        self.posted.lock().unwrap().clone()
    }

    /// Posted notices whose body contains `needle`
    pub fn posted_matching(&self, needle: &str) -> Vec<String> {
        self.posted()
            .into_iter()
            .filter(|body| body.contains(needle))
            .collect()
    }
}

#[async_trait]
impl CollaborationSurface for SimulatedSurface {
    async fn post_comment(&self, body: &str) -> Result<()> {
        if self.fail_posts {
            return Err(OrchestratorError::api_error(403, "Resource not accessible"));
        }
        self.posted.lock().unwrap().push(body.to_string());
        Ok(())
    }

    async fn list_comments_since(&self, since: DateTime<Utc>) -> Result<Vec<Comment>> {
        let now = self.clock.now();
        Ok(self
            .incoming
            .lock()
            .unwrap()
            .iter()
            .filter(|comment| comment.created_at >= since && comment.created_at <= now)
            .cloned()
            .collect())
    }
}

/// Everything a controller test needs, wired to one clock
pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub executor: Arc<SimulatedExecutor>,
    pub host: Arc<SimulatedHost>,
    pub surface: Arc<SimulatedSurface>,
}

impl Harness {
    pub fn new(configure: impl FnOnce(SimulatedExecutor) -> SimulatedExecutor) -> Self {
        let clock = clock();
        Self {
            executor: Arc::new(configure(SimulatedExecutor::new(clock.clone()))),
            host: Arc::new(SimulatedHost::new(clock.clone())),
            surface: Arc::new(SimulatedSurface::new(clock.clone())),
            clock,
        }
    }

    pub fn with_host(mut self, host: SimulatedHost) -> Self {
        self.host = Arc::new(host);
        self
    }

    pub fn with_surface(mut self, surface: SimulatedSurface) -> Self {
        self.surface = Arc::new(surface);
        self
    }

    pub fn controller(
        &self,
        config: &batch_orchestrator::OrchestratorConfig,
    ) -> batch_orchestrator::BatchController {
        batch_orchestrator::BatchController::new(
            config,
            self.executor.clone(),
            self.host.clone(),
            self.surface.clone(),
        )
        .with_clock(self.clock.clone())
    }
}
