//! # Orchestration State
//!
//! Explicit state carried through the orchestration loop: the per-batch phase
//! machine, the pure locate-and-poll transition function, and the
//! process-scoped record of what happened to every batch. Nothing here touches
//! a timer or the network, so every transition is unit-testable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::TimingConfig;
use crate::models::{Batch, CorrelationToken, RemoteRun, RunConclusion};
use crate::orchestration::cancellation::CancellationSignal;

/// Phase of one batch inside the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchPhase {
    /// Not yet dispatched
    Pending,
    /// Dispatch accepted, waiting out the grace period
    Dispatched,
    /// Polling for the run to appear
    Locating,
    /// Run located, polling for completion
    Polling,
    /// Run reached `completed`
    Completed,
    /// Run never appeared within the discovery window
    NotFoundTimeout,
    /// Outer polling ceiling exceeded
    PollTimeout,
}

impl BatchPhase {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::NotFoundTimeout | Self::PollTimeout
        )
    }
}

impl fmt::Display for BatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Dispatched => write!(f, "dispatched"),
            Self::Locating => write!(f, "locating"),
            Self::Polling => write!(f, "polling"),
            Self::Completed => write!(f, "completed"),
            Self::NotFoundTimeout => write!(f, "not_found_timeout"),
            Self::PollTimeout => write!(f, "poll_timeout"),
        }
    }
}

/// How the locate-and-poll loop for one batch ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchTermination {
    Completed(RemoteRun),
    /// No run ever matched the token
    Abandoned { attempts: u32 },
    /// Ceiling reached; the last observed run, if any, may still be running
    TimedOut { tracked_run: Option<RemoteRun> },
}

impl BatchTermination {
    pub fn phase(&self) -> BatchPhase {
        match self {
            Self::Completed(_) => BatchPhase::Completed,
            Self::Abandoned { .. } => BatchPhase::NotFoundTimeout,
            Self::TimedOut { .. } => BatchPhase::PollTimeout,
        }
    }
}

/// Periodic progress notices due on a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressNotice {
    Heartbeat,
    StillProcessing,
}

/// Locate-and-poll loop state for the batch in flight
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollState {
    pub attempts: u32,
    pub phase: BatchPhase,
    pub tracked_run: Option<RemoteRun>,
}

/// Result of feeding one observation into [`PollState::observe`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStep {
    Continue(PollState),
    Finished(BatchTermination),
}

impl Default for PollState {
    fn default() -> Self {
        Self::new()
    }
}

impl PollState {
    pub fn new() -> Self {
        Self {
            attempts: 0,
            phase: BatchPhase::Locating,
            tracked_run: None,
        }
    }

    /// Start the next tick
    pub fn next_attempt(mut self) -> Self {
        self.attempts += 1;
        self
    }

    pub fn run_located(&self) -> bool {
        self.tracked_run.is_some()
    }

    /// Cancellation is re-checked every `cancellation_check_every` ticks
    pub fn cancellation_check_due(&self, timing: &TimingConfig) -> bool {
        self.attempts > 0 && self.attempts % timing.cancellation_check_every == 0
    }

    /// Whether the missing run deserves a warning on this tick
    pub fn not_found_warning_due(&self, timing: &TimingConfig) -> bool {
        !self.run_located() && self.attempts > timing.not_found_warning_after
    }

    /// Apply this tick's lookup result
    pub fn observe(mut self, observation: Option<RemoteRun>, timing: &TimingConfig) -> PollStep {
        match observation {
            Some(run) if run.is_completed() => {
                return PollStep::Finished(BatchTermination::Completed(run));
            }
            Some(run) => {
                self.phase = BatchPhase::Polling;
                self.tracked_run = Some(run);
            }
            None if !self.run_located() && self.attempts > timing.abandon_after => {
                return PollStep::Finished(BatchTermination::Abandoned {
                    attempts: self.attempts,
                });
            }
            // A located run missing from one listing page keeps its last view
            None => {}
        }

        if self.attempts >= timing.max_poll_attempts {
            return PollStep::Finished(BatchTermination::TimedOut {
                tracked_run: self.tracked_run,
            });
        }

        PollStep::Continue(self)
    }

    /// Progress notices due after a tick that did not finish the batch
    pub fn notices_due(&self, timing: &TimingConfig) -> Vec<ProgressNotice> {
        let mut notices = Vec::new();
        if self.attempts % timing.heartbeat_every == 0 {
            notices.push(ProgressNotice::Heartbeat);
        }
        if self.attempts % timing.still_processing_every == 0 {
            notices.push(ProgressNotice::StillProcessing);
        }
        notices
    }

    /// Human-readable status for progress notices
    pub fn status_description(&self) -> String {
        match &self.tracked_run {
            Some(run) => format!("workflow {}", run.status),
            None => "waiting for workflow to start".to_string(),
        }
    }
}

/// Final outcome of one batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BatchOutcome {
    Completed {
        conclusion: RunConclusion,
        run_id: u64,
        run_url: String,
    },
    DispatchFailed {
        status: Option<u16>,
        error: String,
    },
    Abandoned,
    TimedOut {
        run_url: Option<String>,
    },
}

impl BatchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            Self::Completed {
                conclusion: RunConclusion::Success,
                ..
            }
        )
    }

    /// Whether the remote run is known to have finished (or never existed)
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::DispatchFailed { .. })
    }
}

impl From<&BatchTermination> for BatchOutcome {
    fn from(termination: &BatchTermination) -> Self {
        match termination {
            BatchTermination::Completed(run) => Self::Completed {
                conclusion: run.outcome().unwrap_or(RunConclusion::Failure),
                run_id: run.id,
                run_url: run.html_url.clone(),
            },
            BatchTermination::Abandoned { .. } => Self::Abandoned,
            BatchTermination::TimedOut { tracked_run } => Self::TimedOut {
                run_url: tracked_run.as_ref().map(|run| run.html_url.clone()),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRecord {
    pub batch_number: usize,
    pub correlation_token: CorrelationToken,
    pub repositories: usize,
    pub outcome: BatchOutcome,
    pub elapsed_seconds: u64,
}

/// Why and where an orchestration stopped early
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancellationStop {
    pub signal: CancellationSignal,
    pub stopped_at_batch: usize,
    pub completed_batches: usize,
    pub remaining_batches: usize,
    /// Whether the stopping batch had already been dispatched
    pub during_batch: bool,
}

/// Process-scoped state of one orchestration run
#[derive(Debug, Clone)]
pub struct OrchestrationState {
    pub started_at: DateTime<Utc>,
    pub total_batches: usize,
    pub current_batch: usize,
    pub records: Vec<BatchRecord>,
    pub dispatch_failures: u32,
    pub stop: Option<CancellationStop>,
}

impl OrchestrationState {
    pub fn new(started_at: DateTime<Utc>, total_batches: usize) -> Self {
        Self {
            started_at,
            total_batches,
            current_batch: 0,
            records: Vec::with_capacity(total_batches),
            dispatch_failures: 0,
            stop: None,
        }
    }

    pub fn record(&mut self, record: BatchRecord) {
        if matches!(record.outcome, BatchOutcome::DispatchFailed { .. }) {
            self.dispatch_failures += 1;
        }
        self.records.push(record);
    }

    /// Stop before the batch at `index` (0-based) finished
    pub fn stop_at(&mut self, index: usize, signal: CancellationSignal, during_batch: bool) {
        self.stop = Some(CancellationStop {
            signal,
            stopped_at_batch: index + 1,
            completed_batches: index,
            remaining_batches: self.total_batches.saturating_sub(index),
            during_batch,
        });
    }

    /// Tokens of batches from `index` on, plus earlier batches whose run may still be live
    pub fn unsettled_tokens<'a>(
        &self,
        batches: &'a [Batch],
        index: usize,
    ) -> Vec<&'a CorrelationToken> {
        batches
            .iter()
            .enumerate()
            .filter(|(i, batch)| {
                *i >= index
                    || self
                        .records
                        .iter()
                        .any(|r| r.batch_number == batch.batch_number && !r.outcome.is_settled())
            })
            .map(|(_, batch)| &batch.correlation_token)
            .collect()
    }

    pub fn into_report(self, finished_at: DateTime<Utc>) -> OrchestrationReport {
        OrchestrationReport {
            started_at: self.started_at,
            finished_at,
            total_batches: self.total_batches,
            records: self.records,
            stop: self.stop,
        }
    }
}

/// Summary handed to the final-report collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestrationReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total_batches: usize,
    pub records: Vec<BatchRecord>,
    pub stop: Option<CancellationStop>,
}

impl OrchestrationReport {
    pub fn was_cancelled(&self) -> bool {
        self.stop.is_some()
    }

    pub fn succeeded(&self) -> usize {
        self.records.iter().filter(|r| r.outcome.is_success()).count()
    }

    /// Batches that ran to an unsuccessful conclusion or never dispatched
    pub fn failed(&self) -> usize {
        self.records
            .iter()
            .filter(|r| match &r.outcome {
                BatchOutcome::Completed { conclusion, .. } => !conclusion.is_success(),
                BatchOutcome::DispatchFailed { .. } => true,
                _ => false,
            })
            .count()
    }

    /// Batches whose final state is unknown (abandoned or timed out)
    pub fn unknown(&self) -> usize {
        self.records
            .iter()
            .filter(|r| matches!(r.outcome, BatchOutcome::Abandoned | BatchOutcome::TimedOut { .. }))
            .count()
    }

    pub fn record_for(&self, batch_number: usize) -> Option<&BatchRecord> {
        self.records.iter().find(|r| r.batch_number == batch_number)
    }
}
