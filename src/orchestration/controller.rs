//! # Batch Orchestration Controller
//!
//! Drives batches strictly one at a time through
//! dispatch → grace wait → locate-and-poll → outcome, consulting the
//! cancellation monitor before every batch and periodically while polling.
//!
//! ## Per-batch flow
//!
//! ```text
//! Pending ──dispatch ok──▶ Dispatched ──grace──▶ Locating ──run seen──▶ Polling
//!    │                                              │                     │
//!    └─dispatch failed (next batch)                 ▼                     ▼
//!                                           NotFoundTimeout      Completed | PollTimeout
//! ```
//!
//! Every batch failure is recorded and reported, then the controller moves on.
//! The only early exit is cancellation, which is a normal (`Ok`) stop.

use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{OrchestratorConfig, TimingConfig};
use crate::constants::events;
use crate::error::{OrchestratorError, Result};
use crate::logging::log_batch_operation;
use crate::models::{Batch, CorrelationToken, RemoteRun, RunConclusion, RunStatus};
use crate::orchestration::cancellation::{CancellationMonitor, CancellationSignal};
use crate::orchestration::clock::{Clock, SystemClock};
use crate::orchestration::dispatcher::JobDispatcher;
use crate::orchestration::reporter::{BatchEvent, StatusReporter};
use crate::orchestration::run_locator::RunLocator;
use crate::orchestration::state::{
    BatchOutcome, BatchPhase, BatchRecord, BatchTermination, OrchestrationReport,
    OrchestrationState, PollState, PollStep, ProgressNotice,
};
use crate::orchestration::types::{
    CollaborationSurface, HostMonitor, JobExecutor, RunListQuery,
};

/// How processing of one batch ended, from the controller's point of view
enum BatchFlow {
    Finished(BatchRecord),
    Cancelled {
        signal: CancellationSignal,
        tracked_run: Option<RemoteRun>,
    },
}

pub struct BatchController {
    executor: Arc<dyn JobExecutor>,
    dispatcher: JobDispatcher,
    locator: RunLocator,
    monitor: CancellationMonitor,
    reporter: StatusReporter,
    clock: Arc<dyn Clock>,
    timing: TimingConfig,
}

impl BatchController {
    /// Wire a controller from configuration and the three external seams
    pub fn new(
        config: &OrchestratorConfig,
        executor: Arc<dyn JobExecutor>,
        host: Arc<dyn HostMonitor>,
        surface: Arc<dyn CollaborationSurface>,
    ) -> Self {
        let cancel_command = config.orchestration.cancel_command.clone();

        Self {
            dispatcher: JobDispatcher::new(
                executor.clone(),
                config.github.event_type.clone(),
                config.orchestration.run_id,
            ),
            locator: RunLocator::new(executor.clone(), config.timing.run_list_page_size),
            monitor: CancellationMonitor::new(host, surface.clone(), cancel_command.clone()),
            reporter: StatusReporter::new(surface, config.github.actions_url(), cancel_command),
            executor,
            clock: Arc::new(SystemClock),
            timing: config.timing.clone(),
        }
    }

    /// Replace the clock (virtual time in tests and simulations)
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn timing(&self) -> &TimingConfig {
        &self.timing
    }

    /// Process `batches` in order; returns the per-batch record of the run
    pub async fn run(&self, batches: &[Batch]) -> Result<OrchestrationReport> {
        self.timing
            .validate()
            .map_err(|e| OrchestratorError::fatal_config(e.to_string()))?;
        validate_sequence(batches)?;

        let mut state = OrchestrationState::new(self.clock.now(), batches.len());

        info!(
            started_at = %state.started_at.to_rfc3339(),
            total_batches = batches.len(),
            "Starting orchestration; only cancel commands issued after this time count"
        );

        for (index, batch) in batches.iter().enumerate() {
            state.current_batch = index;

            let signal = self.monitor.check(state.started_at).await;
            info!(
                batch_number = batch.batch_number,
                cancellation_requested = signal.is_requested(),
                "Pre-batch cancellation check"
            );
            if signal.is_requested() {
                self.reporter
                    .report(BatchEvent::CancelledBeforeBatch {
                        batch,
                        signal: &signal,
                        completed_batches: index,
                        remaining_batches: batches.len() - index,
                    })
                    .await;
                self.stop(&mut state, batches, index, signal, None, false)
                    .await;
                return Ok(state.into_report(self.clock.now()));
            }

            match self.process_batch(batch, &state).await {
                BatchFlow::Finished(record) => state.record(record),
                BatchFlow::Cancelled {
                    signal,
                    tracked_run,
                } => {
                    self.reporter
                        .report(BatchEvent::CancelledDuringBatch {
                            batch,
                            signal: &signal,
                        })
                        .await;
                    self.stop(&mut state, batches, index, signal, tracked_run, true)
                        .await;
                    return Ok(state.into_report(self.clock.now()));
                }
            }

            if index + 1 < batches.len() {
                debug!(
                    delay_seconds = self.timing.inter_batch_delay_seconds,
                    "Waiting before starting next batch"
                );
                self.clock.sleep(self.timing.inter_batch_delay()).await;
            }
        }

        info!(
            total_batches = batches.len(),
            dispatch_failures = state.dispatch_failures,
            "All batches processed"
        );

        Ok(state.into_report(self.clock.now()))
    }

    async fn process_batch(&self, batch: &Batch, state: &OrchestrationState) -> BatchFlow {
        let dispatched_at = self.clock.now();
        let mut phase = BatchPhase::Pending;

        self.reporter.report(BatchEvent::Started { batch }).await;

        if let Err(error) = self.dispatcher.dispatch(batch).await {
            log_batch_operation(
                events::BATCH_DISPATCH_FAILED,
                batch.batch_number,
                batch.total_batches,
                batch.correlation_token.as_str(),
                &phase.to_string(),
                Some(&error.to_string()),
            );
            self.reporter
                .report(BatchEvent::DispatchFailed {
                    batch,
                    error: &error,
                })
                .await;

            let status = match &error {
                OrchestratorError::Dispatch { status, .. } => *status,
                _ => None,
            };
            return BatchFlow::Finished(self.record(
                batch,
                BatchOutcome::DispatchFailed {
                    status,
                    error: error.to_string(),
                },
                dispatched_at,
            ));
        }

        phase = transition(batch, phase, BatchPhase::Dispatched);
        debug!(
            batch_number = batch.batch_number,
            grace_seconds = self.timing.grace_period_seconds,
            "Waiting for the executor to create the run"
        );
        self.clock.sleep(self.timing.grace_period()).await;
        phase = transition(batch, phase, BatchPhase::Locating);

        let mut poll = PollState::new();
        let termination = loop {
            poll = poll.next_attempt();

            if poll.cancellation_check_due(&self.timing) {
                let signal = self.monitor.check(state.started_at).await;
                if signal.is_requested() {
                    info!(
                        batch_number = batch.batch_number,
                        attempt = poll.attempts,
                        "Cancellation detected during batch wait"
                    );
                    return BatchFlow::Cancelled {
                        signal,
                        tracked_run: poll.tracked_run,
                    };
                }
            }

            self.clock.sleep(self.timing.poll_interval()).await;

            let observation = self
                .locator
                .find_by_correlation(&batch.correlation_token)
                .await;

            if let Some(run) = &observation {
                if !poll.run_located() {
                    log_batch_operation(
                        events::BATCH_RUN_LOCATED,
                        batch.batch_number,
                        batch.total_batches,
                        batch.correlation_token.as_str(),
                        &run.status.to_string(),
                        Some(&run.html_url),
                    );
                }
                if poll.attempts == 1 || poll.attempts % 10 == 0 {
                    debug!(
                        batch_number = batch.batch_number,
                        attempt = poll.attempts,
                        status = %run.status,
                        conclusion = ?run.conclusion,
                        "Batch run status"
                    );
                }
            } else if poll.not_found_warning_due(&self.timing) {
                warn!(
                    batch_number = batch.batch_number,
                    correlation_token = %batch.correlation_token,
                    waited_seconds = u64::from(poll.attempts) * self.timing.poll_interval_seconds,
                    "Run for batch not found yet"
                );
            }

            match poll.observe(observation, &self.timing) {
                PollStep::Continue(next) => {
                    if next.phase != phase {
                        phase = transition(batch, phase, next.phase);
                    }
                    poll = next;
                    self.emit_progress(batch, &poll).await;
                }
                PollStep::Finished(termination) => break termination,
            }
        };

        transition(batch, phase, termination.phase());
        self.finish_batch(batch, &termination, dispatched_at).await
    }

    async fn emit_progress(&self, batch: &Batch, poll: &PollState) {
        for notice in poll.notices_due(&self.timing) {
            let elapsed_minutes = self.timing.elapsed_minutes(poll.attempts);
            let status = poll.status_description();
            let event = match notice {
                ProgressNotice::Heartbeat => BatchEvent::Heartbeat {
                    batch,
                    elapsed_minutes,
                    status,
                },
                ProgressNotice::StillProcessing => BatchEvent::StillProcessing {
                    batch,
                    elapsed_minutes,
                    status,
                },
            };
            self.reporter.report(event).await;
        }
    }

    async fn finish_batch(
        &self,
        batch: &Batch,
        termination: &BatchTermination,
        dispatched_at: chrono::DateTime<chrono::Utc>,
    ) -> BatchFlow {
        let outcome = BatchOutcome::from(termination);
        let record = self.record(batch, outcome, dispatched_at);
        let duration_minutes = (record.elapsed_seconds + 30) / 60;

        match termination {
            BatchTermination::Completed(run) => {
                let conclusion = run.outcome().unwrap_or(RunConclusion::Failure);
                info!(
                    batch_number = batch.batch_number,
                    conclusion = %conclusion,
                    run_url = %run.html_url,
                    "Batch completed"
                );
                log_batch_operation(
                    events::BATCH_COMPLETED,
                    batch.batch_number,
                    batch.total_batches,
                    batch.correlation_token.as_str(),
                    &conclusion.to_string(),
                    Some(&run.html_url),
                );
                self.reporter
                    .report(BatchEvent::Completed {
                        batch,
                        run,
                        conclusion,
                        duration_minutes,
                    })
                    .await;
            }
            BatchTermination::Abandoned { attempts } => {
                warn!(
                    batch_number = batch.batch_number,
                    correlation_token = %batch.correlation_token,
                    attempts = attempts,
                    "Run never located; moving to next batch"
                );
                log_batch_operation(
                    events::BATCH_ABANDONED,
                    batch.batch_number,
                    batch.total_batches,
                    batch.correlation_token.as_str(),
                    "abandoned",
                    None,
                );
                self.reporter.report(BatchEvent::Abandoned { batch }).await;
            }
            BatchTermination::TimedOut { .. } => {
                let ceiling_seconds = u64::from(self.timing.max_poll_attempts)
                    * self.timing.poll_interval_seconds;
                warn!(
                    batch_number = batch.batch_number,
                    ceiling_seconds = ceiling_seconds,
                    "Batch exceeded the polling ceiling"
                );
                log_batch_operation(
                    events::BATCH_TIMED_OUT,
                    batch.batch_number,
                    batch.total_batches,
                    batch.correlation_token.as_str(),
                    "timed_out",
                    None,
                );
                self.reporter
                    .report(BatchEvent::TimedOut {
                        batch,
                        ceiling_hours: (ceiling_seconds + 1800) / 3600,
                    })
                    .await;
            }
        }

        BatchFlow::Finished(record)
    }

    fn record(
        &self,
        batch: &Batch,
        outcome: BatchOutcome,
        dispatched_at: chrono::DateTime<chrono::Utc>,
    ) -> BatchRecord {
        let elapsed = self.clock.now() - dispatched_at;
        BatchRecord {
            batch_number: batch.batch_number,
            correlation_token: batch.correlation_token.clone(),
            repositories: batch.len(),
            outcome,
            elapsed_seconds: u64::try_from(elapsed.num_seconds()).unwrap_or(0),
        }
    }

    /// Record the stop and request cancellation of runs that may still be live
    async fn stop(
        &self,
        state: &mut OrchestrationState,
        batches: &[Batch],
        index: usize,
        signal: CancellationSignal,
        tracked_run: Option<RemoteRun>,
        during_batch: bool,
    ) {
        log_batch_operation(
            events::ORCHESTRATION_CANCELLED,
            batches[index].batch_number,
            batches.len(),
            batches[index].correlation_token.as_str(),
            if during_batch {
                "cancelled_during_batch"
            } else {
                "cancelled_before_batch"
            },
            None,
        );

        let tokens = state.unsettled_tokens(batches, index);
        self.cancel_outstanding_runs(&tokens, tracked_run).await;
        state.stop_at(index, signal, during_batch);
    }

    /// Best-effort: errors are logged, nothing waits for the runs to stop
    async fn cancel_outstanding_runs(
        &self,
        tokens: &[&CorrelationToken],
        tracked_run: Option<RemoteRun>,
    ) {
        let mut run_ids: HashSet<u64> = HashSet::new();

        if let Some(run) = tracked_run.filter(|run| !run.is_completed()) {
            run_ids.insert(run.id);
        }

        for status in [RunStatus::Queued, RunStatus::InProgress] {
            let query = RunListQuery::with_status(status, self.timing.run_list_page_size);
            match self.executor.list_runs(&query).await {
                Ok(runs) => run_ids.extend(
                    runs.into_iter()
                        .filter(|run| {
                            run.name.as_deref().is_some_and(|name| {
                                tokens.iter().any(|token| token.matches_run_name(name))
                            })
                        })
                        .map(|run| run.id),
                ),
                Err(e) => warn!(
                    status = %status,
                    error = %e,
                    "Failed to list runs for cancellation"
                ),
            }
        }

        info!(
            runs = run_ids.len(),
            "Requesting cancellation of outstanding batch runs"
        );

        let results = join_all(run_ids.iter().map(|id| async move {
            (*id, self.executor.cancel_run(*id).await)
        }))
        .await;

        for (run_id, result) in results {
            match result {
                Ok(()) => info!(run_id = run_id, "Cancelled batch run"),
                Err(e) => warn!(run_id = run_id, error = %e, "Failed to cancel batch run"),
            }
        }
    }
}

impl std::fmt::Debug for BatchController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchController")
            .field("dispatcher", &self.dispatcher)
            .field("locator", &self.locator)
            .field("timing", &self.timing)
            .finish_non_exhaustive()
    }
}

fn transition(batch: &Batch, from: BatchPhase, to: BatchPhase) -> BatchPhase {
    debug!(
        batch_number = batch.batch_number,
        from = %from,
        to = %to,
        "Batch phase transition"
    );
    to
}

/// Batches must arrive 1..=N in order with consistent totals
fn validate_sequence(batches: &[Batch]) -> Result<()> {
    for (index, batch) in batches.iter().enumerate() {
        if batch.batch_number != index + 1 {
            return Err(OrchestratorError::invalid_input(format!(
                "batch at position {} has number {}",
                index + 1,
                batch.batch_number
            )));
        }
        if batch.total_batches != batches.len() {
            return Err(OrchestratorError::invalid_input(format!(
                "batch {} reports {} total batches, expected {}",
                batch.batch_number,
                batch.total_batches,
                batches.len()
            )));
        }
    }

    let distinct: HashSet<&CorrelationToken> =
        batches.iter().map(|b| &b.correlation_token).collect();
    if distinct.len() != batches.len() {
        return Err(OrchestratorError::invalid_input(
            "correlation tokens must be unique",
        ));
    }

    Ok(())
}
