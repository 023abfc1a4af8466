//! # Job Dispatcher
//!
//! Issues one asynchronous "start this batch" request per batch. The executor
//! does not answer with a run id; the batch's correlation token travels in the
//! payload and later names the run the executor creates.

use std::sync::Arc;
use tracing::{info, warn};

use crate::constants::events;
use crate::error::Result;
use crate::logging::log_batch_operation;
use crate::models::Batch;
use crate::orchestration::types::{DispatchPayload, DispatchRequest, JobExecutor};

pub struct JobDispatcher {
    executor: Arc<dyn JobExecutor>,
    event_type: String,
    orchestrator_run_id: u64,
}

impl JobDispatcher {
    pub fn new(
        executor: Arc<dyn JobExecutor>,
        event_type: impl Into<String>,
        orchestrator_run_id: u64,
    ) -> Self {
        Self {
            executor,
            event_type: event_type.into(),
            orchestrator_run_id,
        }
    }

    pub fn request_for(&self, batch: &Batch) -> DispatchRequest {
        DispatchRequest {
            event_type: self.event_type.clone(),
            client_payload: DispatchPayload {
                batch: batch.clone(),
                orchestrator_run_id: self.orchestrator_run_id,
            },
        }
    }

    /// Dispatch `batch`; any failure comes back as [`OrchestratorError::Dispatch`]
    ///
    /// [`OrchestratorError::Dispatch`]: crate::error::OrchestratorError::Dispatch
    pub async fn dispatch(&self, batch: &Batch) -> Result<()> {
        let request = self.request_for(batch);

        info!(
            batch_number = batch.batch_number,
            correlation_token = %batch.correlation_token,
            repositories = batch.len(),
            executor = self.executor.executor_name(),
            "Dispatching batch {} of {}",
            batch.batch_number,
            batch.total_batches
        );

        match self.executor.dispatch(&request).await {
            Ok(()) => {
                log_batch_operation(
                    events::BATCH_DISPATCHED,
                    batch.batch_number,
                    batch.total_batches,
                    batch.correlation_token.as_str(),
                    "dispatched",
                    None,
                );
                Ok(())
            }
            Err(e) => {
                let err = e.into_dispatch();
                warn!(
                    batch_number = batch.batch_number,
                    correlation_token = %batch.correlation_token,
                    error = %err,
                    "Failed to dispatch batch"
                );
                Err(err)
            }
        }
    }
}

impl std::fmt::Debug for JobDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobDispatcher")
            .field("executor", &self.executor.executor_name())
            .field("event_type", &self.event_type)
            .field("orchestrator_run_id", &self.orchestrator_run_id)
            .finish()
    }
}
