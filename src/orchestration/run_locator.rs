//! # Run Locator
//!
//! Resolves a correlation token to the executor run created for it. Runs appear
//! asynchronously after dispatch, so "no match yet" is a normal answer and
//! callers poll. A failed listing call is reported as transient and the poll
//! tick counts as "not found".

use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{OrchestratorError, Result};
use crate::models::{CorrelationToken, RemoteRun};
use crate::orchestration::types::{JobExecutor, RunListQuery};

pub struct RunLocator {
    executor: Arc<dyn JobExecutor>,
    page_size: u32,
}

impl RunLocator {
    pub fn new(executor: Arc<dyn JobExecutor>, page_size: u32) -> Self {
        Self {
            executor,
            page_size,
        }
    }

    /// Find the run for `token`, treating listing failures as "not found yet"
    pub async fn find_by_correlation(&self, token: &CorrelationToken) -> Option<RemoteRun> {
        match self.try_find_by_correlation(token).await {
            Ok(run) => run,
            Err(e) => {
                warn!(correlation_token = %token, error = %e, "Run lookup failed, retrying next tick");
                None
            }
        }
    }

    /// Find the run for `token`, surfacing listing failures as [`OrchestratorError::LocatorTransient`]
    pub async fn try_find_by_correlation(
        &self,
        token: &CorrelationToken,
    ) -> Result<Option<RemoteRun>> {
        let runs = self
            .executor
            .list_runs(&RunListQuery::recent(self.page_size))
            .await
            .map_err(|e| OrchestratorError::LocatorTransient(e.to_string()))?;

        let found = select_run(runs, token);
        if let Some(run) = &found {
            debug!(
                correlation_token = %token,
                run_id = run.id,
                status = %run.status,
                "Located run"
            );
        }
        Ok(found)
    }
}

/// Newest run whose name carries `token` as its `ID:` field
pub fn select_run(runs: Vec<RemoteRun>, token: &CorrelationToken) -> Option<RemoteRun> {
    runs.into_iter().find(|run| {
        run.name
            .as_deref()
            .is_some_and(|name| token.matches_run_name(name))
    })
}

impl std::fmt::Debug for RunLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunLocator")
            .field("executor", &self.executor.executor_name())
            .field("page_size", &self.page_size)
            .finish()
    }
}
