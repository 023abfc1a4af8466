//! # Orchestration Types
//!
//! The seams between the controller and the outside world. The controller only
//! ever talks to the executor, its own host and the collaboration surface
//! through these traits, so every component can be driven by simulated
//! collaborators in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::timing::DEFAULT_RUN_LIST_PAGE_SIZE;
use crate::error::Result;
use crate::models::{Batch, Comment, RemoteRun, RunStatus};

/// Body of the fire-and-forget "start this batch" call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchRequest {
    pub event_type: String,
    pub client_payload: DispatchPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchPayload {
    pub batch: Batch,
    pub orchestrator_run_id: u64,
}

/// Filter for listing recent executor runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunListQuery {
    pub status: Option<RunStatus>,
    pub per_page: u32,
}

impl RunListQuery {
    /// Most recent runs regardless of status
    pub fn recent(per_page: u32) -> Self {
        Self {
            status: None,
            per_page,
        }
    }

    pub fn with_status(status: RunStatus, per_page: u32) -> Self {
        Self {
            status: Some(status),
            per_page,
        }
    }
}

impl Default for RunListQuery {
    fn default() -> Self {
        Self::recent(DEFAULT_RUN_LIST_PAGE_SIZE)
    }
}

/// Status of the orchestration process itself, as reported by its host
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRunState {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub conclusion: Option<String>,
}

impl HostRunState {
    pub fn is_cancelled(&self) -> bool {
        matches!(self.status.as_str(), "cancelled" | "cancelling")
            || self.conclusion.as_deref() == Some("cancelled")
    }
}

/// External executor that runs one dispatched batch
#[async_trait]
pub trait JobExecutor: Send + Sync {
    /// Executor name for logging
    fn executor_name(&self) -> &'static str;

    /// Trigger a batch; returns once the executor accepted the request, without a run id
    async fn dispatch(&self, request: &DispatchRequest) -> Result<()>;

    /// Recent runs of the executor job, newest first
    async fn list_runs(&self, query: &RunListQuery) -> Result<Vec<RemoteRun>>;

    /// Ask the executor to cancel a run; does not wait for it to stop
    async fn cancel_run(&self, run_id: u64) -> Result<()>;
}

/// Host of the orchestration process
#[async_trait]
pub trait HostMonitor: Send + Sync {
    async fn own_run_state(&self) -> Result<HostRunState>;
}

/// Conversation the requester and the orchestrator share (issue comments)
#[async_trait]
pub trait CollaborationSurface: Send + Sync {
    async fn post_comment(&self, body: &str) -> Result<()>;

    /// Comments created at or after `since`, oldest first
    async fn list_comments_since(&self, since: DateTime<Utc>) -> Result<Vec<Comment>>;
}
