//! # Cancellation Monitor
//!
//! Cooperative cancellation from two independent sources: the host reporting
//! the orchestration process itself as cancelled, and a requester posting the
//! cancel command as a standalone comment after the orchestration started.
//! Checks are pure reads; a failed read counts as "not cancelled".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{OrchestratorError, Result};
use crate::models::Comment;
use crate::orchestration::types::{CollaborationSurface, HostMonitor};

/// Result of one cancellation check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CancellationSignal {
    None,
    RequestedByCommand { author: String },
    RequestedByHostCancel,
}

impl CancellationSignal {
    pub fn is_requested(&self) -> bool {
        !matches!(self, Self::None)
    }
}

pub struct CancellationMonitor {
    host: Arc<dyn HostMonitor>,
    surface: Arc<dyn CollaborationSurface>,
    cancel_command: String,
}

impl CancellationMonitor {
    pub fn new(
        host: Arc<dyn HostMonitor>,
        surface: Arc<dyn CollaborationSurface>,
        cancel_command: impl Into<String>,
    ) -> Self {
        Self {
            host,
            surface,
            cancel_command: cancel_command.into(),
        }
    }

    /// Consult both sources; commands only count if posted at or after `since`
    pub async fn check(&self, since: DateTime<Utc>) -> CancellationSignal {
        let host_cancelled = match self.host_cancelled().await {
            Ok(cancelled) => cancelled,
            Err(e) => {
                warn!(error = %e, "Error checking host cancellation status");
                false
            }
        };

        let command_author = match self.command_author(since).await {
            Ok(author) => author,
            Err(e) => {
                warn!(error = %e, "Error checking for cancel command");
                None
            }
        };

        debug!(
            host_cancelled = host_cancelled,
            cancel_command_found = command_author.is_some(),
            "Cancellation check"
        );

        if host_cancelled {
            CancellationSignal::RequestedByHostCancel
        } else if let Some(author) = command_author {
            CancellationSignal::RequestedByCommand { author }
        } else {
            CancellationSignal::None
        }
    }

    pub async fn host_cancelled(&self) -> Result<bool> {
        self.host
            .own_run_state()
            .await
            .map(|state| state.is_cancelled())
            .map_err(|e| OrchestratorError::CancellationCheck(e.to_string()))
    }

    /// Login of the first human who posted the cancel command since `since`
    pub async fn command_author(&self, since: DateTime<Utc>) -> Result<Option<String>> {
        let comments = self
            .surface
            .list_comments_since(since)
            .await
            .map_err(|e| OrchestratorError::CancellationCheck(e.to_string()))?;

        Ok(comments
            .iter()
            .find(|comment| self.is_cancel_request(comment, since))
            .map(|comment| comment.user.login.clone()))
    }

    fn is_cancel_request(&self, comment: &Comment, since: DateTime<Utc>) -> bool {
        comment.created_at >= since
            && !comment.user.is_automated()
            && is_cancel_command(&comment.body, &self.cancel_command)
    }
}

impl std::fmt::Debug for CancellationMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationMonitor")
            .field("cancel_command", &self.cancel_command)
            .finish_non_exhaustive()
    }
}

/// Whether `body` issues `command`: the whole trimmed body, or its whole first line
pub fn is_cancel_command(body: &str, command: &str) -> bool {
    let trimmed = body.trim();
    trimmed == command || trimmed.lines().next().map(str::trim) == Some(command)
}
