use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a remote run, as last observed by polling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RunStatus {
    /// Accepted by the executor but not started (includes requested/waiting/pending)
    Queued,
    InProgress,
    Completed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl From<String> for RunStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "completed" => Self::Completed,
            "in_progress" => Self::InProgress,
            _ => Self::Queued,
        }
    }
}

impl From<RunStatus> for String {
    fn from(value: RunStatus) -> Self {
        value.to_string()
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// Outcome carried by a completed run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RunConclusion {
    Success,
    /// Failure, timed out, startup failure and every other unsuccessful conclusion
    Failure,
    Neutral,
    /// Cancelled or skipped by the executor
    Cancelled,
}

impl RunConclusion {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl From<String> for RunConclusion {
    fn from(value: String) -> Self {
        match value.as_str() {
            "success" => Self::Success,
            "neutral" => Self::Neutral,
            "cancelled" | "skipped" => Self::Cancelled,
            _ => Self::Failure,
        }
    }
}

impl From<RunConclusion> for String {
    fn from(value: RunConclusion) -> Self {
        value.to_string()
    }
}

impl fmt::Display for RunConclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
            Self::Neutral => write!(f, "neutral"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Read-only, possibly stale view of one executor run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRun {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    pub status: RunStatus,
    #[serde(default)]
    pub conclusion: Option<RunConclusion>,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl RemoteRun {
    pub fn is_completed(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.conclusion, Some(RunConclusion::Cancelled))
    }

    /// Conclusion of a completed run; completed runs without one count as failures
    pub fn outcome(&self) -> Option<RunConclusion> {
        self.is_completed()
            .then(|| self.conclusion.unwrap_or(RunConclusion::Failure))
    }
}
