//! # System Constants
//!
//! Protocol constants shared by the orchestration components: the cancel command,
//! the identities whose comments are never treated as commands, the run-name
//! correlation marker, and the default timing of the polling loop.

/// Cancellation command and comment-author rules
pub mod commands {
    /// Command a requester posts (as a standalone comment) to stop the orchestration
    pub const CANCEL_MIGRATION: &str = "/cancel-migration";

    /// Author type the collaboration host reports for automated accounts
    pub const BOT_USER_TYPE: &str = "Bot";

    /// Login of the host's built-in automation account
    pub const AUTOMATION_LOGIN: &str = "github-actions[bot]";
}

/// Correlation between a dispatched batch and its remote run
pub mod correlation {
    /// Field marker that precedes the correlation token in a run's display name
    pub const RUN_NAME_TOKEN_MARKER: &str = "ID:";

    /// Prefix of every correlation token
    pub const TOKEN_PREFIX: &str = "batch";

    /// Event type used for the fire-and-forget dispatch call
    pub const DEFAULT_EVENT_TYPE: &str = "migration-batch";

    /// Workflow file of the external batch executor
    pub const DEFAULT_EXECUTOR_WORKFLOW: &str = "batch-processor.yml";

    /// Run-listing event filter for dispatched runs
    pub const DISPATCH_EVENT_FILTER: &str = "repository_dispatch";

    /// Whether a character can be part of a correlation token
    pub fn is_token_char(c: char) -> bool {
        c.is_ascii_alphanumeric() || c == '-' || c == '_'
    }
}

/// Default timing of the locate-and-poll loop
pub mod timing {
    pub const DEFAULT_GRACE_PERIOD_SECONDS: u64 = 20;
    pub const DEFAULT_POLL_INTERVAL_SECONDS: u64 = 30;
    /// 12 hours at the default poll interval
    pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 1440;
    pub const DEFAULT_CANCELLATION_CHECK_EVERY: u32 = 5;
    pub const DEFAULT_NOT_FOUND_WARNING_AFTER: u32 = 6;
    pub const DEFAULT_ABANDON_AFTER: u32 = 10;
    /// ~10 minutes at the default poll interval
    pub const DEFAULT_HEARTBEAT_EVERY: u32 = 20;
    /// ~60 minutes at the default poll interval
    pub const DEFAULT_STILL_PROCESSING_EVERY: u32 = 120;
    pub const DEFAULT_INTER_BATCH_DELAY_SECONDS: u64 = 30;
    pub const DEFAULT_RUN_LIST_PAGE_SIZE: u32 = 20;
    pub const DEFAULT_BATCH_SIZE: usize = 5;
}

/// Structured log event names
pub mod events {
    pub const BATCH_DISPATCHED: &str = "batch.dispatched";
    pub const BATCH_DISPATCH_FAILED: &str = "batch.dispatch_failed";
    pub const BATCH_RUN_LOCATED: &str = "batch.run_located";
    pub const BATCH_COMPLETED: &str = "batch.completed";
    pub const BATCH_ABANDONED: &str = "batch.abandoned";
    pub const BATCH_TIMED_OUT: &str = "batch.timed_out";
    pub const ORCHESTRATION_CANCELLED: &str = "orchestration.cancelled";
}
