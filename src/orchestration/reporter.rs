//! # Status Reporter
//!
//! Turns controller events into notifications on the collaboration surface.
//! The controller decides what happened and when; this module only decides how
//! it reads. Posting failures are logged and swallowed, a missed notice never
//! stops an orchestration.

use std::sync::Arc;
use tracing::{info, warn};

use crate::error::OrchestratorError;
use crate::models::{Batch, RemoteRun, RunConclusion};
use crate::orchestration::cancellation::CancellationSignal;
use crate::orchestration::types::CollaborationSurface;

/// Something the requester should hear about
#[derive(Debug, Clone)]
pub enum BatchEvent<'a> {
    Started {
        batch: &'a Batch,
    },
    DispatchFailed {
        batch: &'a Batch,
        error: &'a OrchestratorError,
    },
    Heartbeat {
        batch: &'a Batch,
        elapsed_minutes: u64,
        status: String,
    },
    StillProcessing {
        batch: &'a Batch,
        elapsed_minutes: u64,
        status: String,
    },
    Completed {
        batch: &'a Batch,
        run: &'a RemoteRun,
        conclusion: RunConclusion,
        duration_minutes: u64,
    },
    Abandoned {
        batch: &'a Batch,
    },
    TimedOut {
        batch: &'a Batch,
        ceiling_hours: u64,
    },
    CancelledBeforeBatch {
        batch: &'a Batch,
        signal: &'a CancellationSignal,
        completed_batches: usize,
        remaining_batches: usize,
    },
    CancelledDuringBatch {
        batch: &'a Batch,
        signal: &'a CancellationSignal,
    },
}

impl BatchEvent<'_> {
    pub fn batch(&self) -> &Batch {
        match self {
            Self::Started { batch }
            | Self::DispatchFailed { batch, .. }
            | Self::Heartbeat { batch, .. }
            | Self::StillProcessing { batch, .. }
            | Self::Completed { batch, .. }
            | Self::Abandoned { batch }
            | Self::TimedOut { batch, .. }
            | Self::CancelledBeforeBatch { batch, .. }
            | Self::CancelledDuringBatch { batch, .. } => batch,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Started { .. } => "started",
            Self::DispatchFailed { .. } => "dispatch_failed",
            Self::Heartbeat { .. } => "heartbeat",
            Self::StillProcessing { .. } => "still_processing",
            Self::Completed { .. } => "completed",
            Self::Abandoned { .. } => "abandoned",
            Self::TimedOut { .. } => "timed_out",
            Self::CancelledBeforeBatch { .. } => "cancelled_before_batch",
            Self::CancelledDuringBatch { .. } => "cancelled_during_batch",
        }
    }
}

pub struct StatusReporter {
    surface: Arc<dyn CollaborationSurface>,
    actions_url: String,
    cancel_command: String,
}

impl StatusReporter {
    pub fn new(
        surface: Arc<dyn CollaborationSurface>,
        actions_url: impl Into<String>,
        cancel_command: impl Into<String>,
    ) -> Self {
        Self {
            surface,
            actions_url: actions_url.into(),
            cancel_command: cancel_command.into(),
        }
    }

    /// Publish `event` on the collaboration surface
    pub async fn report(&self, event: BatchEvent<'_>) {
        let batch = event.batch();

        if let BatchEvent::Heartbeat {
            elapsed_minutes,
            status,
            ..
        } = &event
        {
            info!(
                batch_number = batch.batch_number,
                elapsed_minutes = elapsed_minutes,
                status = %status,
                "Batch {} still running... ({} minutes, {})",
                batch.batch_number,
                elapsed_minutes,
                status
            );
        }

        let body = self.render(&event);
        if let Err(e) = self.surface.post_comment(&body).await {
            warn!(
                batch_number = batch.batch_number,
                event = event.name(),
                error = %e,
                "Failed to post status notification"
            );
        }
    }

    /// Markdown body for `event`
    pub fn render(&self, event: &BatchEvent<'_>) -> String {
        match event {
            BatchEvent::Heartbeat {
                batch,
                elapsed_minutes,
                status,
            } => format!(
                "⏱️ Batch {number} of {total} still running... ({elapsed_minutes} minutes, {status})",
                number = batch.batch_number,
                total = batch.total_batches,
            ),
            BatchEvent::Started { batch } => self.render_started(batch),
            BatchEvent::DispatchFailed { batch, error } => format!(
                "### ❌ Failed to Dispatch Batch {number}\n\n\
                 **Error:** {error}\n\n\
                 <details>\n<summary><b>🔧 Troubleshooting Steps</b></summary>\n\n\
                 1. Check the target token permissions\n\
                 2. Verify the repository dispatch settings\n\
                 3. Check the [Actions tab]({actions})\n\n\
                 </details>\n\n\
                 **💡 Workaround:** Manually trigger the batch workflow with this batch's data.",
                number = batch.batch_number,
                actions = self.actions_url,
            ),
            BatchEvent::StillProcessing {
                batch,
                elapsed_minutes,
                status,
            } => format!(
                "### ⏳ Batch {number} Still Processing\n\n\
                 **Elapsed time:** {elapsed_minutes} minutes\n\
                 **Status:** {status}\n\n\
                 <details>\n<summary><b>Why is this taking so long?</b></summary>\n\n\
                 Large repositories or those with extensive history may take longer to migrate:\n\
                 - Repositories with many commits\n\
                 - Repositories with large files or Git LFS\n\
                 - Network latency between source and target\n\n\
                 </details>\n\n\
                 💡 **Tip:** You can cancel this migration by commenting `{command}` \
                 (as a standalone command, not in a sentence)",
                number = batch.batch_number,
                command = self.cancel_command,
            ),
            BatchEvent::Completed {
                batch,
                run,
                conclusion,
                duration_minutes,
            } => {
                let (icon, emoji) = if conclusion.is_success() {
                    ("✅", "🎉")
                } else {
                    ("❌", "⚠️")
                };
                let next = if batch.is_last() {
                    "🏁 **This was the final batch!**".to_string()
                } else {
                    format!("📥 **Next:** Preparing batch {}...", batch.batch_number + 1)
                };
                format!(
                    "### {icon} Batch {number} of {total} Complete\n\n\
                     {emoji} **Status:** {status}\n\
                     ⏱️ **Duration:** {duration_minutes} minutes\n\
                     🔗 **[View detailed results →]({url})**\n\n\
                     {next}",
                    number = batch.batch_number,
                    total = batch.total_batches,
                    status = conclusion.to_string().to_uppercase(),
                    url = run.html_url,
                )
            }
            BatchEvent::Abandoned { batch } => {
                let next = if batch.is_last() {
                    ""
                } else {
                    "\n\n⏭️ **Continuing to next batch...**"
                };
                format!(
                    "### ⚠️ Batch {number} Status Unknown\n\n\
                     The batch workflow could not be tracked.\n\n\
                     **Batch ID:** `{token}`\n\n\
                     <details>\n<summary><b>🔍 Troubleshooting Steps</b></summary>\n\n\
                     1. Check the [Actions tab]({actions}) for running workflows\n\
                     2. Look for a workflow named \"{run_name}\"\n\
                     3. If found, wait for it to complete\n\
                     4. If not found, the batch may need to be re-run manually\n\n\
                     </details>{next}",
                    number = batch.batch_number,
                    token = batch.correlation_token,
                    actions = self.actions_url,
                    run_name = batch.correlation_token.run_name(batch.batch_number),
                )
            }
            BatchEvent::TimedOut {
                batch,
                ceiling_hours,
            } => {
                let next = if batch.is_last() {
                    "🏁 **This was the final batch.**".to_string()
                } else {
                    format!("⏭️ **Proceeding to batch {}...**", batch.batch_number + 1)
                };
                format!(
                    "### ⚠️ Batch {number} Timed Out\n\n\
                     The batch exceeded the maximum wait time of {ceiling_hours} hours.\n\n\
                     **What this means:**\n\
                     - The batch may still be running\n\
                     - The workflow tracking timed out\n\
                     - Migration will continue with the next batch\n\n\
                     **Action required:** Check the [Actions tab]({actions}) for the actual status.\n\n\
                     {next}",
                    number = batch.batch_number,
                    actions = self.actions_url,
                )
            }
            BatchEvent::CancelledBeforeBatch {
                batch,
                signal,
                completed_batches,
                remaining_batches,
            } => format!(
                "### 🛑 Migration Cancelled\n\n\
                 **Stopped at:** Batch {number} of {total}\n\
                 **Requested by:** {source}\n\n\
                 | Status | Count |\n\
                 |--------|-------|\n\
                 | ✅ Completed batches | {completed_batches} |\n\
                 | ⏭️ Remaining batches | {remaining_batches} |\n\n\
                 > **Note:** Cancellation was requested for any batch workflows still running. \
                 Check the [Actions tab]({actions}) for their final state.",
                number = batch.batch_number,
                total = batch.total_batches,
                source = describe_signal(signal),
                actions = self.actions_url,
            ),
            BatchEvent::CancelledDuringBatch { batch, signal } => format!(
                "### 🛑 Migration Cancelled During Batch {number}\n\n\
                 **Status:** Batch was in progress when cancellation was requested\n\
                 **Requested by:** {source}\n\n\
                 > **Note:** Cancellation was requested for the running batch workflow. \
                 Check the [Actions tab]({actions}) for details.",
                number = batch.batch_number,
                source = describe_signal(signal),
                actions = self.actions_url,
            ),
        }
    }

    fn render_started(&self, batch: &Batch) -> String {
        let repositories = batch
            .repositories
            .iter()
            .enumerate()
            .map(|(i, repo)| format!("{}. `{}`", i + 1, repo))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "### 🚀 Batch {number} of {total} Starting\n\n\
             📦 **Repositories in this batch:** {count}\n\
             🔄 **Migration type:** {migration_type}\n\
             🎯 **Target organization:** `{target}`\n\n\
             <details>\n<summary><b>📋 Repositories being migrated</b></summary>\n\n\
             {repositories}\n\n\
             </details>\n\n\
             ---\n\n\
             **[📊 Track batch progress →]({actions}?query=event%3Arepository_dispatch)**",
            number = batch.batch_number,
            total = batch.total_batches,
            count = batch.len(),
            migration_type = batch.metadata.migration_type,
            target = batch.metadata.target_organization,
            actions = self.actions_url,
        )
    }
}

fn describe_signal(signal: &CancellationSignal) -> String {
    match signal {
        CancellationSignal::RequestedByCommand { author } => format!("@{author} (cancel command)"),
        CancellationSignal::RequestedByHostCancel => "workflow cancellation".to_string(),
        CancellationSignal::None => "unknown".to_string(),
    }
}

impl std::fmt::Debug for StatusReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusReporter")
            .field("actions_url", &self.actions_url)
            .finish_non_exhaustive()
    }
}
