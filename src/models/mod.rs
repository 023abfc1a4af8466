//! # Orchestration Data Model
//!
//! Work items, batches and their correlation tokens, the read-only view of a
//! remote executor run, and the collaboration-surface comments scanned for
//! cancel commands.

pub mod batch;
pub mod comment;
pub mod remote_run;

pub use batch::{Batch, CorrelationToken, JobMetadata, WorkItem};
pub use comment::{Actor, Comment};
pub use remote_run::{RemoteRun, RunConclusion, RunStatus};
