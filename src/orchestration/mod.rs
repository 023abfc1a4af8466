//! # Batch Orchestration
//!
//! Sequential, rate-limited execution of migration batches on a remote job
//! executor, with correlation-based run discovery and cooperative cancellation.
//!
//! ## Core Components
//!
//! - **Partitioner**: splits the work list into ordered batches with unique correlation tokens
//! - **JobDispatcher**: asks the executor to start one run per batch
//! - **RunLocator**: finds the run created for a correlation token
//! - **CancellationMonitor**: checks host-level cancellation and the cancel command
//! - **BatchController**: drives every batch through dispatch, locate and poll
//! - **StatusReporter**: renders controller events as comments for the requester
//!
//! External systems sit behind the [`JobExecutor`], [`HostMonitor`] and
//! [`CollaborationSurface`] traits; time sits behind [`Clock`].

pub mod cancellation;
pub mod clock;
pub mod controller;
pub mod dispatcher;
pub mod partitioner;
pub mod reporter;
pub mod run_locator;
pub mod state;
pub mod types;

pub use cancellation::{is_cancel_command, CancellationMonitor, CancellationSignal};
pub use clock::{Clock, ManualClock, SystemClock};
pub use controller::BatchController;
pub use dispatcher::JobDispatcher;
pub use partitioner::{parse_work_items, partition};
pub use reporter::{BatchEvent, StatusReporter};
pub use run_locator::{select_run, RunLocator};
pub use state::{
    BatchOutcome, BatchPhase, BatchRecord, BatchTermination, CancellationStop,
    OrchestrationReport, OrchestrationState, PollState, PollStep, ProgressNotice,
};
pub use types::{
    CollaborationSurface, DispatchPayload, DispatchRequest, HostMonitor, HostRunState,
    JobExecutor, RunListQuery,
};
