#![allow(clippy::doc_markdown)] // Allow technical terms like GitHub, JSON in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Batch Orchestrator
//!
//! Sequential orchestration of repository migrations on a remote job executor.
//!
//! ## Overview
//!
//! A work list of repositories is split into fixed-size batches. Each batch is
//! dispatched to the executor as one fire-and-forget job, the resulting run is
//! found again through a correlation token embedded in its name, and the
//! controller waits for it to finish before starting the next batch. Requesters
//! can stop the orchestration at any time, either by cancelling the host run or
//! by posting the cancel command on the migration issue.
//!
//! ## Module Organization
//!
//! - [`models`] - Work items, batches, correlation tokens, remote runs and comments
//! - [`orchestration`] - Partitioner, dispatcher, run locator, cancellation monitor, controller and reporter
//! - [`client`] - GitHub REST implementation of the executor, host and surface seams
//! - [`config`] - YAML + environment configuration
//! - [`error`] - Structured error handling
//! - [`logging`] - Console and JSON file logging
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use batch_orchestrator::client::{GitHubClient, GitHubClientConfig};
//! use batch_orchestrator::config::ConfigManager;
//! use batch_orchestrator::models::{JobMetadata, WorkItem};
//! use batch_orchestrator::orchestration::{partition, BatchController};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let config = manager.config();
//!
//! let items = vec![WorkItem::new("https://github.com/acme/api")];
//! let batches = partition(&items, config.orchestration.batch_size, &JobMetadata::default())?;
//!
//! let client = Arc::new(GitHubClient::new(
//!     GitHubClientConfig::from(config),
//!     config.resolve_host_token()?,
//!     config.resolve_target_token("production")?,
//! )?);
//! let controller = BatchController::new(config, client.clone(), client.clone(), client);
//!
//! let report = controller.run(&batches).await?;
//! println!("{} of {} batches succeeded", report.succeeded(), report.total_batches);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod models;
pub mod orchestration;

pub use config::{ConfigManager, OrchestratorConfig, TimingConfig};
pub use error::{OrchestratorError, Result};
pub use models::{Batch, CorrelationToken, JobMetadata, WorkItem};
pub use orchestration::{BatchController, OrchestrationReport};
