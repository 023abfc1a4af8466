//! # Orchestrator Configuration System
//!
//! Layered configuration for the batch orchestrator: a base YAML file, an
//! optional per-environment YAML override, then `ORCHESTRATOR__*` environment
//! variables. Every field has a default so a minimal deployment only sets the
//! repository coordinates, run identifiers and target instances.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use batch_orchestrator::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let timing = &manager.config().timing;
//! println!("polling every {:?}", timing.poll_interval());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::constants::{commands, correlation, timing};

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure mirroring `config/orchestrator.yaml`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Host API coordinates and credentials
    pub github: GitHubConfig,

    /// Identity of this orchestration run
    pub orchestration: OrchestrationSettings,

    /// Polling loop timing
    pub timing: TimingConfig,

    /// Target instances and the variables holding their tokens
    pub instances: InstancesConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GitHubConfig {
    pub api_url: String,
    /// Web URL used for links in posted comments
    pub server_url: String,
    pub owner: String,
    pub repo: String,
    pub executor_workflow: String,
    pub event_type: String,
    /// Environment variable holding the token for runs, comments and cancellation
    pub token_env: String,
    pub request_timeout_ms: u64,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".to_string(),
            server_url: "https://github.com".to_string(),
            owner: String::new(),
            repo: String::new(),
            executor_workflow: correlation::DEFAULT_EXECUTOR_WORKFLOW.to_string(),
            event_type: correlation::DEFAULT_EVENT_TYPE.to_string(),
            token_env: "GITHUB_TOKEN".to_string(),
            request_timeout_ms: 30_000,
        }
    }
}

impl GitHubConfig {
    /// Link to the repository's actions page
    pub fn actions_url(&self) -> String {
        format!("{}/{}/{}/actions", self.server_url, self.owner, self.repo)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OrchestrationSettings {
    /// Host run id of this orchestration process
    pub run_id: u64,
    /// Issue whose comments form the collaboration surface
    pub issue_number: u64,
    pub cancel_command: String,
    pub batch_size: usize,
}

impl Default for OrchestrationSettings {
    fn default() -> Self {
        Self {
            run_id: 0,
            issue_number: 0,
            cancel_command: commands::CANCEL_MIGRATION.to_string(),
            batch_size: timing::DEFAULT_BATCH_SIZE,
        }
    }
}

/// Timing of the locate-and-poll loop; tick counts are in poll intervals
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct TimingConfig {
    pub grace_period_seconds: u64,
    pub poll_interval_seconds: u64,
    pub max_poll_attempts: u32,
    pub cancellation_check_every: u32,
    pub not_found_warning_after: u32,
    pub abandon_after: u32,
    pub heartbeat_every: u32,
    pub still_processing_every: u32,
    pub inter_batch_delay_seconds: u64,
    pub run_list_page_size: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            grace_period_seconds: timing::DEFAULT_GRACE_PERIOD_SECONDS,
            poll_interval_seconds: timing::DEFAULT_POLL_INTERVAL_SECONDS,
            max_poll_attempts: timing::DEFAULT_MAX_POLL_ATTEMPTS,
            cancellation_check_every: timing::DEFAULT_CANCELLATION_CHECK_EVERY,
            not_found_warning_after: timing::DEFAULT_NOT_FOUND_WARNING_AFTER,
            abandon_after: timing::DEFAULT_ABANDON_AFTER,
            heartbeat_every: timing::DEFAULT_HEARTBEAT_EVERY,
            still_processing_every: timing::DEFAULT_STILL_PROCESSING_EVERY,
            inter_batch_delay_seconds: timing::DEFAULT_INTER_BATCH_DELAY_SECONDS,
            run_list_page_size: timing::DEFAULT_RUN_LIST_PAGE_SIZE,
        }
    }
}

impl TimingConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_seconds)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn inter_batch_delay(&self) -> Duration {
        Duration::from_secs(self.inter_batch_delay_seconds)
    }

    /// Wall time represented by `attempts` poll ticks, rounded to minutes
    pub fn elapsed_minutes(&self, attempts: u32) -> u64 {
        (u64::from(attempts) * self.poll_interval_seconds + 30) / 60
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let positive = [
            ("timing.poll_interval_seconds", self.poll_interval_seconds),
            ("timing.max_poll_attempts", u64::from(self.max_poll_attempts)),
            (
                "timing.cancellation_check_every",
                u64::from(self.cancellation_check_every),
            ),
            ("timing.abandon_after", u64::from(self.abandon_after)),
            ("timing.heartbeat_every", u64::from(self.heartbeat_every)),
            (
                "timing.still_processing_every",
                u64::from(self.still_processing_every),
            ),
            ("timing.run_list_page_size", u64::from(self.run_list_page_size)),
        ];

        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigurationError::invalid_value(
                    field,
                    "0",
                    "value must be greater than 0",
                ));
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct InstancesConfig {
    pub targets: HashMap<String, InstanceConfig>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct InstanceConfig {
    /// Environment variable holding this instance's token
    pub token_env: String,
}

impl OrchestratorConfig {
    /// Checks needed by every command
    pub fn validate(&self) -> ConfigResult<()> {
        if self.orchestration.batch_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "orchestration.batch_size",
                "0",
                "batch size must be greater than 0",
            ));
        }

        if self.orchestration.cancel_command.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "orchestration.cancel_command",
                "orchestration configuration",
            ));
        }

        self.timing.validate()
    }

    /// Additional checks before an orchestration run talks to the host
    pub fn validate_for_run(&self) -> ConfigResult<()> {
        self.validate()?;

        for (field, value) in [
            ("github.owner", &self.github.owner),
            ("github.repo", &self.github.repo),
            ("github.api_url", &self.github.api_url),
        ] {
            if value.is_empty() {
                return Err(ConfigurationError::missing_required_field(
                    field,
                    "github configuration",
                ));
            }
        }

        if self.orchestration.run_id == 0 {
            return Err(ConfigurationError::missing_required_field(
                "orchestration.run_id",
                "orchestration configuration",
            ));
        }

        if self.orchestration.issue_number == 0 {
            return Err(ConfigurationError::missing_required_field(
                "orchestration.issue_number",
                "orchestration configuration",
            ));
        }

        Ok(())
    }

    /// Resolve the dispatch token for a target instance from the process environment
    pub fn resolve_target_token(&self, instance: &str) -> ConfigResult<String> {
        self.resolve_target_token_with(instance, |name| std::env::var(name).ok())
    }

    /// Resolve the dispatch token for a target instance using `lookup` for variables
    pub fn resolve_target_token_with<F>(&self, instance: &str, lookup: F) -> ConfigResult<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let target = self.instances.targets.get(instance).ok_or_else(|| {
            ConfigurationError::UnknownInstance {
                instance: instance.to_string(),
            }
        })?;

        lookup(&target.token_env)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ConfigurationError::MissingToken {
                instance: instance.to_string(),
                variable: target.token_env.clone(),
            })
    }

    /// Resolve the token used for run listing, comments and cancellation
    pub fn resolve_host_token(&self) -> ConfigResult<String> {
        std::env::var(&self.github.token_env)
            .ok()
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                ConfigurationError::missing_required_field(
                    self.github.token_env.clone(),
                    "process environment",
                )
            })
    }
}
