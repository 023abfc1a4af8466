//! # Host API Clients
//!
//! HTTP implementations of the orchestration seams. [`GitHubClient`] serves as
//! job executor, host monitor and collaboration surface at once.

pub mod github;

pub use github::{GitHubClient, GitHubClientConfig};
