use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::constants::correlation::{is_token_char, RUN_NAME_TOKEN_MARKER, TOKEN_PREFIX};

/// Last stamp handed out by [`CorrelationToken::next_stamp`]
static LAST_TOKEN_STAMP: AtomicI64 = AtomicI64::new(0);

/// Identifier or URL of one repository to migrate
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkItem(String);

impl WorkItem {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkItem {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Opaque token embedded in a dispatched run's name so the run can be found later
///
/// Tokens have the form `batch-{batch_number}-{stamp}`. The stamp is a
/// millisecond timestamp made strictly increasing within the process, so two
/// partition calls never produce the same token even within one millisecond.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationToken(String);

impl CorrelationToken {
    /// Build the token for `batch_number` from a stamp obtained via [`Self::next_stamp`]
    pub fn new(batch_number: usize, stamp: i64) -> Self {
        Self(format!("{TOKEN_PREFIX}-{batch_number}-{stamp}"))
    }

    /// Next process-wide unique stamp: `max(now_ms, previous + 1)`
    pub fn next_stamp() -> i64 {
        let now_ms = chrono::Utc::now().timestamp_millis();
        let mut previous = LAST_TOKEN_STAMP.load(Ordering::Relaxed);
        loop {
            let candidate = now_ms.max(previous + 1);
            match LAST_TOKEN_STAMP.compare_exchange_weak(
                previous,
                candidate,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return candidate,
                Err(actual) => previous = actual,
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Display name the executor gives the run created for this token
    pub fn run_name(&self, batch_number: usize) -> String {
        format!("Migration Batch {batch_number} - {RUN_NAME_TOKEN_MARKER}{}", self.0)
    }

    /// Whether a run name carries this token as a whole `ID:` field
    ///
    /// The token must directly follow the marker and must not be followed by
    /// another token character, so `ID:batch-1-17` does not match `ID:batch-1-170`.
    pub fn matches_run_name(&self, run_name: &str) -> bool {
        run_name
            .match_indices(RUN_NAME_TOKEN_MARKER)
            .any(|(idx, marker)| {
                let field = &run_name[idx + marker.len()..];
                let end = field.find(|c: char| !is_token_char(c)).unwrap_or(field.len());
                &field[..end] == self.0
            })
    }
}

impl fmt::Display for CorrelationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Job metadata shared verbatim by every batch of one orchestration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobMetadata {
    pub migration_id: Option<String>,
    pub issue_number: Option<u64>,
    pub migration_type: String,
    pub source_organization: String,
    pub target_organization: String,
    pub source_instance: String,
    pub target_instance: String,
    pub target_repository_visibility: String,
    /// Carried as `"true"`/`"false"` on the wire; a JSON bool is accepted too
    #[serde(with = "string_flag")]
    pub install_prereqs: bool,
}

/// Boolean field encoded the way workflow inputs and environment variables are
mod string_flag {
    use serde::de::{self, Unexpected};
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
        Null(()),
    }

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(if *value { "true" } else { "false" })
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        match Flag::deserialize(deserializer)? {
            Flag::Bool(value) => Ok(value),
            Flag::Null(()) => Ok(false),
            Flag::Text(text) => match text.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(true),
                "false" | "0" | "no" | "" => Ok(false),
                _ => Err(de::Error::invalid_value(
                    Unexpected::Str(&text),
                    &"a boolean or \"true\"/\"false\"",
                )),
            },
        }
    }
}

/// One ordered slice of the work list, dispatched as a single remote job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    /// 1-indexed position of this batch
    pub batch_number: usize,
    pub repositories: Vec<WorkItem>,
    #[serde(rename = "batchId")]
    pub correlation_token: CorrelationToken,
    pub total_batches: usize,
    pub total_repos: usize,
    #[serde(flatten)]
    pub metadata: JobMetadata,
}

impl Batch {
    pub fn is_last(&self) -> bool {
        self.batch_number >= self.total_batches
    }

    pub fn len(&self) -> usize {
        self.repositories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.repositories.is_empty()
    }
}
