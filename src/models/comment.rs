use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::commands::{AUTOMATION_LOGIN, BOT_USER_TYPE};

/// Author of a collaboration-surface comment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub login: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

impl Actor {
    pub fn user(login: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            kind: "User".to_string(),
        }
    }

    pub fn bot(login: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            kind: BOT_USER_TYPE.to_string(),
        }
    }

    /// Bots post instructions that quote commands; they never issue them
    pub fn is_automated(&self) -> bool {
        self.kind == BOT_USER_TYPE || self.login == AUTOMATION_LOGIN
    }
}

/// A message on the collaboration surface (issue comment)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: u64,
    #[serde(default)]
    pub body: String,
    pub user: Actor,
    pub created_at: DateTime<Utc>,
}
