//! Turn and user identity types.
//!
//! A turn is the only persisted entity in RelayMind:
//! User sends a message → the relay loads recent turns → the endpoint replies →
//! both the user turn and the assistant turn are appended.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable per-user identifier supplied by the chat platform.
///
/// This is the partition key of the history log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// The speaker of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The generated reply
    Assistant,
}

impl Role {
    /// The label used both in storage and in rendered prompts.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// A single message turn in a user's conversation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Storage sequence number (`None` until persisted)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    /// Owner of the turn
    pub user_id: UserId,

    /// Who said it
    pub role: Role,

    /// The text content
    pub content: String,

    /// Insertion time; non-decreasing within one user's log
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    /// Create an unsaved turn stamped with the current time.
    pub fn new(user_id: UserId, role: Role, content: impl Into<String>) -> Self {
        Self {
            id: None,
            user_id,
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create an unsaved user turn.
    pub fn user(user_id: UserId, content: impl Into<String>) -> Self {
        Self::new(user_id, Role::User, content)
    }

    /// Create an unsaved assistant turn.
    pub fn assistant(user_id: UserId, content: impl Into<String>) -> Self {
        Self::new(user_id, Role::Assistant, content)
    }

    /// Render as a `role: content` prompt line.
    pub fn render(&self) -> String {
        format!("{}: {}", self.role, self.content)
    }
}
