//! Durable FIFO of mutating actions that could not reach the server.
//!
//! The store only persists and enumerates actions; replaying them is the
//! client's job (see `swcache_client::queue`).

pub mod actions;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Error;

/// Kind of administrative raffle action, used as the last path segment of
/// the replay endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ActionType {
    Draw,
    Start,
    Pause,
    Resume,
    Close,
    Cancel,
    /// Any other URL-safe action name.
    Other(String),
}

impl ActionType {
    pub fn as_str(&self) -> &str {
        match self {
            ActionType::Draw => "draw",
            ActionType::Start => "start",
            ActionType::Pause => "pause",
            ActionType::Resume => "resume",
            ActionType::Close => "close",
            ActionType::Cancel => "cancel",
            ActionType::Other(name) => name,
        }
    }
}

impl FromStr for ActionType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let action = match s {
            "draw" => ActionType::Draw,
            "start" => ActionType::Start,
            "pause" => ActionType::Pause,
            "resume" => ActionType::Resume,
            "close" => ActionType::Close,
            "cancel" => ActionType::Cancel,
            other => {
                validate_segment("action type", other)?;
                ActionType::Other(other.to_string())
            }
        };
        Ok(action)
    }
}

impl TryFrom<String> for ActionType {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ActionType> for String {
    fn from(value: ActionType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifiers end up as URL path segments, so only `[A-Za-z0-9_-]` is allowed.
pub fn validate_segment(what: &str, value: &str) -> Result<(), Error> {
    if value.is_empty() {
        return Err(Error::InvalidInput(format!("{what} cannot be empty")));
    }
    if !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err(Error::InvalidInput(format!("{what} must match [A-Za-z0-9_-]+: {value:?}")));
    }
    Ok(())
}

/// An action about to be queued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAction {
    pub raffle_id: String,
    pub action_type: ActionType,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl NewAction {
    /// Validate and build a new action.
    pub fn new(raffle_id: impl Into<String>, action_type: ActionType, params: serde_json::Value) -> Result<Self, Error> {
        let action = Self { raffle_id: raffle_id.into(), action_type, params };
        action.validate()?;
        Ok(action)
    }

    pub fn validate(&self) -> Result<(), Error> {
        validate_segment("raffle id", &self.raffle_id)?;
        validate_segment("action type", self.action_type.as_str())
    }
}

/// A persisted action awaiting replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedAction {
    /// Store-assigned id; increasing ids give enqueue order.
    pub id: i64,
    pub raffle_id: String,
    pub action_type: ActionType,
    pub params: serde_json::Value,
    pub enqueued_at: DateTime<Utc>,
}

impl QueuedAction {
    /// JSON body sent on replay; an absent payload is sent as `{}`.
    pub fn replay_body(&self) -> serde_json::Value {
        if self.params.is_null() { serde_json::json!({}) } else { self.params.clone() }
    }
}

/// Persistent storage for queued actions.
///
/// `pending` must enumerate in enqueue order and `remove` must be atomic per
/// item; removing an id that is already gone returns `Ok(false)`.
#[async_trait]
pub trait ActionStore: Send + Sync {
    async fn enqueue(&self, action: NewAction) -> Result<QueuedAction, Error>;

    async fn pending(&self) -> Result<Vec<QueuedAction>, Error>;

    async fn remove(&self, id: i64) -> Result<bool, Error>;
}
