//! In-memory table of action results
//!
//! Every write replaces a whole [`ActionResult`]; there is no field-level
//! update. A result is created pending at dispatch time and moved to its
//! terminal state exactly once, either by the completion path or by the
//! staleness sweep.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, trace};

use crate::util::{Clock, add_duration, system_clock};

use super::error::ActionError;

/// Error recorded for results that stayed pending for too long
pub const TIMED_OUT_ERROR: &str = "action timed out";

/// Outcome of an action as seen by pollers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    pub id: String,
    pub pmm_agent_id: String,
    pub done: bool,
    pub error: String,
    pub output: Vec<u8>,
}

impl ActionResult {
    /// Pending result written when an action is dispatched
    pub fn pending(id: impl Into<String>, pmm_agent_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            pmm_agent_id: pmm_agent_id.into(),
            ..Default::default()
        }
    }
}

/// Terminal outcome reported for an action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Output(Vec<u8>),
    Error(String),
}

#[derive(Debug, Clone)]
struct Entry {
    result: ActionResult,
    updated_at: DateTime<Utc>,
}

/// Concurrent table of action results keyed by action id
#[derive(Clone)]
pub struct ResultStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    now: Clock,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::with_clock(system_clock())
    }

    pub fn with_clock(now: Clock) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            now,
        }
    }

    /// Insert a new result. Ids are never reused.
    pub async fn store(&self, result: ActionResult) -> Result<(), ActionError> {
        let updated_at = (self.now)();
        let mut entries = self.entries.lock().await;
        if entries.contains_key(&result.id) {
            return Err(ActionError::AlreadyExists(result.id));
        }

        trace!(action_id = %result.id, "storing action result");
        entries.insert(result.id.clone(), Entry { result, updated_at });
        Ok(())
    }

    pub async fn load(&self, id: &str) -> Option<ActionResult> {
        self.entries
            .lock()
            .await
            .get(id)
            .map(|entry| entry.result.clone())
    }

    /// Move a pending result to its terminal state.
    pub async fn complete(&self, id: &str, completion: Completion) -> Result<(), ActionError> {
        let updated_at = (self.now)();
        let mut entries = self.entries.lock().await;
        let Some(entry) = entries.get_mut(id) else {
            return Err(ActionError::NotFound(id.to_string()));
        };
        if entry.result.done {
            return Err(ActionError::AlreadyDone(id.to_string()));
        }

        let (output, error) = match completion {
            Completion::Output(output) => (output, String::new()),
            Completion::Error(error) => (Vec::new(), error),
        };

        *entry = Entry {
            result: ActionResult {
                id: entry.result.id.clone(),
                pmm_agent_id: entry.result.pmm_agent_id.clone(),
                done: true,
                error,
                output,
            },
            updated_at,
        };
        Ok(())
    }

    /// Fail every result that has been pending for longer than `max_pending`.
    ///
    /// Returns the number of results that were timed out.
    pub async fn expire_pending(&self, max_pending: Duration) -> usize {
        let now = (self.now)();
        let mut entries = self.entries.lock().await;
        let mut expired = 0;

        for entry in entries.values_mut() {
            if entry.result.done || add_duration(entry.updated_at, max_pending) > now {
                continue;
            }

            debug!(action_id = %entry.result.id, "pending action timed out");
            *entry = Entry {
                result: ActionResult {
                    id: entry.result.id.clone(),
                    pmm_agent_id: entry.result.pmm_agent_id.clone(),
                    done: true,
                    error: TIMED_OUT_ERROR.to_string(),
                    output: Vec::new(),
                },
                updated_at: now,
            };
            expired += 1;
        }

        expired
    }

    /// Drop finished results that completed more than `retention` ago.
    pub async fn purge_finished(&self, retention: Duration) -> usize {
        let now = (self.now)();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.result.done || add_duration(entry.updated_at, retention) > now);
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for ResultStore {
    fn default() -> Self {
        Self::new()
    }
}
