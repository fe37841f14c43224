//! Action kinds and their lifecycle
//!
//! ```text
//! Created ──prepare──▶ Prepared ──start──▶ Dispatched ──▶ Completed | Failed
//!                                              │
//!                                              └──cancel──▶ Canceled
//! ```

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::ActionError;
use super::store::ActionResult;

/// Whether an action is addressed by node or by service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerKind {
    Node,
    Service,
}

/// Parameters of the pt-summary diagnostic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PtSummaryParams {
    pub config: Option<String>,
    pub read_samples: Option<String>,
    pub save_samples: Option<String>,
    pub sleep: u32,
    pub summarize_mounts: bool,
    pub summarize_network: bool,
    pub summarize_processes: bool,
}

impl Default for PtSummaryParams {
    fn default() -> Self {
        Self {
            config: None,
            read_samples: None,
            save_samples: None,
            sleep: 5,
            summarize_mounts: true,
            summarize_network: true,
            summarize_processes: true,
        }
    }
}

impl PtSummaryParams {
    /// Command line passed to pt-summary on the agent
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![];
        if let Some(config) = &self.config {
            args.extend(["--config".to_string(), config.clone()]);
        }
        if let Some(path) = &self.read_samples {
            args.extend(["--read-samples".to_string(), path.clone()]);
        }
        if let Some(path) = &self.save_samples {
            args.extend(["--save-samples".to_string(), path.clone()]);
        }
        if self.sleep > 0 {
            args.extend(["--sleep".to_string(), self.sleep.to_string()]);
        }
        if self.summarize_mounts {
            args.push("--summarize-mounts".to_string());
        }
        if self.summarize_network {
            args.push("--summarize-network".to_string());
        }
        if self.summarize_processes {
            args.push("--summarize-processes".to_string());
        }
        args
    }
}

/// Every diagnostic an agent can run, with its parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ActionKind {
    #[serde(rename = "pt-summary")]
    PtSummary(PtSummaryParams),
    #[serde(rename = "pt-mysql-summary")]
    PtMySqlSummary { args: Vec<String> },
    #[serde(rename = "mysql-explain")]
    MySqlExplain { query: String },
    #[serde(rename = "mysql-explain-json")]
    MySqlExplainJson { query: String },
    #[serde(rename = "mysql-query-show")]
    MySqlQueryShow { query: String },
    #[serde(rename = "mysql-query-select")]
    MySqlQuerySelect { query: String },
    #[serde(rename = "postgresql-query-show")]
    PostgreSqlQueryShow,
    #[serde(rename = "postgresql-query-select")]
    PostgreSqlQuerySelect { query: String },
    #[serde(rename = "mongodb-query-getparameter")]
    MongoDbQueryGetParameter,
    #[serde(rename = "mongodb-query-buildinfo")]
    MongoDbQueryBuildInfo,
    #[serde(rename = "mongodb-query-getcmdlineopts")]
    MongoDbQueryGetCmdLineOpts,
}

impl ActionKind {
    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::PtSummary(_) => "pt-summary",
            ActionKind::PtMySqlSummary { .. } => "pt-mysql-summary",
            ActionKind::MySqlExplain { .. } => "mysql-explain",
            ActionKind::MySqlExplainJson { .. } => "mysql-explain-json",
            ActionKind::MySqlQueryShow { .. } => "mysql-query-show",
            ActionKind::MySqlQuerySelect { .. } => "mysql-query-select",
            ActionKind::PostgreSqlQueryShow => "postgresql-query-show",
            ActionKind::PostgreSqlQuerySelect { .. } => "postgresql-query-select",
            ActionKind::MongoDbQueryGetParameter => "mongodb-query-getparameter",
            ActionKind::MongoDbQueryBuildInfo => "mongodb-query-buildinfo",
            ActionKind::MongoDbQueryGetCmdLineOpts => "mongodb-query-getcmdlineopts",
        }
    }

    pub fn owner(&self) -> OwnerKind {
        match self {
            ActionKind::PtSummary(_) => OwnerKind::Node,
            _ => OwnerKind::Service,
        }
    }

    /// Kinds that connect to the database need the exporter's DSN
    pub fn requires_dsn(&self) -> bool {
        !matches!(
            self,
            ActionKind::PtSummary(_) | ActionKind::PtMySqlSummary { .. }
        )
    }
}

/// Lifecycle state of an [`Action`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionState {
    Created,
    Prepared,
    Dispatched,
    Completed,
    Failed,
    Canceled,
}

impl ActionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionState::Created => "created",
            ActionState::Prepared => "prepared",
            ActionState::Dispatched => "dispatched",
            ActionState::Completed => "completed",
            ActionState::Failed => "failed",
            ActionState::Canceled => "canceled",
        }
    }

    fn can_move_to(&self, next: ActionState) -> bool {
        matches!(
            (self, next),
            (ActionState::Created, ActionState::Prepared)
                | (ActionState::Prepared, ActionState::Dispatched)
                | (ActionState::Prepared, ActionState::Failed)
                | (ActionState::Dispatched, ActionState::Completed)
                | (ActionState::Dispatched, ActionState::Failed)
                | (ActionState::Dispatched, ActionState::Canceled)
        )
    }

    /// State implied by a polled result
    pub fn of_result(result: &ActionResult) -> Self {
        match (result.done, result.error.is_empty()) {
            (false, _) => ActionState::Dispatched,
            (true, true) => ActionState::Completed,
            (true, false) => ActionState::Failed,
        }
    }
}

/// A single diagnostic run on a remote agent
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub id: String,
    pub kind: ActionKind,
    /// Node id for node-level kinds, service id otherwise
    pub owner_id: String,
    /// Requested agent, replaced by the resolved one on prepare
    pub pmm_agent_id: String,
    pub dsn: Option<String>,
    state: ActionState,
}

impl Action {
    pub fn new(owner_id: impl Into<String>, pmm_agent_id: impl Into<String>, kind: ActionKind) -> Self {
        Self {
            id: new_action_id(),
            kind,
            owner_id: owner_id.into(),
            pmm_agent_id: pmm_agent_id.into(),
            dsn: None,
            state: ActionState::Created,
        }
    }

    pub fn state(&self) -> ActionState {
        self.state
    }

    pub(crate) fn advance(&mut self, next: ActionState) -> Result<(), ActionError> {
        if !self.state.can_move_to(next) {
            return Err(ActionError::InvalidTransition {
                from: self.state.as_str(),
                to: next.as_str(),
            });
        }
        self.state = next;
        Ok(())
    }

    /// Update a dispatched action from its polled result.
    pub fn observe(&mut self, result: &ActionResult) {
        if self.state == ActionState::Dispatched {
            self.state = ActionState::of_result(result);
        }
    }
}

fn new_action_id() -> String {
    format!("/action_id/{}", Uuid::new_v4())
}
