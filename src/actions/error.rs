//! Error types for action dispatch

use std::fmt;

/// Status class an [`ActionError`] is reported with to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    FailedPrecondition,
    NotFound,
    Internal,
}

/// Errors that can occur while preparing, dispatching or polling actions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    /// No explicit agent was requested and the owner has zero or several agents
    AmbiguousTarget { owner_id: String, candidates: usize },

    /// The explicitly requested agent is not bound to the owner
    TargetNotFound { owner_id: String, requested: String },

    /// A DSN was required but the service has zero or several matching exporters
    UnsupportedOrAmbiguousExporter { service_id: String, found: usize },

    /// The owning service is unknown or of an unsupported type
    UnknownService(String),

    /// No result is stored under the given action id
    NotFound(String),

    /// A result with the given id is already stored
    AlreadyExists(String),

    /// The result already reached its terminal state
    AlreadyDone(String),

    /// The action was used out of order (e.g. started before it was prepared)
    InvalidTransition { from: &'static str, to: &'static str },

    /// Inventory lookup failed
    Inventory(String),

    /// Sending to the remote agent failed
    Transport(String),
}

impl ActionError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ActionError::AmbiguousTarget { .. }
            | ActionError::TargetNotFound { .. }
            | ActionError::UnsupportedOrAmbiguousExporter { .. }
            | ActionError::UnknownService(_)
            | ActionError::InvalidTransition { .. } => ErrorCode::FailedPrecondition,
            ActionError::NotFound(_) => ErrorCode::NotFound,
            ActionError::AlreadyExists(_)
            | ActionError::AlreadyDone(_)
            | ActionError::Inventory(_)
            | ActionError::Transport(_) => ErrorCode::Internal,
        }
    }
}

impl fmt::Display for ActionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionError::AmbiguousTarget {
                owner_id,
                candidates,
            } => write!(
                f,
                "couldn't find pmm-agent to run action for {owner_id}: {candidates} candidates, pass one explicitly"
            ),
            ActionError::TargetNotFound {
                owner_id,
                requested,
            } => write!(f, "pmm-agent {requested} is not bound to {owner_id}"),
            ActionError::UnsupportedOrAmbiguousExporter { service_id, found } => write!(
                f,
                "couldn't resolve exporter for service {service_id}: found {found}"
            ),
            ActionError::UnknownService(id) => write!(f, "unknown or unsupported service {id}"),
            ActionError::NotFound(id) => write!(f, "action result {id} wasn't found"),
            ActionError::AlreadyExists(id) => write!(f, "action result {id} already exists"),
            ActionError::AlreadyDone(id) => write!(f, "action {id} already finished"),
            ActionError::InvalidTransition { from, to } => {
                write!(f, "invalid action state transition {from} -> {to}")
            }
            ActionError::Inventory(msg) => write!(f, "inventory lookup failed: {msg}"),
            ActionError::Transport(msg) => write!(f, "failed to reach pmm-agent: {msg}"),
        }
    }
}

impl std::error::Error for ActionError {}
