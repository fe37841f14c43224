//! Error types for the checks pipeline

use std::fmt;

/// Errors raised while fetching, verifying or evaluating checks
///
/// None of these reach users synchronously; they are logged and the
/// affected bundle, check or (check, target) pair is skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChecksError {
    /// The checks endpoint could not be reached or answered with an error
    Transport(String),

    /// Wrong signature count, unknown key or invalid signature
    Verification(String),

    /// The bundle is not a valid list of checks
    Parse(String),

    /// No host function set exists for this check version
    UnsupportedVersion(u32),

    /// Script failed to compile or run, or faulted inside the sandbox
    Script { check: String, message: String },

    /// Script output has the wrong shape or values
    Validation { check: String, message: String },

    /// Reading a local checks file failed
    Io(String),
}

impl fmt::Display for ChecksError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChecksError::Transport(msg) => write!(f, "failed to request checks service: {msg}"),
            ChecksError::Verification(msg) => write!(f, "checks signature verification failed: {msg}"),
            ChecksError::Parse(msg) => write!(f, "failed to parse checks: {msg}"),
            ChecksError::UnsupportedVersion(v) => write!(f, "unsupported check version {v}"),
            ChecksError::Script { check, message } => {
                write!(f, "check {check}: script error: {message}")
            }
            ChecksError::Validation { check, message } => {
                write!(f, "check {check}: invalid result: {message}")
            }
            ChecksError::Io(msg) => write!(f, "I/O error: {msg}"),
        }
    }
}

impl std::error::Error for ChecksError {}

impl From<std::io::Error> for ChecksError {
    fn from(err: std::io::Error) -> Self {
        ChecksError::Io(err.to_string())
    }
}

impl From<serde_yaml::Error> for ChecksError {
    fn from(err: serde_yaml::Error) -> Self {
        ChecksError::Parse(err.to_string())
    }
}
