pub mod actions;
pub mod actors;
pub mod alerts;
pub mod checks;
pub mod config;
pub mod util;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Kind of database service a target belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceType {
    MySQL,
    PostgreSQL,
    MongoDB,
}

impl ServiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::MySQL => "mysql",
            ServiceType::PostgreSQL => "postgresql",
            ServiceType::MongoDB => "mongodb",
        }
    }
}

impl std::fmt::Display for ServiceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Placeholder pair used by agents to splice query text into a command line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelimiterPair {
    pub left: String,
    pub right: String,
}

impl Default for DelimiterPair {
    fn default() -> Self {
        Self {
            left: "{{".to_string(),
            right: "}}".to_string(),
        }
    }
}

/// A monitored service together with the agent that can reach it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub agent_id: String,
    pub service_id: String,
    pub service_name: String,
    pub service_type: ServiceType,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    pub connection_string: String,
    #[serde(default)]
    pub extra_files: HashMap<String, String>,
    #[serde(default)]
    pub tls_skip_verify: bool,
    #[serde(default)]
    pub delimiter_pair: DelimiterPair,
}
