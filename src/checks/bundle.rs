//! Check definitions and the YAML bundle they are distributed in
//!
//! ```yaml
//! checks:
//!   - version: 1
//!     name: mysql_version
//!     summary: MySQL version check
//!     type: mysql_select
//!     query: "VERSION()"
//!     interval: rare
//!     script: |
//!       fn check(rows) { [] }
//! ```

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::ServiceType;
use crate::actions::ActionKind;

use super::error::ChecksError;

/// How often a check runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interval {
    #[default]
    Standard,
    Rare,
    Frequent,
}

impl Interval {
    pub const ALL: [Interval; 3] = [Interval::Standard, Interval::Rare, Interval::Frequent];

    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::Standard => "standard",
            Interval::Rare => "rare",
            Interval::Frequent => "frequent",
        }
    }
}

/// Data source a check queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckType {
    #[serde(rename = "mysql_show")]
    MySqlShow,
    #[serde(rename = "mysql_select")]
    MySqlSelect,
    #[serde(rename = "postgresql_show")]
    PostgreSqlShow,
    #[serde(rename = "postgresql_select")]
    PostgreSqlSelect,
    #[serde(rename = "mongodb_getparameter")]
    MongoDbGetParameter,
    #[serde(rename = "mongodb_buildinfo")]
    MongoDbBuildInfo,
    #[serde(rename = "mongodb_getcmdlineopts")]
    MongoDbGetCmdLineOpts,
}

impl CheckType {
    pub fn service_type(&self) -> ServiceType {
        match self {
            CheckType::MySqlShow | CheckType::MySqlSelect => ServiceType::MySQL,
            CheckType::PostgreSqlShow | CheckType::PostgreSqlSelect => ServiceType::PostgreSQL,
            CheckType::MongoDbGetParameter
            | CheckType::MongoDbBuildInfo
            | CheckType::MongoDbGetCmdLineOpts => ServiceType::MongoDB,
        }
    }

    /// Query action that collects the rows this check evaluates
    pub fn action_kind(&self, query: &str) -> ActionKind {
        let query = query.to_string();
        match self {
            CheckType::MySqlShow => ActionKind::MySqlQueryShow { query },
            CheckType::MySqlSelect => ActionKind::MySqlQuerySelect { query },
            CheckType::PostgreSqlShow => ActionKind::PostgreSqlQueryShow,
            CheckType::PostgreSqlSelect => ActionKind::PostgreSqlQuerySelect { query },
            CheckType::MongoDbGetParameter => ActionKind::MongoDbQueryGetParameter,
            CheckType::MongoDbBuildInfo => ActionKind::MongoDbQueryBuildInfo,
            CheckType::MongoDbGetCmdLineOpts => ActionKind::MongoDbQueryGetCmdLineOpts,
        }
    }

    fn needs_query(&self) -> bool {
        matches!(
            self,
            CheckType::MySqlShow | CheckType::MySqlSelect | CheckType::PostgreSqlSelect
        )
    }
}

/// A single signed check definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Check {
    pub version: u32,
    pub name: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub check_type: CheckType,
    #[serde(default)]
    pub query: String,
    pub script: String,
    #[serde(default)]
    pub interval: Interval,
}

impl Check {
    pub fn service_type(&self) -> ServiceType {
        self.check_type.service_type()
    }

    fn validate(&self) -> Result<(), ChecksError> {
        if self.name.trim().is_empty() {
            return Err(ChecksError::Parse("check name is empty".to_string()));
        }
        if self.script.trim().is_empty() {
            return Err(ChecksError::Parse(format!("check {} has no script", self.name)));
        }
        if self.check_type.needs_query() && self.query.trim().is_empty() {
            return Err(ChecksError::Parse(format!("check {} has no query", self.name)));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct Bundle {
    checks: Vec<Check>,
}

/// Parse a whole bundle. Any invalid check rejects the bundle.
pub fn parse_checks(input: &str) -> Result<Vec<Check>, ChecksError> {
    let bundle: Bundle = serde_yaml::from_str(input)?;

    let mut names = HashSet::new();
    for check in &bundle.checks {
        check.validate()?;
        if !names.insert(check.name.as_str()) {
            return Err(ChecksError::Parse(format!("duplicate check name {}", check.name)));
        }
    }

    Ok(bundle.checks)
}

/// Checks of one interval class
pub fn filter_checks(checks: &[Check], interval: Interval) -> Vec<Check> {
    checks
        .iter()
        .filter(|c| c.interval == interval)
        .cloned()
        .collect()
}
