//! Results produced by check scripts

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Target;

/// Syslog-style severity of a check finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Unknown,
    Emergency,
    Alert,
    Critical,
    Error,
    Warning,
    Notice,
    Info,
    Debug,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Unknown => "unknown",
            Severity::Emergency => "emergency",
            Severity::Alert => "alert",
            Severity::Critical => "critical",
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Notice => "notice",
            Severity::Info => "info",
            Severity::Debug => "debug",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "unknown" => Severity::Unknown,
            "emergency" => Severity::Emergency,
            "alert" => Severity::Alert,
            "critical" => Severity::Critical,
            "error" => Severity::Error,
            "warning" => Severity::Warning,
            "notice" => Severity::Notice,
            "info" => Severity::Info,
            "debug" => Severity::Debug,
            other => return Err(format!("unknown severity {other:?}")),
        })
    }
}

/// One finding as returned by a script, before it is tied to a target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptResult {
    pub summary: String,
    pub description: String,
    pub severity: Severity,
    pub labels: HashMap<String, String>,
}

/// A finding for one check on one target
#[derive(Debug, Clone, PartialEq)]
pub struct CheckResult {
    pub check_name: String,
    pub target: Target,
    pub severity: Severity,
    pub summary: String,
    pub description: String,
    pub labels: HashMap<String, String>,
}

impl CheckResult {
    pub fn new(check_name: &str, target: &Target, result: ScriptResult) -> Self {
        Self {
            check_name: check_name.to_string(),
            target: target.clone(),
            severity: result.severity,
            summary: result.summary,
            description: result.description,
            labels: result.labels,
        }
    }
}

fn optional_string(record: &serde_json::Map<String, Value>, key: &str) -> Result<String, String> {
    match record.get(key) {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(format!("{key} must be a string, got {other}")),
    }
}

fn parse_record(i: usize, value: &Value) -> Result<ScriptResult, String> {
    let record = value
        .as_object()
        .ok_or_else(|| format!("result {i} is not a dict"))?;

    let severity = match record.get("severity") {
        Some(Value::String(s)) => s.parse::<Severity>().map_err(|e| format!("result {i}: {e}"))?,
        Some(other) => return Err(format!("result {i}: severity must be a string, got {other}")),
        None => return Err(format!("result {i}: missing severity")),
    };
    if severity == Severity::Unknown {
        return Err(format!("result {i}: severity must not be unknown"));
    }

    let mut labels = HashMap::new();
    match record.get("labels") {
        None | Some(Value::Null) => {}
        Some(Value::Object(map)) => {
            for (key, value) in map {
                let value = value.as_str().ok_or_else(|| {
                    format!("result {i}: label {key:?} must be a string, got {value}")
                })?;
                labels.insert(key.clone(), value.to_string());
            }
        }
        Some(other) => return Err(format!("result {i}: labels must be a dict, got {other}")),
    }

    Ok(ScriptResult {
        summary: optional_string(record, "summary").map_err(|e| format!("result {i}: {e}"))?,
        description: optional_string(record, "description")
            .map_err(|e| format!("result {i}: {e}"))?,
        severity,
        labels,
    })
}

/// Validate the value returned by a script's `check` function.
///
/// Any malformed record rejects the whole value.
pub fn parse_script_output(output: &Value) -> Result<Vec<ScriptResult>, String> {
    let records = output
        .as_array()
        .ok_or_else(|| format!("expected a list of results, got {output}"))?;

    records
        .iter()
        .enumerate()
        .map(|(i, record)| parse_record(i, record))
        .collect()
}
