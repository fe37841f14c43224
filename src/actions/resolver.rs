//! Agent resolution for actions
//!
//! Both steps are pure: they only look at the candidate lists handed in by
//! the caller and never touch inventory or the result store.

use serde::{Deserialize, Serialize};

use crate::ServiceType;

use super::error::ActionError;

/// Type of the exporter agent that holds a service's connection details
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExporterType {
    MysqldExporter,
    PostgresExporter,
    MongodbExporter,
}

impl ExporterType {
    pub fn for_service(service_type: ServiceType) -> Self {
        match service_type {
            ServiceType::MySQL => ExporterType::MysqldExporter,
            ServiceType::PostgreSQL => ExporterType::PostgresExporter,
            ServiceType::MongoDB => ExporterType::MongodbExporter,
        }
    }
}

/// Exporter agent as reported by inventory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exporter {
    pub agent_id: String,
    pub pmm_agent_id: String,
    pub service_id: String,
    pub exporter_type: ExporterType,
    pub dsn: String,
}

/// Pick the agent that runs an action.
///
/// An empty `explicit_id` is accepted only when there is exactly one
/// candidate; a non-empty one must appear verbatim in `candidates`.
pub fn resolve_agent(
    owner_id: &str,
    explicit_id: &str,
    candidates: &[String],
) -> Result<String, ActionError> {
    if explicit_id.is_empty() {
        return match candidates {
            [only] => Ok(only.clone()),
            _ => Err(ActionError::AmbiguousTarget {
                owner_id: owner_id.to_string(),
                candidates: candidates.len(),
            }),
        };
    }

    candidates
        .iter()
        .find(|c| c.as_str() == explicit_id)
        .cloned()
        .ok_or_else(|| ActionError::TargetNotFound {
            owner_id: owner_id.to_string(),
            requested: explicit_id.to_string(),
        })
}

/// Pick the single exporter of the expected type bound to `service_id`.
pub fn resolve_exporter<'a>(
    service_id: &str,
    expected: ExporterType,
    exporters: &'a [Exporter],
) -> Result<&'a Exporter, ActionError> {
    let mut matching = exporters
        .iter()
        .filter(|e| e.exporter_type == expected && e.service_id == service_id);

    match (matching.next(), matching.next()) {
        (Some(exporter), None) => Ok(exporter),
        (first, second) => Err(ActionError::UnsupportedOrAmbiguousExporter {
            service_id: service_id.to_string(),
            found: usize::from(first.is_some()) + usize::from(second.is_some()) + matching.count(),
        }),
    }
}
