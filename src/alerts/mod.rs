//! Conversion of check results into self-expiring alerts
//!
//! Alerts are keyed by a stable id so that repeated firings of the same
//! finding refresh `endsAt` instead of piling up.

pub mod registry;
pub mod sink;

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use sha2::{Digest, Sha256};

use crate::checks::CheckResult;

pub use registry::{AlertRegistry, IdAlert, RegistryAlert};
pub use sink::{AlertSink, AlertmanagerSink};

/// Alerts live this many resend intervals before the sink resolves them
pub const RESOLVE_TIMEOUT_FACTOR: u32 = 3;

pub fn alert_ttl(resend_interval: Duration) -> Duration {
    resend_interval.saturating_mul(RESOLVE_TIMEOUT_FACTOR)
}

/// `/stt/` + hex SHA-256 of check name, service id and the labels sorted by key
pub fn alert_id(check_name: &str, service_id: &str, labels: &HashMap<String, String>) -> String {
    let sorted: BTreeMap<_, _> = labels.iter().collect();

    let mut hasher = Sha256::new();
    hasher.update(check_name.as_bytes());
    hasher.update([0]);
    hasher.update(service_id.as_bytes());
    for (key, value) in sorted {
        hasher.update([0]);
        hasher.update(key.as_bytes());
        hasher.update([0]);
        hasher.update(value.as_bytes());
    }

    format!("/stt/{}", hex::encode(hasher.finalize()))
}

/// Labels and annotations of the alert raised for a result
pub fn alert_content(result: &CheckResult) -> (HashMap<String, String>, HashMap<String, String>) {
    let target = &result.target;

    let mut labels = target.labels.clone();
    labels.extend(result.labels.clone());
    labels.insert("alertname".to_string(), result.check_name.clone());
    labels.insert("severity".to_string(), result.severity.to_string());
    labels.insert("stt_check".to_string(), "1".to_string());
    labels.insert("service_id".to_string(), target.service_id.clone());
    labels.insert("service_name".to_string(), target.service_name.clone());

    let annotations = HashMap::from([
        ("summary".to_string(), result.summary.clone()),
        ("description".to_string(), result.description.clone()),
    ]);

    (labels, annotations)
}

/// Build the registry entry for one result.
pub fn to_alert(registry: &AlertRegistry, result: &CheckResult, ttl: Duration) -> IdAlert {
    let (labels, annotations) = alert_content(result);
    IdAlert {
        id: alert_id(&result.check_name, &result.target.service_id, &result.labels),
        alert: registry.create_alert(labels, annotations, ttl),
    }
}
