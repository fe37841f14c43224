use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Source of the current time, replaceable in tests
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

/// Add a std duration to a timestamp, saturating instead of overflowing.
pub fn add_duration(at: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(duration)
        .ok()
        .and_then(|d| at.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

// Environment variables below only exist for testing against
// non-production checks endpoints.

const CHECKS_HOST: &str = "FLEET_TEST_CHECKS_HOST";

pub fn get_checks_host() -> Option<String> {
    std::env::var(CHECKS_HOST).ok().filter(|h| !h.is_empty())
}

const CHECKS_PUBLIC_KEY: &str = "FLEET_TEST_CHECKS_PUBLIC_KEY";

pub fn get_checks_public_keys() -> Option<Vec<String>> {
    std::env::var(CHECKS_PUBLIC_KEY)
        .ok()
        .filter(|k| !k.is_empty())
        .map(|keys| keys.split(',').map(|k| k.trim().to_string()).collect())
}

const CHECKS_INTERVAL: &str = "FLEET_TEST_CHECKS_INTERVAL";

pub fn get_checks_interval() -> Option<u64> {
    std::env::var(CHECKS_INTERVAL)
        .ok()
        .and_then(|res| res.parse().ok())
        .filter(|secs| *secs > 0)
}

const CHECKS_TIMEOUT: &str = "FLEET_TEST_CHECKS_TIMEOUT";

pub fn get_checks_timeout() -> Option<u64> {
    std::env::var(CHECKS_TIMEOUT)
        .ok()
        .and_then(|res| res.parse().ok())
        .filter(|secs| *secs > 0)
}

const CHECKS_FILE: &str = "FLEET_TEST_CHECKS_FILE";

pub fn get_checks_file() -> Option<PathBuf> {
    std::env::var(CHECKS_FILE)
        .ok()
        .filter(|f| !f.is_empty())
        .map(PathBuf::from)
}
