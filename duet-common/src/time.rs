//! Timestamps stamped into snapshots and manifests

use chrono::{DateTime, SecondsFormat, Utc};

/// Current UTC time formatted for manifests and snapshots (RFC 3339, microseconds)
pub fn now_utc_iso() -> String {
    to_iso(&Utc::now())
}

/// Format a timestamp the way every persisted document stores it
pub fn to_iso(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, false)
}
