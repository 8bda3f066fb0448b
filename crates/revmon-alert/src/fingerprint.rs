//! Deduplication keys for fired alerts.
//!
//! A fingerprint is the SHA-256 of the rule id, the scope and the start of
//! the dedupe bucket `now` falls into. Every evaluation of the same rule and
//! scope inside one bucket yields the same key, so the unique constraint on
//! `alert_instances.fingerprint` keeps at most one instance per bucket.

use chrono::{DateTime, TimeZone, Utc};
use revmon_common::types::AlertScope;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::engine::iso_millis;

const MS_PER_HOUR: i64 = 3_600_000;

/// Start of the `hours`-long bucket containing `now`, aligned to the Unix
/// epoch.
pub fn bucket_start(now: DateTime<Utc>, hours: u32) -> DateTime<Utc> {
    let size = i64::from(hours.max(1)) * MS_PER_HOUR;
    let start = now.timestamp_millis().div_euclid(size) * size;
    Utc.timestamp_millis_opt(start).single().unwrap_or(now)
}

// Field order is part of the hashed payload.
#[derive(Serialize)]
struct FingerprintPayload<'a> {
    rule_id: &'a str,
    bucket_start_utc: String,
    tenant_id: Option<&'a str>,
    content_type: Option<&'a str>,
    content_key: Option<&'a str>,
}

/// Lowercase hex SHA-256 identifying `rule_id` on `scope` within the dedupe
/// bucket of `now`.
pub fn fingerprint(rule_id: &str, scope: &AlertScope, now: DateTime<Utc>, hours: u32) -> String {
    let payload = FingerprintPayload {
        rule_id,
        bucket_start_utc: iso_millis(bucket_start(now, hours)),
        tenant_id: scope.tenant_id.as_deref(),
        content_type: scope.content_type.as_deref(),
        content_key: scope.content_key.as_deref(),
    };
    // Serializing a struct of strings cannot fail.
    let encoded = serde_json::to_vec(&payload).unwrap_or_default();
    let digest = Sha256::digest(&encoded);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
