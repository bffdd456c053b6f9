//! Storage notification payloads as delivered to the job runner.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static ESCAPE: Lazy<Regex> = Lazy::new(|| Regex::new(r"%[0-9A-Fa-f]{2}").unwrap());

/// One object event, flattened out of a `Records[]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectNotification {
    pub event_name: String,
    pub bucket: String,
    /// Object key, already URL-decoded.
    pub key: String,
    pub version_id: Option<String>,
    pub size: Option<u64>,
}

/// Identity of one delivery for deduplication. The same object written twice
/// yields two versions and therefore two keys; a redelivery yields the same.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeliveryKey {
    pub bucket: String,
    pub key: String,
    pub version: Option<String>,
}

impl ObjectNotification {
    pub fn delivery_key(&self) -> DeliveryKey {
        DeliveryKey {
            bucket: self.bucket.clone(),
            key: self.key.clone(),
            version: self.version_id.clone(),
        }
    }

    pub fn uri(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key)
    }
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "Records", default)]
    records: Vec<Record>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Record {
    event_name: String,
    s3: S3Entity,
}

#[derive(Deserialize)]
struct S3Entity {
    bucket: BucketEntity,
    object: ObjectEntity,
}

#[derive(Deserialize)]
struct BucketEntity {
    name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectEntity {
    key: String,
    #[serde(default)]
    version_id: Option<String>,
    #[serde(default)]
    size: Option<u64>,
}

/// Parse a notification payload. A payload without `Records` yields nothing.
pub fn parse_notification(payload: &Value) -> Result<Vec<ObjectNotification>> {
    let envelope: Envelope =
        serde_json::from_value(payload.clone()).context("malformed storage notification")?;
    envelope
        .records
        .into_iter()
        .map(|r| {
            Ok(ObjectNotification {
                event_name: r.event_name,
                bucket: r.s3.bucket.name,
                key: decode_key(&r.s3.object.key)
                    .with_context(|| format!("undecodable object key {}", r.s3.object.key))?,
                version_id: r.s3.object.version_id.filter(|v| !v.is_empty()),
                size: r.s3.object.size,
            })
        })
        .collect()
}

/// Keys arrive form-encoded: `+` is a space and `%XX` an escaped byte.
/// A `%` that does not start a two-digit hex escape is rejected.
fn decode_key(raw: &str) -> Result<String> {
    let escapes = raw.matches('%').count();
    if ESCAPE.find_iter(raw).count() != escapes {
        anyhow::bail!("malformed percent escape");
    }
    let spaced = raw.replace('+', " ");
    let decoded = urlencoding::decode(&spaced).context("key is not UTF-8")?;
    Ok(decoded.into_owned())
}

/// Where the runner writes the extraction result for `source_key`:
/// `<prefix>/<timestamp>/<file stem>.json`.
pub fn output_key(output_prefix: &str, source_key: &str, at: DateTime<Utc>) -> String {
    let stem = Path::new(source_key)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(source_key);
    format!(
        "{}/{}/{stem}.json",
        output_prefix.trim_end_matches('/'),
        at.to_rfc3339_opts(SecondsFormat::Micros, true)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn payload() -> Value {
        json!({
            "Records": [{
                "eventName": "ObjectCreated:Put",
                "s3": {
                    "bucket": { "name": "docs" },
                    "object": { "key": "uploads/tax+form%282024%29.pdf", "versionId": "v1", "size": 1024 }
                }
            }]
        })
    }

    #[test]
    fn parses_records_and_decodes_keys() {
        let parsed = parse_notification(&payload()).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].bucket, "docs");
        assert_eq!(parsed[0].key, "uploads/tax form(2024).pdf");
        assert_eq!(parsed[0].uri(), "s3://docs/uploads/tax form(2024).pdf");

        let mut plus = payload();
        plus["Records"][0]["s3"]["object"]["key"] = json!("uploads/a%2Bb+c%25.pdf");
        assert_eq!(parse_notification(&plus).unwrap()[0].key, "uploads/a+b c%.pdf");
    }

    #[test]
    fn redelivery_has_same_delivery_key() {
        let first = parse_notification(&payload()).unwrap();
        let again = parse_notification(&payload()).unwrap();
        assert_eq!(first[0].delivery_key(), again[0].delivery_key());

        let mut newer = payload();
        newer["Records"][0]["s3"]["object"]["versionId"] = json!("v2");
        let newer = parse_notification(&newer).unwrap();
        assert_ne!(first[0].delivery_key(), newer[0].delivery_key());
    }

    #[test]
    fn empty_payload_yields_nothing() {
        assert!(parse_notification(&json!({})).unwrap().is_empty());
    }

    #[test]
    fn malformed_record_is_an_error() {
        assert!(parse_notification(&json!({ "Records": [{ "eventName": "x" }] })).is_err());
        let mut bad = payload();
        for key in ["uploads/%4", "uploads/%+1", "uploads/%zz.pdf", "uploads/%C3%28"] {
            bad["Records"][0]["s3"]["object"]["key"] = json!(key);
            assert!(parse_notification(&bad).is_err(), "{key} should not decode");
        }
    }

    #[test]
    fn output_key_uses_stem_and_timestamp() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(
            output_key("outputs/", "uploads/scan.pdf", at),
            "outputs/2024-05-01T12:00:00.000000Z/scan.json"
        );
    }
}
