//! Provisioning Event Logger
//!
//! Typed provisioning events (resource added, warning, access decision)
//! emitted under the `provisioning` target, so the JSON file layer yields one
//! NDJSON line per event.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use enclave_core::{BuildEvent, BuildEventKind};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProvisioningEvent {
    ResourceAdded {
        id: String,
        kind: String,
    },
    EdgeAdded {
        edge: String,
    },
    Warning {
        subject: String,
        message: String,
    },
    Decision {
        role: String,
        action: String,
        resource: String,
        allowed: bool,
        reason: String,
    },
    Realized {
        realizer: String,
        resources: usize,
    },
}

impl ProvisioningEvent {
    fn is_warning(&self) -> bool {
        matches!(self, ProvisioningEvent::Warning { .. })
    }
}

impl From<&BuildEvent> for ProvisioningEvent {
    fn from(event: &BuildEvent) -> Self {
        let detail = |key: &str| {
            event
                .detail
                .get(key)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };
        match event.kind {
            BuildEventKind::ResourceAdded => ProvisioningEvent::ResourceAdded {
                id: event.subject.clone(),
                kind: detail("kind"),
            },
            BuildEventKind::EdgeAdded => ProvisioningEvent::EdgeAdded {
                edge: event.subject.clone(),
            },
            BuildEventKind::WarningRaised => ProvisioningEvent::Warning {
                subject: event.subject.clone(),
                message: detail("message"),
            },
            BuildEventKind::ValidationPassed => ProvisioningEvent::ResourceAdded {
                id: event.subject.clone(),
                kind: "validation".into(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProvisioningLogEntry {
    pub stack: String,
    pub timestamp: DateTime<Utc>,
    pub event: ProvisioningEvent,
}

pub struct BuildEventLogger;

impl BuildEventLogger {
    /// Emit one provisioning event for `stack`.
    pub fn log_event(stack: &str, event: ProvisioningEvent) -> ProvisioningLogEntry {
        let entry = ProvisioningLogEntry {
            stack: stack.into(),
            timestamp: Utc::now(),
            event,
        };
        let line = serde_json::to_string(&entry).unwrap_or_default();
        if entry.event.is_warning() {
            warn!(target: "provisioning", stack, event = %line, "Provisioning warning");
        } else {
            info!(target: "provisioning", stack, event = %line, "Provisioning event");
        }
        entry
    }

    /// Replay a graph's build journal, one log line per entry.
    pub fn replay_journal(stack: &str, journal: &[BuildEvent]) -> usize {
        for event in journal {
            Self::log_event(stack, event.into());
        }
        journal.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn journal_entries_map_to_events() {
        let added = BuildEvent::new(
            BuildEventKind::ResourceAdded,
            "bucket/docs",
            json!({"kind": "bucket"}),
        );
        match ProvisioningEvent::from(&added) {
            ProvisioningEvent::ResourceAdded { id, kind } => {
                assert_eq!(id, "bucket/docs");
                assert_eq!(kind, "bucket");
            }
            other => panic!("unexpected event: {other:?}"),
        }

        let warning = BuildEvent::new(
            BuildEventKind::WarningRaised,
            "principal/runner",
            json!({"message": "no endpoint"}),
        );
        assert!(ProvisioningEvent::from(&warning).is_warning());
    }

    #[test]
    fn entries_serialize_with_type_tag() {
        let entry = BuildEventLogger::log_event(
            "enclave",
            ProvisioningEvent::Decision {
                role: "runner".into(),
                action: "s3:GetObject".into(),
                resource: "arn:aws:s3:::docs/uploads/a.pdf".into(),
                allowed: false,
                reason: "explicit deny".into(),
            },
        );
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["stack"], "enclave");
        assert_eq!(value["event"]["type"], "decision");
        assert_eq!(value["event"]["allowed"], false);
    }

    #[test]
    fn replay_counts_entries() {
        let journal = vec![
            BuildEvent::new(BuildEventKind::ResourceAdded, "network/a", json!({})),
            BuildEvent::new(BuildEventKind::EdgeAdded, "a -> b", json!({})),
        ];
        assert_eq!(BuildEventLogger::replay_journal("enclave", &journal), 2);
    }
}
