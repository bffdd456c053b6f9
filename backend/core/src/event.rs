use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One entry in a resource graph's build journal.
///
/// The journal is append-only, like the graph itself, and records every
/// builder call in the order it happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub kind: BuildEventKind,
    /// Resource id (or `from -> to` for edges) the event is about.
    pub subject: String,
    pub detail: serde_json::Value,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BuildEventKind {
    ResourceAdded,
    EdgeAdded,
    /// A non-fatal diagnostic, e.g. an unreachable service.
    WarningRaised,
    ValidationPassed,
}

impl BuildEvent {
    pub fn new(kind: BuildEventKind, subject: impl Into<String>, detail: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            kind,
            subject: subject.into(),
            detail,
        }
    }
}

impl std::fmt::Display for BuildEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ResourceAdded => "resource_added",
            Self::EdgeAdded => "edge_added",
            Self::WarningRaised => "warning_raised",
            Self::ValidationPassed => "validation_passed",
        };
        write!(f, "{s}")
    }
}
