//! Event bindings: "object created under prefix" → principal invocation.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use enclave_core::{EdgeKind, EnclaveError, PrincipalId, ResourceGraph, ResourceKind, Result};

use crate::notification::ObjectNotification;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "s3:ObjectCreated:*")]
    ObjectCreated,
    #[serde(rename = "s3:ObjectRemoved:*")]
    ObjectRemoved,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::ObjectCreated => "s3:ObjectCreated:*",
            EventType::ObjectRemoved => "s3:ObjectRemoved:*",
        }
    }

    /// Match a concrete notification name such as `ObjectCreated:Put`.
    pub fn matches(&self, event_name: &str) -> bool {
        let name = event_name.strip_prefix("s3:").unwrap_or(event_name);
        match self {
            EventType::ObjectCreated => name.starts_with("ObjectCreated"),
            EventType::ObjectRemoved => name.starts_with("ObjectRemoved"),
        }
    }

    fn slug(&self) -> &'static str {
        match self {
            EventType::ObjectCreated => "object-created",
            EventType::ObjectRemoved => "object-removed",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventBinding {
    pub bucket: String,
    pub prefix: String,
    pub event: EventType,
    pub target: PrincipalId,
}

impl EventBinding {
    pub fn node_id(&self) -> String {
        format!("binding/{}/{}/{}", self.bucket, self.event.slug(), self.prefix)
    }

    pub fn matches(&self, notification: &ObjectNotification) -> bool {
        self.bucket == notification.bucket
            && self.event.matches(&notification.event_name)
            && notification.key.starts_with(&self.prefix)
    }
}

#[derive(Debug, Clone, Default)]
pub struct EventWiring {
    bindings: Vec<EventBinding>,
}

impl EventWiring {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bindings(&self) -> &[EventBinding] {
        &self.bindings
    }

    /// Invoke `target` for every object created under `prefix` in `bucket`.
    pub fn on_object_created(
        &mut self,
        graph: &mut ResourceGraph,
        bucket: &str,
        prefix: &str,
        target: &PrincipalId,
    ) -> Result<EventBinding> {
        self.bind(graph, bucket, prefix, EventType::ObjectCreated, target)
    }

    /// At most one binding exists per (bucket, prefix, event type).
    pub fn bind(
        &mut self,
        graph: &mut ResourceGraph,
        bucket: &str,
        prefix: &str,
        event: EventType,
        target: &PrincipalId,
    ) -> Result<EventBinding> {
        if self
            .bindings
            .iter()
            .any(|b| b.bucket == bucket && b.prefix == prefix && b.event == event)
        {
            return Err(EnclaveError::DuplicateBinding {
                bucket: bucket.to_string(),
                prefix: prefix.to_string(),
                event: event.to_string(),
            });
        }
        let bucket_node = format!("bucket/{bucket}");
        if !graph.contains(&bucket_node) {
            return Err(EnclaveError::unknown("bucket", bucket));
        }
        if !graph.contains(&target.node_id()) {
            return Err(EnclaveError::unknown("principal", target.as_str()));
        }

        let binding = EventBinding {
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
            event,
            target: target.clone(),
        };
        let node = binding.node_id();
        graph.add_resource(node.clone(), ResourceKind::EventBinding, &binding)?;
        graph.connect(&node, &bucket_node, EdgeKind::Watches)?;
        graph.connect(&node, &target.node_id(), EdgeKind::Triggers)?;

        info!(bucket, prefix, event = %event, target = %target, "Event binding added");
        self.bindings.push(binding.clone());
        Ok(binding)
    }

    /// Bindings a notification should be delivered to.
    pub fn route<'a>(&'a self, notification: &ObjectNotification) -> Vec<&'a EventBinding> {
        let matched: Vec<&EventBinding> = self
            .bindings
            .iter()
            .filter(|b| b.matches(notification))
            .collect();
        debug!(
            bucket = %notification.bucket,
            key = %notification.key,
            matched = matched.len(),
            "Notification routed"
        );
        matched
    }
}
