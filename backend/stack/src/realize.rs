//! Hand-off to a realization engine.
//!
//! Resources go out one at a time: parents and dependencies first on
//! creation, the exact reverse on teardown.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use enclave_core::{Realizer, ResourceGraph, ResourceKind, ResourceNode};

/// Create every resource in `graph`. The graph is validated first; nothing
/// is created from an invalid graph. Stops at the first failure.
pub async fn realize(graph: &ResourceGraph, realizer: &dyn Realizer) -> Result<usize> {
    graph.validate().context("Refusing to realize an invalid graph")?;
    let order = graph.creation_order()?;
    for node in &order {
        realizer
            .create(node)
            .await
            .with_context(|| format!("{} failed to create {}", realizer.name(), node.id))?;
    }
    info!(realizer = realizer.name(), resources = order.len(), "Graph realized");
    Ok(order.len())
}

/// Destroy every resource in `graph`, dependents first. Everything inside
/// the network space goes before the network space itself.
pub async fn teardown(graph: &ResourceGraph, realizer: &dyn Realizer) -> Result<usize> {
    let order = graph.teardown_order()?;
    for node in &order {
        realizer
            .destroy(node)
            .await
            .with_context(|| format!("{} failed to destroy {}", realizer.name(), node.id))?;
    }
    info!(realizer = realizer.name(), resources = order.len(), "Graph torn down");
    Ok(order.len())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RealizeOpKind {
    Create,
    Destroy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RealizeOp {
    pub op: RealizeOpKind,
    pub id: String,
    pub kind: ResourceKind,
}

/// Realizer that records operations instead of performing them.
#[derive(Debug, Clone, Default)]
pub struct DryRunRealizer {
    ops: Arc<Mutex<Vec<RealizeOp>>>,
    fail_on: HashSet<String>,
}

impl DryRunRealizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail when asked to create or destroy the resource `id`.
    pub fn failing_on(mut self, id: impl Into<String>) -> Self {
        self.fail_on.insert(id.into());
        self
    }

    pub async fn operations(&self) -> Vec<RealizeOp> {
        self.ops.lock().await.clone()
    }

    async fn record(&self, op: RealizeOpKind, resource: &ResourceNode) -> Result<()> {
        if self.fail_on.contains(&resource.id) {
            anyhow::bail!("injected failure on {}", resource.id);
        }
        debug!(op = ?op, resource = %resource.id, "Dry run");
        self.ops.lock().await.push(RealizeOp {
            op,
            id: resource.id.clone(),
            kind: resource.kind,
        });
        Ok(())
    }
}

#[async_trait]
impl Realizer for DryRunRealizer {
    fn name(&self) -> &str {
        "dry-run"
    }

    async fn create(&self, resource: &ResourceNode) -> Result<()> {
        self.record(RealizeOpKind::Create, resource).await
    }

    async fn destroy(&self, resource: &ResourceNode) -> Result<()> {
        self.record(RealizeOpKind::Destroy, resource).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enclave::Enclave;
    use crate::settings::EnclaveSettings;
    use enclave_config::EnclaveConfig;
    use enclave_core::EdgeKind;

    fn enclave() -> Enclave {
        Enclave::build(&EnclaveSettings::from_config(&EnclaveConfig::default()).unwrap()).unwrap()
    }

    fn position(ops: &[RealizeOp], id: &str) -> usize {
        ops.iter().position(|op| op.id == id).unwrap()
    }

    #[tokio::test]
    async fn creates_every_resource_parents_first() {
        let enclave = enclave();
        let realizer = DryRunRealizer::new();
        let count = realize(&enclave.graph, &realizer).await.unwrap();
        let ops = realizer.operations().await;
        assert_eq!(count, enclave.graph.node_count());
        assert_eq!(ops.len(), count);

        for edge in enclave.graph.to_document().edges {
            match edge.kind {
                EdgeKind::Contains => assert!(position(&ops, &edge.from) < position(&ops, &edge.to)),
                _ => assert!(position(&ops, &edge.to) < position(&ops, &edge.from)),
            }
        }
    }

    #[tokio::test]
    async fn teardown_is_the_reverse_of_creation() {
        let enclave = enclave();
        let realizer = DryRunRealizer::new();
        realize(&enclave.graph, &realizer).await.unwrap();
        teardown(&enclave.graph, &realizer).await.unwrap();

        let ops = realizer.operations().await;
        let (created, destroyed): (Vec<_>, Vec<_>) =
            ops.into_iter().partition(|op| op.op == RealizeOpKind::Create);
        let mut reversed: Vec<String> = created.into_iter().map(|op| op.id).collect();
        reversed.reverse();
        let destroyed: Vec<String> = destroyed.into_iter().map(|op| op.id).collect();
        assert_eq!(destroyed, reversed);

        let network = destroyed
            .iter()
            .position(|id| *id == enclave.network.id.node_id())
            .unwrap();
        for child in enclave.graph.children(&enclave.network.id.node_id()) {
            assert!(destroyed.iter().position(|id| *id == child.id).unwrap() < network);
        }
    }

    #[tokio::test]
    async fn stops_at_the_first_failure() {
        let enclave = enclave();
        let realizer = DryRunRealizer::new().failing_on("bucket/document-enclave");
        let err = realize(&enclave.graph, &realizer).await.unwrap_err();
        assert!(format!("{err:#}").contains("bucket/document-enclave"));
        let ops = realizer.operations().await;
        assert!(ops.iter().all(|op| op.id != "bucket/document-enclave"));
        assert!(ops.len() < enclave.graph.node_count());
    }
}
