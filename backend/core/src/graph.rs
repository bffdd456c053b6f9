//! Append-only resource graph handed to the realization engine.
//!
//! Builders never mutate a node once added; they only append nodes and typed
//! edges. That lets the whole graph be validated (dependency cycles, per-kind
//! invariants) before anything is realized, instead of trusting call order.

use std::collections::HashMap;

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EnclaveError, Result};
use crate::event::{BuildEvent, BuildEventKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    NetworkSpace,
    Subnet,
    GatewayEndpoint,
    InterfaceEndpoint,
    SecurityGroup,
    IngressRule,
    EgressRule,
    Principal,
    ExecutionRole,
    /// One statement of a role or bucket policy.
    PolicyStatement,
    Bucket,
    BucketPolicy,
    EventBinding,
    Output,
}

/// Typed edge between two resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// Parent → child. A child has at most one parent and is torn down with it.
    Contains,
    /// Endpoint or principal → security group.
    AttachedTo,
    /// Endpoint presence or principal → subnet.
    PlacedIn,
    /// Gateway endpoint → subnet whose route table it extends.
    Routes,
    /// Traffic rule → the group it names as peer.
    Peer,
    /// Principal → execution role.
    Assumes,
    /// Bucket policy → bucket.
    Governs,
    /// Event binding → principal it invokes.
    Triggers,
    /// Event binding → bucket it listens on.
    Watches,
}

impl EdgeKind {
    /// Whether the edge's source has to be created after its target.
    fn source_depends_on_target(&self) -> bool {
        !matches!(self, EdgeKind::Contains)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceNode {
    pub id: String,
    pub kind: ResourceKind,
    pub properties: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub from: String,
    pub to: String,
    pub kind: EdgeKind,
}

/// Serializable snapshot of the graph, nodes in insertion order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphDocument {
    pub nodes: Vec<ResourceNode>,
    pub edges: Vec<EdgeRecord>,
}

#[derive(Debug, Clone, Default)]
pub struct ResourceGraph {
    inner: DiGraph<ResourceNode, EdgeKind>,
    index: HashMap<String, NodeIndex>,
    journal: Vec<BuildEvent>,
}

impl ResourceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a root-level resource.
    pub fn add_resource<P: Serialize + ?Sized>(
        &mut self,
        id: impl Into<String>,
        kind: ResourceKind,
        properties: &P,
    ) -> Result<()> {
        let id = id.into();
        if self.index.contains_key(&id) {
            return Err(EnclaveError::DuplicateResource(id));
        }
        let properties =
            serde_json::to_value(properties).map_err(|e| EnclaveError::Other(e.into()))?;
        let idx = self.inner.add_node(ResourceNode {
            id: id.clone(),
            kind,
            properties,
        });
        self.index.insert(id.clone(), idx);
        debug!(resource = %id, kind = ?kind, "Resource added");
        self.journal.push(BuildEvent::new(
            BuildEventKind::ResourceAdded,
            id,
            serde_json::json!({ "kind": kind }),
        ));
        Ok(())
    }

    /// Append a resource contained in `parent`.
    pub fn add_child<P: Serialize + ?Sized>(
        &mut self,
        parent: &str,
        id: impl Into<String>,
        kind: ResourceKind,
        properties: &P,
    ) -> Result<()> {
        self.lookup(parent)?;
        let id = id.into();
        self.add_resource(id.clone(), kind, properties)?;
        self.connect(parent, &id, EdgeKind::Contains)
    }

    /// Append a typed edge between two existing resources.
    pub fn connect(&mut self, from: &str, to: &str, kind: EdgeKind) -> Result<()> {
        let a = self.lookup(from)?;
        let b = self.lookup(to)?;
        if kind == EdgeKind::Contains
            && self
                .inner
                .edges_directed(b, Direction::Incoming)
                .any(|e| *e.weight() == EdgeKind::Contains)
        {
            return Err(EnclaveError::InvalidGraph(format!(
                "{to} already has a parent; cannot also be contained in {from}"
            )));
        }
        self.inner.add_edge(a, b, kind);
        self.journal.push(BuildEvent::new(
            BuildEventKind::EdgeAdded,
            format!("{from} -> {to}"),
            serde_json::json!({ "kind": kind }),
        ));
        Ok(())
    }

    /// Record a diagnostic or milestone in the build journal.
    pub fn record(&mut self, kind: BuildEventKind, subject: impl Into<String>, detail: serde_json::Value) {
        self.journal.push(BuildEvent::new(kind, subject, detail));
    }

    fn lookup(&self, id: &str) -> Result<NodeIndex> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| EnclaveError::unknown("resource", id))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn node(&self, id: &str) -> Option<&ResourceNode> {
        self.index.get(id).map(|idx| &self.inner[*idx])
    }

    pub fn nodes_of_kind(&self, kind: ResourceKind) -> impl Iterator<Item = &ResourceNode> + '_ {
        self.inner.node_weights().filter(move |n| n.kind == kind)
    }

    /// Targets of `from`'s outgoing edges of `kind`, in insertion order.
    pub fn targets(&self, from: &str, kind: EdgeKind) -> Vec<&ResourceNode> {
        let Some(idx) = self.index.get(from) else {
            return Vec::new();
        };
        let mut found: Vec<NodeIndex> = self
            .inner
            .edges_directed(*idx, Direction::Outgoing)
            .filter(|e| *e.weight() == kind)
            .map(|e| e.target())
            .collect();
        found.sort();
        found.into_iter().map(|i| &self.inner[i]).collect()
    }

    pub fn children(&self, id: &str) -> Vec<&ResourceNode> {
        self.targets(id, EdgeKind::Contains)
    }

    pub fn node_count(&self) -> usize {
        self.inner.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.inner.edge_count()
    }

    pub fn journal(&self) -> &[BuildEvent] {
        &self.journal
    }

    /// Check the graph before hand-off: no dependency cycles, and the
    /// per-kind attachment invariants hold.
    pub fn validate(&self) -> Result<()> {
        self.creation_order()?;

        for node in self.inner.node_weights() {
            let count = |kind| self.targets(&node.id, kind).len();
            match node.kind {
                ResourceKind::Principal if count(EdgeKind::Assumes) != 1 => {
                    return Err(EnclaveError::InvalidGraph(format!(
                        "principal {} must assume exactly one role (found {})",
                        node.id,
                        count(EdgeKind::Assumes)
                    )));
                }
                ResourceKind::InterfaceEndpoint if count(EdgeKind::AttachedTo) == 0 => {
                    return Err(EnclaveError::InvalidGraph(format!(
                        "interface endpoint {} has no security group",
                        node.id
                    )));
                }
                ResourceKind::GatewayEndpoint if count(EdgeKind::AttachedTo) != 0 => {
                    return Err(EnclaveError::InvalidGraph(format!(
                        "gateway endpoint {} cannot carry security groups",
                        node.id
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Resources ordered so that every resource follows everything it
    /// depends on (parents before children).
    pub fn creation_order(&self) -> Result<Vec<&ResourceNode>> {
        let mut deps: DiGraph<(), ()> =
            DiGraph::with_capacity(self.inner.node_count(), self.inner.edge_count());
        for _ in self.inner.node_indices() {
            deps.add_node(());
        }
        for edge in self.inner.edge_references() {
            let (first, then) = if edge.weight().source_depends_on_target() {
                (edge.target(), edge.source())
            } else {
                (edge.source(), edge.target())
            };
            deps.add_edge(first, then, ());
        }

        let order = toposort(&deps, None).map_err(|cycle| {
            EnclaveError::InvalidGraph(format!(
                "dependency cycle through {}",
                self.inner[cycle.node_id()].id
            ))
        })?;
        Ok(order.into_iter().map(|idx| &self.inner[idx]).collect())
    }

    /// Exact reverse of [`creation_order`](Self::creation_order): dependents
    /// first, so removing the network space cascades to everything in it.
    pub fn teardown_order(&self) -> Result<Vec<&ResourceNode>> {
        let mut order = self.creation_order()?;
        order.reverse();
        Ok(order)
    }

    pub fn to_document(&self) -> GraphDocument {
        let nodes = self.inner.node_weights().cloned().collect();
        let edges = self
            .inner
            .edge_references()
            .map(|e| EdgeRecord {
                from: self.inner[e.source()].id.clone(),
                to: self.inner[e.target()].id.clone(),
                kind: *e.weight(),
            })
            .collect();
        GraphDocument { nodes, edges }
    }
}
