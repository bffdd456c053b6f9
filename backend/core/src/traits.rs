use anyhow::Result;
use async_trait::async_trait;

use crate::graph::ResourceNode;
use crate::types::{GroupId, PortRange, SubnetId};

/// Anything that security-group rules can be written for: endpoints,
/// principals, or a bare group.
pub trait Connectable {
    /// Graph id of the connectable thing, used in diagnostics.
    fn connectable_id(&self) -> String;

    /// Groups whose rules decide this side's traffic.
    fn security_groups(&self) -> &[GroupId];

    /// Subnets this side has addresses in; CIDR peers match against these.
    fn placement(&self) -> &[SubnetId];

    /// The port clients should use, if the thing serves one.
    fn default_port(&self) -> Option<PortRange> {
        None
    }
}

/// The external engine that turns a validated resource graph into real
/// cloud resources.
///
/// Realizers receive resources one at a time in dependency order and never
/// see a graph that failed validation.
#[async_trait]
pub trait Realizer: Send + Sync {
    /// Human-readable name of the backend.
    fn name(&self) -> &str;

    /// Create one resource. Its dependencies have already been created.
    async fn create(&self, resource: &ResourceNode) -> Result<()>;

    /// Destroy one resource. Everything that depends on it is already gone.
    async fn destroy(&self, resource: &ResourceNode) -> Result<()>;
}
