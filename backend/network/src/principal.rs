//! Compute principals placed in the network: the job runner and the
//! administrative host.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use enclave_core::{
    Connectable, EdgeKind, EnclaveError, GroupId, PrincipalId, ResourceGraph, ResourceKind,
    Result, RoleId, ServiceId, SubnetId,
};

use crate::security_group::SecurityGroupGraph;
use crate::topology::NetworkSpace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalKind {
    JobRunner,
    AdministrativeHost,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub id: PrincipalId,
    pub kind: PrincipalKind,
    /// The one execution role this principal runs as.
    pub role: RoleId,
    pub security_groups: Vec<GroupId>,
    pub subnets: Vec<SubnetId>,
    /// Services this principal is configured to call; each one is checked
    /// for a resolvable path at build time.
    pub calls: Vec<ServiceId>,
}

impl Principal {
    pub fn new(id: impl Into<String>, kind: PrincipalKind, role: RoleId) -> Self {
        Self {
            id: PrincipalId::new(id),
            kind,
            role,
            security_groups: Vec::new(),
            subnets: Vec::new(),
            calls: Vec::new(),
        }
    }

    pub fn with_groups(mut self, groups: impl IntoIterator<Item = GroupId>) -> Self {
        self.security_groups.extend(groups);
        self
    }

    pub fn in_subnets(mut self, subnets: impl IntoIterator<Item = SubnetId>) -> Self {
        self.subnets.extend(subnets);
        self
    }

    pub fn calling(mut self, services: impl IntoIterator<Item = ServiceId>) -> Self {
        self.calls.extend(services);
        self
    }
}

impl Connectable for Principal {
    fn connectable_id(&self) -> String {
        self.id.node_id()
    }

    fn security_groups(&self) -> &[GroupId] {
        &self.security_groups
    }

    fn placement(&self) -> &[SubnetId] {
        &self.subnets
    }
}

#[derive(Debug, Clone, Default)]
pub struct PrincipalSet {
    principals: BTreeMap<PrincipalId, Principal>,
}

impl PrincipalSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &PrincipalId) -> Option<&Principal> {
        self.principals.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Principal> + '_ {
        self.principals.values()
    }

    /// Place a principal in `network`. Its role must already be in the graph,
    /// and every group and subnet it names must exist.
    pub fn add(
        &mut self,
        graph: &mut ResourceGraph,
        network: &NetworkSpace,
        groups: &SecurityGroupGraph,
        principal: Principal,
    ) -> Result<Principal> {
        if self.principals.contains_key(&principal.id) {
            return Err(EnclaveError::DuplicateResource(principal.id.node_id()));
        }
        if !graph.contains(&principal.role.node_id()) {
            return Err(EnclaveError::unknown("execution role", principal.role.as_str()));
        }
        for group in &principal.security_groups {
            if groups.get(group).is_none() {
                return Err(EnclaveError::unknown("security group", group.as_str()));
            }
        }
        for subnet in &principal.subnets {
            if network.subnet(subnet).is_none() {
                return Err(EnclaveError::unknown("subnet", subnet.as_str()));
            }
        }

        let node = principal.id.node_id();
        graph.add_child(&network.id.node_id(), node.clone(), ResourceKind::Principal, &principal)?;
        graph.connect(&node, &principal.role.node_id(), EdgeKind::Assumes)?;
        for group in &principal.security_groups {
            graph.connect(&node, &group.node_id(), EdgeKind::AttachedTo)?;
        }
        for subnet in &principal.subnets {
            graph.connect(&node, &subnet.node_id(), EdgeKind::PlacedIn)?;
        }

        info!(principal = %principal.id, kind = ?principal.kind, role = %principal.role, "Principal placed");
        self.principals.insert(principal.id.clone(), principal.clone());
        Ok(principal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{build_network, NetworkLayout, SubnetSpec};

    fn setup() -> (ResourceGraph, NetworkSpace, SecurityGroupGraph) {
        let mut graph = ResourceGraph::new();
        let layout = NetworkLayout {
            name: "enclave".into(),
            cidr: "10.0.0.0/16".parse().unwrap(),
            region: "us-east-1".into(),
            zone_count: 1,
            subnets: vec![SubnetSpec::isolated("private", 24)],
        };
        let net = build_network(&mut graph, &layout).unwrap();
        graph
            .add_resource("role/runner", ResourceKind::ExecutionRole, &serde_json::json!({}))
            .unwrap();
        (graph, net, SecurityGroupGraph::new())
    }

    #[test]
    fn principal_is_wired_into_graph() {
        let (mut graph, net, mut groups) = setup();
        let sg = groups.create_group(&mut graph, &net, "runner-sg".into(), "", false).unwrap();
        let mut set = PrincipalSet::new();
        let p = Principal::new("runner", PrincipalKind::JobRunner, "runner".into())
            .with_groups([sg])
            .in_subnets(net.isolated_subnet_ids());
        let p = set.add(&mut graph, &net, &groups, p).unwrap();

        assert_eq!(graph.targets(&p.id.node_id(), EdgeKind::Assumes).len(), 1);
        assert_eq!(graph.targets(&p.id.node_id(), EdgeKind::AttachedTo).len(), 1);
        graph.validate().unwrap();
    }

    #[test]
    fn principal_requires_existing_role() {
        let (mut graph, net, groups) = setup();
        let mut set = PrincipalSet::new();
        let p = Principal::new("host", PrincipalKind::AdministrativeHost, "missing".into());
        let err = set.add(&mut graph, &net, &groups, p).unwrap_err();
        assert!(matches!(err, EnclaveError::UnknownResource { kind: "execution role", .. }));
    }

    #[test]
    fn principal_rejects_foreign_subnet() {
        let (mut graph, net, groups) = setup();
        let mut set = PrincipalSet::new();
        let p = Principal::new("runner", PrincipalKind::JobRunner, "runner".into())
            .in_subnets([SubnetId::new("elsewhere")]);
        assert!(set.add(&mut graph, &net, &groups, p).is_err());
    }
}
