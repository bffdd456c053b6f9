//! Security-group graph.
//!
//! Groups hold ordered, additive ingress and egress rules. There is no deny
//! rule at this layer: traffic is admitted only by an explicit rule, and every
//! direction has to be declared on its own. `allow` writes both halves of one
//! direction (ingress on the destination, egress on the source) and nothing
//! else, so connectivity never becomes transitive or symmetric by accident.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use enclave_core::{
    Cidr, Connectable, EdgeKind, EnclaveError, GroupId, NetworkId, PortRange, Protocol,
    ResourceGraph, ResourceKind, Result, ServiceId, SubnetId,
};

use crate::endpoint::{Endpoint, EndpointKind};
use crate::topology::NetworkSpace;

/// The other side of a traffic rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Peer {
    Group(GroupId),
    Cidr(Cidr),
    /// The managed address list of a gateway service.
    PrefixList(ServiceId),
}

impl Peer {
    pub fn any_ipv4() -> Self {
        Peer::Cidr(Cidr::ANY)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub peer: Peer,
    pub protocol: Protocol,
    pub ports: PortRange,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Rule {
    pub fn tcp(peer: Peer, ports: PortRange) -> Self {
        Self {
            peer,
            protocol: Protocol::Tcp,
            ports,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// True when this rule covers traffic of `protocol` on `ports`.
    pub fn covers(&self, protocol: Protocol, ports: &PortRange) -> bool {
        self.protocol.covers(protocol) && self.ports.covers(ports)
    }

    fn same_traffic(&self, other: &Rule) -> bool {
        self.peer == other.peer && self.protocol == other.protocol && self.ports == other.ports
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityGroup {
    pub id: GroupId,
    pub network: NetworkId,
    pub description: String,
    /// Groups created this way never carry explicit egress rules.
    pub allow_all_outbound: bool,
    pub ingress: Vec<Rule>,
    pub egress: Vec<Rule>,
}

impl Connectable for SecurityGroup {
    fn connectable_id(&self) -> String {
        self.id.node_id()
    }

    fn security_groups(&self) -> &[GroupId] {
        std::slice::from_ref(&self.id)
    }

    fn placement(&self) -> &[SubnetId] {
        &[]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Ingress,
    Egress,
}

impl Direction {
    fn as_str(&self) -> &'static str {
        match self {
            Direction::Ingress => "ingress",
            Direction::Egress => "egress",
        }
    }

    fn resource_kind(&self) -> ResourceKind {
        match self {
            Direction::Ingress => ResourceKind::IngressRule,
            Direction::Egress => ResourceKind::EgressRule,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SecurityGroupGraph {
    groups: BTreeMap<GroupId, SecurityGroup>,
}

impl SecurityGroupGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &GroupId) -> Option<&SecurityGroup> {
        self.groups.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SecurityGroup> + '_ {
        self.groups.values()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Create a group owned by `network`.
    pub fn create_group(
        &mut self,
        graph: &mut ResourceGraph,
        network: &NetworkSpace,
        id: GroupId,
        description: impl Into<String>,
        allow_all_outbound: bool,
    ) -> Result<GroupId> {
        if self.groups.contains_key(&id) {
            return Err(EnclaveError::DuplicateResource(id.node_id()));
        }
        let group = SecurityGroup {
            id: id.clone(),
            network: network.id.clone(),
            description: description.into(),
            allow_all_outbound,
            ingress: Vec::new(),
            egress: Vec::new(),
        };
        graph.add_child(
            &network.id.node_id(),
            id.node_id(),
            ResourceKind::SecurityGroup,
            &serde_json::json!({
                "description": group.description,
                "allowAllOutbound": allow_all_outbound,
            }),
        )?;
        debug!(group = %id, allow_all_outbound, "Security group created");
        self.groups.insert(id.clone(), group);
        Ok(id)
    }

    /// Append one ingress rule. Identical rules are not repeated.
    pub fn add_ingress_rule(&mut self, graph: &mut ResourceGraph, group: &GroupId, rule: Rule) -> Result<()> {
        self.append(graph, group, Direction::Ingress, rule)
    }

    /// Append one egress rule. A no-op on allow-all-outbound groups, whose
    /// egress side already covers everything.
    pub fn add_egress_rule(&mut self, graph: &mut ResourceGraph, group: &GroupId, rule: Rule) -> Result<()> {
        self.append(graph, group, Direction::Egress, rule)
    }

    fn append(
        &mut self,
        graph: &mut ResourceGraph,
        group_id: &GroupId,
        direction: Direction,
        rule: Rule,
    ) -> Result<()> {
        if let Peer::Group(peer) = &rule.peer {
            if !self.groups.contains_key(peer) {
                return Err(EnclaveError::unknown("security group", peer.as_str()));
            }
        }
        let group = self
            .groups
            .get_mut(group_id)
            .ok_or_else(|| EnclaveError::unknown("security group", group_id.as_str()))?;

        if direction == Direction::Egress && group.allow_all_outbound {
            debug!(group = %group_id, "Skipping egress rule on allow-all-outbound group");
            return Ok(());
        }
        let rules = match direction {
            Direction::Ingress => &mut group.ingress,
            Direction::Egress => &mut group.egress,
        };
        if rules.iter().any(|r| r.same_traffic(&rule)) {
            debug!(group = %group_id, direction = direction.as_str(), "Rule already present");
            return Ok(());
        }

        let node = format!("{}/{}/{}", group_id.node_id(), direction.as_str(), rules.len());
        graph.add_child(&group_id.node_id(), node.clone(), direction.resource_kind(), &rule)?;
        if let Peer::Group(peer) = &rule.peer {
            graph.connect(&node, &peer.node_id(), EdgeKind::Peer)?;
        }
        rules.push(rule);
        Ok(())
    }

    /// Admit `source` into `dest` on `ports`: one ingress rule on every
    /// destination group per source group, and the matching egress rules on
    /// the source groups.
    ///
    /// Only the `source → dest` direction is opened.
    pub fn allow(
        &mut self,
        graph: &mut ResourceGraph,
        source: &dyn Connectable,
        dest: &dyn Connectable,
        ports: PortRange,
    ) -> Result<()> {
        if source.security_groups().is_empty() {
            return Err(EnclaveError::InvalidGraph(format!(
                "{} has no security groups to allow traffic from",
                source.connectable_id()
            )));
        }
        if dest.security_groups().is_empty() {
            return Err(EnclaveError::InvalidGraph(format!(
                "{} has no security groups to admit traffic into",
                dest.connectable_id()
            )));
        }

        for dst in dest.security_groups() {
            for src in source.security_groups() {
                let rule = Rule::tcp(Peer::Group(src.clone()), ports)
                    .with_description(format!("from {}:{ports}", source.connectable_id()));
                self.add_ingress_rule(graph, dst, rule)?;
            }
        }
        for src in source.security_groups() {
            for dst in dest.security_groups() {
                let rule = Rule::tcp(Peer::Group(dst.clone()), ports)
                    .with_description(format!("to {}:{ports}", dest.connectable_id()));
                self.add_egress_rule(graph, src, rule)?;
            }
        }
        info!(
            source = %source.connectable_id(),
            dest = %dest.connectable_id(),
            ports = %ports,
            "Connectivity allowed"
        );
        Ok(())
    }

    /// Open an interface endpoint's default port to `source`.
    pub fn allow_default_port_from(
        &mut self,
        graph: &mut ResourceGraph,
        endpoint: &Endpoint,
        source: &dyn Connectable,
    ) -> Result<()> {
        match endpoint.kind {
            EndpointKind::Interface { port, .. } => self.allow(graph, source, endpoint, port),
            EndpointKind::Gateway { .. } => Err(EnclaveError::InvalidGraph(format!(
                "{} is a gateway endpoint; use allow_to_gateway",
                endpoint.id
            ))),
        }
    }

    /// Let `source` send to a gateway endpoint's service prefix list. Gateway
    /// endpoints carry no groups, so only the egress half exists.
    pub fn allow_to_gateway(
        &mut self,
        graph: &mut ResourceGraph,
        source: &dyn Connectable,
        endpoint: &Endpoint,
    ) -> Result<()> {
        if !endpoint.is_gateway() {
            return Err(EnclaveError::InvalidGraph(format!(
                "{} is not a gateway endpoint",
                endpoint.id
            )));
        }
        let ports = endpoint.service.default_port();
        for src in source.security_groups() {
            let rule = Rule::tcp(Peer::PrefixList(endpoint.service), ports)
                .with_description(format!("to {} prefix list", endpoint.service));
            self.add_egress_rule(graph, src, rule)?;
        }
        Ok(())
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
            zone_count: 2,
            subnets: vec![SubnetSpec::isolated("private", 24)],
        };
        let net = build_network(&mut graph, &layout).unwrap();
        (graph, net, SecurityGroupGraph::new())
    }

    #[test]
    fn allow_writes_both_halves_of_one_direction() {
        let (mut graph, net, mut groups) = setup();
        let a = groups.create_group(&mut graph, &net, "a".into(), "a", false).unwrap();
        let b = groups.create_group(&mut graph, &net, "b".into(), "b", false).unwrap();
        let group_a = groups.get(&a).unwrap().clone();
        let group_b = groups.get(&b).unwrap().clone();

        groups.allow(&mut graph, &group_a, &group_b, PortRange::single(443)).unwrap();

        let b_after = groups.get(&b).unwrap();
        assert_eq!(b_after.ingress.len(), 1);
        assert_eq!(b_after.ingress[0].peer, Peer::Group(a.clone()));
        assert!(b_after.egress.is_empty(), "reverse direction must not be opened");

        let a_after = groups.get(&a).unwrap();
        assert_eq!(a_after.egress.len(), 1);
        assert!(a_after.ingress.is_empty());
    }

    #[test]
    fn allow_all_outbound_groups_get_no_egress_rules() {
        let (mut graph, net, mut groups) = setup();
        let open = groups.create_group(&mut graph, &net, "open".into(), "", true).unwrap();
        let dst = groups.create_group(&mut graph, &net, "dst".into(), "", false).unwrap();
        let src_group = groups.get(&open).unwrap().clone();
        let dst_group = groups.get(&dst).unwrap().clone();

        groups.allow(&mut graph, &src_group, &dst_group, PortRange::single(443)).unwrap();
        assert!(groups.get(&open).unwrap().egress.is_empty());
        assert_eq!(groups.get(&dst).unwrap().ingress.len(), 1);
    }

    #[test]
    fn identical_rules_are_not_duplicated() {
        let (mut graph, net, mut groups) = setup();
        let a = groups.create_group(&mut graph, &net, "a".into(), "", false).unwrap();
        let rule = Rule::tcp(Peer::any_ipv4(), PortRange::single(443));
        groups.add_egress_rule(&mut graph, &a, rule.clone()).unwrap();
        let nodes = graph.node_count();
        groups.add_egress_rule(&mut graph, &a, rule).unwrap();
        assert_eq!(groups.get(&a).unwrap().egress.len(), 1);
        assert_eq!(graph.node_count(), nodes);
    }

    #[test]
    fn rules_become_graph_nodes_with_peer_edges() {
        let (mut graph, net, mut groups) = setup();
        let a = groups.create_group(&mut graph, &net, "a".into(), "", false).unwrap();
        let b = groups.create_group(&mut graph, &net, "b".into(), "", false).unwrap();
        groups
            .add_ingress_rule(&mut graph, &b, Rule::tcp(Peer::Group(a.clone()), PortRange::single(443)))
            .unwrap();
        let rule_node = format!("{}/ingress/0", b.node_id());
        assert!(graph.contains(&rule_node));
        let peers = graph.targets(&rule_node, EdgeKind::Peer);
        assert_eq!(peers[0].id, a.node_id());
        graph.validate().unwrap();
    }

    #[test]
    fn unknown_peer_group_is_rejected() {
        let (mut graph, net, mut groups) = setup();
        let a = groups.create_group(&mut graph, &net, "a".into(), "", false).unwrap();
        let err = groups
            .add_ingress_rule(&mut graph, &a, Rule::tcp(Peer::Group("ghost".into()), PortRange::single(22)))
            .unwrap_err();
        assert!(matches!(err, EnclaveError::UnknownResource { .. }));
    }

    #[test]
    fn duplicate_group_is_rejected() {
        let (mut graph, net, mut groups) = setup();
        groups.create_group(&mut graph, &net, "a".into(), "", false).unwrap();
        assert!(groups.create_group(&mut graph, &net, "a".into(), "", false).is_err());
    }
}
