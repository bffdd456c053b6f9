//! Endpoint registry.
//!
//! Endpoints are keyed by (network, service): asking twice for the same pair
//! hands back the endpoint registered the first time instead of creating a
//! second one.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info};

use enclave_core::{
    Connectable, EdgeKind, EnclaveError, EndpointId, GroupId, NetworkId, PortRange,
    ResourceGraph, ResourceKind, Result, ServiceId, SubnetId,
};

use crate::security_group::SecurityGroupGraph;
use crate::topology::NetworkSpace;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EndpointKind {
    /// Route-table based; carries no security groups.
    Gateway { route_tables: Vec<SubnetId> },
    /// One network presence per isolated subnet, fronted by security groups.
    Interface {
        port: PortRange,
        security_groups: Vec<GroupId>,
        presences: Vec<SubnetId>,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub id: EndpointId,
    pub network: NetworkId,
    pub service: ServiceId,
    pub service_name: String,
    pub kind: EndpointKind,
}

impl Endpoint {
    pub fn is_gateway(&self) -> bool {
        matches!(self.kind, EndpointKind::Gateway { .. })
    }

    fn kind_name(&self) -> &'static str {
        match self.kind {
            EndpointKind::Gateway { .. } => "gateway",
            EndpointKind::Interface { .. } => "interface",
        }
    }
}

impl Connectable for Endpoint {
    fn connectable_id(&self) -> String {
        self.id.node_id()
    }

    fn security_groups(&self) -> &[GroupId] {
        match &self.kind {
            EndpointKind::Gateway { .. } => &[],
            EndpointKind::Interface { security_groups, .. } => security_groups,
        }
    }

    fn placement(&self) -> &[SubnetId] {
        match &self.kind {
            EndpointKind::Gateway { route_tables } => route_tables,
            EndpointKind::Interface { presences, .. } => presences,
        }
    }

    fn default_port(&self) -> Option<PortRange> {
        match &self.kind {
            EndpointKind::Gateway { .. } => None,
            EndpointKind::Interface { port, .. } => Some(*port),
        }
    }
}

fn endpoint_id(network: &NetworkSpace, service: ServiceId) -> EndpointId {
    EndpointId::new(format!("vpce-{}-{}", network.id, service))
}

#[derive(Debug, Clone, Default)]
pub struct EndpointRegistry {
    endpoints: BTreeMap<(NetworkId, ServiceId), Endpoint>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, network: &NetworkId, service: ServiceId) -> Option<&Endpoint> {
        self.endpoints.get(&(network.clone(), service))
    }

    pub fn by_id(&self, id: &EndpointId) -> Option<&Endpoint> {
        self.endpoints.values().find(|e| &e.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Endpoint> + '_ {
        self.endpoints.values()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Return the existing endpoint for the pair if it has the expected kind.
    fn existing(&self, network: &NetworkSpace, service: ServiceId, gateway: bool) -> Result<Option<Endpoint>> {
        let Some(existing) = self.get(&network.id, service) else {
            return Ok(None);
        };
        if existing.is_gateway() != gateway {
            return Err(EnclaveError::EndpointKindConflict {
                service,
                existing: existing.kind_name().to_string(),
            });
        }
        debug!(endpoint = %existing.id, "Endpoint already registered");
        Ok(Some(existing.clone()))
    }

    /// Register a route-table endpoint for a gateway-capable service. A route
    /// is added to every isolated subnet.
    pub fn add_gateway_endpoint(
        &mut self,
        graph: &mut ResourceGraph,
        network: &NetworkSpace,
        service: ServiceId,
    ) -> Result<Endpoint> {
        if !service.supports_gateway() {
            return Err(EnclaveError::UnsupportedGateway(service));
        }
        if let Some(existing) = self.existing(network, service, true)? {
            return Ok(existing);
        }

        let endpoint = Endpoint {
            id: endpoint_id(network, service),
            network: network.id.clone(),
            service,
            service_name: service.service_name(&network.region),
            kind: EndpointKind::Gateway {
                route_tables: network.isolated_subnet_ids(),
            },
        };
        let node = endpoint.id.node_id();
        graph.add_child(&network.id.node_id(), node.clone(), ResourceKind::GatewayEndpoint, &endpoint)?;
        for subnet in endpoint.placement() {
            graph.connect(&node, &subnet.node_id(), EdgeKind::Routes)?;
        }

        info!(endpoint = %endpoint.id, service = %service, "Gateway endpoint registered");
        self.endpoints
            .insert((network.id.clone(), service), endpoint.clone());
        Ok(endpoint)
    }

    /// Register an interface endpoint with one presence per isolated subnet.
    ///
    /// With no groups given, a default allow-all-outbound group named
    /// `<endpoint>-sg` is created so the endpoint is never unguarded.
    pub fn add_interface_endpoint(
        &mut self,
        graph: &mut ResourceGraph,
        groups: &mut SecurityGroupGraph,
        network: &NetworkSpace,
        service: ServiceId,
        security_groups: &[GroupId],
    ) -> Result<Endpoint> {
        if let Some(existing) = self.existing(network, service, false)? {
            return Ok(existing);
        }
        for group in security_groups {
            if groups.get(group).is_none() {
                return Err(EnclaveError::unknown("security group", group.as_str()));
            }
        }

        let id = endpoint_id(network, service);
        let security_groups = if security_groups.is_empty() {
            let default = GroupId::new(format!("{id}-sg"));
            groups.create_group(
                graph,
                network,
                default.clone(),
                format!("Default group for {id}"),
                true,
            )?;
            vec![default]
        } else {
            security_groups.to_vec()
        };

        let endpoint = Endpoint {
            id,
            network: network.id.clone(),
            service,
            service_name: service.service_name(&network.region),
            kind: EndpointKind::Interface {
                port: service.default_port(),
                security_groups,
                presences: network.isolated_subnet_ids(),
            },
        };
        let node = endpoint.id.node_id();
        graph.add_child(&network.id.node_id(), node.clone(), ResourceKind::InterfaceEndpoint, &endpoint)?;
        for group in endpoint.security_groups() {
            graph.connect(&node, &group.node_id(), EdgeKind::AttachedTo)?;
        }
        for subnet in endpoint.placement() {
            graph.connect(&node, &subnet.node_id(), EdgeKind::PlacedIn)?;
        }

        info!(
            endpoint = %endpoint.id,
            service = %service,
            presences = endpoint.placement().len(),
            "Interface endpoint registered"
        );
        self.endpoints
            .insert((network.id.clone(), service), endpoint.clone());
        Ok(endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{build_network, NetworkLayout, SubnetSpec};

    fn network(graph: &mut ResourceGraph) -> NetworkSpace {
        let layout = NetworkLayout {
            name: "enclave".into(),
            cidr: "10.0.0.0/16".parse().unwrap(),
            region: "us-east-1".into(),
            zone_count: 2,
            subnets: vec![SubnetSpec::isolated("private-1", 24), SubnetSpec::isolated("private-2", 24)],
        };
        build_network(graph, &layout).unwrap()
    }

    #[test]
    fn gateway_registration_is_idempotent() {
        let mut graph = ResourceGraph::new();
        let net = network(&mut graph);
        let mut registry = EndpointRegistry::new();

        let first = registry.add_gateway_endpoint(&mut graph, &net, ServiceId::Storage).unwrap();
        let nodes = graph.node_count();
        let second = registry.add_gateway_endpoint(&mut graph, &net, ServiceId::Storage).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(registry.len(), 1);
        assert_eq!(graph.node_count(), nodes);
        assert_eq!(graph.nodes_of_kind(ResourceKind::GatewayEndpoint).count(), 1);
    }

    #[test]
    fn interface_registration_is_idempotent() {
        let mut graph = ResourceGraph::new();
        let net = network(&mut graph);
        let mut groups = SecurityGroupGraph::new();
        let mut registry = EndpointRegistry::new();

        let first = registry
            .add_interface_endpoint(&mut graph, &mut groups, &net, ServiceId::OcrService, &[])
            .unwrap();
        let group_count = groups.len();
        let second = registry
            .add_interface_endpoint(&mut graph, &mut groups, &net, ServiceId::OcrService, &[])
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(groups.len(), group_count, "no second default group");
        assert_eq!(graph.nodes_of_kind(ResourceKind::InterfaceEndpoint).count(), 1);
    }

    #[test]
    fn interface_endpoint_has_presence_per_isolated_subnet() {
        let mut graph = ResourceGraph::new();
        let net = network(&mut graph);
        let mut groups = SecurityGroupGraph::new();
        let mut registry = EndpointRegistry::new();
        let ep = registry
            .add_interface_endpoint(&mut graph, &mut groups, &net, ServiceId::SessionBroker, &[])
            .unwrap();
        assert_eq!(ep.placement().len(), 4);
        assert_eq!(graph.targets(&ep.id.node_id(), EdgeKind::PlacedIn).len(), 4);
    }

    #[test]
    fn interface_endpoint_always_has_a_group() {
        let mut graph = ResourceGraph::new();
        let net = network(&mut graph);
        let mut groups = SecurityGroupGraph::new();
        let mut registry = EndpointRegistry::new();
        let ep = registry
            .add_interface_endpoint(&mut graph, &mut groups, &net, ServiceId::Logs, &[])
            .unwrap();
        assert_eq!(ep.security_groups().len(), 1);
        assert!(groups.get(&ep.security_groups()[0]).unwrap().allow_all_outbound);
        graph.validate().unwrap();
    }

    #[test]
    fn explicit_groups_are_used_as_given() {
        let mut graph = ResourceGraph::new();
        let net = network(&mut graph);
        let mut groups = SecurityGroupGraph::new();
        let sg = groups
            .create_group(&mut graph, &net, "endpoint-sg".into(), "shared", true)
            .unwrap();
        let mut registry = EndpointRegistry::new();
        let ep = registry
            .add_interface_endpoint(&mut graph, &mut groups, &net, ServiceId::Invocation, &[sg.clone()])
            .unwrap();
        assert_eq!(ep.security_groups(), &[sg]);
        assert_eq!(groups.len(), 1);
    }

    #[test]
    fn gateway_endpoint_has_no_groups() {
        let mut graph = ResourceGraph::new();
        let net = network(&mut graph);
        let mut registry = EndpointRegistry::new();
        let ep = registry.add_gateway_endpoint(&mut graph, &net, ServiceId::Storage).unwrap();
        assert!(ep.security_groups().is_empty());
        assert_eq!(graph.targets(&ep.id.node_id(), EdgeKind::Routes).len(), 4);
    }

    #[test]
    fn non_gateway_service_rejected() {
        let mut graph = ResourceGraph::new();
        let net = network(&mut graph);
        let mut registry = EndpointRegistry::new();
        let err = registry
            .add_gateway_endpoint(&mut graph, &net, ServiceId::OcrService)
            .unwrap_err();
        assert!(matches!(err, EnclaveError::UnsupportedGateway(ServiceId::OcrService)));
    }

    #[test]
    fn kind_conflict_is_an_error() {
        let mut graph = ResourceGraph::new();
        let net = network(&mut graph);
        let mut groups = SecurityGroupGraph::new();
        let mut registry = EndpointRegistry::new();
        registry.add_gateway_endpoint(&mut graph, &net, ServiceId::Storage).unwrap();
        let err = registry
            .add_interface_endpoint(&mut graph, &mut groups, &net, ServiceId::Storage, &[])
            .unwrap_err();
        assert!(matches!(err, EnclaveError::EndpointKindConflict { .. }));
    }
}
