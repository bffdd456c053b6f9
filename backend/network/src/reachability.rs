//! Connectivity resolution.
//!
//! "Can P reach S" holds only when both sides agree: one of P's groups has an
//! egress rule towards S on the port, and one of the groups fronting S has an
//! ingress rule admitting P on that port. Only declared edges count; nothing
//! is inferred through intermediate hops or from the reverse direction.

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use enclave_core::{Cidr, Connectable, EndpointId, PortRange, PrincipalId, Protocol, ServiceId};

use crate::endpoint::{Endpoint, EndpointRegistry};
use crate::principal::{Principal, PrincipalSet};
use crate::security_group::{Peer, SecurityGroupGraph};
use crate::topology::NetworkSpace;

/// Verdict of resolving a principal's path to a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Reachability {
    Reachable { endpoint: EndpointId, ports: PortRange },
    /// No endpoint for the service exists in the principal's network.
    NoEndpoint,
    /// Gateway endpoint exists but routes none of the principal's subnets.
    NotRouted { endpoint: EndpointId },
    MissingEgress { endpoint: EndpointId },
    MissingIngress { endpoint: EndpointId },
    MissingBoth { endpoint: EndpointId },
}

impl Reachability {
    pub fn is_reachable(&self) -> bool {
        matches!(self, Reachability::Reachable { .. })
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Reachability::Reachable { .. } => "reachable",
            Reachability::NoEndpoint => "no endpoint registered for the service",
            Reachability::NotRouted { .. } => "gateway endpoint does not route the principal's subnets",
            Reachability::MissingEgress { .. } => "principal has no egress rule to the endpoint",
            Reachability::MissingIngress { .. } => "endpoint has no ingress rule admitting the principal",
            Reachability::MissingBoth { .. } => "neither egress nor ingress rule is declared",
        }
    }
}

/// Non-fatal build diagnostic: a principal is configured to call a service
/// it has no resolvable path to.
#[derive(Debug, Clone, Error, Serialize)]
#[error("principal {principal} cannot reach {service}: {}", .verdict.reason())]
pub struct UnreachableServiceWarning {
    pub principal: PrincipalId,
    pub service: ServiceId,
    pub verdict: Reachability,
}

/// Read-only view over the network used to answer reachability questions.
pub struct ConnectivityResolver<'a> {
    network: &'a NetworkSpace,
    groups: &'a SecurityGroupGraph,
    endpoints: &'a EndpointRegistry,
}

impl<'a> ConnectivityResolver<'a> {
    pub fn new(
        network: &'a NetworkSpace,
        groups: &'a SecurityGroupGraph,
        endpoints: &'a EndpointRegistry,
    ) -> Self {
        Self {
            network,
            groups,
            endpoints,
        }
    }

    /// True when a CIDR peer contains a whole subnet `side` is placed in.
    fn cidr_matches(&self, cidr: &Cidr, side: &dyn Connectable) -> bool {
        if *cidr == Cidr::ANY {
            return true;
        }
        side.placement()
            .iter()
            .filter_map(|id| self.network.subnet(id))
            .any(|subnet| cidr.contains(&subnet.cidr))
    }

    fn peer_matches(&self, peer: &Peer, side: &dyn Connectable) -> bool {
        match peer {
            Peer::Group(id) => side.security_groups().contains(id),
            Peer::Cidr(cidr) => self.cidr_matches(cidr, side),
            Peer::PrefixList(_) => false,
        }
    }

    /// Source half: some group of `source` may send to `dest` on `ports`.
    pub fn egress_permits(
        &self,
        source: &dyn Connectable,
        dest: &dyn Connectable,
        protocol: Protocol,
        ports: &PortRange,
    ) -> bool {
        source
            .security_groups()
            .iter()
            .filter_map(|id| self.groups.get(id))
            .any(|group| {
                group.allow_all_outbound
                    || group
                        .egress
                        .iter()
                        .any(|rule| rule.covers(protocol, ports) && self.peer_matches(&rule.peer, dest))
            })
    }

    /// Destination half: some group fronting `dest` admits `source` on `ports`.
    pub fn ingress_admits(
        &self,
        source: &dyn Connectable,
        dest: &dyn Connectable,
        protocol: Protocol,
        ports: &PortRange,
    ) -> bool {
        dest.security_groups()
            .iter()
            .filter_map(|id| self.groups.get(id))
            .any(|group| {
                group
                    .ingress
                    .iter()
                    .any(|rule| rule.covers(protocol, ports) && self.peer_matches(&rule.peer, source))
            })
    }

    /// Direct TCP reachability between two connectables. Both halves must be
    /// declared.
    pub fn can_reach(&self, source: &dyn Connectable, dest: &dyn Connectable, ports: PortRange) -> bool {
        self.egress_permits(source, dest, Protocol::Tcp, &ports)
            && self.ingress_admits(source, dest, Protocol::Tcp, &ports)
    }

    fn resolve_gateway(&self, principal: &Principal, endpoint: &Endpoint) -> Reachability {
        let routed = principal
            .subnets
            .iter()
            .any(|s| endpoint.placement().contains(s));
        if !routed {
            return Reachability::NotRouted {
                endpoint: endpoint.id.clone(),
            };
        }

        let ports = endpoint.service.default_port();
        let egress = principal
            .security_groups
            .iter()
            .filter_map(|id| self.groups.get(id))
            .any(|group| {
                group.allow_all_outbound
                    || group.egress.iter().any(|rule| {
                        rule.covers(Protocol::Tcp, &ports)
                            && match &rule.peer {
                                Peer::PrefixList(svc) => *svc == endpoint.service,
                                Peer::Cidr(cidr) => *cidr == Cidr::ANY,
                                Peer::Group(_) => false,
                            }
                    })
            });
        if egress {
            Reachability::Reachable {
                endpoint: endpoint.id.clone(),
                ports,
            }
        } else {
            Reachability::MissingEgress {
                endpoint: endpoint.id.clone(),
            }
        }
    }

    /// Resolve `principal`'s path to `service` through its registered endpoint.
    pub fn resolve_service(&self, principal: &Principal, service: ServiceId) -> Reachability {
        let Some(endpoint) = self.endpoints.get(&self.network.id, service) else {
            return Reachability::NoEndpoint;
        };
        if endpoint.is_gateway() {
            return self.resolve_gateway(principal, endpoint);
        }

        let ports = endpoint.default_port().unwrap_or_else(|| service.default_port());
        let egress = self.egress_permits(principal, endpoint, Protocol::Tcp, &ports);
        let ingress = self.ingress_admits(principal, endpoint, Protocol::Tcp, &ports);
        let id = endpoint.id.clone();
        let verdict = match (egress, ingress) {
            (true, true) => Reachability::Reachable { endpoint: id, ports },
            (false, true) => Reachability::MissingEgress { endpoint: id },
            (true, false) => Reachability::MissingIngress { endpoint: id },
            (false, false) => Reachability::MissingBoth { endpoint: id },
        };
        debug!(principal = %principal.id, service = %service, verdict = verdict.reason(), "Resolved service path");
        verdict
    }

    /// Check every configured call of every principal and report the ones
    /// without a path. Each warning is also logged.
    pub fn diagnose(&self, principals: &PrincipalSet) -> Vec<UnreachableServiceWarning> {
        let mut warnings = Vec::new();
        for principal in principals.iter() {
            for service in &principal.calls {
                let verdict = self.resolve_service(principal, *service);
                if verdict.is_reachable() {
                    continue;
                }
                let warning = UnreachableServiceWarning {
                    principal: principal.id.clone(),
                    service: *service,
                    verdict,
                };
                warn!(principal = %warning.principal, service = %warning.service, "{warning}");
                warnings.push(warning);
            }
        }
        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::principal::PrincipalKind;
    use crate::security_group::Rule;
    use crate::topology::{build_network, NetworkLayout, SubnetSpec};
    use enclave_core::{ResourceGraph, ResourceKind};

    struct Fixture {
        graph: ResourceGraph,
        net: NetworkSpace,
        groups: SecurityGroupGraph,
        endpoints: EndpointRegistry,
        principals: PrincipalSet,
    }

    impl Fixture {
        fn new() -> Self {
            let mut graph = ResourceGraph::new();
            let layout = NetworkLayout {
                name: "enclave".into(),
                cidr: "10.0.0.0/16".parse().unwrap(),
                region: "us-east-1".into(),
                zone_count: 2,
                subnets: vec![SubnetSpec::isolated("private", 24)],
            };
            let net = build_network(&mut graph, &layout).unwrap();
            for role in ["a", "b"] {
                graph
                    .add_resource(format!("role/{role}"), ResourceKind::ExecutionRole, &serde_json::json!({}))
                    .unwrap();
            }
            Self {
                graph,
                net,
                groups: SecurityGroupGraph::new(),
                endpoints: EndpointRegistry::new(),
                principals: PrincipalSet::new(),
            }
        }

        fn principal(&mut self, name: &str, allow_all_outbound: bool, calls: &[ServiceId]) -> Principal {
            let sg = self
                .groups
                .create_group(&mut self.graph, &self.net, format!("{name}-sg").as_str().into(), "", allow_all_outbound)
                .unwrap();
            let p = Principal::new(name, PrincipalKind::JobRunner, name.into())
                .with_groups([sg])
                .in_subnets(self.net.isolated_subnet_ids())
                .calling(calls.iter().copied());
            self.principals.add(&mut self.graph, &self.net, &self.groups, p).unwrap()
        }

        fn endpoint_sg(&mut self) -> enclave_core::GroupId {
            self.groups
                .create_group(&mut self.graph, &self.net, "endpoint-sg".into(), "", true)
                .unwrap()
        }

        fn interface(&mut self, service: ServiceId, groups: &[enclave_core::GroupId]) -> Endpoint {
            self.endpoints
                .add_interface_endpoint(&mut self.graph, &mut self.groups, &self.net, service, groups)
                .unwrap()
        }

        fn resolver(&self) -> ConnectivityResolver<'_> {
            ConnectivityResolver::new(&self.net, &self.groups, &self.endpoints)
        }
    }

    #[test]
    fn allow_default_port_makes_endpoint_reachable() {
        let mut f = Fixture::new();
        let runner = f.principal("a", false, &[ServiceId::OcrService]);
        let sg = f.endpoint_sg();
        let ocr = f.interface(ServiceId::OcrService, &[sg]);
        f.groups.allow_default_port_from(&mut f.graph, &ocr, &runner).unwrap();

        let verdict = f.resolver().resolve_service(&runner, ServiceId::OcrService);
        assert!(verdict.is_reachable(), "{verdict:?}");
        assert!(f.resolver().diagnose(&f.principals).is_empty());
    }

    #[test]
    fn one_sided_ingress_is_unreachable() {
        let mut f = Fixture::new();
        // Runner group does not allow all outbound and receives no egress rule.
        let runner = f.principal("a", false, &[ServiceId::OcrService]);
        let sg = f.endpoint_sg();
        let ocr = f.interface(ServiceId::OcrService, &[sg.clone()]);
        let rule = Rule::tcp(Peer::Group(runner.security_groups[0].clone()), PortRange::single(443));
        f.groups.add_ingress_rule(&mut f.graph, &sg, rule).unwrap();

        let resolver = f.resolver();
        assert!(resolver.ingress_admits(&runner, &ocr, Protocol::Tcp, &PortRange::single(443)));
        assert!(!resolver.can_reach(&runner, &ocr, PortRange::single(443)));
        assert_eq!(
            resolver.resolve_service(&runner, ServiceId::OcrService),
            Reachability::MissingEgress { endpoint: ocr.id.clone() }
        );
        let warnings = resolver.diagnose(&f.principals);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].service, ServiceId::OcrService);
    }

    #[test]
    fn one_sided_egress_is_unreachable() {
        let mut f = Fixture::new();
        let runner = f.principal("a", false, &[]);
        let sg = f.endpoint_sg();
        let ocr = f.interface(ServiceId::OcrService, &[sg.clone()]);
        let rule = Rule::tcp(Peer::Group(sg), PortRange::single(443));
        f.groups
            .add_egress_rule(&mut f.graph, &runner.security_groups[0], rule)
            .unwrap();

        assert_eq!(
            f.resolver().resolve_service(&runner, ServiceId::OcrService),
            Reachability::MissingIngress { endpoint: ocr.id }
        );
    }

    #[test]
    fn connectivity_is_not_transitive() {
        let mut f = Fixture::new();
        let a = f.principal("a", false, &[]);
        let b = f.principal("b", false, &[]);
        let sg = f.groups
            .create_group(&mut f.graph, &f.net, "endpoint-sg".into(), "", false)
            .unwrap();
        let e = f.interface(ServiceId::Invocation, &[sg]);

        f.groups.allow(&mut f.graph, &a, &e, PortRange::single(443)).unwrap();
        f.groups.allow(&mut f.graph, &e, &b, PortRange::single(443)).unwrap();

        let resolver = f.resolver();
        assert!(resolver.can_reach(&a, &e, PortRange::single(443)));
        assert!(resolver.can_reach(&e, &b, PortRange::single(443)));
        assert!(!resolver.can_reach(&a, &b, PortRange::single(443)), "A must not reach B through E");
        assert!(!resolver.can_reach(&e, &a, PortRange::single(443)), "E must not initiate to A");
        assert!(!resolver.can_reach(&b, &e, PortRange::single(443)), "B was never admitted to E");
    }

    #[test]
    fn missing_endpoint_is_reported() {
        let mut f = Fixture::new();
        let runner = f.principal("a", true, &[ServiceId::Metrics]);
        assert_eq!(
            f.resolver().resolve_service(&runner, ServiceId::Metrics),
            Reachability::NoEndpoint
        );
    }

    #[test]
    fn gateway_needs_prefix_list_egress() {
        let mut f = Fixture::new();
        let runner = f.principal("a", false, &[ServiceId::Storage]);
        let storage = f
            .endpoints
            .add_gateway_endpoint(&mut f.graph, &f.net, ServiceId::Storage)
            .unwrap();

        assert_eq!(
            f.resolver().resolve_service(&runner, ServiceId::Storage),
            Reachability::MissingEgress { endpoint: storage.id.clone() }
        );

        f.groups.allow_to_gateway(&mut f.graph, &runner, &storage).unwrap();
        assert!(f.resolver().resolve_service(&runner, ServiceId::Storage).is_reachable());
    }

    #[test]
    fn any_ipv4_egress_covers_endpoints() {
        let mut f = Fixture::new();
        let host = f.principal("a", false, &[ServiceId::SessionBroker]);
        let ssm = f.interface(ServiceId::SessionBroker, &[]);
        f.groups
            .add_egress_rule(&mut f.graph, &host.security_groups[0], Rule::tcp(Peer::any_ipv4(), PortRange::single(443)))
            .unwrap();
        assert_eq!(
            f.resolver().resolve_service(&host, ServiceId::SessionBroker),
            Reachability::MissingIngress { endpoint: ssm.id.clone() }
        );
        f.groups.allow_default_port_from(&mut f.graph, &ssm, &host).unwrap();
        assert!(f.resolver().resolve_service(&host, ServiceId::SessionBroker).is_reachable());
    }

    #[test]
    fn cidr_peer_must_contain_the_whole_subnet() {
        let mut f = Fixture::new();
        let runner = f.principal("a", true, &[ServiceId::OcrService]);
        let sg = f.endpoint_sg();
        let ocr = f.interface(ServiceId::OcrService, &[sg.clone()]);

        let narrow = Rule::tcp(Peer::Cidr("10.0.0.0/28".parse().unwrap()), PortRange::single(443));
        f.groups.add_ingress_rule(&mut f.graph, &sg, narrow).unwrap();
        assert_eq!(
            f.resolver().resolve_service(&runner, ServiceId::OcrService),
            Reachability::MissingIngress { endpoint: ocr.id.clone() }
        );

        let wide = Rule::tcp(Peer::Cidr("10.0.0.0/23".parse().unwrap()), PortRange::single(443));
        f.groups.add_ingress_rule(&mut f.graph, &sg, wide).unwrap();
        assert!(f.resolver().resolve_service(&runner, ServiceId::OcrService).is_reachable());
    }

    #[test]
    fn wrong_port_does_not_count() {
        let mut f = Fixture::new();
        let runner = f.principal("a", false, &[]);
        let sg = f.endpoint_sg();
        let ocr = f.interface(ServiceId::OcrService, &[sg]);
        f.groups.allow(&mut f.graph, &runner, &ocr, PortRange::single(8443)).unwrap();
        assert!(!f.resolver().resolve_service(&runner, ServiceId::OcrService).is_reachable());
    }
}
