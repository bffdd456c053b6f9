//! Administrative host reachable only through the session broker.
//!
//! The host has no inbound rules at all; operators reach it through the
//! session-broker, session-messages and instance-messages endpoints.

use tracing::info;

use enclave_core::{GroupId, PortRange, PrincipalId, Result, RoleId, ServiceId};
use enclave_network::{Peer, Principal, PrincipalKind, Rule};

use crate::enclave::Enclave;
use crate::settings::BastionSettings;

pub const BASTION_ID: &str = "bastion";
pub const BASTION_ROLE: &str = "bastion-role";
pub const BASTION_GROUP: &str = "bastion-sg";
pub const BASTION_SERVICE_PRINCIPAL: &str = "ec2.amazonaws.com";

pub const SESSION_SERVICES: [ServiceId; 3] = [
    ServiceId::SessionBroker,
    ServiceId::SessionMessages,
    ServiceId::InstanceMessages,
];

pub fn build_bastion(enclave: &mut Enclave, settings: &BastionSettings) -> Result<PrincipalId> {
    let Enclave {
        graph,
        network,
        endpoints,
        groups,
        principals,
        roles,
        ..
    } = enclave;

    // Idempotent: the pipeline usually registered it already.
    endpoints.add_gateway_endpoint(graph, network, ServiceId::Storage)?;
    let mut sessions = Vec::with_capacity(SESSION_SERVICES.len());
    for service in SESSION_SERVICES {
        sessions.push(endpoints.add_interface_endpoint(graph, groups, network, service, &[])?);
    }

    let group = groups.create_group(graph, network, GroupId::new(BASTION_GROUP), "Administrative host", false)?;
    groups.add_egress_rule(
        graph,
        &group,
        Rule::tcp(Peer::any_ipv4(), PortRange::single(443)).with_description("HTTPS to any IPv4"),
    )?;

    let managed: Vec<&str> = settings.managed_policies.iter().map(String::as_str).collect();
    let role = roles.create_role(graph, RoleId::new(BASTION_ROLE), BASTION_SERVICE_PRINCIPAL, &managed)?;

    // A single instance lives in the first isolated subnet.
    let subnet = network.isolated_subnet_ids().into_iter().take(1);
    let host = principals.add(
        graph,
        network,
        groups,
        Principal::new(BASTION_ID, PrincipalKind::AdministrativeHost, role)
            .with_groups([group])
            .in_subnets(subnet)
            .calling(SESSION_SERVICES.into_iter().chain([ServiceId::Storage])),
    )?;
    for endpoint in &sessions {
        groups.allow_default_port_from(graph, endpoint, &host)?;
    }

    info!(host = %host.id, policies = ?settings.managed_policies, "Bastion assembled");
    Ok(host.id)
}
