//! Network topology builder.
//!
//! Carves a network block into one subnet per (subnet spec × zone). Specs are
//! walked in declaration order and zones in order within each spec; every
//! block is aligned to its own size, so allocations never overlap.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use enclave_core::{Cidr, EnclaveError, NetworkId, ResourceGraph, ResourceKind, Result, SubnetId, Zone};

/// Maximum number of zones a region name can be suffixed with (`a`..`z`).
const MAX_ZONES: usize = 26;

/// Routing class of a subnet. Isolated subnets have no route to the
/// internet, neither inbound nor through NAT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IsolationClass {
    #[default]
    Isolated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubnetSpec {
    pub name: String,
    pub cidr_mask: u8,
    #[serde(default)]
    pub isolation: IsolationClass,
}

impl SubnetSpec {
    pub fn isolated(name: impl Into<String>, cidr_mask: u8) -> Self {
        Self {
            name: name.into(),
            cidr_mask,
            isolation: IsolationClass::Isolated,
        }
    }
}

/// Everything `build_network` needs to lay out a network space.
#[derive(Debug, Clone)]
pub struct NetworkLayout {
    pub name: String,
    pub cidr: Cidr,
    pub region: String,
    pub zone_count: usize,
    pub subnets: Vec<SubnetSpec>,
}

impl NetworkLayout {
    /// Zone names derived from the region: `<region>a`, `<region>b`, ...
    pub fn zones(&self) -> Result<Vec<Zone>> {
        if self.zone_count == 0 {
            return Err(EnclaveError::InvalidLayout("zone count must be >= 1".into()));
        }
        if self.zone_count > MAX_ZONES {
            return Err(EnclaveError::InvalidLayout(format!(
                "zone count {} exceeds {MAX_ZONES}",
                self.zone_count
            )));
        }
        Ok((0..self.zone_count)
            .map(|i| Zone::new(format!("{}{}", self.region, char::from(b'a' + i as u8))))
            .collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subnet {
    pub id: SubnetId,
    pub name: String,
    pub cidr: Cidr,
    pub zone: Zone,
    pub isolation: IsolationClass,
}

/// A built network space: the block plus its allocated subnets.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSpace {
    pub id: NetworkId,
    pub cidr: Cidr,
    pub region: String,
    pub subnets: Vec<Subnet>,
}

impl NetworkSpace {
    pub fn subnet(&self, id: &SubnetId) -> Option<&Subnet> {
        self.subnets.iter().find(|s| &s.id == id)
    }

    pub fn isolated_subnets(&self) -> impl Iterator<Item = &Subnet> + '_ {
        self.subnets
            .iter()
            .filter(|s| s.isolation == IsolationClass::Isolated)
    }

    pub fn isolated_subnet_ids(&self) -> Vec<SubnetId> {
        self.isolated_subnets().map(|s| s.id.clone()).collect()
    }

    pub fn zones(&self) -> Vec<Zone> {
        let mut zones: Vec<Zone> = self.subnets.iter().map(|s| s.zone.clone()).collect();
        zones.sort();
        zones.dedup();
        zones
    }
}

/// Allocate every subnet block, or fail before anything is recorded.
fn allocate(layout: &NetworkLayout, zones: &[Zone]) -> Result<Vec<Subnet>> {
    let requested = layout.subnets.len() * zones.len();
    let end = layout.cidr.end_bits();
    let mut cursor = u64::from(layout.cidr.base_bits());
    let mut subnets = Vec::with_capacity(requested);
    let mut names = HashSet::new();

    for spec in &layout.subnets {
        if !names.insert(spec.name.as_str()) {
            return Err(EnclaveError::InvalidLayout(format!(
                "subnet spec '{}' is declared twice",
                spec.name
            )));
        }
        if spec.cidr_mask > 32 {
            return Err(EnclaveError::InvalidLayout(format!(
                "subnet '{}' has mask /{} (> /32)",
                spec.name, spec.cidr_mask
            )));
        }
        let capacity_error = || EnclaveError::Capacity {
            network: layout.cidr,
            mask: spec.cidr_mask,
            requested,
        };
        if spec.cidr_mask < layout.cidr.prefix() {
            return Err(capacity_error());
        }

        let size = 1u64 << (32 - u32::from(spec.cidr_mask));
        for zone in zones {
            let aligned = cursor.div_ceil(size) * size;
            if aligned + size > end {
                return Err(capacity_error());
            }
            let cidr = Cidr::from_bits(aligned as u32, spec.cidr_mask)?;
            cursor = aligned + size;
            subnets.push(Subnet {
                id: SubnetId::new(format!("{}-{}-{}", layout.name, spec.name, zone)),
                name: spec.name.clone(),
                cidr,
                zone: zone.clone(),
                isolation: spec.isolation,
            });
        }
    }
    Ok(subnets)
}

/// Build a network space with one subnet per (spec × zone).
///
/// Fails with [`EnclaveError::Capacity`] when the block cannot hold the
/// requested layout. On any failure the graph is left untouched.
pub fn build_network(graph: &mut ResourceGraph, layout: &NetworkLayout) -> Result<NetworkSpace> {
    if layout.subnets.is_empty() {
        return Err(EnclaveError::InvalidLayout("at least one subnet spec is required".into()));
    }
    let zones = layout.zones()?;
    let subnets = allocate(layout, &zones)?;

    let network = NetworkSpace {
        id: NetworkId::new(layout.name.clone()),
        cidr: layout.cidr,
        region: layout.region.clone(),
        subnets,
    };

    let network_node = network.id.node_id();
    if let Some(taken) = std::iter::once(network_node.clone())
        .chain(network.subnets.iter().map(|s| s.id.node_id()))
        .find(|id| graph.contains(id))
    {
        return Err(EnclaveError::DuplicateResource(taken));
    }
    graph.add_resource(
        network_node.clone(),
        ResourceKind::NetworkSpace,
        &serde_json::json!({
            "cidr": network.cidr,
            "region": network.region,
            "zones": network.zones(),
            "internetGateway": false,
        }),
    )?;
    for subnet in &network.subnets {
        debug!(subnet = %subnet.id, cidr = %subnet.cidr, zone = %subnet.zone, "Subnet allocated");
        graph.add_child(&network_node, subnet.id.node_id(), ResourceKind::Subnet, subnet)?;
    }

    info!(
        network = %network.id,
        cidr = %network.cidr,
        zones = zones.len(),
        subnets = network.subnets.len(),
        "Network space built"
    );
    Ok(network)
}
