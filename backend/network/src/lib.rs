//! `enclave-network`: the private network half of the enclave.
//!
//! Provides:
//! - Topology builder: isolated subnets allocated across failure zones
//! - Endpoint registry: idempotent gateway/interface endpoints per service
//! - Security-group graph: directional, additive traffic rules
//! - Principals: compute entities placed in the network
//! - Reachability: the dual-sided (egress + ingress) connectivity check

pub mod endpoint;
pub mod principal;
pub mod reachability;
pub mod security_group;
pub mod topology;

pub use endpoint::{Endpoint, EndpointKind, EndpointRegistry};
pub use principal::{Principal, PrincipalKind, PrincipalSet};
pub use reachability::{ConnectivityResolver, Reachability, UnreachableServiceWarning};
pub use security_group::{Peer, Rule, SecurityGroup, SecurityGroupGraph};
pub use topology::{build_network, IsolationClass, NetworkLayout, NetworkSpace, Subnet, SubnetSpec};
