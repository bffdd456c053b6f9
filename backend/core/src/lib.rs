pub mod cidr;
pub mod error;
pub mod event;
pub mod graph;
pub mod traits;
pub mod types;

pub use cidr::Cidr;
pub use error::{EnclaveError, Result};
pub use event::{BuildEvent, BuildEventKind};
pub use graph::{EdgeKind, EdgeRecord, GraphDocument, ResourceGraph, ResourceKind, ResourceNode};
pub use traits::{Connectable, Realizer};
pub use types::{
    EndpointId, GroupId, NetworkId, PortRange, PrincipalId, Protocol, RoleId, ServiceId,
    SubnetId, Zone,
};
