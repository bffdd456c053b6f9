use thiserror::Error;

use crate::cidr::Cidr;
use crate::types::ServiceId;

/// Fatal errors raised while building the enclave graph.
///
/// Any of these aborts the build; a partially built graph is never handed to
/// a realizer.
#[derive(Debug, Error)]
pub enum EnclaveError {
    #[error("capacity error: {requested} subnets of /{mask} do not fit in {network}")]
    Capacity {
        network: Cidr,
        mask: u8,
        requested: usize,
    },

    #[error("invalid network layout: {0}")]
    InvalidLayout(String),

    #[error("invalid CIDR block: {0}")]
    InvalidCidr(String),

    #[error("service {0} does not support gateway endpoints")]
    UnsupportedGateway(ServiceId),

    #[error("endpoint for {service} is already registered as a {existing} endpoint")]
    EndpointKindConflict { service: ServiceId, existing: String },

    #[error("duplicate event binding: {event} on {bucket}/{prefix}")]
    DuplicateBinding {
        bucket: String,
        prefix: String,
        event: String,
    },

    #[error("unknown {kind}: {id}")]
    UnknownResource { kind: &'static str, id: String },

    #[error("resource already present in graph: {0}")]
    DuplicateResource(String),

    #[error("invalid resource graph: {0}")]
    InvalidGraph(String),

    #[error("invalid runner environment: {0}")]
    InvalidEnvironment(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EnclaveError {
    pub fn unknown(kind: &'static str, id: impl Into<String>) -> Self {
        Self::UnknownResource {
            kind,
            id: id.into(),
        }
    }
}

pub type Result<T, E = EnclaveError> = std::result::Result<T, E>;
