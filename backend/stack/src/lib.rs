//! `enclave-stack`: the enclave as one unit.
//!
//! Turns settings into a validated resource graph: network, endpoints,
//! groups, roles, bucket policy and event wiring for the document pipeline,
//! plus the optional bastion. Also the hand-off to a [`Realizer`].
//!
//! [`Realizer`]: enclave_core::Realizer

pub mod bastion;
pub mod enclave;
pub mod environment;
pub mod pipeline;
pub mod realize;
pub mod settings;

pub use enclave::{Enclave, SynthDocument, DOCUMENT_UPLOAD_OUTPUT};
pub use environment::RunnerEnvironment;
pub use realize::{realize, teardown, DryRunRealizer, RealizeOp, RealizeOpKind};
pub use settings::{BastionSettings, EnclaveSettings};
