//! Structured logging for the enclave tooling.
//!
//! Console output (pretty or JSON), optional daily rolling NDJSON files, and
//! typed provisioning events.

pub mod event_logger;
pub mod logger;

pub use event_logger::{BuildEventLogger, ProvisioningEvent, ProvisioningLogEntry};
pub use logger::init_logger;
