//! `enclave-security`: who may do what, and under which provenance.
//!
//! - Identity binder: execution roles and their additive statements
//! - Resource policy engine: conditional deny-unless bucket policies
//! - Evaluation: union of identity and resource statements, deny wins
//! - Audit: findings for broad grants, unguarded buckets, unreachable services

pub mod audit;
pub mod bucket_policy;
pub mod evaluation;
pub mod identity;
pub mod pattern;
pub mod statement;

pub use audit::{audit_enclave, AuditFinding, AuditReport, AuditSeverity};
pub use bucket_policy::{Bucket, BucketPolicy, DenyRule, ResourcePolicyEngine};
pub use evaluation::{evaluate_statements, Decision, PolicyEvaluator, PolicyOrigin, RequestContext};
pub use identity::{ExecutionRole, RoleBinder};
pub use statement::{actions, Condition, Effect, PolicyDocument, PolicyStatement};
