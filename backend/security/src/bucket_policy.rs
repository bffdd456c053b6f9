//! Bucket resource policies.
//!
//! A deny-unless rule ("deny these actions unless every exception holds")
//! compiles into one DENY statement per exception, each guarded by the
//! negated exception. Any single unmet exception is then enough to deny, and
//! a request missing the key entirely is denied as well.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use enclave_core::{EdgeKind, EnclaveError, EndpointId, ResourceGraph, ResourceKind, Result};

use crate::statement::{actions, Condition, Effect, PolicyDocument, PolicyStatement};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    pub name: String,
    #[serde(default)]
    pub versioned: bool,
}

impl Bucket {
    pub fn new(name: impl Into<String>, versioned: bool) -> Self {
        Self {
            name: name.into(),
            versioned,
        }
    }

    pub fn arn(&self) -> String {
        format!("arn:aws:s3:::{}", self.name)
    }

    pub fn objects_arn(&self) -> String {
        format!("arn:aws:s3:::{}/*", self.name)
    }

    pub fn node_id(&self) -> String {
        format!("bucket/{}", self.name)
    }

    /// `s3://bucket/prefix/` form used for declared outputs.
    pub fn uri(&self, prefix: &str) -> String {
        format!("s3://{}/{}/", self.name, prefix.trim_matches('/'))
    }
}

/// Deny `actions` on `resources` for everyone unless all of `unless` hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenyRule {
    pub actions: Vec<String>,
    pub resources: Vec<String>,
    pub unless: Vec<Condition>,
}

impl DenyRule {
    /// Deny get, list and put on the bucket and its objects unless the request
    /// came through `endpoint` and its first caller is one of `services`.
    pub fn endpoint_and_service_chain(bucket: &Bucket, endpoint: &EndpointId, services: &[String]) -> Self {
        Self {
            actions: vec![
                actions::GET_OBJECT.to_string(),
                actions::LIST_BUCKET.to_string(),
                actions::PUT_OBJECT.to_string(),
            ],
            resources: vec![bucket.arn(), bucket.objects_arn()],
            unless: vec![
                Condition::SourceEndpointEquals(endpoint.clone()),
                Condition::CalledViaFirstOf(services.to_vec()),
            ],
        }
    }

    /// One DENY per exception, carrying the negated exception. With no
    /// exceptions the deny is unconditional.
    pub fn compile(&self) -> Vec<PolicyStatement> {
        let base = |sid: String| {
            PolicyStatement::new(Effect::Deny, self.actions.iter().cloned(), self.resources.iter().cloned())
                .with_sid(sid)
                .with_principal("*")
        };
        if self.unless.is_empty() {
            return vec![base("DenyAll".into())];
        }
        self.unless
            .iter()
            .map(|exception| {
                let negated = exception.negate();
                let sid = match negated {
                    Condition::SourceEndpointNotEquals(_) | Condition::SourceEndpointEquals(_) => {
                        "DenyUnlessSourceEndpoint"
                    }
                    Condition::CalledViaFirstNotOf(_) | Condition::CalledViaFirstOf(_) => {
                        "DenyUnlessTrustedCaller"
                    }
                };
                base(sid.into()).with_conditions([negated])
            })
            .collect()
    }
}

/// The single resource policy of one bucket.
#[derive(Debug, Clone, Serialize)]
pub struct BucketPolicy {
    pub bucket: String,
    pub statements: Vec<PolicyStatement>,
}

impl BucketPolicy {
    pub fn node_id(&self) -> String {
        format!("bucket/{}/policy", self.bucket)
    }

    pub fn document(&self) -> PolicyDocument {
        PolicyDocument {
            statements: self.statements.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResourcePolicyEngine {
    buckets: BTreeMap<String, Bucket>,
    policies: BTreeMap<String, BucketPolicy>,
}

impl ResourcePolicyEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bucket(&self, name: &str) -> Option<&Bucket> {
        self.buckets.get(name)
    }

    pub fn buckets(&self) -> impl Iterator<Item = &Bucket> + '_ {
        self.buckets.values()
    }

    pub fn policy(&self, bucket: &str) -> Option<&BucketPolicy> {
        self.policies.get(bucket)
    }

    pub fn policies(&self) -> impl Iterator<Item = &BucketPolicy> + '_ {
        self.policies.values()
    }

    pub fn add_bucket(&mut self, graph: &mut ResourceGraph, bucket: Bucket) -> Result<Bucket> {
        if self.buckets.contains_key(&bucket.name) {
            return Err(EnclaveError::DuplicateResource(bucket.node_id()));
        }
        graph.add_resource(bucket.node_id(), ResourceKind::Bucket, &bucket)?;
        info!(bucket = %bucket.name, versioned = bucket.versioned, "Bucket declared");
        self.buckets.insert(bucket.name.clone(), bucket.clone());
        Ok(bucket)
    }

    /// Compile `rule` into the bucket's policy. A bucket has one policy;
    /// attaching again appends to it.
    pub fn attach_bucket_policy(&mut self, graph: &mut ResourceGraph, bucket: &str, rule: &DenyRule) -> Result<()> {
        let target = self
            .buckets
            .get(bucket)
            .ok_or_else(|| EnclaveError::unknown("bucket", bucket))?;

        let policy = match self.policies.entry(bucket.to_string()) {
            std::collections::btree_map::Entry::Occupied(e) => e.into_mut(),
            std::collections::btree_map::Entry::Vacant(e) => {
                let policy = BucketPolicy {
                    bucket: bucket.to_string(),
                    statements: Vec::new(),
                };
                graph.add_child(&target.node_id(), policy.node_id(), ResourceKind::BucketPolicy, &serde_json::json!({}))?;
                graph.connect(&policy.node_id(), &target.node_id(), EdgeKind::Governs)?;
                e.insert(policy)
            }
        };

        let compiled = rule.compile();
        for statement in compiled {
            let node = format!("{}/statement/{}", policy.node_id(), policy.statements.len());
            graph.add_child(&policy.node_id(), node, ResourceKind::PolicyStatement, &statement)?;
            policy.statements.push(statement);
        }
        info!(
            bucket,
            statements = policy.statements.len(),
            "Bucket policy attached"
        );
        Ok(())
    }
}
