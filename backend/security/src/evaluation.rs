//! Access decisions over the union of identity and resource statements.
//!
//! Every statement that applies is considered together: an explicit deny from
//! any source wins, otherwise any allow grants, otherwise the request is
//! implicitly denied. A denied request is an outcome, not an error.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use enclave_core::{EndpointId, RoleId};

use crate::bucket_policy::ResourcePolicyEngine;
use crate::identity::RoleBinder;
use crate::statement::{Effect, PolicyStatement};

static BUCKET_ARN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^arn:aws:s3:::([^/]+)").expect("bucket ARN pattern is valid"));

/// What a request carries: the action on a resource plus its provenance.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    pub action: String,
    pub resource: String,
    pub source_endpoint: Option<EndpointId>,
    /// Services the request was proxied through, outermost first.
    pub called_via: Vec<String>,
}

impl RequestContext {
    pub fn new(action: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            resource: resource.into(),
            ..Default::default()
        }
    }

    pub fn via_endpoint(mut self, endpoint: EndpointId) -> Self {
        self.source_endpoint = Some(endpoint);
        self
    }

    pub fn called_via(mut self, chain: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.called_via = chain.into_iter().map(Into::into).collect();
        self
    }

    pub fn called_via_first(&self) -> Option<&str> {
        self.called_via.first().map(String::as_str)
    }

    /// Bucket named by the resource ARN, if it is a storage ARN.
    pub fn bucket(&self) -> Option<&str> {
        BUCKET_ARN
            .captures(&self.resource)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
    }
}

/// Where a deciding statement came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "name", rename_all = "snake_case")]
pub enum PolicyOrigin {
    Identity(RoleId),
    Resource(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Allow {
        origin: PolicyOrigin,
        statement: usize,
    },
    ExplicitDeny {
        origin: PolicyOrigin,
        statement: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        sid: Option<String>,
    },
    ImplicitDeny,
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow { .. })
    }
}

/// Evaluate `ctx` against statement sets from several origins at once.
pub fn evaluate_statements(sets: &[(PolicyOrigin, &[PolicyStatement])], ctx: &RequestContext) -> Decision {
    let mut allow = None;
    for (origin, statements) in sets {
        for (index, statement) in statements.iter().enumerate() {
            if !statement.applies_to(ctx) {
                continue;
            }
            match statement.effect {
                Effect::Deny => {
                    return Decision::ExplicitDeny {
                        origin: origin.clone(),
                        statement: index,
                        sid: statement.sid.clone(),
                    };
                }
                Effect::Allow => {
                    allow.get_or_insert_with(|| Decision::Allow {
                        origin: origin.clone(),
                        statement: index,
                    });
                }
            }
        }
    }
    allow.unwrap_or(Decision::ImplicitDeny)
}

/// Evaluates requests made by roles against the bucket policies.
pub struct PolicyEvaluator<'a> {
    roles: &'a RoleBinder,
    resources: &'a ResourcePolicyEngine,
}

impl<'a> PolicyEvaluator<'a> {
    pub fn new(roles: &'a RoleBinder, resources: &'a ResourcePolicyEngine) -> Self {
        Self { roles, resources }
    }

    /// Decide a request made under `role`. An unknown role contributes no
    /// statements, so it can at most be allowed by a resource policy.
    pub fn evaluate(&self, role: &RoleId, ctx: &RequestContext) -> Decision {
        let identity = self.roles.get(role).map(|r| r.statements.as_slice()).unwrap_or(&[]);
        let mut sets = vec![(PolicyOrigin::Identity(role.clone()), identity)];
        if let Some(bucket) = ctx.bucket() {
            if let Some(policy) = self.resources.policy(bucket) {
                sets.push((PolicyOrigin::Resource(bucket.to_string()), policy.statements.as_slice()));
            }
        }

        let decision = evaluate_statements(&sets, ctx);
        debug!(
            role = %role,
            action = %ctx.action,
            resource = %ctx.resource,
            decision = ?decision,
            "Policy evaluated"
        );
        decision
    }
}
