//! Policy statements, conditions, and the rendered policy document.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use enclave_core::EndpointId;

use crate::evaluation::RequestContext;
use crate::pattern::{action_matches, resource_matches};

/// Actions the enclave reasons about.
pub mod actions {
    pub const GET_OBJECT: &str = "s3:GetObject";
    pub const LIST_BUCKET: &str = "s3:ListBucket";
    pub const PUT_OBJECT: &str = "s3:PutObject";
    pub const ALL_STORAGE: &str = "s3:*";

    pub const DETECT_DOCUMENT_TEXT: &str = "textract:DetectDocumentText";
    pub const ANALYZE_DOCUMENT: &str = "textract:AnalyzeDocument";
}

/// Request key carrying the endpoint a request arrived through.
pub const SOURCE_ENDPOINT_KEY: &str = "aws:SourceVpce";
/// Request key carrying the first service in the calling chain.
pub const CALLED_VIA_FIRST_KEY: &str = "aws:CalledViaFirst";

pub const POLICY_VERSION: &str = "2012-10-17";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    Allow,
    Deny,
}

/// Closed set of conditions a statement can carry.
///
/// The negative forms hold when the request does not carry the key at all,
/// so a deny guarded by them fires on requests without provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Condition {
    SourceEndpointEquals(EndpointId),
    SourceEndpointNotEquals(EndpointId),
    CalledViaFirstOf(Vec<String>),
    CalledViaFirstNotOf(Vec<String>),
}

impl Condition {
    pub fn negate(&self) -> Condition {
        match self {
            Condition::SourceEndpointEquals(e) => Condition::SourceEndpointNotEquals(e.clone()),
            Condition::SourceEndpointNotEquals(e) => Condition::SourceEndpointEquals(e.clone()),
            Condition::CalledViaFirstOf(s) => Condition::CalledViaFirstNotOf(s.clone()),
            Condition::CalledViaFirstNotOf(s) => Condition::CalledViaFirstOf(s.clone()),
        }
    }

    pub fn holds(&self, ctx: &RequestContext) -> bool {
        match self {
            Condition::SourceEndpointEquals(e) => ctx.source_endpoint.as_ref() == Some(e),
            Condition::SourceEndpointNotEquals(e) => ctx.source_endpoint.as_ref() != Some(e),
            Condition::CalledViaFirstOf(services) => ctx
                .called_via_first()
                .is_some_and(|first| services.iter().any(|s| s == first)),
            Condition::CalledViaFirstNotOf(services) => !ctx
                .called_via_first()
                .is_some_and(|first| services.iter().any(|s| s == first)),
        }
    }

    pub fn operator(&self) -> &'static str {
        match self {
            Condition::SourceEndpointEquals(_) | Condition::CalledViaFirstOf(_) => "StringEquals",
            Condition::SourceEndpointNotEquals(_) | Condition::CalledViaFirstNotOf(_) => "StringNotEquals",
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            Condition::SourceEndpointEquals(_) | Condition::SourceEndpointNotEquals(_) => SOURCE_ENDPOINT_KEY,
            Condition::CalledViaFirstOf(_) | Condition::CalledViaFirstNotOf(_) => CALLED_VIA_FIRST_KEY,
        }
    }

    pub fn values(&self) -> Vec<String> {
        match self {
            Condition::SourceEndpointEquals(e) | Condition::SourceEndpointNotEquals(e) => {
                vec![e.to_string()]
            }
            Condition::CalledViaFirstOf(s) | Condition::CalledViaFirstNotOf(s) => s.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyStatement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
    pub effect: Effect,
    /// `Some("*")` on resource policies; identity statements name no principal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal: Option<String>,
    pub actions: Vec<String>,
    pub resources: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl PolicyStatement {
    pub fn new(
        effect: Effect,
        actions: impl IntoIterator<Item = impl Into<String>>,
        resources: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            sid: None,
            effect,
            principal: None,
            actions: actions.into_iter().map(Into::into).collect(),
            resources: resources.into_iter().map(Into::into).collect(),
            conditions: Vec::new(),
        }
    }

    pub fn with_sid(mut self, sid: impl Into<String>) -> Self {
        self.sid = Some(sid.into());
        self
    }

    pub fn with_principal(mut self, principal: impl Into<String>) -> Self {
        self.principal = Some(principal.into());
        self
    }

    pub fn with_conditions(mut self, conditions: impl IntoIterator<Item = Condition>) -> Self {
        self.conditions.extend(conditions);
        self
    }

    /// True when action and resource match and every condition holds.
    pub fn applies_to(&self, ctx: &RequestContext) -> bool {
        self.actions.iter().any(|a| action_matches(a, &ctx.action))
            && self.resources.iter().any(|r| resource_matches(r, &ctx.resource))
            && self.conditions.iter().all(|c| c.holds(ctx))
    }

    pub fn to_json(&self) -> Value {
        let mut stmt = Map::new();
        if let Some(sid) = &self.sid {
            stmt.insert("Sid".into(), json!(sid));
        }
        stmt.insert("Effect".into(), json!(self.effect));
        if let Some(principal) = &self.principal {
            let principal = if principal == "*" {
                json!("*")
            } else {
                json!({ "AWS": principal })
            };
            stmt.insert("Principal".into(), principal);
        }
        stmt.insert("Action".into(), one_or_many(&self.actions));
        stmt.insert("Resource".into(), one_or_many(&self.resources));

        if !self.conditions.is_empty() {
            let mut block = Map::new();
            for condition in &self.conditions {
                let operator = block
                    .entry(condition.operator())
                    .or_insert_with(|| Value::Object(Map::new()));
                if let Value::Object(keys) = operator {
                    keys.insert(condition.key().into(), one_or_many(&condition.values()));
                }
            }
            stmt.insert("Condition".into(), Value::Object(block));
        }
        Value::Object(stmt)
    }
}

fn one_or_many(values: &[String]) -> Value {
    match values {
        [single] => json!(single),
        many => json!(many),
    }
}

/// A full policy document as handed to the storage collaborator.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PolicyDocument {
    pub statements: Vec<PolicyStatement>,
}

impl PolicyDocument {
    pub fn to_json(&self) -> Value {
        json!({
            "Version": POLICY_VERSION,
            "Statement": self.statements.iter().map(PolicyStatement::to_json).collect::<Vec<_>>(),
        })
    }
}
