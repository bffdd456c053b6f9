//! Enclave security audit: flags grants, bucket policies and connectivity
//! gaps that weaken the isolation model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use enclave_network::UnreachableServiceWarning;

use crate::bucket_policy::ResourcePolicyEngine;
use crate::identity::RoleBinder;
use crate::pattern::is_wildcard_action;
use crate::statement::{Effect, SOURCE_ENDPOINT_KEY};

/// Severity of a security finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditSeverity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

/// A single audit finding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditFinding {
    pub severity: AuditSeverity,
    pub code: String,
    pub title: String,
    pub description: String,
    pub field_path: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditReport {
    pub generated_at: DateTime<Utc>,
    pub findings: Vec<AuditFinding>,
    pub passed: bool,
}

impl AuditReport {
    pub fn is_healthy(&self) -> bool {
        self.findings
            .iter()
            .all(|f| matches!(f.severity, AuditSeverity::Info | AuditSeverity::Low))
    }

    pub fn with_code<'a>(&'a self, code: &'a str) -> impl Iterator<Item = &'a AuditFinding> + 'a {
        self.findings.iter().filter(move |f| f.code == code)
    }
}

/// Allow statements granting every action of a service (or everything) on
/// every resource.
pub fn audit_roles(roles: &RoleBinder) -> Vec<AuditFinding> {
    let mut findings = Vec::new();
    for role in roles.iter() {
        for (index, stmt) in role.statements.iter().enumerate() {
            if stmt.effect != Effect::Allow || !stmt.conditions.is_empty() {
                continue;
            }
            let broad_actions: Vec<&str> = stmt
                .actions
                .iter()
                .map(String::as_str)
                .filter(|a| is_wildcard_action(a))
                .collect();
            if broad_actions.is_empty() || !stmt.resources.iter().any(|r| r == "*") {
                continue;
            }
            let severity = if broad_actions.iter().any(|a| *a == "*" || a.starts_with("s3:")) {
                AuditSeverity::Critical
            } else {
                AuditSeverity::High
            };
            findings.push(AuditFinding {
                severity,
                code: "IAM001".into(),
                title: "Broad unconditional grant".into(),
                description: format!(
                    "Role {} allows {} on every resource without conditions.",
                    role.id,
                    broad_actions.join(", ")
                ),
                field_path: Some(format!("roles.{}.statements[{index}]", role.id)),
            });
        }
    }
    findings
}

/// Buckets without a policy, and policies that never check the endpoint a
/// request arrived through.
pub fn audit_buckets(engine: &ResourcePolicyEngine) -> Vec<AuditFinding> {
    let mut findings = Vec::new();
    for bucket in engine.buckets() {
        let Some(policy) = engine.policy(&bucket.name) else {
            findings.push(AuditFinding {
                severity: AuditSeverity::High,
                code: "BKT001".into(),
                title: "Bucket without resource policy".into(),
                description: format!(
                    "Bucket {} relies on identity grants alone; any role with a broad grant can reach it.",
                    bucket.name
                ),
                field_path: Some(format!("buckets.{}.policy", bucket.name)),
            });
            continue;
        };

        let checks_endpoint = policy.statements.iter().any(|s| {
            s.effect == Effect::Deny && s.conditions.iter().any(|c| c.key() == SOURCE_ENDPOINT_KEY)
        });
        if !checks_endpoint {
            findings.push(AuditFinding {
                severity: AuditSeverity::Medium,
                code: "BKT002".into(),
                title: "Policy ignores request provenance".into(),
                description: format!(
                    "No deny in the policy of {} is conditioned on the source endpoint.",
                    bucket.name
                ),
                field_path: Some(format!("buckets.{}.policy", bucket.name)),
            });
        }

        let unconditional_allow = policy
            .statements
            .iter()
            .any(|s| s.effect == Effect::Allow && s.principal.as_deref() == Some("*") && s.conditions.is_empty());
        if unconditional_allow {
            findings.push(AuditFinding {
                severity: AuditSeverity::Critical,
                code: "BKT003".into(),
                title: "Public bucket grant".into(),
                description: format!("The policy of {} allows any principal unconditionally.", bucket.name),
                field_path: Some(format!("buckets.{}.policy", bucket.name)),
            });
        }

        if !bucket.versioned {
            findings.push(AuditFinding {
                severity: AuditSeverity::Low,
                code: "BKT004".into(),
                title: "Versioning disabled".into(),
                description: format!(
                    "Bucket {} is not versioned; redelivered notifications cannot be told apart by version.",
                    bucket.name
                ),
                field_path: Some(format!("buckets.{}.versioned", bucket.name)),
            });
        }
    }
    findings
}

pub fn audit_reachability(warnings: &[UnreachableServiceWarning]) -> Vec<AuditFinding> {
    warnings
        .iter()
        .map(|w| AuditFinding {
            severity: AuditSeverity::Medium,
            code: "NET001".into(),
            title: "Unreachable service".into(),
            description: w.to_string(),
            field_path: Some(format!("principals.{}.calls.{}", w.principal, w.service)),
        })
        .collect()
}

/// Run every check. The report passes when nothing is High or Critical.
pub fn audit_enclave(
    roles: &RoleBinder,
    engine: &ResourcePolicyEngine,
    warnings: &[UnreachableServiceWarning],
) -> AuditReport {
    let mut findings = audit_roles(roles);
    findings.extend(audit_buckets(engine));
    findings.extend(audit_reachability(warnings));
    findings.sort_by(|a, b| b.severity.cmp(&a.severity).then_with(|| a.code.cmp(&b.code)));

    for finding in findings
        .iter()
        .filter(|f| f.severity >= AuditSeverity::High)
    {
        warn!(code = %finding.code, "{}", finding.description);
    }

    let passed = !findings
        .iter()
        .any(|f| matches!(f.severity, AuditSeverity::High | AuditSeverity::Critical));

    AuditReport {
        generated_at: Utc::now(),
        findings,
        passed,
    }
}
