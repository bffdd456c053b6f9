//! The assembled enclave: every builder's state plus the graph they wrote.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;

use enclave_core::{
    BuildEventKind, EnclaveError, GraphDocument, PrincipalId, ResourceGraph, ResourceKind, Result,
    RoleId, ServiceId,
};
use enclave_events::{EventBinding, EventWiring};
use enclave_network::{
    build_network, ConnectivityResolver, Endpoint, EndpointRegistry, NetworkLayout, NetworkSpace,
    PrincipalSet, Reachability, SecurityGroupGraph, UnreachableServiceWarning,
};
use enclave_security::{
    audit_enclave, AuditReport, Decision, PolicyDocument, PolicyEvaluator, RequestContext,
    ResourcePolicyEngine, RoleBinder,
};

use crate::environment::RunnerEnvironment;
use crate::settings::EnclaveSettings;
use crate::{bastion, pipeline};

/// Name of the declared output pointing uploaders at the input prefix.
pub const DOCUMENT_UPLOAD_OUTPUT: &str = "DocumentUpload";

/// What the job runner is launched with.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerSummary {
    pub principal: PrincipalId,
    pub role: RoleId,
    pub timeout_seconds: u32,
    pub environment: RunnerEnvironment,
}

/// JSON hand-off document for the realization engine.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthDocument {
    pub network: String,
    pub region: String,
    pub graph: GraphDocument,
    pub outputs: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runner: Option<RunnerSummary>,
    pub role_policies: BTreeMap<String, Value>,
    pub bucket_policies: BTreeMap<String, Value>,
    pub event_bindings: Vec<EventBinding>,
    pub warnings: Vec<UnreachableServiceWarning>,
}

#[derive(Debug, Clone)]
pub struct Enclave {
    pub graph: ResourceGraph,
    pub network: NetworkSpace,
    pub endpoints: EndpointRegistry,
    pub groups: SecurityGroupGraph,
    pub principals: PrincipalSet,
    pub roles: RoleBinder,
    pub policies: ResourcePolicyEngine,
    pub events: EventWiring,
    pub outputs: BTreeMap<String, String>,
    pub runner: Option<RunnerSummary>,
    /// Reachability diagnostics from the last [`finish`](Self::finish).
    pub warnings: Vec<UnreachableServiceWarning>,
}

impl Enclave {
    /// An enclave holding only its network. A layout that does not fit
    /// leaves nothing behind.
    pub fn with_network(layout: &NetworkLayout) -> Result<Self> {
        let mut graph = ResourceGraph::new();
        let network = build_network(&mut graph, layout)?;
        Ok(Self {
            graph,
            network,
            endpoints: EndpointRegistry::new(),
            groups: SecurityGroupGraph::new(),
            principals: PrincipalSet::new(),
            roles: RoleBinder::new(),
            policies: ResourcePolicyEngine::new(),
            events: EventWiring::new(),
            outputs: BTreeMap::new(),
            runner: None,
            warnings: Vec::new(),
        })
    }

    /// Build the document pipeline, and the bastion when enabled, then
    /// diagnose and validate.
    pub fn build(settings: &EnclaveSettings) -> Result<Self> {
        let mut enclave = Self::with_network(&settings.layout)?;
        pipeline::build_document_pipeline(&mut enclave, settings)?;
        if let Some(bastion) = &settings.bastion {
            bastion::build_bastion(&mut enclave, bastion)?;
        }
        enclave.finish()?;
        Ok(enclave)
    }

    /// Run reachability diagnostics, then validate the graph for hand-off.
    /// Unreachable services are warnings; an invalid graph is an error.
    pub fn finish(&mut self) -> Result<()> {
        let warnings = self.resolver().diagnose(&self.principals);
        for warning in &warnings {
            self.graph.record(
                BuildEventKind::WarningRaised,
                warning.principal.node_id(),
                json!({ "service": warning.service, "message": warning.to_string() }),
            );
        }
        self.warnings = warnings;

        self.graph.validate()?;
        self.graph.record(
            BuildEventKind::ValidationPassed,
            self.network.id.node_id(),
            json!({ "nodes": self.graph.node_count(), "edges": self.graph.edge_count() }),
        );
        info!(
            network = %self.network.id,
            nodes = self.graph.node_count(),
            edges = self.graph.edge_count(),
            warnings = self.warnings.len(),
            "Enclave validated"
        );
        Ok(())
    }

    pub fn resolver(&self) -> ConnectivityResolver<'_> {
        ConnectivityResolver::new(&self.network, &self.groups, &self.endpoints)
    }

    /// Declare a named output value.
    pub fn declare_output(&mut self, name: &str, value: impl Into<String>) -> Result<()> {
        let value = value.into();
        self.graph.add_resource(
            format!("output/{name}"),
            ResourceKind::Output,
            &json!({ "name": name, "value": value }),
        )?;
        info!(output = name, value = %value, "Output declared");
        self.outputs.insert(name.to_string(), value);
        Ok(())
    }

    pub fn endpoint(&self, service: ServiceId) -> Option<&Endpoint> {
        self.endpoints.get(&self.network.id, service)
    }

    pub fn reach(&self, principal: &PrincipalId, service: ServiceId) -> Result<Reachability> {
        let principal = self
            .principals
            .get(principal)
            .ok_or_else(|| EnclaveError::unknown("principal", principal.as_str()))?;
        Ok(self.resolver().resolve_service(principal, service))
    }

    /// Decide a request made under `role` against its statements and the
    /// target bucket's policy.
    pub fn simulate(&self, role: &RoleId, ctx: &RequestContext) -> Decision {
        PolicyEvaluator::new(&self.roles, &self.policies).evaluate(role, ctx)
    }

    pub fn audit(&self) -> AuditReport {
        audit_enclave(&self.roles, &self.policies, &self.warnings)
    }

    pub fn synth(&self) -> SynthDocument {
        let role_policies = self
            .roles
            .iter()
            .map(|role| {
                let document = PolicyDocument {
                    statements: role.statements.clone(),
                };
                (role.id.to_string(), document.to_json())
            })
            .collect();
        let bucket_policies = self
            .policies
            .policies()
            .map(|policy| (policy.bucket.clone(), policy.document().to_json()))
            .collect();

        SynthDocument {
            network: self.network.id.to_string(),
            region: self.network.region.clone(),
            graph: self.graph.to_document(),
            outputs: self.outputs.clone(),
            runner: self.runner.clone(),
            role_policies,
            bucket_policies,
            event_bindings: self.events.bindings().to_vec(),
            warnings: self.warnings.clone(),
        }
    }
}
