//! `enclavectl simulate` and `enclavectl reach`

use anyhow::{Context, Result};
use serde_json::json;

use enclave_core::{EndpointId, PrincipalId, RoleId, ServiceId};
use enclave_logging::{BuildEventLogger, ProvisioningEvent};
use enclave_network::Reachability;
use enclave_security::RequestContext;
use enclave_stack::Enclave;

use crate::terminal_output::{describe_decision, note_error, note_success, render_reachability};

pub struct SimulateRequest {
    pub role: String,
    pub action: String,
    pub resource: String,
    pub endpoint: Option<String>,
    pub called_via: Vec<String>,
}

/// Build the request context. An endpoint given as a service name resolves
/// to that service's registered endpoint.
fn request_context(enclave: &Enclave, request: &SimulateRequest) -> RequestContext {
    let mut ctx = RequestContext::new(&request.action, &request.resource);
    if let Some(endpoint) = &request.endpoint {
        let id = endpoint
            .parse::<ServiceId>()
            .ok()
            .and_then(|service| enclave.endpoint(service))
            .map(|e| e.id.clone())
            .unwrap_or_else(|| EndpointId::new(endpoint.as_str()));
        ctx = ctx.via_endpoint(id);
    }
    if !request.called_via.is_empty() {
        ctx = ctx.called_via(request.called_via.iter().cloned());
    }
    ctx
}

/// Print the decision. Returns whether the request was allowed.
pub fn simulate(enclave: &Enclave, request: SimulateRequest, json: bool) -> Result<bool> {
    let ctx = request_context(enclave, &request);
    let role = RoleId::new(request.role.as_str());
    let decision = enclave.simulate(&role, &ctx);
    let summary = describe_decision(&decision);

    BuildEventLogger::log_event(
        enclave.network.id.as_str(),
        ProvisioningEvent::Decision {
            role: request.role.clone(),
            action: request.action.clone(),
            resource: request.resource.clone(),
            allowed: decision.is_allowed(),
            reason: summary.clone(),
        },
    );

    if json {
        let out = json!({ "request": ctx, "decision": decision, "summary": summary });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else if decision.is_allowed() {
        note_success(&format!("{} on {}: {summary}", request.action, request.resource));
    } else {
        note_error(&format!("{} on {}: {summary}", request.action, request.resource));
    }
    Ok(decision.is_allowed())
}

/// Resolve `principal`'s path to `service`, or to every service it calls.
/// Returns whether all resolved paths are reachable.
pub fn reach(enclave: &Enclave, principal: &str, service: Option<&str>, json: bool) -> Result<bool> {
    let id = PrincipalId::new(principal);
    let services: Vec<ServiceId> = match service {
        Some(name) => vec![name
            .parse()
            .with_context(|| format!("Unknown service '{name}'"))?],
        None => enclave
            .principals
            .get(&id)
            .map(|p| p.calls.clone())
            .with_context(|| format!("Unknown principal '{principal}'"))?,
    };

    let mut rows: Vec<(String, Reachability)> = Vec::with_capacity(services.len());
    for service in services {
        rows.push((service.to_string(), enclave.reach(&id, service)?));
    }
    let all_reachable = rows.iter().all(|(_, verdict)| verdict.is_reachable());

    if json {
        let out: serde_json::Map<String, serde_json::Value> = rows
            .iter()
            .map(|(service, verdict)| Ok((service.clone(), serde_json::to_value(verdict)?)))
            .collect::<Result<_, serde_json::Error>>()?;
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        print!("{}", render_reachability(&rows));
    }
    Ok(all_reachable)
}
