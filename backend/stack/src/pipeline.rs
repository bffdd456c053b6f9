//! The document pipeline: uploads under the input prefix trigger the job
//! runner, which reads them through the storage endpoint, calls the OCR
//! service through its own endpoint, and writes results under the output
//! prefix.

use tracing::info;

use enclave_core::{GroupId, PrincipalId, Result, RoleId, ServiceId};
use enclave_network::{Principal, PrincipalKind};
use enclave_security::{actions, Bucket, DenyRule, Effect};

use crate::enclave::{Enclave, RunnerSummary, DOCUMENT_UPLOAD_OUTPUT};
use crate::environment::RunnerEnvironment;
use crate::settings::EnclaveSettings;

pub const RUNNER_ID: &str = "document-runner";
pub const RUNNER_ROLE: &str = "document-runner-role";
pub const RUNNER_GROUP: &str = "runner-sg";
/// Shared by the invocation, logs and metrics endpoints.
pub const ENDPOINT_GROUP: &str = "endpoint-sg";
pub const RUNNER_SERVICE_PRINCIPAL: &str = "lambda.amazonaws.com";

const SHARED_GROUP_SERVICES: [ServiceId; 3] = [ServiceId::Invocation, ServiceId::Logs, ServiceId::Metrics];

/// Services the runner calls at run time.
pub const RUNNER_CALLS: [ServiceId; 5] = [
    ServiceId::Storage,
    ServiceId::OcrService,
    ServiceId::Invocation,
    ServiceId::Logs,
    ServiceId::Metrics,
];

pub fn build_document_pipeline(enclave: &mut Enclave, settings: &EnclaveSettings) -> Result<PrincipalId> {
    let Enclave {
        graph,
        network,
        endpoints,
        groups,
        principals,
        roles,
        policies,
        events,
        ..
    } = enclave;

    let bucket = policies.add_bucket(graph, Bucket::new(&settings.bucket, settings.versioned))?;
    let storage = endpoints.add_gateway_endpoint(graph, network, ServiceId::Storage)?;

    let runner_group = groups.create_group(graph, network, GroupId::new(RUNNER_GROUP), "Job runner", false)?;
    let endpoint_group = groups.create_group(
        graph,
        network,
        GroupId::new(ENDPOINT_GROUP),
        "Shared interface endpoints",
        true,
    )?;

    // OCR keeps its own default group.
    let mut interface = vec![endpoints.add_interface_endpoint(graph, groups, network, ServiceId::OcrService, &[])?];
    for service in SHARED_GROUP_SERVICES {
        interface.push(endpoints.add_interface_endpoint(
            graph,
            groups,
            network,
            service,
            std::slice::from_ref(&endpoint_group),
        )?);
    }

    let role = roles.create_role(graph, RoleId::new(RUNNER_ROLE), RUNNER_SERVICE_PRINCIPAL, &[])?;
    let bucket_arn = bucket.arn();
    let input_objects = format!("{bucket_arn}/{}/*", settings.input_prefix);
    let output_objects = format!("{bucket_arn}/{}/*", settings.output_prefix);
    roles.grant(graph, &role, Effect::Allow, &[actions::GET_OBJECT], &[input_objects.as_str()], vec![])?;
    roles.grant(graph, &role, Effect::Allow, &[actions::LIST_BUCKET], &[bucket_arn.as_str()], vec![])?;
    roles.grant(graph, &role, Effect::Allow, &[actions::PUT_OBJECT], &[output_objects.as_str()], vec![])?;
    roles.grant(
        graph,
        &role,
        Effect::Allow,
        &[actions::DETECT_DOCUMENT_TEXT, actions::ANALYZE_DOCUMENT],
        &["*"],
        vec![],
    )?;

    let runner = principals.add(
        graph,
        network,
        groups,
        Principal::new(RUNNER_ID, PrincipalKind::JobRunner, role.clone())
            .with_groups([runner_group])
            .in_subnets(network.isolated_subnet_ids())
            .calling(RUNNER_CALLS),
    )?;
    for endpoint in &interface {
        groups.allow_default_port_from(graph, endpoint, &runner)?;
    }
    groups.allow_to_gateway(graph, &runner, &storage)?;

    let rule = DenyRule::endpoint_and_service_chain(&bucket, &storage.id, &settings.trusted_services);
    policies.attach_bucket_policy(graph, &bucket.name, &rule)?;

    events.on_object_created(graph, &bucket.name, &settings.input_prefix, &runner.id)?;

    let environment = RunnerEnvironment::new(&bucket.name, &settings.output_prefix, &settings.runner_log_level)?;
    enclave.runner = Some(RunnerSummary {
        principal: runner.id.clone(),
        role,
        timeout_seconds: settings.timeout_seconds,
        environment,
    });
    enclave.declare_output(DOCUMENT_UPLOAD_OUTPUT, bucket.uri(&settings.input_prefix))?;

    info!(
        runner = %runner.id,
        bucket = %bucket.name,
        input_prefix = %settings.input_prefix,
        output_prefix = %settings.output_prefix,
        "Document pipeline assembled"
    );
    Ok(runner.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use enclave_config::EnclaveConfig;
    use enclave_core::{Connectable, EdgeKind, EnclaveError, ResourceKind};
    use enclave_events::parse_notification;
    use serde_json::json;

    fn pipeline_only() -> Enclave {
        let settings = EnclaveSettings::from_config(&EnclaveConfig::default()).unwrap();
        let mut enclave = Enclave::with_network(&settings.layout).unwrap();
        build_document_pipeline(&mut enclave, &settings).unwrap();
        enclave
    }

    #[test]
    fn registers_one_endpoint_per_service() {
        let enclave = pipeline_only();
        assert_eq!(enclave.endpoints.len(), 5);
        let storage = enclave.endpoint(ServiceId::Storage).unwrap();
        assert!(storage.is_gateway());
        let ocr = enclave.endpoint(ServiceId::OcrService).unwrap();
        assert_eq!(ocr.security_groups().len(), 1);
        assert_ne!(ocr.security_groups()[0].as_str(), ENDPOINT_GROUP);
    }

    #[test]
    fn runner_role_has_no_broad_storage_grant() {
        let enclave = pipeline_only();
        let role = enclave.roles.get(&RoleId::new(RUNNER_ROLE)).unwrap();
        assert_eq!(role.assumed_by, RUNNER_SERVICE_PRINCIPAL);
        assert!(role
            .statements
            .iter()
            .flat_map(|s| s.actions.iter())
            .all(|a| a != actions::ALL_STORAGE && a != "*"));
    }

    #[test]
    fn uploads_route_to_the_runner() {
        let enclave = pipeline_only();
        let payload = json!({"Records": [{
            "eventName": "ObjectCreated:Put",
            "s3": {"bucket": {"name": "document-enclave"}, "object": {"key": "uploads/scan.pdf", "versionId": "v1"}}
        }]});
        let notifications = parse_notification(&payload).unwrap();
        let routed = enclave.events.route(&notifications[0]);
        assert_eq!(routed.len(), 1);
        assert_eq!(routed[0].target.as_str(), RUNNER_ID);

        let binding_node = routed[0].node_id();
        let triggered = enclave.graph.targets(&binding_node, EdgeKind::Triggers);
        assert_eq!(triggered[0].kind, ResourceKind::Principal);
    }

    #[test]
    fn outputs_are_not_routed() {
        let enclave = pipeline_only();
        let payload = json!({"Records": [{
            "eventName": "ObjectCreated:Put",
            "s3": {"bucket": {"name": "document-enclave"}, "object": {"key": "outputs/scan.json"}}
        }]});
        let notifications = parse_notification(&payload).unwrap();
        assert!(enclave.events.route(&notifications[0]).is_empty());
    }

    #[test]
    fn second_pipeline_on_the_same_enclave_fails() {
        let settings = EnclaveSettings::from_config(&EnclaveConfig::default()).unwrap();
        let mut enclave = pipeline_only();
        let err = build_document_pipeline(&mut enclave, &settings).unwrap_err();
        assert!(matches!(err, EnclaveError::DuplicateResource(_)));
    }

    #[test]
    fn duplicate_binding_is_rejected() {
        let mut enclave = pipeline_only();
        let err = enclave
            .events
            .on_object_created(&mut enclave.graph, "document-enclave", "uploads", &PrincipalId::new(RUNNER_ID))
            .unwrap_err();
        assert!(matches!(err, EnclaveError::DuplicateBinding { .. }));
    }
}
