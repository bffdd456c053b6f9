//! Config validation: deep checks with user-friendly error messages.
//!
//! Runs after defaults are applied, so missing sections are not errors here.

use thiserror::Error;

use enclave_core::{Cidr, ServiceId};

use crate::schema::EnclaveConfig;

#[derive(Debug, Error)]
#[error("config validation error at '{path}': {message}")]
pub struct ConfigValidationError {
    pub path: String,
    pub message: String,
}

/// All errors and warnings found in one pass.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }

    fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }
}

const RUNNER_LOG_LEVELS: [&str; 5] = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"];
const TOOL_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const MAX_ZONES: usize = 26;

pub fn validate(config: &EnclaveConfig) -> ValidationReport {
    let mut report = ValidationReport::default();
    validate_network(config, &mut report);
    validate_storage(config, &mut report);
    validate_pipeline(config, &mut report);
    validate_logging(config, &mut report);
    report
}

fn validate_network(config: &EnclaveConfig, report: &mut ValidationReport) {
    let Some(network) = &config.network else { return };

    let block = match network.cidr.as_deref().map(str::parse::<Cidr>) {
        Some(Ok(block)) => Some(block),
        Some(Err(e)) => {
            report.error("network.cidr", e.to_string());
            None
        }
        None => None,
    };

    match network.zone_count {
        Some(0) => report.error("network.zoneCount", "zoneCount must be >= 1"),
        Some(n) if n > MAX_ZONES => report.error("network.zoneCount", format!("zoneCount must be <= {MAX_ZONES}")),
        Some(1) => report.warn("network.zoneCount", "A single zone gives the pipeline no failure isolation"),
        _ => {}
    }

    if network.subnets.is_empty() {
        report.error("network.subnets", "At least one subnet is required");
    }
    for (i, subnet) in network.subnets.iter().enumerate() {
        let path = format!("network.subnets[{i}]");
        if subnet.name.trim().is_empty() {
            report.error(format!("{path}.name"), "Subnet name cannot be empty");
        }
        if subnet.cidr_mask > 32 {
            report.error(format!("{path}.cidrMask"), "cidrMask must be <= 32");
        } else if let Some(block) = block {
            if subnet.cidr_mask < block.prefix() {
                report.error(
                    format!("{path}.cidrMask"),
                    format!("/{} is larger than the network block {block}", subnet.cidr_mask),
                );
            }
        }
        if network.subnets[..i].iter().any(|s| s.name == subnet.name) {
            report.error(format!("{path}.name"), format!("Duplicate subnet name '{}'", subnet.name));
        }
    }
}

/// Bucket names: 3-63 chars of lowercase letters, digits, `.` and `-`,
/// starting and ending with a letter or digit.
fn is_valid_bucket_name(name: &str) -> bool {
    let edge_ok = |c: Option<char>| c.is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    (3..=63).contains(&name.len())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-')
        && edge_ok(name.chars().next())
        && edge_ok(name.chars().last())
}

fn normalize_prefix(prefix: &str) -> String {
    format!("{}/", prefix.trim_matches('/'))
}

fn validate_storage(config: &EnclaveConfig, report: &mut ValidationReport) {
    let Some(storage) = &config.storage else { return };

    if let Some(bucket) = &storage.bucket {
        if !is_valid_bucket_name(bucket) {
            report.error("storage.bucket", format!("'{bucket}' is not a valid bucket name"));
        }
    }

    let input = storage.input_prefix.as_deref().unwrap_or_default();
    let output = storage.output_prefix.as_deref().unwrap_or_default();
    if input.trim_matches('/').is_empty() {
        report.error("storage.inputPrefix", "Input prefix cannot be empty; every upload would trigger the runner");
    }
    if output.trim_matches('/').is_empty() {
        report.error("storage.outputPrefix", "Output prefix cannot be empty; the runner refuses to start without it");
    }
    if !input.trim_matches('/').is_empty() && !output.trim_matches('/').is_empty() {
        let (input, output) = (normalize_prefix(input), normalize_prefix(output));
        if output.starts_with(&input) {
            report.error(
                "storage.outputPrefix",
                format!("Output prefix '{output}' lies under input prefix '{input}'; results would re-trigger the runner"),
            );
        } else if input.starts_with(&output) {
            report.warn(
                "storage.inputPrefix",
                format!("Input prefix '{input}' lies under output prefix '{output}'"),
            );
        }
    }
    if storage.versioned == Some(false) {
        report.warn("storage.versioned", "Unversioned bucket: redeliveries cannot be told apart by version");
    }
}

fn validate_pipeline(config: &EnclaveConfig, report: &mut ValidationReport) {
    let Some(pipeline) = &config.pipeline else { return };

    if let Some(level) = &pipeline.log_level {
        if !RUNNER_LOG_LEVELS.contains(&level.as_str()) {
            report.warn(
                "pipeline.logLevel",
                format!("Unknown runner log level '{level}'. Use one of {}", RUNNER_LOG_LEVELS.join(", ")),
            );
        }
    }
    if pipeline.trusted_services.is_empty() {
        report.error("pipeline.trustedServices", "No trusted services: every bucket request would be denied");
    }
    for (i, service) in pipeline.trusted_services.iter().enumerate() {
        if service.trim().is_empty() {
            report.error(format!("pipeline.trustedServices[{i}]"), "Service name cannot be empty");
        }
    }
    if !pipeline
        .trusted_services
        .iter()
        .any(|s| matches!(s.parse::<ServiceId>(), Ok(ServiceId::OcrService)))
    {
        report.warn("pipeline.trustedServices", "The OCR service is not trusted; the runner cannot read uploads");
    }
    if pipeline.timeout_seconds == Some(0) {
        report.error("pipeline.timeoutSeconds", "timeoutSeconds must be > 0");
    }
}

fn validate_logging(config: &EnclaveConfig, report: &mut ValidationReport) {
    let Some(logging) = &config.logging else { return };
    if let Some(level) = &logging.level {
        if !TOOL_LOG_LEVELS.contains(&level.to_ascii_lowercase().as_str()) {
            report.error("logging.level", format!("Unknown log level '{level}'"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::apply_all_defaults;
    use crate::schema::{StorageConfig, SubnetConfig};

    fn defaults() -> EnclaveConfig {
        apply_all_defaults(EnclaveConfig::default())
    }

    #[test]
    fn defaults_are_valid() {
        let report = validate(&defaults());
        assert!(report.is_valid(), "errors: {:?}", report.errors);
    }

    #[test]
    fn output_nested_in_input_is_rejected() {
        let mut cfg = defaults();
        cfg.storage = Some(StorageConfig {
            input_prefix: Some("uploads".into()),
            output_prefix: Some("uploads/results".into()),
            ..cfg.storage.unwrap()
        });
        let report = validate(&cfg);
        assert!(!report.is_valid());
        assert_eq!(report.errors[0].path, "storage.outputPrefix");
    }

    #[test]
    fn sibling_prefixes_sharing_a_stem_are_fine() {
        let mut cfg = defaults();
        let storage = cfg.storage.as_mut().unwrap();
        storage.input_prefix = Some("uploads".into());
        storage.output_prefix = Some("uploads-out".into());
        assert!(validate(&cfg).is_valid());
    }

    #[test]
    fn empty_output_prefix_is_rejected() {
        let mut cfg = defaults();
        cfg.storage.as_mut().unwrap().output_prefix = Some("/".into());
        assert!(!validate(&cfg).is_valid());
    }

    #[test]
    fn bad_cidr_and_mask_are_rejected() {
        let mut cfg = defaults();
        let network = cfg.network.as_mut().unwrap();
        network.cidr = Some("10.0.0.0/33".into());
        assert!(!validate(&cfg).is_valid());

        let mut cfg = defaults();
        cfg.network.as_mut().unwrap().subnets = vec![SubnetConfig { name: "big".into(), cidr_mask: 8 }];
        let report = validate(&cfg);
        assert!(report.errors.iter().any(|e| e.path == "network.subnets[0].cidrMask"));
    }

    #[test]
    fn invalid_bucket_name_is_rejected() {
        for name in ["Docs", "ab", "-docs", "docs_bucket"] {
            let mut cfg = defaults();
            cfg.storage.as_mut().unwrap().bucket = Some(name.into());
            assert!(!validate(&cfg).is_valid(), "{name} should be rejected");
        }
    }

    #[test]
    fn untrusted_ocr_is_a_warning() {
        let mut cfg = defaults();
        cfg.pipeline.as_mut().unwrap().trusted_services = vec!["provisioning-service".into()];
        let report = validate(&cfg);
        assert!(report.is_valid());
        assert!(report.warnings.iter().any(|w| w.path == "pipeline.trustedServices"));
    }
}
