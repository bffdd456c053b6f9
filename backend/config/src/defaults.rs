//! Config defaults: the two-zone, two-subnet document pipeline.

use crate::schema::{
    BastionConfig, EnclaveConfig, LoggingConfig, NetworkConfig, PipelineConfig, StorageConfig,
    SubnetConfig,
};

pub const DEFAULT_NETWORK_NAME: &str = "enclave";
pub const DEFAULT_CIDR: &str = "10.0.0.0/16";
pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_ZONE_COUNT: usize = 2;
pub const DEFAULT_SUBNET_MASK: u8 = 24;

pub const DEFAULT_BUCKET: &str = "document-enclave";
pub const DEFAULT_INPUT_PREFIX: &str = "uploads";
pub const DEFAULT_OUTPUT_PREFIX: &str = "outputs";

pub const DEFAULT_RUNNER_LOG_LEVEL: &str = "INFO";
pub const DEFAULT_TRUSTED_SERVICES: [&str; 2] = ["ocr-service", "provisioning-service"];
pub const DEFAULT_TIMEOUT_SECONDS: u32 = 15;

pub const DEFAULT_BASTION_POLICY: &str = "AmazonSSMManagedInstanceCore";

pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Apply all defaults to a freshly loaded config.
pub fn apply_all_defaults(config: EnclaveConfig) -> EnclaveConfig {
    let config = apply_network_defaults(config);
    let config = apply_storage_defaults(config);
    let config = apply_pipeline_defaults(config);
    let config = apply_bastion_defaults(config);
    apply_logging_defaults(config)
}

fn apply_network_defaults(mut config: EnclaveConfig) -> EnclaveConfig {
    let network = config.network.get_or_insert_with(NetworkConfig::default);
    network.name.get_or_insert_with(|| DEFAULT_NETWORK_NAME.to_string());
    network.cidr.get_or_insert_with(|| DEFAULT_CIDR.to_string());
    network.region.get_or_insert_with(|| DEFAULT_REGION.to_string());
    network.zone_count.get_or_insert(DEFAULT_ZONE_COUNT);
    if network.subnets.is_empty() {
        network.subnets = (1..=2)
            .map(|i| SubnetConfig {
                name: format!("private-{i}"),
                cidr_mask: DEFAULT_SUBNET_MASK,
            })
            .collect();
    }
    config
}

fn apply_storage_defaults(mut config: EnclaveConfig) -> EnclaveConfig {
    let storage = config.storage.get_or_insert_with(StorageConfig::default);
    storage.bucket.get_or_insert_with(|| DEFAULT_BUCKET.to_string());
    storage.versioned.get_or_insert(true);
    storage.input_prefix.get_or_insert_with(|| DEFAULT_INPUT_PREFIX.to_string());
    storage.output_prefix.get_or_insert_with(|| DEFAULT_OUTPUT_PREFIX.to_string());
    config
}

fn apply_pipeline_defaults(mut config: EnclaveConfig) -> EnclaveConfig {
    let pipeline = config.pipeline.get_or_insert_with(PipelineConfig::default);
    pipeline.log_level.get_or_insert_with(|| DEFAULT_RUNNER_LOG_LEVEL.to_string());
    pipeline.timeout_seconds.get_or_insert(DEFAULT_TIMEOUT_SECONDS);
    if pipeline.trusted_services.is_empty() {
        pipeline.trusted_services = DEFAULT_TRUSTED_SERVICES.iter().map(|s| s.to_string()).collect();
    }
    config
}

fn apply_bastion_defaults(mut config: EnclaveConfig) -> EnclaveConfig {
    let bastion = config.bastion.get_or_insert_with(BastionConfig::default);
    bastion.enabled.get_or_insert(true);
    if bastion.managed_policies.is_empty() {
        bastion.managed_policies = vec![DEFAULT_BASTION_POLICY.to_string()];
    }
    config
}

fn apply_logging_defaults(mut config: EnclaveConfig) -> EnclaveConfig {
    let logging = config.logging.get_or_insert_with(LoggingConfig::default);
    logging.level.get_or_insert_with(|| DEFAULT_LOG_LEVEL.to_string());
    logging.json.get_or_insert(false);
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_the_document_pipeline_layout() {
        let cfg = apply_all_defaults(EnclaveConfig::default());
        let network = cfg.network.unwrap();
        assert_eq!(network.cidr.as_deref(), Some(DEFAULT_CIDR));
        assert_eq!(network.zone_count, Some(2));
        assert_eq!(network.subnets.len(), 2);

        let storage = cfg.storage.unwrap();
        assert_eq!(storage.input_prefix.as_deref(), Some("uploads"));
        assert_eq!(storage.output_prefix.as_deref(), Some("outputs"));

        let pipeline = cfg.pipeline.unwrap();
        assert_eq!(pipeline.trusted_services, vec!["ocr-service", "provisioning-service"]);
        assert_eq!(pipeline.log_level.as_deref(), Some("INFO"));
    }

    #[test]
    fn does_not_override_user_values() {
        let cfg = EnclaveConfig {
            network: Some(NetworkConfig {
                zone_count: Some(3),
                subnets: vec![SubnetConfig { name: "only".into(), cidr_mask: 20 }],
                ..Default::default()
            }),
            bastion: Some(BastionConfig {
                enabled: Some(false),
                ..Default::default()
            }),
            ..Default::default()
        };
        let cfg = apply_all_defaults(cfg);
        let network = cfg.network.unwrap();
        assert_eq!(network.zone_count, Some(3));
        assert_eq!(network.subnets.len(), 1);
        assert_eq!(cfg.bastion.unwrap().enabled, Some(false));
    }
}
