//! Typed settings for one enclave, resolved from a prepared config.

use anyhow::{Context, Result};

use enclave_config::defaults::{
    DEFAULT_BASTION_POLICY, DEFAULT_BUCKET, DEFAULT_CIDR, DEFAULT_INPUT_PREFIX, DEFAULT_NETWORK_NAME,
    DEFAULT_OUTPUT_PREFIX, DEFAULT_REGION, DEFAULT_RUNNER_LOG_LEVEL, DEFAULT_TIMEOUT_SECONDS,
    DEFAULT_ZONE_COUNT,
};
use enclave_config::{apply_all_defaults, EnclaveConfig};
use enclave_core::Cidr;
use enclave_network::{NetworkLayout, SubnetSpec};

#[derive(Debug, Clone)]
pub struct BastionSettings {
    pub managed_policies: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct EnclaveSettings {
    pub layout: NetworkLayout,
    pub bucket: String,
    pub versioned: bool,
    pub input_prefix: String,
    pub output_prefix: String,
    pub runner_log_level: String,
    /// Services allowed as first caller on bucket requests.
    pub trusted_services: Vec<String>,
    pub timeout_seconds: u32,
    /// `None` when the bastion is disabled.
    pub bastion: Option<BastionSettings>,
}

impl EnclaveSettings {
    /// Resolve settings from a config. Sections the config leaves out fall
    /// back to the same defaults the loader applies.
    pub fn from_config(config: &EnclaveConfig) -> Result<Self> {
        let config = apply_all_defaults(config.clone());
        let network = config.network.unwrap_or_default();
        let storage = config.storage.unwrap_or_default();
        let pipeline = config.pipeline.unwrap_or_default();
        let bastion = config.bastion.unwrap_or_default();

        let cidr_text = network.cidr.as_deref().unwrap_or(DEFAULT_CIDR);
        let cidr: Cidr = cidr_text
            .parse()
            .with_context(|| format!("network.cidr '{cidr_text}' is not a valid block"))?;

        let layout = NetworkLayout {
            name: network.name.unwrap_or_else(|| DEFAULT_NETWORK_NAME.to_string()),
            cidr,
            region: network.region.unwrap_or_else(|| DEFAULT_REGION.to_string()),
            zone_count: network.zone_count.unwrap_or(DEFAULT_ZONE_COUNT),
            subnets: network
                .subnets
                .iter()
                .map(|s| SubnetSpec::isolated(s.name.clone(), s.cidr_mask))
                .collect(),
        };

        let bastion = if bastion.enabled.unwrap_or(true) {
            let managed_policies = if bastion.managed_policies.is_empty() {
                vec![DEFAULT_BASTION_POLICY.to_string()]
            } else {
                bastion.managed_policies
            };
            Some(BastionSettings { managed_policies })
        } else {
            None
        };

        Ok(Self {
            layout,
            bucket: storage.bucket.unwrap_or_else(|| DEFAULT_BUCKET.to_string()),
            versioned: storage.versioned.unwrap_or(true),
            input_prefix: trim_prefix(storage.input_prefix.as_deref().unwrap_or(DEFAULT_INPUT_PREFIX)),
            output_prefix: trim_prefix(storage.output_prefix.as_deref().unwrap_or(DEFAULT_OUTPUT_PREFIX)),
            runner_log_level: pipeline
                .log_level
                .unwrap_or_else(|| DEFAULT_RUNNER_LOG_LEVEL.to_string()),
            trusted_services: pipeline.trusted_services,
            timeout_seconds: pipeline.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS),
            bastion,
        })
    }
}

fn trim_prefix(prefix: &str) -> String {
    prefix.trim_matches('/').to_string()
}
