//! Enclave configuration schema, typed for serde YAML/JSON.
//!
//! Every section is optional on disk; [`crate::defaults`] fills in what the
//! file leaves out.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnclaveConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageConfig>,

    /// Job runner and the storage provenance rule guarding its bucket
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<PipelineConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bastion: Option<BastionConfig>,

    /// Logging of this tool, not of the deployed runner
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// IPv4 block in CIDR notation, e.g. `10.0.0.0/16`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cidr: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone_count: Option<usize>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subnets: Vec<SubnetConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubnetConfig {
    pub name: String,
    pub cidr_mask: u8,
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub versioned: Option<bool>,

    /// Uploads under this prefix trigger the runner
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_prefix: Option<String>,

    /// Runner results are written under this prefix
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_prefix: Option<String>,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfig {
    /// `LOG_LEVEL` handed to the runner
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Services allowed as first caller on bucket requests
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trusted_services: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u32>,
}

// ---------------------------------------------------------------------------
// Bastion
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BastionConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Managed policies attached to the host role
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub managed_policies: Vec<String>,
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<bool>,

    /// Directory for daily rolling log files; console only when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_camel_case_yaml() {
        let yaml = r#"
network:
  cidr: 10.1.0.0/16
  zoneCount: 3
  subnets:
    - name: private
      cidrMask: 20
storage:
  bucket: scans
  inputPrefix: incoming
pipeline:
  trustedServices: [ocr-service]
"#;
        let cfg: EnclaveConfig = serde_yaml::from_str(yaml).unwrap();
        let network = cfg.network.unwrap();
        assert_eq!(network.zone_count, Some(3));
        assert_eq!(network.subnets[0].cidr_mask, 20);
        assert_eq!(cfg.storage.unwrap().input_prefix.as_deref(), Some("incoming"));
        assert_eq!(cfg.pipeline.unwrap().trusted_services, vec!["ocr-service"]);
        assert!(cfg.bastion.is_none());
    }

    #[test]
    fn empty_document_is_default() {
        let cfg: EnclaveConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(cfg, EnclaveConfig::default());
    }
}
