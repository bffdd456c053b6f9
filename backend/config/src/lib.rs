//! `enclave-config`: configuration for the document enclave.
//!
//! Provides:
//! - Typed config schema (network, storage, pipeline, bastion, logging)
//! - YAML read/write
//! - `${ENV_VAR}` substitution
//! - Default value application
//! - Validation with a report of errors and warnings

pub mod defaults;
pub mod env;
pub mod io;
pub mod schema;
pub mod validation;

pub use defaults::apply_all_defaults;
pub use env::{collect_referenced_vars, resolve_env_vars, resolve_env_vars_with, MissingEnvVarError};
pub use io::{config_dir, config_file_path, load_config_value, write_config};
pub use schema::EnclaveConfig;
pub use validation::{validate, ConfigValidationError, ValidationReport};

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde_json::Value;

/// Apply env substitution, typing, defaults and validation to a raw value.
pub fn prepare(value: &Value) -> Result<EnclaveConfig> {
    let value = resolve_env_vars(value).context("Failed to resolve env vars in config")?;
    let config: EnclaveConfig =
        serde_json::from_value(value).context("Failed to deserialize config after processing")?;
    let config = apply_all_defaults(config);

    let report = validate(&config);
    for warning in &report.warnings {
        tracing::warn!(path = %warning.path, message = %warning.message, "Config warning");
    }
    for error in &report.errors {
        tracing::error!(path = %error.path, message = %error.message, "Config error");
    }
    if !report.is_valid() {
        let details: Vec<String> = report.errors.iter().map(ToString::to_string).collect();
        bail!("invalid config:\n  {}", details.join("\n  "));
    }
    Ok(config)
}

/// Load a config file and prepare it. This is the main entry point.
pub async fn load_and_prepare(path: &Path) -> Result<EnclaveConfig> {
    let value = load_config_value(path).await?;
    prepare(&value).with_context(|| format!("Config at {} is not usable", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn prepare_applies_defaults() {
        let config = prepare(&json!({})).unwrap();
        assert_eq!(config.storage.unwrap().bucket.as_deref(), Some(defaults::DEFAULT_BUCKET));
    }

    #[test]
    fn prepare_rejects_invalid_config() {
        let err = prepare(&json!({ "storage": { "inputPrefix": "in", "outputPrefix": "in/out" } }))
            .unwrap_err();
        assert!(err.to_string().contains("storage.outputPrefix"));
    }

    #[tokio::test]
    async fn load_and_prepare_without_file_uses_defaults() {
        let path = std::env::temp_dir().join(format!("enclave-absent-{}.yaml", std::process::id()));
        let config = load_and_prepare(&path).await.unwrap();
        assert_eq!(config.network.unwrap().zone_count, Some(defaults::DEFAULT_ZONE_COUNT));
    }
}
