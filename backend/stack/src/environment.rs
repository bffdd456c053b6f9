//! Flat environment handed to the job runner.

use std::collections::BTreeMap;

use serde::Serialize;

use enclave_core::{EnclaveError, Result};

pub const OUTPUT_BUCKET_KEY: &str = "S3_OUTPUT_BUCKET";
pub const OUTPUT_PREFIX_KEY: &str = "S3_OUTPUT_PREFIX";
pub const LOG_LEVEL_KEY: &str = "LOG_LEVEL";

/// String-keyed runner environment. The runner refuses to start without an
/// output bucket and prefix, so neither may be empty here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RunnerEnvironment(BTreeMap<String, String>);

impl RunnerEnvironment {
    pub fn new(output_bucket: &str, output_prefix: &str, log_level: &str) -> Result<Self> {
        if output_bucket.trim().is_empty() {
            return Err(EnclaveError::InvalidEnvironment(format!("{OUTPUT_BUCKET_KEY} is empty")));
        }
        if output_prefix.trim_matches('/').is_empty() {
            return Err(EnclaveError::InvalidEnvironment(format!("{OUTPUT_PREFIX_KEY} is empty")));
        }
        let vars = BTreeMap::from([
            (OUTPUT_BUCKET_KEY.to_string(), output_bucket.to_string()),
            (OUTPUT_PREFIX_KEY.to_string(), output_prefix.to_string()),
            (LOG_LEVEL_KEY.to_string(), log_level.to_string()),
        ]);
        Ok(Self(vars))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn vars(&self) -> &BTreeMap<String, String> {
        &self.0
    }
}
