//! `enclavectl init`: write a config holding every default.

use std::path::Path;

use anyhow::{bail, Result};

use enclave_config::{apply_all_defaults, write_config, EnclaveConfig};

use crate::terminal_output::note_success;

pub async fn run(path: &Path, force: bool) -> Result<()> {
    if !force && tokio::fs::try_exists(path).await.unwrap_or(false) {
        bail!("{} already exists; pass --force to overwrite", path.display());
    }
    let config = apply_all_defaults(EnclaveConfig::default());
    write_config(&config, path).await?;
    note_success(&format!("Wrote {}", path.display()));
    Ok(())
}
