//! `enclavectl synth`: the hand-off document for the realization engine.

use std::path::Path;

use anyhow::{Context, Result};

use enclave_logging::BuildEventLogger;
use enclave_stack::Enclave;

use crate::terminal_output::note_success;

pub async fn run(enclave: &Enclave, output: Option<&Path>) -> Result<()> {
    BuildEventLogger::replay_journal(enclave.network.id.as_str(), enclave.graph.journal());

    let document = serde_json::to_string_pretty(&enclave.synth()).context("Failed to serialize synth document")?;
    match output {
        Some(path) => {
            tokio::fs::write(path, document.as_bytes())
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            note_success(&format!(
                "{} resources written to {}",
                enclave.graph.node_count(),
                path.display()
            ));
        }
        None => println!("{document}"),
    }
    Ok(())
}
