//! `enclavectl realize`: walk the graph with the dry-run realizer.

use anyhow::Result;

use enclave_logging::{BuildEventLogger, ProvisioningEvent};
use enclave_stack::{realize, teardown, DryRunRealizer, Enclave};

use crate::terminal_output::{render_table, Column};

pub async fn run(enclave: &Enclave, and_teardown: bool, json: bool) -> Result<()> {
    let realizer = DryRunRealizer::new();
    let created = realize(&enclave.graph, &realizer).await?;
    if and_teardown {
        teardown(&enclave.graph, &realizer).await?;
    }
    BuildEventLogger::log_event(
        enclave.network.id.as_str(),
        ProvisioningEvent::Realized {
            realizer: "dry-run".into(),
            resources: created,
        },
    );

    let ops = realizer.operations().await;
    if json {
        println!("{}", serde_json::to_string_pretty(&ops)?);
        return Ok(());
    }
    let rows: Vec<Vec<String>> = ops
        .iter()
        .enumerate()
        .map(|(i, op)| {
            let kind = serde_json::to_value(op.kind)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default();
            vec![(i + 1).to_string(), format!("{:?}", op.op).to_lowercase(), kind, op.id.clone()]
        })
        .collect();
    print!(
        "{}",
        render_table(
            &[Column::new("#"), Column::new("Op"), Column::new("Kind"), Column::new("Resource")],
            &rows
        )
    );
    Ok(())
}
