//! `enclavectl audit`

use anyhow::Result;

use enclave_logging::{BuildEventLogger, ProvisioningEvent};
use enclave_stack::Enclave;

use crate::terminal_output::{note_error, note_success, note_warn, render_audit};

/// Print the audit report. Returns whether it passed.
pub fn run(enclave: &Enclave, json: bool) -> Result<bool> {
    let report = enclave.audit();
    for warning in &enclave.warnings {
        BuildEventLogger::log_event(
            enclave.network.id.as_str(),
            ProvisioningEvent::Warning {
                subject: warning.principal.to_string(),
                message: warning.to_string(),
            },
        );
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(report.passed);
    }

    print!("{}", render_audit(&report));
    println!();
    if report.is_healthy() {
        note_success("No findings above Low.");
    } else if report.passed {
        note_warn("Passed with Medium findings.");
    } else {
        note_error("High or Critical findings present.");
    }
    Ok(report.passed)
}
