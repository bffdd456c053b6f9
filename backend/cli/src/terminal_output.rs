//! Terminal output: ANSI notes, tables, and renderers for audit reports,
//! access decisions and reachability verdicts.

use enclave_network::Reachability;
use enclave_security::{AuditReport, AuditSeverity, Decision, PolicyOrigin};

pub const RESET: &str = "\x1b[0m";
pub const BOLD: &str = "\x1b[1m";
pub const DIM: &str = "\x1b[2m";

pub const RED: &str = "\x1b[31m";
pub const GREEN: &str = "\x1b[32m";
pub const YELLOW: &str = "\x1b[33m";
pub const MAGENTA: &str = "\x1b[35m";
pub const CYAN: &str = "\x1b[36m";

/// Check if the terminal supports color output.
pub fn supports_color() -> bool {
    std::env::var("NO_COLOR").is_err()
        && (std::env::var("COLORTERM").is_ok()
            || std::env::var("TERM")
                .map(|t| t != "dumb")
                .unwrap_or(false))
}

/// Strip ANSI escape codes from a string.
pub fn strip_ansi(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\x1b' {
            for next in chars.by_ref() {
                if next == 'm' {
                    break;
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}

fn paint(color: &str, text: &str) -> String {
    if supports_color() {
        format!("{color}{text}{RESET}")
    } else {
        text.to_string()
    }
}

// ---------------------------------------------------------------------------
// Formatted notes
// ---------------------------------------------------------------------------

pub fn note_warn(msg: &str) {
    if supports_color() {
        println!("{YELLOW}{BOLD}⚠{RESET} {msg}");
    } else {
        println!("WARN: {msg}");
    }
}

pub fn note_error(msg: &str) {
    if supports_color() {
        eprintln!("{RED}{BOLD}✗{RESET} {msg}");
    } else {
        eprintln!("ERROR: {msg}");
    }
}

pub fn note_success(msg: &str) {
    if supports_color() {
        println!("{GREEN}{BOLD}✓{RESET} {msg}");
    } else {
        println!("OK: {msg}");
    }
}

// ---------------------------------------------------------------------------
// Table rendering
// ---------------------------------------------------------------------------

/// A left-aligned table column.
pub struct Column {
    pub header: String,
    pub max_width: Option<usize>,
}

impl Column {
    pub fn new(header: impl Into<String>) -> Self {
        Self { header: header.into(), max_width: None }
    }

    pub fn max(mut self, width: usize) -> Self {
        self.max_width = Some(width);
        self
    }
}

/// Render rows under `columns`. Cells wider than a column's max are cut.
pub fn render_table(columns: &[Column], rows: &[Vec<String>]) -> String {
    let cut = |cell: &str, i: usize| -> String {
        match columns[i].max_width {
            Some(max) if strip_ansi(cell).chars().count() > max => {
                let mut short: String = strip_ansi(cell).chars().take(max.saturating_sub(1)).collect();
                short.push('…');
                short
            }
            _ => cell.to_string(),
        }
    };

    let rows: Vec<Vec<String>> = rows
        .iter()
        .map(|row| (0..columns.len()).map(|i| cut(row.get(i).map(String::as_str).unwrap_or(""), i)).collect())
        .collect();
    let mut widths: Vec<usize> = columns.iter().map(|c| c.header.chars().count()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(strip_ansi(cell).chars().count());
        }
    }

    let pad = |s: &str, width: usize| {
        let visible = strip_ansi(s).chars().count();
        format!("{s}{}", " ".repeat(width.saturating_sub(visible)))
    };

    let mut out = String::new();
    let header: Vec<String> = columns.iter().enumerate().map(|(i, c)| pad(&c.header, widths[i])).collect();
    out.push_str(&format!("  {}\n", paint(BOLD, &header.join("  "))));
    let sep: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    out.push_str(&format!("  {}\n", sep.join("  ")));
    for row in &rows {
        let cells: Vec<String> = row.iter().enumerate().map(|(i, c)| pad(c, widths[i])).collect();
        out.push_str(&format!("  {}\n", cells.join("  ")));
    }
    out
}

// ---------------------------------------------------------------------------
// Domain renderers
// ---------------------------------------------------------------------------

fn severity_label(severity: AuditSeverity) -> String {
    let (color, label) = match severity {
        AuditSeverity::Critical => (MAGENTA, "CRITICAL"),
        AuditSeverity::High => (RED, "HIGH"),
        AuditSeverity::Medium => (YELLOW, "MEDIUM"),
        AuditSeverity::Low => (CYAN, "LOW"),
        AuditSeverity::Info => (DIM, "INFO"),
    };
    paint(color, label)
}

pub fn render_audit(report: &AuditReport) -> String {
    if report.findings.is_empty() {
        return "  no findings\n".to_string();
    }
    let columns = [
        Column::new("Severity"),
        Column::new("Code"),
        Column::new("Title"),
        Column::new("Detail").max(80),
    ];
    let rows: Vec<Vec<String>> = report
        .findings
        .iter()
        .map(|f| {
            vec![
                severity_label(f.severity),
                f.code.clone(),
                f.title.clone(),
                f.description.clone(),
            ]
        })
        .collect();
    render_table(&columns, &rows)
}

fn origin_label(origin: &PolicyOrigin) -> String {
    match origin {
        PolicyOrigin::Identity(role) => format!("role {role}"),
        PolicyOrigin::Resource(bucket) => format!("bucket policy of {bucket}"),
    }
}

/// One-line summary of an access decision.
pub fn describe_decision(decision: &Decision) -> String {
    match decision {
        Decision::Allow { origin, statement } => {
            format!("allowed by statement {statement} of {}", origin_label(origin))
        }
        Decision::ExplicitDeny { origin, statement, sid } => match sid {
            Some(sid) => format!("explicitly denied by {sid} in {}", origin_label(origin)),
            None => format!("explicitly denied by statement {statement} of {}", origin_label(origin)),
        },
        Decision::ImplicitDeny => "implicitly denied: no statement allows it".to_string(),
    }
}

pub fn render_reachability(rows: &[(String, Reachability)]) -> String {
    let columns = [Column::new("Service"), Column::new("Status"), Column::new("Endpoint")];
    let rows: Vec<Vec<String>> = rows
        .iter()
        .map(|(service, verdict)| {
            let status = if verdict.is_reachable() {
                paint(GREEN, verdict.reason())
            } else {
                paint(RED, verdict.reason())
            };
            let endpoint = match verdict {
                Reachability::Reachable { endpoint, .. }
                | Reachability::NotRouted { endpoint }
                | Reachability::MissingEgress { endpoint }
                | Reachability::MissingIngress { endpoint }
                | Reachability::MissingBoth { endpoint } => endpoint.to_string(),
                Reachability::NoEndpoint => "-".to_string(),
            };
            vec![service.clone(), status, endpoint]
        })
        .collect();
    render_table(&columns, &rows)
}
