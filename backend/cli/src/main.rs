mod audit_cmd;
mod init_cmd;
mod realize_cmd;
mod simulate_cmd;
mod synth_cmd;
mod terminal_output;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use enclave_config::defaults::DEFAULT_LOG_LEVEL;
use enclave_config::schema::LoggingConfig;
use enclave_config::{config_dir, config_file_path, load_and_prepare};
use enclave_stack::{Enclave, EnclaveSettings};

#[derive(Parser)]
#[command(name = "enclavectl")]
#[command(about = "Inspect the private document enclave: synthesize, audit, simulate")]
#[command(version)]
struct Cli {
    /// Config file (default: $ENCLAVE_CONFIG_DIR/enclave.yaml or ~/.enclave/enclave.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a config file holding every default
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Build the enclave and print the hand-off document
    Synth {
        /// Write the document here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Report broad grants, unguarded buckets and unreachable services
    Audit,
    /// Decide one request against a role and the bucket policy
    Simulate {
        #[arg(long)]
        role: String,
        #[arg(long)]
        action: String,
        #[arg(long)]
        resource: String,
        /// Endpoint the request arrives through; `storage` names the registered storage endpoint
        #[arg(long)]
        endpoint: Option<String>,
        /// Calling-service chain, first caller first
        #[arg(long = "called-via", value_delimiter = ',')]
        called_via: Vec<String>,
    },
    /// Resolve a principal's path to a service, or to every service it calls
    Reach {
        #[arg(long)]
        principal: String,
        #[arg(long)]
        service: Option<String>,
    },
    /// Walk the graph with a dry-run realizer
    Realize {
        /// Tear down after creating
        #[arg(long)]
        teardown: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let path = cli
        .config
        .clone()
        .unwrap_or_else(|| config_file_path(&config_dir()));

    init_logging(&path).await;

    let ok = match cli.command {
        Commands::Init { force } => {
            init_cmd::run(&path, force).await?;
            true
        }
        Commands::Synth { output } => {
            let enclave = build(&path).await?;
            synth_cmd::run(&enclave, output.as_deref()).await?;
            true
        }
        Commands::Audit => {
            let enclave = build(&path).await?;
            audit_cmd::run(&enclave, cli.json)?
        }
        Commands::Simulate {
            role,
            action,
            resource,
            endpoint,
            called_via,
        } => {
            let enclave = build(&path).await?;
            let request = simulate_cmd::SimulateRequest {
                role,
                action,
                resource,
                endpoint,
                called_via,
            };
            simulate_cmd::simulate(&enclave, request, cli.json)?
        }
        Commands::Reach { principal, service } => {
            let enclave = build(&path).await?;
            simulate_cmd::reach(&enclave, &principal, service.as_deref(), cli.json)?
        }
        Commands::Realize { teardown } => {
            let enclave = build(&path).await?;
            realize_cmd::run(&enclave, teardown, cli.json).await?;
            true
        }
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

/// Logging comes up before the config is validated, so validation messages
/// are visible. Only the `logging` section is read here.
async fn init_logging(path: &Path) {
    let logging = enclave_config::load_config_value(path)
        .await
        .ok()
        .and_then(|value| value.get("logging").cloned())
        .and_then(|section| serde_json::from_value::<LoggingConfig>(section).ok())
        .unwrap_or_default();

    let level = logging.level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL);
    let dir = logging.dir.as_deref().map(Path::new);
    enclave_logging::init_logger(level, logging.json.unwrap_or(false), dir);
}

async fn build(path: &Path) -> Result<Enclave> {
    let config = load_and_prepare(path).await?;
    let settings = EnclaveSettings::from_config(&config)?;
    let enclave = Enclave::build(&settings).context("Failed to build the enclave")?;
    info!(
        network = %enclave.network.id,
        resources = enclave.graph.node_count(),
        "Enclave built"
    );
    Ok(enclave)
}
