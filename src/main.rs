mod config;
mod deploy;
mod env;
mod error;
mod portainer;
mod report;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use config::{Credentials, DeployConfig, DEFAULT_STACK_FILE, DEFAULT_TIMEOUT_SECS};
use deploy::Outcome;
use portainer::HttpPortainer;
use report::{ConsoleReporter, Reporter};
use std::{path::PathBuf, process::ExitCode, time::Duration};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about = "Deploy or update a Docker stack through Portainer", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the stack if it does not exist yet, otherwise update it
    Deploy(DeployArgs),
}

#[derive(Args)]
struct DeployArgs {
    /// Portainer instance URL
    #[arg(long, env = "PORTAINER_URL")]
    portainer_url: String,

    /// Portainer username
    #[arg(long, env = "PORTAINER_USERNAME")]
    portainer_username: String,

    /// Portainer password
    #[arg(long, env = "PORTAINER_PASSWORD", hide_env_values = true)]
    portainer_password: String,

    /// Default Portainer endpoint ID (0 means discover)
    #[arg(long, env = "PORTAINER_ENDPOINT_ID")]
    portainer_endpoint_id: Option<u64>,

    /// Name of the stack
    #[arg(long, env = "STACK_NAME")]
    stack_name: String,

    /// Path to the stack file
    #[arg(long, env = "STACK_FILE", default_value = DEFAULT_STACK_FILE)]
    stack_file: PathBuf,

    /// Environment variable used during stack deployment (NAME=VALUE, repeatable)
    #[arg(short = 'e', long = "env-var", value_name = "NAME=VALUE")]
    env_vars: Vec<String>,

    /// Per-request timeout in seconds
    #[arg(long, env = "PORTAINER_TIMEOUT", default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout: u64,
}

impl DeployArgs {
    fn into_config(self) -> Result<DeployConfig> {
        Ok(DeployConfig {
            api_url: config::api_url(&self.portainer_url)?,
            credentials: Credentials {
                username: self.portainer_username,
                password: self.portainer_password,
            },
            // Portainer never assigns ID 0; treat it as "discover".
            endpoint_id: self.portainer_endpoint_id.filter(|&id| id != 0),
            stack_name: self.stack_name,
            stack_file: self.stack_file,
            env_vars: self.env_vars,
            timeout: Duration::from_secs(self.timeout),
        })
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    let mut reporter = ConsoleReporter::stdout();
    let result = match cli.command {
        Commands::Deploy(args) => run_deploy(args, &mut reporter),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            reporter.fail(&err);
            ExitCode::FAILURE
        }
    }
}

fn run_deploy(args: DeployArgs, reporter: &mut dyn Reporter) -> Result<()> {
    let config = args.into_config()?;
    let api = HttpPortainer::new(config.api_url.clone(), config.timeout)?;
    match deploy::run(&config, &api, reporter)? {
        Outcome::Created {
            endpoint_id,
            cluster_id,
        } => info!(stack = %config.stack_name, endpoint_id, %cluster_id, "stack created"),
        Outcome::Updated {
            stack_id,
            endpoint_id,
        } => info!(stack = %config.stack_name, stack_id, endpoint_id, "stack updated"),
    }
    Ok(())
}
