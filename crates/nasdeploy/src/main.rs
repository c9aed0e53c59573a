//! nasdeploy - Deploy Docker Compose apps to a TrueNAS appliance.

use anyhow::Context;
use clap::{Parser, Subcommand};
use nasdeploy::facade::{self, Operations, Outcome, DEFAULT_LOG_LINES};
use nasdeploy::logging;
use nasdeploy_client::StatusFilter;
use nasdeploy_common::Config;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "nasdeploy")]
#[command(
    author,
    version,
    about = "Validate, convert and deploy Docker Compose apps on TrueNAS"
)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Use the in-memory backend instead of an appliance
    #[arg(long, global = true)]
    mock: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(flatten)]
    Offline(OfflineCommand),

    #[command(flatten)]
    Online(OnlineCommand),
}

/// Commands that work on a local file only.
#[derive(Subcommand)]
enum OfflineCommand {
    /// Check a Compose file for structure, security and compatibility issues
    Validate {
        #[arg(long, short)]
        file: PathBuf,

        /// Skip the security rules
        #[arg(long)]
        skip_security: bool,
    },

    /// Print the app descriptor a Compose file converts to
    Convert {
        /// App name the descriptor is built for
        name: String,

        #[arg(long, short)]
        file: PathBuf,
    },
}

/// Commands that talk to an appliance (or the mock backend).
#[derive(Subcommand)]
enum OnlineCommand {
    /// Check that the appliance is reachable and the API key works
    TestConnection,

    /// List Custom Apps
    List {
        /// Only show apps in this state (all, running, stopped, error)
        #[arg(long, default_value = "all")]
        status: StatusFilter,
    },

    /// Show the state of one app
    Status { name: String },

    /// Start an app
    Start { name: String },

    /// Stop an app
    Stop { name: String },

    /// Convert a Compose file and create an app from it
    Deploy {
        name: String,

        /// Docker Compose file
        #[arg(long, short)]
        file: PathBuf,

        /// Leave the app stopped after creation
        #[arg(long)]
        no_start: bool,
    },

    /// Replace an app's configuration from a Compose file
    Update {
        name: String,

        #[arg(long, short)]
        file: PathBuf,

        /// Recreate containers even when nothing changed
        #[arg(long)]
        force_recreate: bool,
    },

    /// Delete an app
    Delete {
        name: String,

        /// Also delete the app's volumes
        #[arg(long)]
        delete_volumes: bool,

        /// Required for the deletion to happen
        #[arg(long)]
        confirm: bool,
    },

    /// Show recent log lines of an app
    Logs {
        name: String,

        #[arg(long, default_value_t = DEFAULT_LOG_LINES)]
        lines: usize,

        /// Restrict to one service
        #[arg(long)]
        service: Option<String>,
    },
}

fn read_document(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

fn report(outcome: Outcome) -> ExitCode {
    println!("{}", outcome.text);
    if outcome.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn run_offline(command: OfflineCommand) -> anyhow::Result<Outcome> {
    let outcome = match command {
        OfflineCommand::Validate {
            file,
            skip_security,
        } => facade::validate_document(&read_document(&file)?, !skip_security),
        OfflineCommand::Convert { name, file } => {
            facade::convert_document(&name, &read_document(&file)?)
        }
    };
    Ok(outcome)
}

async fn run_online(ops: &Operations, command: OnlineCommand) -> anyhow::Result<Outcome> {
    if !matches!(command, OnlineCommand::TestConnection) {
        let connected = ops.connect().await;
        if !connected.success {
            return Ok(connected);
        }
    }

    let outcome = match command {
        OnlineCommand::TestConnection => ops.test_connection().await,
        OnlineCommand::List { status } => ops.list_apps(status).await,
        OnlineCommand::Status { name } => ops.app_status(&name).await,
        OnlineCommand::Start { name } => ops.start_app(&name).await,
        OnlineCommand::Stop { name } => ops.stop_app(&name).await,
        OnlineCommand::Deploy {
            name,
            file,
            no_start,
        } => ops.deploy_app(&name, &read_document(&file)?, !no_start).await,
        OnlineCommand::Update {
            name,
            file,
            force_recreate,
        } => {
            ops.update_app(&name, &read_document(&file)?, force_recreate)
                .await
        }
        OnlineCommand::Delete {
            name,
            delete_volumes,
            confirm,
        } => ops.delete_app(&name, delete_volumes, confirm).await,
        OnlineCommand::Logs {
            name,
            lines,
            service,
        } => ops.app_logs(&name, lines, service.as_deref()).await,
    };
    Ok(outcome)
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    logging::init(cli.verbose || Config::debug_from_env(), cli.json_logs);

    let outcome = match cli.command {
        // Validation and conversion never read the appliance settings.
        Commands::Offline(command) => run_offline(command)?,
        Commands::Online(command) => {
            let mut config = Config::from_env()?;
            if cli.mock {
                config.mock = true;
            }
            debug!(endpoint = %config.endpoint.url(), mock = config.mock, "Loaded configuration");

            config.enforce()?;
            let ops = Operations::from_config(&config)?;
            info!(mock = config.mock, "Backend ready");
            let outcome = run_online(&ops, command).await;
            ops.shutdown().await;
            outcome?
        }
    };

    Ok(report(outcome))
}
