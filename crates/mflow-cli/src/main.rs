//! `mflow`: lists, runs, starts, stops, and inspects node instances from
//! declarative configuration.

mod client;
mod instances;
mod pidfile;
mod processors;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use mflow_core::Registry;
use mflow_node::{NodeControl, NodeManager, TransportSource};
use tokio::sync::Notify;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt};

use pidfile::CliError;

#[derive(Parser)]
#[command(name = "mflow", about = "Manage mflow stream-processing node instances")]
struct Cli {
    /// Explicit instance-definitions file, highest priority over the
    /// standard /etc, ~/, ./ search path.
    #[arg(long = "config_file", global = true)]
    config_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print configured instance names.
    List {
        /// Also print module_to_run, input_args, and whether each is running.
        #[arg(short = 'v', long)]
        verbose: bool,
    },
    /// Run an instance's node manager and HTTP server in the foreground.
    Run { instance: String },
    /// Start an instance as a detached background process.
    Start { instance: String },
    /// Stop a background instance started with `start`.
    Stop { instance: String },
    /// Print `help` and `status` from a running instance's HTTP API.
    ClientInfo { instance: String },
    /// Print `status`, `parameters`, and `statistics` from a running instance.
    Client { instance: String },
}

fn fail(message: impl std::fmt::Display) -> ExitCode {
    eprintln!("error: {message}");
    ExitCode::FAILURE
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config_file = cli.config_file.as_deref();

    match cli.command {
        Command::List { verbose } => match instances::discover_instances(config_file) {
            Ok(found) => {
                for (name, entry) in &found {
                    if verbose {
                        let running = if pidfile::is_running(name) { "running" } else { "stopped" };
                        println!(
                            "{name}\t{}\t{running}\t{}",
                            entry.module_to_run,
                            serde_json::to_string(&entry.input_args).unwrap_or_default()
                        );
                    } else {
                        println!("{name}");
                    }
                }
                ExitCode::SUCCESS
            }
            Err(e) => fail(e),
        },
        Command::Run { instance } => match run_instance(&instance, config_file).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => fail(e),
        },
        Command::Start { instance } => {
            if let Err(e) = instances::find_instance(&instance, config_file) {
                return fail(e);
            }
            match pidfile::start(&instance, config_file) {
                Ok(()) => {
                    println!("started '{instance}'");
                    ExitCode::SUCCESS
                }
                Err(e) => fail(e),
            }
        }
        Command::Stop { instance } => match pidfile::stop(&instance) {
            Ok(()) => {
                println!("stopped '{instance}'");
                ExitCode::SUCCESS
            }
            Err(e) => fail(e),
        },
        Command::ClientInfo { instance } => match instance_config(&instance, config_file) {
            Ok(config) => match client::client_info(&config).await {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => fail(e),
            },
            Err(e) => fail(e),
        },
        Command::Client { instance } => match instance_config(&instance, config_file) {
            Ok(config) => match client::client(&config).await {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => fail(e),
            },
            Err(e) => fail(e),
        },
    }
}

fn instance_config(
    instance: &str,
    config_file: Option<&std::path::Path>,
) -> Result<mflow_core::Config, CliError> {
    let entry = instances::find_instance(instance, config_file).map_err(|e| CliError(e.0))?;
    instances::config_from_entry(&entry).map_err(|e| CliError(e.0))
}

async fn run_instance(instance: &str, config_file: Option<&std::path::Path>) -> Result<(), CliError> {
    let entry = instances::find_instance(instance, config_file).map_err(|e| CliError(e.0))?;
    let config = instances::config_from_entry(&entry).map_err(|e| CliError(e.0))?;

    let (filter, reload_handle) = reload::Layer::new(EnvFilter::new(&config.log_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .ok();

    let processor = processors::build_processor(&entry.module_to_run, &config)
        .await
        .map_err(|e| CliError(e.to_string()))?;

    let manager = Arc::new(NodeManager::new(
        config.clone(),
        Arc::new(Registry::standard()),
        processor,
        TransportSource::TcpPull,
    ));

    if let Some(parameters) = entry.parameters.clone() {
        manager
            .set_parameters(parameters.into_iter().collect())
            .await
            .map_err(|e| CliError(e.to_string()))?;
    }

    if let Err(e) = manager.start().await {
        tracing::warn!(error = %e, "initial start() failed; instance remains reachable over HTTP for a retry");
    }

    let manager: Arc<dyn NodeControl> = manager;
    let logging = mflow_http::LoggingRegistry::new(reload_handle);
    let shutdown = Arc::new(Notify::new());
    let state = mflow_http::AppState { manager: manager.clone(), logging, shutdown: shutdown.clone() };
    let router = mflow_http::build_router(&config.instance_name, state, None);

    let addr: SocketAddr = format!("{}:{}", config.rest_host, config.rest_port)
        .parse()
        .map_err(|e| CliError(format!("invalid rest_host/rest_port: {e}")))?;

    tracing::info!(%addr, instance = %config.instance_name, "serving mflow node instance");
    mflow_http::serve(router, addr, manager, shutdown)
        .await
        .map_err(|e| CliError(e.to_string()))
}
