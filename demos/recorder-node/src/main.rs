//! Standalone runnable recorder node: connects to an upstream push endpoint,
//! records every frame it sees, and exposes the full HTTP control surface.
//! `mflow-cli run`/`start` is the intended way to launch a configured
//! instance; this binary is a minimal example of wiring the pieces by hand.

use std::net::SocketAddr;
use std::sync::Arc;

use mflow_core::{Config, Registry};
use mflow_node::{NodeControl, NodeManager, TransportSource};
use recorder_node::RecorderProcessor;
use tokio::sync::Notify;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    let mut config = Config::default();
    config.instance_name = "recorder".to_string();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--connect" => {
                config.connect_address = args.next().expect("--connect needs an address");
            }
            "--rest-port" => {
                config.rest_port = args
                    .next()
                    .expect("--rest-port needs a value")
                    .parse()
                    .expect("--rest-port must be a number");
            }
            other => panic!("unrecognized argument: {other}"),
        }
    }

    let (filter, reload_handle) = reload::Layer::new(EnvFilter::new(&config.log_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let manager: Arc<dyn NodeControl> = Arc::new(NodeManager::new(
        config.clone(),
        Arc::new(Registry::standard()),
        Arc::new(RecorderProcessor::new()),
        TransportSource::TcpPull,
    ));

    let logging = mflow_http::LoggingRegistry::new(reload_handle);
    let shutdown = Arc::new(Notify::new());
    let state = mflow_http::AppState { manager: manager.clone(), logging, shutdown: shutdown.clone() };
    let router = mflow_http::build_router(&config.instance_name, state, None);

    let addr: SocketAddr = format!("{}:{}", config.rest_host, config.rest_port)
        .parse()
        .expect("invalid rest_host/rest_port");

    tracing::info!(%addr, instance = %config.instance_name, "serving recorder demo node");
    if let Err(e) = mflow_http::serve(router, addr, manager, shutdown).await {
        tracing::error!(error = %e, "server exited with an error");
        std::process::exit(1);
    }
}
