//! Resolves a persisted instance's `module_to_run` string to a concrete
//! `Processor`. The original source resolves this via dynamic module import;
//! Rust has no runtime-dynamic-import equivalent, so this is instead a small
//! compiled-in registry of the processors this workspace ships (see
//! DESIGN.md). Out-of-tree processors are expected to run behind the
//! out-of-process proxy with their own binary implementing the same IPC
//! envelope.

use std::sync::Arc;

use mflow_core::{Config, NodeError};
use mflow_node::{Forwarder, Processor};
use mflow_transport::{TcpPushTransport, Transport};
use recorder_node::{ProxyProcessor, RecorderProcessor};

const DEFAULT_PROXY_MODULO: i64 = 2;

pub async fn build_processor(
    module_to_run: &str,
    config: &Config,
) -> Result<Arc<dyn Processor>, NodeError> {
    match module_to_run {
        "recorder_node::RecorderProcessor" | "demo.recorder" | "recorder" => {
            Ok(Arc::new(RecorderProcessor::new()))
        }
        "recorder_node::ProxyProcessor" | "demo.proxy" | "proxy" => {
            let binding_address = config.binding_address.clone().ok_or_else(|| {
                NodeError::InvalidParameter {
                    name: "binding_address".to_string(),
                    reason: "the proxy processor forwards downstream and requires input_args.binding_address".to_string(),
                }
            })?;
            let transport = TcpPushTransport::bind(&binding_address)
                .await
                .map_err(|e| NodeError::TransportError { detail: e.0 })?;
            let forwarder = Forwarder::new(Transport::TcpPush(transport));
            Ok(Arc::new(ProxyProcessor::new(forwarder, DEFAULT_PROXY_MODULO)))
        }
        other => Err(NodeError::InvalidParameter {
            name: "module_to_run".to_string(),
            reason: format!("no built-in processor registered under '{other}'"),
        }),
    }
}
