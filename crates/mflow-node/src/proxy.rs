use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mflow_core::{NodeError, ParameterMap, StatisticsSample, StatisticsSnapshot};
use parking_lot::Mutex as SyncMutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;

use crate::control::{ControlFuture, NodeControl};

#[derive(Serialize)]
struct IpcRequest<'a> {
    call_id: u64,
    method: &'a str,
    args: Value,
}

#[derive(Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum IpcStatus {
    Ok,
    Error,
}

#[derive(Deserialize)]
struct IpcResponse {
    call_id: u64,
    status: IpcStatus,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    message: Option<String>,
}

type PendingCalls = Arc<SyncMutex<HashMap<u64, oneshot::Sender<Result<Value, String>>>>>;

/// Out-of-process control surface: drives a real child OS process over
/// newline-delimited JSON request/response envelopes on its piped
/// stdin/stdout, the practical substitute for a language-level pickling
/// pipe. The child is expected to host its own `NodeManager` and answer
/// each `{call_id, method, args}` with exactly one `{call_id, status, data?,
/// message?}` line.
pub struct NodeManagerProxy {
    child: AsyncMutex<Child>,
    stdin: AsyncMutex<ChildStdin>,
    pending: PendingCalls,
    next_call_id: AtomicU64,
    reader_handle: JoinHandle<()>,
    ipc_timeout: Duration,
    shutdown_timeout: Duration,
}

impl NodeManagerProxy {
    /// Spawns `command` with piped stdio and starts the background reader
    /// task that dispatches responses back to waiting callers.
    pub fn spawn(
        mut command: Command,
        ipc_timeout: Duration,
        shutdown_timeout: Duration,
    ) -> Result<Self, NodeError> {
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        let mut child = command
            .spawn()
            .map_err(|e| NodeError::IoError { detail: format!("spawning ipc child: {e}") })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| NodeError::IoError { detail: "child stdin was not piped".into() })?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| NodeError::IoError { detail: "child stdout was not piped".into() })?;

        let pending: PendingCalls = Arc::new(SyncMutex::new(HashMap::new()));
        let reader_pending = pending.clone();
        let reader_handle = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => match serde_json::from_str::<IpcResponse>(&line) {
                        Ok(response) => {
                            if let Some(tx) = reader_pending.lock().remove(&response.call_id) {
                                let result = match response.status {
                                    IpcStatus::Ok => Ok(response.data.unwrap_or(Value::Null)),
                                    IpcStatus::Error => {
                                        Err(response.message.unwrap_or_else(|| "ipc call failed".into()))
                                    }
                                };
                                let _ = tx.send(result);
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, line = %line, "dropping malformed ipc response")
                        }
                    },
                    Ok(None) => break,
                    Err(e) => {
                        tracing::error!(error = %e, "ipc child stdout read failed");
                        break;
                    }
                }
            }
        });

        Ok(NodeManagerProxy {
            child: AsyncMutex::new(child),
            stdin: AsyncMutex::new(stdin),
            pending,
            next_call_id: AtomicU64::new(0),
            reader_handle,
            ipc_timeout,
            shutdown_timeout,
        })
    }

    async fn call(&self, method: &str, args: Value) -> Result<Value, NodeError> {
        let call_id = self.next_call_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(call_id, tx);

        let mut line = serde_json::to_string(&IpcRequest { call_id, method, args })
            .map_err(|e| NodeError::IoError { detail: e.to_string() })?;
        line.push('\n');
        {
            let mut stdin = self.stdin.lock().await;
            if let Err(e) = stdin.write_all(line.as_bytes()).await {
                self.pending.lock().remove(&call_id);
                return Err(NodeError::IoError { detail: format!("writing ipc request: {e}") });
            }
        }

        match tokio::time::timeout(self.ipc_timeout, rx).await {
            Ok(Ok(Ok(data))) => Ok(data),
            Ok(Ok(Err(message))) => Err(NodeError::IoError { detail: message }),
            Ok(Err(_)) => Err(NodeError::IoError {
                detail: "ipc reader task dropped the response channel".into(),
            }),
            Err(_) => {
                self.pending.lock().remove(&call_id);
                Err(NodeError::IpcTimeout { method: method.to_string() })
            }
        }
    }

    fn typed<T: for<'de> Deserialize<'de>>(value: Value) -> Result<T, NodeError> {
        serde_json::from_value(value)
            .map_err(|e| NodeError::IoError { detail: format!("malformed ipc response: {e}") })
    }

    /// Asks the child to stop gracefully (`__shutdown`), waits up to the
    /// configured shutdown timeout for it to exit on its own, then kills it.
    pub async fn kill(&self) -> Result<(), NodeError> {
        let _ = self.call("__shutdown", Value::Null).await;
        let mut child = self.child.lock().await;
        let waited = tokio::time::timeout(self.shutdown_timeout, child.wait()).await;
        if waited.is_err() {
            let _ = child.start_kill();
            let _ = child.wait().await;
        }
        self.reader_handle.abort();
        Ok(())
    }
}

impl NodeControl for NodeManagerProxy {
    fn start(&self) -> ControlFuture<'_, ()> {
        Box::pin(async move {
            self.call("start", Value::Null).await?;
            Ok(())
        })
    }

    fn stop(&self) -> ControlFuture<'_, ()> {
        Box::pin(async move {
            self.call("stop", Value::Null).await?;
            Ok(())
        })
    }

    fn is_running(&self) -> ControlFuture<'_, bool> {
        Box::pin(async move { Self::typed(self.call("is_running", Value::Null).await?) })
    }

    fn set_parameters(&self, params: ParameterMap) -> ControlFuture<'_, ()> {
        Box::pin(async move {
            self.call("set_parameters", serde_json::json!(params)).await?;
            Ok(())
        })
    }

    fn get_parameters(&self) -> ControlFuture<'_, ParameterMap> {
        Box::pin(async move { Self::typed(self.call("get_parameters", Value::Null).await?) })
    }

    fn get_statistics(&self) -> ControlFuture<'_, StatisticsSnapshot> {
        Box::pin(async move { Self::typed(self.call("get_statistics", Value::Null).await?) })
    }

    fn get_statistics_raw(&self) -> ControlFuture<'_, Vec<StatisticsSample>> {
        Box::pin(async move { Self::typed(self.call("get_statistics_raw", Value::Null).await?) })
    }

    fn describe(&self) -> ControlFuture<'_, String> {
        Box::pin(async move { Self::typed(self.call("describe", Value::Null).await?) })
    }

    fn reset(&self) -> ControlFuture<'_, ParameterMap> {
        Box::pin(async move { Self::typed(self.call("reset", Value::Null).await?) })
    }
}
