use std::fmt;

/// Unified error taxonomy for the node runtime.
///
/// Worker errors are never raised across task boundaries; they are recorded by
/// clearing the worker's live-flag and surfaced here only when something calls
/// back into the manager or the HTTP layer afterwards.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeError {
    /// A parameter was not `(name, value)` shaped, or a reserved name carried
    /// the wrong value type.
    InvalidParameter { name: String, reason: String },
    /// `start()` was called while the node was already running.
    AlreadyRunning,
    /// An operation required a running node but none was running.
    NotRunning,
    /// One or more workers did not signal liveness within the startup timeout.
    StartupFailed { detail: String },
    /// `processor.start`/`process`/`stop` raised.
    ProcessorError { detail: String },
    /// The receiver's transport raised.
    TransportError { detail: String },
    /// An unknown htype or structurally invalid frame was dropped. Never fatal.
    DecodeWarning { detail: String },
    /// Out-of-process proxy call did not get a response within the IPC timeout.
    IpcTimeout { method: String },
    /// HTTP or transport I/O failure.
    IoError { detail: String },
    /// No instance is registered under the requested name.
    UnknownInstance { name: String },
}

impl fmt::Display for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeError::InvalidParameter { name, reason } => {
                write!(f, "invalid parameter '{name}': {reason}")
            }
            NodeError::AlreadyRunning => write!(f, "node is already running"),
            NodeError::NotRunning => write!(f, "node is not running"),
            NodeError::StartupFailed { detail } => write!(f, "startup failed: {detail}"),
            NodeError::ProcessorError { detail } => write!(f, "processor error: {detail}"),
            NodeError::TransportError { detail } => write!(f, "transport error: {detail}"),
            NodeError::DecodeWarning { detail } => write!(f, "decode warning: {detail}"),
            NodeError::IpcTimeout { method } => {
                write!(f, "ipc call to '{method}' timed out")
            }
            NodeError::IoError { detail } => write!(f, "io error: {detail}"),
            NodeError::UnknownInstance { name } => write!(f, "unknown instance '{name}'"),
        }
    }
}

impl std::error::Error for NodeError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context() {
        let err = NodeError::InvalidParameter {
            name: "n_messages".into(),
            reason: "expected an integer".into(),
        };
        assert!(err.to_string().contains("n_messages"));
        assert!(err.to_string().contains("expected an integer"));
    }

    #[test]
    fn already_running_and_not_running_are_distinct() {
        assert_ne!(NodeError::AlreadyRunning, NodeError::NotRunning);
    }
}
