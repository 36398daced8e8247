//! Node manager, worker supervision, and the in-process/out-of-process
//! control plane for mflow stream-processing nodes.

mod control;
mod forwarder;
mod live_flag;
mod manager;
mod processor;
mod processor_worker;
mod proxy;
mod receiver_worker;
mod reserved;
mod state;

pub use control::{ControlFuture, NodeControl};
pub use forwarder::Forwarder;
pub use live_flag::LiveFlag;
pub use manager::{NodeManager, TransportSource};
pub use processor::{Processor, ProcessorError};
pub use proxy::NodeManagerProxy;
pub use reserved::{N_MESSAGES, PROCESS_GID, PROCESS_UID};
pub use state::NodeState;

/// The receiver and processor worker loops, exposed for custom manager
/// implementations and for the CLI's out-of-process child entry point.
pub mod workers {
    pub use crate::processor_worker::run as run_processor_worker;
    pub use crate::receiver_worker::run as run_receiver_worker;
}
