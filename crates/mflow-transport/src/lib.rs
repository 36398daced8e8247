//! Transport backends for the mflow node runtime: an in-memory backend for
//! tests/demos/intra-process pipelines, and a length-prefixed multi-part
//! framing over TCP for real push/pull deployments.

mod backend;
mod framing;
mod mem;
mod tcp;

pub use backend::{Transport, TransportBackend, TransportError, WireFrame};
pub use framing::{read_frame, write_frame};
pub use mem::{MemTransport, CHANNEL_CAPACITY};
pub use tcp::{TcpPullTransport, TcpPushTransport};
