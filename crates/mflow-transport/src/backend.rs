use std::fmt;
use std::time::Duration;

use bytes::Bytes;

use crate::mem::MemTransport;
use crate::tcp::{TcpPullTransport, TcpPushTransport};

/// Raised by a transport backend. Same policy as `ProcessorError`: caught by
/// the owning worker, logged, and surfaced by clearing that worker's
/// live-flag rather than propagating across tasks.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportError(pub String);

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transport error: {}", self.0)
    }
}

impl std::error::Error for TransportError {}

/// One multi-part wire frame: an ordered sequence of byte segments, segment
/// 0 conventionally the JSON header per `mflow_core::RawFrame`.
pub type WireFrame = Vec<Bytes>;

/// A concrete transport implementation. Each backend owns its own
/// connect/bind lifecycle; `Transport` below dispatches to whichever one is
/// configured without requiring callers to match on the backend type.
pub trait TransportBackend: Send + Sync {
    /// Receive one frame, waiting up to `timeout`. `Ok(None)` is a normal
    /// empty poll (timeout elapsed with no frame), not an error.
    fn recv_frame(
        &self,
        timeout: Duration,
    ) -> impl std::future::Future<Output = Result<Option<WireFrame>, TransportError>> + Send;

    /// Send one frame, blocking (backpressure) if the underlying channel
    /// applies flow control.
    fn send_frame(
        &self,
        frame: WireFrame,
    ) -> impl std::future::Future<Output = Result<(), TransportError>> + Send;

    fn close(&self);

    fn is_closed(&self) -> bool;
}

impl TransportBackend for MemTransport {
    async fn recv_frame(&self, timeout: Duration) -> Result<Option<WireFrame>, TransportError> {
        MemTransport::recv_frame(self, timeout).await
    }

    async fn send_frame(&self, frame: WireFrame) -> Result<(), TransportError> {
        MemTransport::send_frame(self, frame).await
    }

    fn close(&self) {
        MemTransport::close(self)
    }

    fn is_closed(&self) -> bool {
        MemTransport::is_closed(self)
    }
}

impl TransportBackend for TcpPullTransport {
    async fn recv_frame(&self, timeout: Duration) -> Result<Option<WireFrame>, TransportError> {
        TcpPullTransport::recv_frame(self, timeout).await
    }

    async fn send_frame(&self, frame: WireFrame) -> Result<(), TransportError> {
        TcpPullTransport::send_frame(self, frame).await
    }

    fn close(&self) {
        TcpPullTransport::close(self)
    }

    fn is_closed(&self) -> bool {
        TcpPullTransport::is_closed(self)
    }
}

impl TransportBackend for TcpPushTransport {
    async fn recv_frame(&self, timeout: Duration) -> Result<Option<WireFrame>, TransportError> {
        TcpPushTransport::recv_frame(self, timeout).await
    }

    async fn send_frame(&self, frame: WireFrame) -> Result<(), TransportError> {
        TcpPushTransport::send_frame(self, frame).await
    }

    fn close(&self) {
        TcpPushTransport::close(self)
    }

    fn is_closed(&self) -> bool {
        TcpPushTransport::is_closed(self)
    }
}

/// Dispatches to one of the backends this runtime ships. New backends are
/// added as enum variants rather than trait objects, mirroring the
/// transport abstraction this codebase's RPC core uses for its own
/// mem/stream/shm/websocket backends.
#[derive(Clone)]
pub enum Transport {
    Mem(MemTransport),
    TcpPull(TcpPullTransport),
    TcpPush(TcpPushTransport),
}

impl Transport {
    pub async fn recv_frame(&self, timeout: Duration) -> Result<Option<WireFrame>, TransportError> {
        match self {
            Transport::Mem(t) => t.recv_frame(timeout).await,
            Transport::TcpPull(t) => t.recv_frame(timeout).await,
            Transport::TcpPush(t) => t.recv_frame(timeout).await,
        }
    }

    pub async fn send_frame(&self, frame: WireFrame) -> Result<(), TransportError> {
        match self {
            Transport::Mem(t) => t.send_frame(frame).await,
            Transport::TcpPull(t) => t.send_frame(frame).await,
            Transport::TcpPush(t) => t.send_frame(frame).await,
        }
    }

    pub fn close(&self) {
        match self {
            Transport::Mem(t) => t.close(),
            Transport::TcpPull(t) => t.close(),
            Transport::TcpPush(t) => t.close(),
        }
    }

    pub fn is_closed(&self) -> bool {
        match self {
            Transport::Mem(t) => t.is_closed(),
            Transport::TcpPull(t) => t.is_closed(),
            Transport::TcpPush(t) => t.is_closed(),
        }
    }
}
