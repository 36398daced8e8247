use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

use crate::backend::{TransportError, WireFrame};
use crate::framing::{read_frame, write_frame};

/// Strips an optional `tcp://` scheme so `connect_address`/`binding_address`
/// values copied verbatim from the original ZeroMQ-flavored configuration
/// keep working.
fn strip_scheme(addr: &str) -> &str {
    addr.strip_prefix("tcp://").unwrap_or(addr)
}

/// Client-mode (pull) transport: connects once to `connect_address` and
/// reads frames. This is what a Receiver Worker opens.
#[derive(Clone)]
pub struct TcpPullTransport {
    read_half: Arc<Mutex<OwnedReadHalf>>,
    closed: Arc<AtomicBool>,
}

impl TcpPullTransport {
    pub async fn connect(address: &str) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(strip_scheme(address))
            .await
            .map_err(|e| TransportError(format!("connecting to {address}: {e}")))?;
        let (read_half, _write_half) = stream.into_split();
        Ok(TcpPullTransport {
            read_half: Arc::new(Mutex::new(read_half)),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    pub async fn recv_frame(&self, timeout: Duration) -> Result<Option<WireFrame>, TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError("transport is closed".into()));
        }
        let mut guard = self.read_half.lock().await;
        match tokio::time::timeout(timeout, read_frame(&mut *guard)).await {
            Ok(Ok(frame)) => Ok(Some(frame)),
            Ok(Err(e)) => Err(TransportError(format!("recv failed: {e}"))),
            Err(_) => Ok(None),
        }
    }

    pub async fn send_frame(&self, _frame: WireFrame) -> Result<(), TransportError> {
        Err(TransportError(
            "pull (receive-only) transport does not support send_frame".into(),
        ))
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Server-mode (push) transport: binds `binding_address` and broadcasts
/// sent frames to every currently connected downstream consumer. This is
/// what a Forwarder opens.
#[derive(Clone)]
pub struct TcpPushTransport {
    peers: Arc<Mutex<Vec<OwnedWriteHalf>>>,
    closed: Arc<AtomicBool>,
    local_addr: std::net::SocketAddr,
}

impl TcpPushTransport {
    pub async fn bind(address: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(strip_scheme(address))
            .await
            .map_err(|e| TransportError(format!("binding {address}: {e}")))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| TransportError(format!("reading bound address: {e}")))?;
        let peers = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));

        let accept_peers = peers.clone();
        let accept_closed = closed.clone();
        tokio::spawn(async move {
            loop {
                if accept_closed.load(Ordering::Acquire) {
                    break;
                }
                match listener.accept().await {
                    Ok((stream, _addr)) => {
                        let (_read_half, write_half) = stream.into_split();
                        accept_peers.lock().await.push(write_half);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "forwarder accept() failed");
                        break;
                    }
                }
            }
        });

        Ok(TcpPushTransport {
            peers,
            closed,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.local_addr
    }

    pub async fn recv_frame(&self, _timeout: Duration) -> Result<Option<WireFrame>, TransportError> {
        Err(TransportError(
            "push (send-only) transport does not support recv_frame".into(),
        ))
    }

    pub async fn send_frame(&self, frame: WireFrame) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError("transport is closed".into()));
        }
        let mut peers = self.peers.lock().await;
        let mut still_connected = Vec::with_capacity(peers.len());
        for mut peer in peers.drain(..) {
            if write_frame(&mut peer, &frame).await.is_ok() {
                still_connected.push(peer);
            }
        }
        *peers = still_connected;
        Ok(())
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
