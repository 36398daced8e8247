use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};

use crate::backend::{TransportError, WireFrame};

/// Default bounded channel capacity for an in-memory transport pair.
pub const CHANNEL_CAPACITY: usize = 64;

struct Inner {
    tx: mpsc::Sender<WireFrame>,
    rx: Mutex<mpsc::Receiver<WireFrame>>,
    closed: AtomicBool,
}

/// In-process transport backed by a bounded `tokio::mpsc` channel. Used for
/// tests, demos, and intra-process pipelines (e.g. wiring a Forwarder
/// straight into a downstream node's Receiver without going over the
/// network, as in the proxy-filtering end-to-end scenario).
#[derive(Clone)]
pub struct MemTransport {
    inner: Arc<Inner>,
}

impl MemTransport {
    /// Builds a connected pair: frames sent on one end are received on the
    /// other.
    pub fn pair() -> (MemTransport, MemTransport) {
        let (tx_a, rx_b) = mpsc::channel(CHANNEL_CAPACITY);
        let (tx_b, rx_a) = mpsc::channel(CHANNEL_CAPACITY);
        let a = MemTransport {
            inner: Arc::new(Inner {
                tx: tx_a,
                rx: Mutex::new(rx_a),
                closed: AtomicBool::new(false),
            }),
        };
        let b = MemTransport {
            inner: Arc::new(Inner {
                tx: tx_b,
                rx: Mutex::new(rx_b),
                closed: AtomicBool::new(false),
            }),
        };
        (a, b)
    }

    pub async fn recv_frame(&self, timeout: Duration) -> Result<Option<WireFrame>, TransportError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(TransportError("transport is closed".into()));
        }
        let mut rx = self.inner.rx.lock().await;
        match tokio::time::timeout(timeout, rx.recv()).await {
            Ok(Some(frame)) => Ok(Some(frame)),
            Ok(None) => Err(TransportError("peer closed the channel".into())),
            Err(_) => Ok(None),
        }
    }

    pub async fn send_frame(&self, frame: WireFrame) -> Result<(), TransportError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(TransportError("transport is closed".into()));
        }
        self.inner
            .tx
            .send(frame)
            .await
            .map_err(|_| TransportError("peer closed the channel".into()))
    }

    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[tokio::test]
    async fn sends_and_receives_a_frame() {
        let (a, b) = MemTransport::pair();
        a.send_frame(vec![Bytes::from_static(b"hello")])
            .await
            .unwrap();
        let frame = b.recv_frame(Duration::from_secs(1)).await.unwrap();
        assert_eq!(frame, Some(vec![Bytes::from_static(b"hello")]));
    }

    #[tokio::test]
    async fn recv_times_out_without_error() {
        let (_a, b) = MemTransport::pair();
        let frame = b.recv_frame(Duration::from_millis(20)).await.unwrap();
        assert_eq!(frame, None);
    }

    #[tokio::test]
    async fn closed_transport_errors_on_send_and_recv() {
        let (a, _b) = MemTransport::pair();
        a.close();
        assert!(a.is_closed());
        assert!(a.send_frame(vec![]).await.is_err());
        assert!(a.recv_frame(Duration::from_millis(10)).await.is_err());
    }
}
