use bytes::Bytes;
use mflow_transport::{Transport, TransportError, WireFrame};
use serde_json::Value;

/// Thin outbound counterpart to the Receiver, reused by forwarding/proxy
/// processors to re-emit (possibly transformed) frames downstream.
///
/// Raw passthrough reuses the inbound frame's bytes unmodified via
/// [`Forwarder::send_raw`]; a transformed outbound frame is re-serialized
/// as UTF-8 JSON header followed by payload segments via
/// [`Forwarder::send`].
#[derive(Clone)]
pub struct Forwarder {
    transport: Transport,
}

impl Forwarder {
    pub fn new(transport: Transport) -> Self {
        Forwarder { transport }
    }

    pub async fn send(&self, header: Value, payload: Vec<Bytes>) -> Result<(), TransportError> {
        let mut frame: WireFrame = Vec::with_capacity(payload.len() + 1);
        frame.push(Bytes::from(header.to_string()));
        frame.extend(payload);
        self.transport.send_frame(frame).await
    }

    /// Re-emits an inbound frame byte-for-byte, unmodified.
    pub async fn send_raw(&self, original: WireFrame) -> Result<(), TransportError> {
        self.transport.send_frame(original).await
    }

    pub fn close(&self) {
        self.transport.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mflow_transport::MemTransport;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn send_serializes_header_as_first_part() {
        let (a, b) = MemTransport::pair();
        let forwarder = Forwarder::new(Transport::Mem(a));
        forwarder
            .send(json!({"htype": "array-1.0", "frame": 2}), vec![Bytes::from_static(b"xy")])
            .await
            .unwrap();

        let frame = b.recv_frame(Duration::from_secs(1)).await.unwrap().unwrap();
        assert_eq!(frame.len(), 2);
        let header: Value = serde_json::from_slice(&frame[0]).unwrap();
        assert_eq!(header["frame"], 2);
        assert_eq!(&frame[1][..], b"xy");
    }

    #[tokio::test]
    async fn send_raw_preserves_bytes_exactly() {
        let (a, b) = MemTransport::pair();
        let forwarder = Forwarder::new(Transport::Mem(a));
        let original: WireFrame = vec![Bytes::from_static(b"{}"), Bytes::from_static(b"raw-bytes")];
        forwarder.send_raw(original.clone()).await.unwrap();
        let frame = b.recv_frame(Duration::from_secs(1)).await.unwrap().unwrap();
        assert_eq!(frame, original);
    }
}
