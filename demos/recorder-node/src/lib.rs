//! Two small `Processor` implementations used as runnable demos and as the
//! fixtures behind the end-to-end scenarios: a recorder that just remembers
//! what it saw, and a proxy that forwards a filtered subset downstream.

use mflow_core::{Message, MessageData, ParameterMap, ParameterValue};
use mflow_node::{Forwarder, Processor, ProcessorError};
use parking_lot::Mutex;
use serde_json::json;

/// Appends every `frame_index` it sees to an in-memory list. The `threshold`
/// parameter is accepted and stored but does not otherwise affect behavior;
/// it exists so a running instance has something to demonstrate parameter
/// updates against.
pub struct RecorderProcessor {
    seen: Mutex<Vec<i64>>,
    threshold: Mutex<ParameterValue>,
}

impl RecorderProcessor {
    pub fn new() -> Self {
        RecorderProcessor {
            seen: Mutex::new(Vec::new()),
            threshold: Mutex::new(json!(0)),
        }
    }

    /// Frame indices recorded so far, oldest first.
    pub fn recorded(&self) -> Vec<i64> {
        self.seen.lock().clone()
    }
}

impl Default for RecorderProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl Processor for RecorderProcessor {
    fn process(&self, message: &Message) -> Result<(), ProcessorError> {
        self.seen.lock().push(message.frame_index());
        Ok(())
    }

    fn set_parameter(&self, name: &str, value: ParameterValue) -> Result<(), ProcessorError> {
        if name == "threshold" {
            *self.threshold.lock() = value;
        }
        Ok(())
    }

    fn describe(&self) -> String {
        "records the frame_index of every message it processes".to_string()
    }

    fn current_parameters(&self) -> ParameterMap {
        let mut params = ParameterMap::new();
        params.insert("threshold".to_string(), self.threshold.lock().clone());
        params
    }

    fn reset(&self) -> Result<(), ProcessorError> {
        self.seen.lock().clear();
        Ok(())
    }
}

/// Forwards every control message (`dheader-1.0`, `dseries_end-1.0`)
/// unconditionally and forwards data messages whose `frame_index` is a
/// multiple of `modulo`, dropping the rest.
///
/// `modulo` is itself a live parameter: `set_parameter("modulo", n)` takes
/// effect on the next message, matching the mid-stream parameter update
/// scenario.
pub struct ProxyProcessor {
    forwarder: Forwarder,
    modulo: Mutex<i64>,
}

impl ProxyProcessor {
    pub fn new(forwarder: Forwarder, modulo: i64) -> Self {
        ProxyProcessor {
            forwarder,
            modulo: Mutex::new(modulo.max(1)),
        }
    }

    fn should_forward(&self, frame_index: i64) -> bool {
        frame_index < 0 || frame_index % *self.modulo.lock() == 0
    }
}

impl Processor for ProxyProcessor {
    fn process(&self, message: &Message) -> Result<(), ProcessorError> {
        if !self.should_forward(message.frame_index()) {
            return Ok(());
        }
        let payload = match message.data() {
            MessageData::Bytes(segments) => segments.clone(),
            MessageData::Json(_) | MessageData::None => Vec::new(),
        };
        // process() is synchronous; the owning processor worker always runs
        // under a multi-thread tokio runtime, so blocking in to drive the
        // forward is safe here.
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current()
                .block_on(self.forwarder.send(message.header().clone(), payload))
        })
        .map_err(|e| ProcessorError(e.0))
    }

    fn set_parameter(&self, name: &str, value: ParameterValue) -> Result<(), ProcessorError> {
        if name == "modulo" {
            let n = value.as_i64().ok_or_else(|| {
                ProcessorError("modulo must be a positive integer".to_string())
            })?;
            if n < 1 {
                return Err(ProcessorError("modulo must be at least 1".to_string()));
            }
            *self.modulo.lock() = n;
        }
        Ok(())
    }

    fn describe(&self) -> String {
        "forwards data frames whose frame_index is a multiple of modulo".to_string()
    }

    fn current_parameters(&self) -> ParameterMap {
        let mut params = ParameterMap::new();
        params.insert("modulo".to_string(), json!(*self.modulo.lock()));
        params
    }

    fn stop(&self) -> Result<(), ProcessorError> {
        self.forwarder.close();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mflow_transport::{MemTransport, Transport};
    use std::time::Duration;

    fn message(frame_index: i64) -> Message {
        Message::new(
            "array-1.0",
            json!({"htype": "array-1.0", "frame": frame_index}),
            frame_index,
            Some(vec![1]),
            Some("u8".to_string()),
            MessageData::Bytes(vec![bytes::Bytes::from_static(b"x")]),
        )
    }

    #[test]
    fn recorder_appends_every_frame_index() {
        let recorder = RecorderProcessor::new();
        for i in 0..16 {
            recorder.process(&message(i)).unwrap();
        }
        assert_eq!(recorder.recorded(), (0..16).collect::<Vec<_>>());
    }

    #[test]
    fn recorder_reset_clears_history() {
        let recorder = RecorderProcessor::new();
        recorder.process(&message(0)).unwrap();
        recorder.reset().unwrap();
        assert!(recorder.recorded().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn proxy_forwards_only_multiples_of_modulo() {
        let (local, remote) = MemTransport::pair();
        let proxy = ProxyProcessor::new(Forwarder::new(Transport::Mem(local)), 2);

        for i in 0..16 {
            proxy.process(&message(i)).unwrap();
        }

        let mut forwarded = Vec::new();
        while let Ok(Some(frame)) = remote.recv_frame(Duration::from_millis(50)).await {
            let header: serde_json::Value = serde_json::from_slice(&frame[0]).unwrap();
            forwarded.push(header["frame"].as_i64().unwrap());
        }
        assert_eq!(forwarded, vec![0, 2, 4, 6, 8, 10, 12, 14]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn proxy_modulo_is_adjustable_mid_stream() {
        let (local, remote) = MemTransport::pair();
        let proxy = ProxyProcessor::new(Forwarder::new(Transport::Mem(local)), 2);

        proxy.process(&message(0)).unwrap();
        proxy.set_parameter("modulo", json!(3)).unwrap();
        proxy.process(&message(1)).unwrap();
        proxy.process(&message(3)).unwrap();

        let mut forwarded = Vec::new();
        while let Ok(Some(frame)) = remote.recv_frame(Duration::from_millis(50)).await {
            let header: serde_json::Value = serde_json::from_slice(&frame[0]).unwrap();
            forwarded.push(header["frame"].as_i64().unwrap());
        }
        assert_eq!(forwarded, vec![0, 3]);
    }
}
