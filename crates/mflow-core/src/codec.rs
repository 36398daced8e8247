//! htype-keyed message codec.
//!
//! A `Registry` is a process-wide, immutable-after-init mapping from wire
//! `htype` strings to `MessageHandler`s. `Registry::decode` never raises on
//! malformed input: unknown htypes and structurally invalid frames are
//! logged once and dropped.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::message::{MalformedFrame, Message, MessageData, RawFrame};

/// Error produced by an individual handler while decoding one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerError(pub String);

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for HandlerError {}

/// Per-htype decode behavior. One handler instance is registered per htype.
pub trait MessageHandler: Send + Sync {
    /// The wire tag this handler is registered under.
    fn htype(&self) -> &'static str;

    /// Decode a validated raw frame (header already parsed, `htype` already
    /// matched to this handler) into a typed `Message`.
    fn decode(&self, raw: &RawFrame) -> Result<Message, HandlerError>;
}

fn header_i64(raw: &RawFrame, key: &str) -> Option<i64> {
    raw.header().get(key).and_then(|v| v.as_i64())
}

fn header_shape(raw: &RawFrame) -> Option<Vec<u64>> {
    raw.header().get("shape").and_then(|v| v.as_array()).map(|arr| {
        arr.iter().filter_map(|e| e.as_u64()).collect()
    })
}

fn header_dtype(raw: &RawFrame) -> Option<String> {
    raw.header()
        .get("type")
        .or_else(|| raw.header().get("dtype"))
        .and_then(|v| v.as_str())
        .map(str::to_owned)
}

/// `array-1.0`: single payload segment; shape/dtype from the header.
pub struct ArrayHandler;

impl MessageHandler for ArrayHandler {
    fn htype(&self) -> &'static str {
        "array-1.0"
    }

    fn decode(&self, raw: &RawFrame) -> Result<Message, HandlerError> {
        let segment = raw
            .payload()
            .first()
            .ok_or_else(|| HandlerError("array-1.0 frame has no payload segment".into()))?;
        Ok(Message::new(
            self.htype(),
            raw.header().clone(),
            header_i64(raw, "frame").unwrap_or(-1),
            Some(header_shape(raw).unwrap_or_default()),
            header_dtype(raw),
            MessageData::Bytes(vec![segment.clone()]),
        ))
    }
}

/// `dimage-1.0`: multi-part; data is the second segment (index 1, raw bytes);
/// shape is read from the first part's own JSON header (`part2.shape` in the
/// wire protocol's own 1-based `part_2`/`part_3_raw` naming).
pub struct DImageHandler;

impl MessageHandler for DImageHandler {
    fn htype(&self) -> &'static str {
        "dimage-1.0"
    }

    fn decode(&self, raw: &RawFrame) -> Result<Message, HandlerError> {
        let part2 = raw
            .payload()
            .first()
            .ok_or_else(|| HandlerError("dimage-1.0 frame is missing part 2 (shape header)".into()))?;
        let part2_header: serde_json::Value = serde_json::from_slice(part2)
            .map_err(|e| HandlerError(format!("dimage-1.0 part 2 is not valid JSON: {e}")))?;
        let shape = part2_header
            .get("shape")
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|e| e.as_u64()).collect::<Vec<_>>());
        let dtype = part2_header
            .get("type")
            .and_then(|v| v.as_str())
            .map(str::to_owned);
        let data_segment = raw
            .payload()
            .get(1)
            .ok_or_else(|| HandlerError("dimage-1.0 frame is missing part 3 (raw data)".into()))?;
        Ok(Message::new(
            self.htype(),
            raw.header().clone(),
            header_i64(raw, "frame").unwrap_or(-1),
            shape,
            dtype,
            MessageData::Bytes(vec![data_segment.clone()]),
        ))
    }
}

/// `dheader-1.0`: control message, `frame_index == -1`, no shape/dtype.
/// `data` is the header mapping merged with any additional parts when
/// `header_detail == "all"`; a part named `appendix` overlays the mapping.
pub struct DHeaderHandler;

impl MessageHandler for DHeaderHandler {
    fn htype(&self) -> &'static str {
        "dheader-1.0"
    }

    fn decode(&self, raw: &RawFrame) -> Result<Message, HandlerError> {
        let mut merged = raw.header().clone();
        let detail_all = raw
            .header()
            .get("header_detail")
            .and_then(|v| v.as_str())
            .map(|s| s == "all")
            .unwrap_or(false);

        if detail_all {
            for part in raw.payload() {
                if let Ok(serde_json::Value::Object(extra)) =
                    serde_json::from_slice::<serde_json::Value>(part)
                {
                    if let serde_json::Value::Object(base) = &mut merged {
                        for (k, v) in extra {
                            base.insert(k, v);
                        }
                    }
                }
            }
        }

        // An `appendix` part, when present, overlays the base mapping last.
        if let Some(appendix_index) = raw
            .header()
            .get("appendix_part")
            .and_then(|v| v.as_u64())
            .map(|n| n as usize)
        {
            if let Some(part) = raw.payload().get(appendix_index) {
                if let Ok(serde_json::Value::Object(appendix)) =
                    serde_json::from_slice::<serde_json::Value>(part)
                {
                    if let serde_json::Value::Object(base) = &mut merged {
                        for (k, v) in appendix {
                            base.insert(k, v);
                        }
                    }
                }
            }
        }

        Ok(Message::new(
            self.htype(),
            raw.header().clone(),
            -1,
            None,
            None,
            MessageData::Json(merged),
        ))
    }
}

/// `dseries_end-1.0`: end-of-series marker, no data, `frame_index == -1`.
pub struct DSeriesEndHandler;

impl MessageHandler for DSeriesEndHandler {
    fn htype(&self) -> &'static str {
        "dseries_end-1.0"
    }

    fn decode(&self, raw: &RawFrame) -> Result<Message, HandlerError> {
        Ok(Message::new(
            self.htype(),
            raw.header().clone(),
            -1,
            None,
            None,
            MessageData::None,
        ))
    }
}

/// `raw-1.0`: passthrough; data is all segments (or the sole one).
pub struct RawHandler;

impl MessageHandler for RawHandler {
    fn htype(&self) -> &'static str {
        "raw-1.0"
    }

    fn decode(&self, raw: &RawFrame) -> Result<Message, HandlerError> {
        Ok(Message::new(
            self.htype(),
            raw.header().clone(),
            header_i64(raw, "frame").unwrap_or(-1),
            Some(header_shape(raw).unwrap_or_default()),
            header_dtype(raw),
            MessageData::Bytes(raw.payload().to_vec()),
        ))
    }
}

/// Failures building a `Registry`.
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryError {
    EmptyHtype,
    DuplicateHtype(String),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::EmptyHtype => write!(f, "handler htype must not be empty"),
            RegistryError::DuplicateHtype(h) => write!(f, "duplicate htype '{h}'"),
        }
    }
}

impl std::error::Error for RegistryError {}

/// Builds an immutable `Registry`, validating each registration.
#[derive(Default)]
pub struct RegistryBuilder {
    handlers: HashMap<&'static str, Arc<dyn MessageHandler>>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Arc<dyn MessageHandler>) -> Result<&mut Self, RegistryError> {
        let htype = handler.htype();
        if htype.is_empty() {
            return Err(RegistryError::EmptyHtype);
        }
        if self.handlers.contains_key(htype) {
            return Err(RegistryError::DuplicateHtype(htype.to_string()));
        }
        self.handlers.insert(htype, handler);
        Ok(self)
    }

    pub fn build(self) -> Registry {
        Registry {
            handlers: self.handlers,
        }
    }
}

/// Process-wide, immutable-after-init mapping from `htype` to handler.
#[derive(Clone, Default)]
pub struct Registry {
    handlers: HashMap<&'static str, Arc<dyn MessageHandler>>,
}

impl Registry {
    /// The registry pre-loaded with the five built-in htypes this runtime
    /// understands (`array-1.0`, `dimage-1.0`, `dheader-1.0`,
    /// `dseries_end-1.0`, `raw-1.0`).
    pub fn standard() -> Self {
        let mut builder = RegistryBuilder::new();
        builder.register(Arc::new(ArrayHandler)).unwrap();
        builder.register(Arc::new(DImageHandler)).unwrap();
        builder.register(Arc::new(DHeaderHandler)).unwrap();
        builder.register(Arc::new(DSeriesEndHandler)).unwrap();
        builder.register(Arc::new(RawHandler)).unwrap();
        builder.build()
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    pub fn has_handler(&self, htype: &str) -> bool {
        self.handlers.contains_key(htype)
    }

    /// Decode a raw frame into a typed message. Returns `None` when `header`
    /// is absent, `htype` is unknown, or the handler reports a structurally
    /// invalid frame; in every such case a warning is logged and the frame
    /// is dropped, never raising to the caller.
    pub fn decode(&self, raw: &RawFrame) -> Option<Message> {
        let Some(htype) = raw.htype() else {
            tracing::warn!("dropping frame with no htype in header");
            return None;
        };
        let Some(handler) = self.handlers.get(htype) else {
            tracing::warn!(htype, "dropping frame with unknown htype");
            return None;
        };
        match handler.decode(raw) {
            Ok(message) => Some(message),
            Err(e) => {
                tracing::warn!(htype, error = %e, "dropping structurally invalid frame");
                None
            }
        }
    }

    /// Bypasses htype dispatch: wraps the frame with the passthrough
    /// handler regardless of its declared htype.
    pub fn decode_raw(&self, raw: &RawFrame) -> Message {
        Message::new(
            raw.htype().unwrap_or("raw-1.0").to_string(),
            raw.header().clone(),
            header_i64(raw, "frame").unwrap_or(-1),
            Some(header_shape(raw).unwrap_or_default()),
            header_dtype(raw),
            MessageData::Bytes(raw.payload().to_vec()),
        )
    }
}
