use std::fmt;

use bytes::Bytes;
use serde_json::Value;

/// A raw, pre-codec transport frame: a non-empty ordered list of byte
/// segments where segment 0 is required to be a UTF-8 JSON object carrying
/// at least `htype`.
#[derive(Debug, Clone)]
pub struct RawFrame {
    header: Value,
    payload: Vec<Bytes>,
}

/// Segment 0 was missing, empty, not valid UTF-8 JSON, or not a JSON object.
#[derive(Debug, Clone, PartialEq)]
pub struct MalformedFrame(pub String);

impl fmt::Display for MalformedFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed frame: {}", self.0)
    }
}

impl std::error::Error for MalformedFrame {}

impl RawFrame {
    /// Splits `parts` into a parsed JSON header and the remaining payload
    /// segments. Never panics; structurally invalid input is reported as
    /// `MalformedFrame`, matching the "never fails with an exception on
    /// input shape" contract of the codec.
    pub fn from_parts(mut parts: Vec<Bytes>) -> Result<Self, MalformedFrame> {
        if parts.is_empty() {
            return Err(MalformedFrame("frame has no parts".into()));
        }
        let header_bytes = parts.remove(0);
        let header: Value = serde_json::from_slice(&header_bytes)
            .map_err(|e| MalformedFrame(format!("header part is not valid JSON: {e}")))?;
        if !header.is_object() {
            return Err(MalformedFrame("header part is not a JSON object".into()));
        }
        Ok(RawFrame {
            header,
            payload: parts,
        })
    }

    pub fn header(&self) -> &Value {
        &self.header
    }

    pub fn payload(&self) -> &[Bytes] {
        &self.payload
    }

    pub fn htype(&self) -> Option<&str> {
        self.header.get("htype").and_then(Value::as_str)
    }
}

/// The htype-specific payload shape: most handlers produce byte segments,
/// `dheader-1.0` produces a merged JSON mapping, `dseries_end-1.0` produces
/// nothing.
#[derive(Debug, Clone)]
pub enum MessageData {
    Bytes(Vec<Bytes>),
    Json(Value),
    None,
}

impl MessageData {
    pub fn byte_len(&self) -> usize {
        match self {
            MessageData::Bytes(segments) => segments.iter().map(Bytes::len).sum(),
            MessageData::Json(_) | MessageData::None => 0,
        }
    }
}

/// Raised when `shape()`/`dtype()` is queried on a control-type message
/// (`dheader-1.0`, `dseries_end-1.0`) for which shape/dtype are not defined.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeDtypeUnavailable {
    pub htype: String,
}

impl fmt::Display for ShapeDtypeUnavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "htype '{}' does not carry shape/dtype information",
            self.htype
        )
    }
}

impl std::error::Error for ShapeDtypeUnavailable {}

/// A typed, immutable view over one transport frame, produced by the codec.
///
/// Owned by one receiver until handed off on the data queue, then owned by
/// the processor worker until `process` returns. Never mutated.
#[derive(Debug, Clone)]
pub struct Message {
    htype: String,
    header: Value,
    frame_index: i64,
    shape: Option<Vec<u64>>,
    dtype: Option<String>,
    data: MessageData,
}

impl Message {
    pub fn new(
        htype: impl Into<String>,
        header: Value,
        frame_index: i64,
        shape: Option<Vec<u64>>,
        dtype: Option<String>,
        data: MessageData,
    ) -> Self {
        Message {
            htype: htype.into(),
            header,
            frame_index,
            shape,
            dtype,
            data,
        }
    }

    pub fn htype(&self) -> &str {
        &self.htype
    }

    pub fn header(&self) -> &Value {
        &self.header
    }

    pub fn frame_index(&self) -> i64 {
        self.frame_index
    }

    pub fn data(&self) -> &MessageData {
        &self.data
    }

    pub fn data_length(&self) -> usize {
        self.data.byte_len()
    }

    /// `Ok(None)` when the htype carries no shape (e.g. `dseries_end-1.0`
    /// reaching this point would already be control); `Err` for htypes that
    /// don't define shape/dtype at all (`dheader-1.0`, `dseries_end-1.0`).
    pub fn shape(&self) -> Result<Option<&[u64]>, ShapeDtypeUnavailable> {
        if self.is_control() {
            return Err(ShapeDtypeUnavailable {
                htype: self.htype.clone(),
            });
        }
        Ok(self.shape.as_deref())
    }

    pub fn dtype(&self) -> Result<Option<&str>, ShapeDtypeUnavailable> {
        if self.is_control() {
            return Err(ShapeDtypeUnavailable {
                htype: self.htype.clone(),
            });
        }
        Ok(self.dtype.as_deref())
    }

    fn is_control(&self) -> bool {
        self.htype == "dheader-1.0" || self.htype == "dseries_end-1.0"
    }
}

/// A `(name, value)` pair. A processor's current configuration is the
/// insertion-ordered map of the most recent value for each name.
pub type ParameterValue = Value;

/// An insertion-ordered `name -> value` map: a processor's current
/// configuration, per the insertion-order invariant above. Iteration and
/// JSON serialization preserve the order names were first/most-recently set
/// in, unlike a `BTreeMap` which would silently re-sort them alphabetically.
pub type ParameterMap = indexmap::IndexMap<String, ParameterValue>;

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(header: &str, payload: Vec<&str>) -> RawFrame {
        let mut parts = vec![Bytes::from(header.to_string())];
        parts.extend(payload.into_iter().map(|s| Bytes::from(s.to_string())));
        RawFrame::from_parts(parts).unwrap()
    }

    #[test]
    fn rejects_empty_frame() {
        assert!(RawFrame::from_parts(vec![]).is_err());
    }

    #[test]
    fn rejects_non_json_header() {
        let parts = vec![Bytes::from_static(b"not json")];
        assert!(RawFrame::from_parts(parts).is_err());
    }

    #[test]
    fn rejects_non_object_header() {
        let parts = vec![Bytes::from_static(b"[1,2,3]")];
        assert!(RawFrame::from_parts(parts).is_err());
    }

    #[test]
    fn extracts_htype() {
        let f = frame(r#"{"htype":"array-1.0","frame":3}"#, vec!["abcd"]);
        assert_eq!(f.htype(), Some("array-1.0"));
        assert_eq!(f.payload().len(), 1);
    }

    #[test]
    fn shape_dtype_unavailable_on_control_messages() {
        let m = Message::new("dheader-1.0", serde_json::json!({}), -1, None, None, MessageData::None);
        assert!(m.shape().is_err());
        assert!(m.dtype().is_err());
    }

    #[test]
    fn shape_dtype_available_on_data_messages() {
        let m = Message::new(
            "array-1.0",
            serde_json::json!({}),
            0,
            Some(vec![2, 2]),
            Some("float32".into()),
            MessageData::Bytes(vec![Bytes::from_static(b"1234")]),
        );
        assert_eq!(m.shape().unwrap(), Some([2u64, 2].as_slice()));
        assert_eq!(m.dtype().unwrap(), Some("float32"));
        assert_eq!(m.data_length(), 4);
    }
}
