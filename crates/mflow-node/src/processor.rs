use std::fmt;

use mflow_core::{Message, ParameterMap, ParameterValue};

/// Raised by `processor.start`/`process`/`stop`. Caught inside the
/// Processor Worker; logged; clears that worker's live-flag.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessorError(pub String);

impl fmt::Display for ProcessorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "processor error: {}", self.0)
    }
}

impl std::error::Error for ProcessorError {}

/// User-supplied stream-processing logic. A collaborator, not part of the
/// core: concrete processors (HDF5 writers, compressors, recorders) live
/// outside this crate and are plugged in here.
///
/// Deliberately synchronous: the original contract is a plain, blocking
/// object (no reflection-based dynamic attributes, per the explicit
/// parameter contract below), matching the source's own `BaseProcessor`.
pub trait Processor: Send + Sync {
    fn start(&self) -> Result<(), ProcessorError> {
        Ok(())
    }

    fn stop(&self) -> Result<(), ProcessorError> {
        Ok(())
    }

    fn process(&self, message: &Message) -> Result<(), ProcessorError>;

    /// Store `value` under `name`, visible to subsequent operations.
    /// Processors may override to validate and reject bad values.
    fn set_parameter(&self, name: &str, value: ParameterValue) -> Result<(), ProcessorError>;

    fn describe(&self) -> String {
        "no description provided".to_string()
    }

    fn current_parameters(&self) -> ParameterMap {
        ParameterMap::new()
    }

    /// Processor-defined; the manager returns `current_parameters()` to the
    /// caller afterwards regardless of what this does.
    fn reset(&self) -> Result<(), ProcessorError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Recorder {
        seen: Mutex<Vec<i64>>,
    }

    impl Processor for Recorder {
        fn process(&self, message: &Message) -> Result<(), ProcessorError> {
            self.seen.lock().push(message.frame_index());
            Ok(())
        }

        fn set_parameter(&self, _name: &str, _value: ParameterValue) -> Result<(), ProcessorError> {
            Ok(())
        }
    }

    #[test]
    fn default_lifecycle_methods_are_no_ops() {
        let p = Recorder {
            seen: Mutex::new(Vec::new()),
        };
        assert!(p.start().is_ok());
        assert!(p.stop().is_ok());
        assert_eq!(p.describe(), "no description provided");
        assert!(p.current_parameters().is_empty());
    }
}
