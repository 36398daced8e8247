use std::collections::BTreeMap;

use mflow_core::NodeError;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::reload;

/// Read/write access to the process's active `EnvFilter` directive, exposed
/// to the HTTP `logging` endpoints as a small named-logger-to-level map
/// rather than one global level. Built in the owning binary's `main()` at
/// the same time the `tracing_subscriber` layer stack is assembled.
#[derive(Clone)]
pub struct LoggingRegistry {
    handle: reload::Handle<EnvFilter, tracing_subscriber::Registry>,
}

impl LoggingRegistry {
    pub fn new(handle: reload::Handle<EnvFilter, tracing_subscriber::Registry>) -> Self {
        LoggingRegistry { handle }
    }

    fn current_directive(&self) -> Result<String, NodeError> {
        self.handle
            .with_current(|filter| filter.to_string())
            .map_err(|e| NodeError::IoError { detail: format!("reading log filter: {e}") })
    }

    fn apply_directive(&self, directive: &str) -> Result<(), NodeError> {
        let filter = EnvFilter::try_new(directive).map_err(|e| NodeError::InvalidParameter {
            name: "logging".to_string(),
            reason: e.to_string(),
        })?;
        self.handle
            .reload(filter)
            .map_err(|e| NodeError::IoError { detail: format!("reloading log filter: {e}") })
    }

    /// Splits the active directive (`target=level,target=level,...`) into a
    /// map for the `logging` GET endpoint. A bare level with no target is
    /// reported under the key `"*"`.
    pub fn as_map(&self) -> Result<BTreeMap<String, String>, NodeError> {
        let directive = self.current_directive()?;
        let mut levels = BTreeMap::new();
        for part in directive.split(',') {
            if part.is_empty() {
                continue;
            }
            match part.split_once('=') {
                Some((target, level)) => {
                    levels.insert(target.to_string(), level.to_string());
                }
                None => {
                    levels.insert("*".to_string(), part.to_string());
                }
            }
        }
        Ok(levels)
    }

    /// Rebuilds the directive string from `levels` and reloads the filter.
    pub fn set_map(&self, levels: BTreeMap<String, String>) -> Result<(), NodeError> {
        let directive = levels
            .into_iter()
            .map(|(target, level)| {
                if target == "*" {
                    level
                } else {
                    format!("{target}={level}")
                }
            })
            .collect::<Vec<_>>()
            .join(",");
        self.apply_directive(&directive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::layer::SubscriberExt;

    fn test_registry() -> LoggingRegistry {
        let filter = EnvFilter::new("info");
        let (filter, handle) = reload::Layer::new(filter);
        let subscriber = tracing_subscriber::registry().with(filter);
        let _guard = tracing::subscriber::set_default(subscriber);
        LoggingRegistry::new(handle)
    }

    #[test]
    fn round_trips_target_level_pairs() {
        let registry = test_registry();
        let mut levels = BTreeMap::new();
        levels.insert("mflow_node::manager".to_string(), "debug".to_string());
        registry.set_map(levels.clone()).unwrap();
        assert_eq!(registry.as_map().unwrap(), levels);
    }

    #[test]
    fn bare_level_round_trips_under_star() {
        let registry = test_registry();
        let mut levels = BTreeMap::new();
        levels.insert("*".to_string(), "warn".to_string());
        registry.set_map(levels.clone()).unwrap();
        assert_eq!(registry.as_map().unwrap(), levels);
    }

    #[test]
    fn invalid_directive_is_rejected() {
        let registry = test_registry();
        let mut levels = BTreeMap::new();
        levels.insert("*".to_string(), "not-a-level".to_string());
        assert!(registry.set_map(levels).is_err());
    }
}
