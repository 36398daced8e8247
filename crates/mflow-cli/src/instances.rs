//! Instance discovery and the `InstanceEntry` → `Config` overlay, layered on
//! top of `mflow_core::config_search_paths` the same way `load_instance_entry`
//! merges per-instance fields across files in increasing priority.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use mflow_core::{config_search_paths, Config, ConfigError, InstanceEntry};
use serde_json::Value;

pub const CONFIG_NAME: &str = "mflow";

/// Every instance entry found across the priority-ordered config files,
/// keyed by instance name. Unlike `load_instance_entry`, which resolves one
/// instance, this merges every instance present in any file so `list` can
/// enumerate them all.
pub fn discover_instances(
    explicit: Option<&Path>,
) -> Result<BTreeMap<String, InstanceEntry>, ConfigError> {
    let paths = config_search_paths(CONFIG_NAME, explicit);
    if paths.is_empty() {
        return Err(ConfigError(format!(
            "no config file found for '{CONFIG_NAME}' (checked /etc, ~/, ./, --config_file)"
        )));
    }

    let mut merged: BTreeMap<String, serde_json::Map<String, Value>> = BTreeMap::new();
    for path in &paths {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError(format!("reading {}: {e}", path.display())))?;
        let doc: Value = serde_json::from_str(&contents)
            .map_err(|e| ConfigError(format!("parsing {}: {e}", path.display())))?;
        let Value::Object(instances) = doc else {
            return Err(ConfigError(format!(
                "{} does not contain a JSON object of instances",
                path.display()
            )));
        };
        for (name, entry) in instances {
            if let Value::Object(fields) = entry {
                let slot = merged.entry(name).or_default();
                for (k, v) in fields {
                    slot.insert(k, v);
                }
            }
        }
    }

    merged
        .into_iter()
        .map(|(name, fields)| {
            let entry: InstanceEntry = serde_json::from_value(Value::Object(fields))
                .map_err(|e| ConfigError(format!("instance '{name}' is malformed: {e}")))?;
            Ok((name, entry))
        })
        .collect()
}

/// Looks up a single instance by name among every discovered instance.
pub fn find_instance(
    instance_name: &str,
    explicit: Option<&Path>,
) -> Result<InstanceEntry, ConfigError> {
    let mut instances = discover_instances(explicit)?;
    instances
        .remove(instance_name)
        .ok_or_else(|| ConfigError(format!("instance '{instance_name}' not found")))
}

fn str_field(input_args: &std::collections::HashMap<String, Value>, key: &str) -> Option<String> {
    input_args.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Overlays the recognized `input_args` keys from §6 (`instance_name`,
/// `rest_host`, `rest_port`, `connect_address`, `binding_address`,
/// `log_level`, `raw`) onto `Config::default()`. `instance_name` is
/// mandatory; the rest are optional.
pub fn config_from_entry(entry: &InstanceEntry) -> Result<Config, ConfigError> {
    let mut config = Config::default();

    config.instance_name = str_field(&entry.input_args, "instance_name")
        .ok_or_else(|| ConfigError("input_args is missing required key 'instance_name'".into()))?;

    if let Some(v) = str_field(&entry.input_args, "rest_host") {
        config.rest_host = v;
    }
    if let Some(v) = entry.input_args.get("rest_port") {
        config.rest_port = v
            .as_u64()
            .and_then(|n| u16::try_from(n).ok())
            .ok_or_else(|| ConfigError("input_args.rest_port must be a 16-bit integer".into()))?;
    }
    if let Some(v) = str_field(&entry.input_args, "connect_address") {
        config.connect_address = v;
    }
    if let Some(v) = str_field(&entry.input_args, "binding_address") {
        config.binding_address = Some(v);
    }
    if let Some(v) = str_field(&entry.input_args, "log_level") {
        config.log_level = v;
    }
    if let Some(v) = entry.input_args.get("raw") {
        config.raw = v
            .as_bool()
            .ok_or_else(|| ConfigError("input_args.raw must be a boolean".into()))?;
    }

    Ok(config)
}

/// Where pidfiles and background-process logs for `start`/`stop` live.
pub fn runtime_dir() -> std::io::Result<PathBuf> {
    let dir = std::env::var_os("XDG_RUNTIME_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join("mflow-node-runtime"));
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

pub fn pidfile_path(instance_name: &str) -> std::io::Result<PathBuf> {
    Ok(runtime_dir()?.join(format!("{instance_name}.pid")))
}

pub fn log_path(instance_name: &str) -> std::io::Result<PathBuf> {
    Ok(runtime_dir()?.join(format!("{instance_name}.log")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn tempdir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("mflow-cli-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn discovers_every_instance_across_one_file() {
        let dir = tempdir();
        let path = dir.join("instances-a.json");
        std::fs::write(
            &path,
            r#"{
                "recorder": {"module_to_run": "demo.recorder", "input_args": {"instance_name": "recorder"}},
                "proxy": {"module_to_run": "demo.proxy", "input_args": {"instance_name": "proxy"}}
            }"#,
        )
        .unwrap();

        let instances = discover_instances(Some(&path)).unwrap();
        assert_eq!(instances.len(), 2);
        assert!(instances.contains_key("recorder"));
        assert!(instances.contains_key("proxy"));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn config_from_entry_requires_instance_name() {
        let mut f = std::collections::HashMap::new();
        f.insert("rest_port".to_string(), serde_json::json!(5000));
        let entry = InstanceEntry { module_to_run: "demo.recorder".into(), input_args: f, parameters: None };
        let err = config_from_entry(&entry).unwrap_err();
        assert!(err.0.contains("instance_name"));
    }

    #[test]
    fn config_from_entry_overlays_recognized_fields() {
        let mut f = std::collections::HashMap::new();
        f.insert("instance_name".to_string(), serde_json::json!("recorder"));
        f.insert("rest_port".to_string(), serde_json::json!(5001));
        let entry = InstanceEntry { module_to_run: "demo.recorder".into(), input_args: f, parameters: None };
        let config = config_from_entry(&entry).unwrap();
        assert_eq!(config.instance_name, "recorder");
        assert_eq!(config.rest_port, 5001);

        let _ = Write::flush(&mut std::io::sink());
    }
}
