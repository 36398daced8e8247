use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ParameterMap;

pub const DEFAULT_CONNECT_ADDRESS: &str = "tcp://127.0.0.1:40000";
pub const DEFAULT_REST_HOST: &str = "0.0.0.0";
pub const DEFAULT_REST_PORT: u16 = 41000;
pub const DEFAULT_DATA_QUEUE_LENGTH: usize = 16;
pub const DEFAULT_N_RECEIVING_THREADS: usize = 1;
pub const DEFAULT_STARTUP_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_IPC_TIMEOUT_SECS: u64 = 2;
pub const DEFAULT_IPC_POLL_TIMEOUT_MILLIS: u64 = 500;
pub const DEFAULT_RECEIVE_TIMEOUT_MILLIS: u64 = 1000;
pub const DEFAULT_ZMQ_QUEUE_LENGTH: usize = 32;

/// Explicit, constructed-once runtime configuration, replacing the
/// original's implicit global config module (see design notes).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub instance_name: String,
    pub rest_host: String,
    pub rest_port: u16,
    pub connect_address: String,
    pub binding_address: Option<String>,
    pub data_queue_length: usize,
    pub n_receiving_threads: usize,
    pub statistics_buffer_length: usize,
    pub startup_timeout_secs: u64,
    pub shutdown_timeout_secs: u64,
    pub ipc_timeout_secs: u64,
    pub ipc_poll_timeout_millis: u64,
    pub receive_timeout_millis: u64,
    pub log_level: String,
    pub raw: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            instance_name: "mflow_node".to_string(),
            rest_host: DEFAULT_REST_HOST.to_string(),
            rest_port: DEFAULT_REST_PORT,
            connect_address: DEFAULT_CONNECT_ADDRESS.to_string(),
            binding_address: None,
            data_queue_length: DEFAULT_DATA_QUEUE_LENGTH,
            n_receiving_threads: DEFAULT_N_RECEIVING_THREADS,
            statistics_buffer_length: crate::statistics::DEFAULT_STATISTICS_BUFFER_LENGTH,
            startup_timeout_secs: DEFAULT_STARTUP_TIMEOUT_SECS,
            shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            ipc_timeout_secs: DEFAULT_IPC_TIMEOUT_SECS,
            ipc_poll_timeout_millis: DEFAULT_IPC_POLL_TIMEOUT_MILLIS,
            receive_timeout_millis: DEFAULT_RECEIVE_TIMEOUT_MILLIS,
            log_level: "info".to_string(),
            raw: false,
        }
    }
}

impl Config {
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn ipc_timeout(&self) -> Duration {
        Duration::from_secs(self.ipc_timeout_secs)
    }

    pub fn ipc_poll_timeout(&self) -> Duration {
        Duration::from_millis(self.ipc_poll_timeout_millis)
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_millis)
    }
}

/// One instance entry as persisted in an instance-definitions JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceEntry {
    pub module_to_run: String,
    pub input_args: HashMap<String, Value>,
    #[serde(default)]
    pub parameters: Option<ParameterMap>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConfigError(pub String);

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "config error: {}", self.0)
    }
}

impl std::error::Error for ConfigError {}

/// Search path for an instance-definitions file named `name`, in increasing
/// priority: `/etc/<name>.json`, `~/.<name>_rc.json`, `./<name>.json`, and
/// any explicit `--config_file` path. Only paths that exist are returned.
pub fn config_search_paths(name: &str, explicit: Option<&Path>) -> Vec<PathBuf> {
    let mut candidates = vec![
        PathBuf::from(format!("/etc/{name}.json")),
    ];
    if let Some(home) = dirs_home() {
        candidates.push(home.join(format!(".{name}_rc.json")));
    }
    candidates.push(PathBuf::from(format!("./{name}.json")));
    if let Some(explicit) = explicit {
        candidates.push(explicit.to_path_buf());
    }
    candidates.into_iter().filter(|p| p.exists()).collect()
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

/// Loads the entry for `instance_name`, layering each existing config file
/// in increasing priority (later files' fields override earlier ones at the
/// top level).
pub fn load_instance_entry(
    instance_name: &str,
    config_file_name: &str,
    explicit: Option<&Path>,
) -> Result<InstanceEntry, ConfigError> {
    let paths = config_search_paths(config_file_name, explicit);
    if paths.is_empty() {
        return Err(ConfigError(format!(
            "no config file found for '{config_file_name}' (checked /etc, ~/, ./, --config_file)"
        )));
    }

    let mut merged = serde_json::Map::new();
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
        if let Some(entry) = instances.get(instance_name) {
            if let Value::Object(entry_obj) = entry {
                for (k, v) in entry_obj {
                    merged.insert(k.clone(), v.clone());
                }
            }
        }
    }

    if merged.is_empty() {
        return Err(ConfigError(format!(
            "instance '{instance_name}' not found in any of: {}",
            paths
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        )));
    }

    serde_json::from_value(Value::Object(merged))
        .map_err(|e| ConfigError(format!("instance '{instance_name}' is malformed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_constants() {
        let c = Config::default();
        assert_eq!(c.rest_port, 41000);
        assert_eq!(c.data_queue_length, 16);
        assert_eq!(c.n_receiving_threads, 1);
        assert_eq!(c.receive_timeout().as_millis(), 1000);
    }

    #[test]
    fn loads_instance_from_explicit_config_file() {
        let dir = tempdir();
        let path = dir.join("demo.json");
        let mut f = std::fs::File::create(&path).unwrap();
        write!(
            f,
            r#"{{"recorder": {{"module_to_run": "demo::recorder", "input_args": {{"instance_name": "recorder"}}}}}}"#
        )
        .unwrap();

        let entry = load_instance_entry("recorder", "demo", Some(&path)).unwrap();
        assert_eq!(entry.module_to_run, "demo::recorder");
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn missing_instance_is_an_error() {
        let dir = tempdir();
        let path = dir.join("demo2.json");
        std::fs::write(&path, r#"{"other": {"module_to_run": "x", "input_args": {}}}"#).unwrap();
        let err = load_instance_entry("recorder", "demo2", Some(&path)).unwrap_err();
        assert!(err.0.contains("not found"));
        std::fs::remove_file(&path).ok();
    }

    fn tempdir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("mflow-core-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}
