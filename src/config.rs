//! Ambient configuration: compile-time-ish bounded constants (specification
//! §6) loaded from an optional TOML file and overridable by CLI flags, the
//! way the teacher's manifest already pulls in `serde` + `toml` for.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

/// Bounded constants and tunables shared by the name server and storage
/// servers. Defaults match the specification's intent (generous but finite
/// capacities, a heartbeat cadence fast enough to detect failure within a
/// couple of seconds).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub max_files: usize,
    pub max_folders: usize,
    pub max_clients: usize,
    pub max_storage_servers: usize,
    pub lock_registry_size: usize,
    pub lru_cache_size: u64,
    pub heartbeat_check_interval_ms: u64,
    pub heartbeat_timeout_ms: u64,
    /// Gate for the EXEC operation (specification §9, Open Question b).
    /// Disabled by default; when enabled, only commands named in
    /// `exec_allow_list` may run.
    pub allow_exec: bool,
    pub exec_allow_list: Vec<String>,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_files: 65_536,
            max_folders: 16_384,
            max_clients: 4_096,
            max_storage_servers: 256,
            lock_registry_size: 8_192,
            lru_cache_size: 4_096,
            heartbeat_check_interval_ms: 1_000,
            heartbeat_timeout_ms: 5_000,
            allow_exec: false,
            exec_allow_list: Vec::new(),
        }
    }
}

impl Limits {
    pub fn heartbeat_check_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_check_interval_ms)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    /// Loads limits from a TOML file, falling back to defaults for any
    /// field it doesn't set and falling back entirely if the file is
    /// missing (a config file is an optional tuning knob, not a
    /// requirement to start the process).
    pub fn load(path: impl AsRef<Path>) -> Self {
        match std::fs::read_to_string(path.as_ref()) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|err| {
                tracing::warn!(error = %err, "failed to parse config file, using defaults");
                Limits::default()
            }),
            Err(_) => Limits::default(),
        }
    }
}
