//! Engine configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::compile::CompilerConfig;
use crate::execute::DEFAULT_MAX_CONCURRENT_PROCESSES;
use crate::paths::default_temp_root;
use crate::session::DEFAULT_INPUT_TIMEOUT;

/// Configuration for [`ExecutionEngine`](crate::ExecutionEngine).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Root directory for sandboxes and publish work directories.
    pub temp_root: PathBuf,
    /// Explicit path to the `runbox-host` binary.
    pub host_path: Option<PathBuf>,
    /// Directory holding precompiled package libraries.
    ///
    /// `None` means only the standard library is available.
    pub library_dir: Option<PathBuf>,
    /// Upper bound on live execution host processes.
    pub max_concurrent_processes: usize,
    /// How long a blocked guest read waits before receiving an empty line.
    pub input_timeout: Duration,
    /// Compiler settings.
    pub compiler: CompilerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            temp_root: default_temp_root(),
            host_path: None,
            library_dir: None,
            max_concurrent_processes: DEFAULT_MAX_CONCURRENT_PROCESSES,
            input_timeout: DEFAULT_INPUT_TIMEOUT,
            compiler: CompilerConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `RUNBOX_*` environment variables.
    ///
    /// | Variable                    | Field                      |
    /// |-----------------------------|----------------------------|
    /// | `RUNBOX_TEMP_ROOT`          | `temp_root`                |
    /// | `RUNBOX_HOST_PATH`          | `host_path`                |
    /// | `RUNBOX_LIBRARY_DIR`        | `library_dir`              |
    /// | `RUNBOX_MAX_PROCESSES`      | `max_concurrent_processes` |
    /// | `RUNBOX_INPUT_TIMEOUT_SECS` | `input_timeout`            |
    ///
    /// Unparsable numbers are ignored with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(root) = non_empty("RUNBOX_TEMP_ROOT") {
            config.temp_root = PathBuf::from(root);
        }
        if let Some(host) = non_empty("RUNBOX_HOST_PATH") {
            config.host_path = Some(PathBuf::from(host));
        }
        if let Some(dir) = non_empty("RUNBOX_LIBRARY_DIR") {
            config.library_dir = Some(PathBuf::from(dir));
        }
        if let Some(max) = non_empty("RUNBOX_MAX_PROCESSES") {
            match max.trim().parse::<usize>() {
                Ok(max) if max > 0 => config.max_concurrent_processes = max,
                _ => tracing::warn!("Ignoring invalid RUNBOX_MAX_PROCESSES={}", max),
            }
        }
        if let Some(secs) = non_empty("RUNBOX_INPUT_TIMEOUT_SECS") {
            match secs.trim().parse::<u64>() {
                Ok(secs) => config.input_timeout = Duration::from_secs(secs),
                Err(_) => tracing::warn!("Ignoring invalid RUNBOX_INPUT_TIMEOUT_SECS={}", secs),
            }
        }
        config
    }
}
