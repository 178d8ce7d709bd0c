//! Configuration loading and parsing for the simulated host

use anyhow::{bail, Context, Result};
use completion_trampoline::{FaultPolicy, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Main host configuration (loaded from a TOML file)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HostConfig {
    #[serde(default)]
    pub host: HostSettings,
    #[serde(default)]
    pub operations: Vec<OperationConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HostSettings {
    /// Number of completion worker threads
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Reaction of the checked trampoline to a bad context
    #[serde(default)]
    pub fault_policy: FaultPolicy,
    /// Shared library exporting `init_checked` (in-process trampoline if unset)
    pub library: Option<PathBuf>,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            fault_policy: FaultPolicy::default(),
            library: None,
        }
    }
}

fn default_workers() -> usize {
    4
}

/// One asynchronous operation the host will complete
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OperationConfig {
    pub name: String,
    /// Status code delivered with the completion
    #[serde(default)]
    pub code: StatusCode,
    /// Payload behind the result pointer (null result if unset)
    pub result: Option<i64>,
    /// How many times the host fires this completion
    #[serde(default = "default_repeat")]
    pub repeat: u32,
    /// Simulated latency before each delivery
    #[serde(default)]
    pub delay_ms: u64,
}

fn default_repeat() -> u32 {
    1
}

impl OperationConfig {
    pub fn new(name: &str, code: StatusCode, result: Option<i64>) -> Self {
        Self {
            name: name.to_string(),
            code,
            result,
            repeat: default_repeat(),
            delay_ms: 0,
        }
    }

    pub fn with_repeat(mut self, repeat: u32) -> Self {
        self.repeat = repeat;
        self
    }
}

impl HostConfig {
    /// Built-in operations used when no config file is given
    pub fn demo() -> Self {
        Self {
            host: HostSettings::default(),
            operations: vec![
                OperationConfig::new("query-ok", 0, Some(42)),
                OperationConfig::new("query-failed", -1, None),
                OperationConfig::new("duplicate-completion", 0, Some(7)).with_repeat(2),
            ],
        }
    }

    /// Check the configuration for values the host cannot run
    pub fn validate(&self) -> Result<()> {
        if self.host.workers == 0 {
            bail!("host.workers must be at least 1");
        }
        if self.operations.is_empty() {
            bail!("No operations configured");
        }

        let mut names = HashSet::new();
        for op in &self.operations {
            if op.name.trim().is_empty() {
                bail!("Operation name must not be empty");
            }
            if !names.insert(op.name.as_str()) {
                bail!("Duplicate operation name: {}", op.name);
            }
            if op.repeat == 0 {
                bail!("Operation '{}' has repeat = 0", op.name);
            }
            if op.repeat > 1 && self.host.fault_policy == FaultPolicy::Abort {
                bail!(
                    "Operation '{}' has repeat = {}, but fault_policy = abort would abort \
                     the host on the second delivery (use fault_policy = log)",
                    op.name,
                    op.repeat
                );
            }
        }

        Ok(())
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<HostConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: HostConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    config
        .validate()
        .with_context(|| format!("Invalid config file: {:?}", path))?;

    Ok(config)
}
