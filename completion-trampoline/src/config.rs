//! Trampoline configuration types
//!
//! The hardened trampoline has a fixed C signature and cannot return an error, so
//! the only choice left to configure is what it does once it detects a fault.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What the hardened extern trampoline does when it detects a fault
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FaultPolicy {
    /// Log the fault at `error` level and return without invoking anything
    #[default]
    Log,
    /// Log the fault, then abort the process
    Abort,
}

impl fmt::Display for FaultPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultPolicy::Log => write!(f, "log"),
            FaultPolicy::Abort => write!(f, "abort"),
        }
    }
}

/// Configuration for the trampoline registration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrampolineConfig {
    /// Reaction to faults detected inside the extern trampoline
    #[serde(default)]
    pub fault_policy: FaultPolicy,
}

impl TrampolineConfig {
    /// Create a configuration with the default (logging) fault policy
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the fault policy
    pub fn with_fault_policy(mut self, policy: FaultPolicy) -> Self {
        self.fault_policy = policy;
        self
    }
}
