//! Configuration types for vgpu admission

use serde::{Deserialize, Serialize};

/// Top-level admission configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Scheduling policy knobs
    pub scheduler: SchedulerConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AdmissionConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> Result<Self, crate::VgpuError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::VgpuError::Config(format!("Failed to read config file: {}", e))
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, crate::VgpuError> {
        toml::from_str(content)
            .map_err(|e| crate::VgpuError::Config(format!("Failed to parse config: {}", e)))
    }
}

/// Scheduler policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Drop devices that cannot hold the request before share-mode ranking.
    ///
    /// Off by default: the ranking considers every device on the node and may
    /// pick one that is already too full for the request.
    pub capacity_filter: bool,
    /// How pod-level feasibility checks are answered
    pub feasibility: FeasibilityMode,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            capacity_filter: false,
            feasibility: FeasibilityMode::Commit,
        }
    }
}

/// Feasibility check behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FeasibilityMode {
    /// Book resources on the node while checking; repeated checks double-book
    Commit,
    /// Evaluate against a snapshot of the node, leaving it untouched
    DryRun,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Log format (json or text)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}
