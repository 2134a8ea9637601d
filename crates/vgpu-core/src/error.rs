//! Error types for vgpu admission

use thiserror::Error;

/// Main error type for vgpu admission
#[derive(Error, Debug)]
pub enum VgpuError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A request attribute (estimated time, resource quantity) could not be read
    #[error("Lookup error: {0}")]
    Lookup(String),

    /// No evaluator produced a device for the container
    #[error("failed to allocate for container {container}")]
    NoFeasibleDevice { container: String },

    /// Booking referenced a device the node does not have
    #[error("failed to find device {device} on node {node}")]
    DeviceNotFound { node: String, device: u32 },

    /// Release referenced a booking the device does not hold
    #[error("no matching booking on device {device} of node {node}")]
    BookingNotFound { node: String, device: u32 },

    /// Node not registered
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for vgpu operations
pub type VgpuResult<T> = Result<T, VgpuError>;

impl From<serde_json::Error> for VgpuError {
    fn from(err: serde_json::Error) -> Self {
        VgpuError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for VgpuError {
    fn from(err: toml::de::Error) -> Self {
        VgpuError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = VgpuError::Config("invalid config".to_string());
        assert_eq!(err.to_string(), "Configuration error: invalid config");

        let err = VgpuError::NoFeasibleDevice {
            container: "trainer".to_string(),
        };
        assert_eq!(err.to_string(), "failed to allocate for container trainer");

        let err = VgpuError::DeviceNotFound {
            node: "gpu-node-1".to_string(),
            device: 3,
        };
        assert_eq!(err.to_string(), "failed to find device 3 on node gpu-node-1");

        let err = VgpuError::BookingNotFound {
            node: "gpu-node-1".to_string(),
            device: 0,
        };
        assert_eq!(err.to_string(), "no matching booking on device 0 of node gpu-node-1");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: VgpuError = io_err.into();
        assert!(matches!(err, VgpuError::Io(_)));
    }

    #[test]
    fn test_error_from_json() {
        let json_err = serde_json::from_str::<u32>("not a number").unwrap_err();
        let err: VgpuError = json_err.into();
        assert!(matches!(err, VgpuError::Serialization(_)));
    }
}
