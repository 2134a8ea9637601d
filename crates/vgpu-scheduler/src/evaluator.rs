//! Device evaluation contract shared by share and exclusive mode

use vgpu_core::DeviceInfo;

/// A container's GPU request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuRequest {
    /// Virtual cores (100 = one whole device)
    pub cores: u64,
    /// Virtual memory
    pub memory: u64,
    /// Estimated execution time
    pub estimated_time: u64,
}

impl GpuRequest {
    pub fn new(cores: u64, memory: u64, estimated_time: u64) -> Self {
        Self {
            cores,
            memory,
            estimated_time,
        }
    }
}

/// Strategy for picking the devices a container is bound to
pub trait Evaluator: Send + Sync {
    /// Pick devices for the request. An empty result means nothing fits.
    fn evaluate<'a>(&self, devices: &'a [DeviceInfo], request: &GpuRequest)
        -> Vec<&'a DeviceInfo>;

    /// Name used in logs
    fn name(&self) -> &'static str;
}
