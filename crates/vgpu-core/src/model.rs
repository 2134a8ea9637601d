//! Workload and container descriptors, resource names and annotation keys

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::{VgpuError, VgpuResult};

/// Resource name for virtual GPU cores (100 = one whole device)
pub const VCORE_RESOURCE: &str = "vgpu.io/vcuda-core";
/// Resource name for virtual GPU memory
pub const VMEMORY_RESOURCE: &str = "vgpu.io/vcuda-memory";

/// Prefix of the per-container estimated execution time annotation
pub const ESTIMATED_TIME_PREFIX: &str = "vgpu.io/estimated-time-";
/// Prefix of the per-container assigned device list annotation
pub const PREDICATE_GPU_INDEX_PREFIX: &str = "vgpu.io/predicate-gpu-idx-";
/// Node the workload was bound to
pub const PREDICATE_NODE: &str = "vgpu.io/predicate-node";
/// Whether the device assignment has been confirmed on the node
pub const GPU_ASSIGNED: &str = "vgpu.io/gpu-assigned";
/// Allocation time in nanoseconds since the epoch
pub const PREDICATE_TIME: &str = "vgpu.io/predicate-time";

/// A workload (pod) asking for GPU resources
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workload {
    /// Unique identifier
    #[serde(default = "Uuid::new_v4")]
    pub uid: Uuid,
    /// Workload name
    pub name: String,
    /// Namespace
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Annotations
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    /// Containers in declaration order
    #[serde(default)]
    pub containers: Vec<Container>,
}

fn default_namespace() -> String {
    "default".to_string()
}

impl Workload {
    /// Create an empty workload in the default namespace
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            uid: Uuid::new_v4(),
            name: name.into(),
            namespace: default_namespace(),
            annotations: BTreeMap::new(),
            containers: Vec::new(),
        }
    }

    /// Append a container
    pub fn with_container(mut self, container: Container) -> Self {
        self.containers.push(container);
        self
    }

    /// Set an annotation
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// Set the estimated execution time of the container at `index`
    pub fn with_estimated_time(self, index: usize, time: u64) -> Self {
        self.with_annotation(format!("{}{}", ESTIMATED_TIME_PREFIX, index), time.to_string())
    }

    /// Device ids recorded for the container at `index`
    pub fn assigned_devices(&self, index: usize) -> Option<Vec<u32>> {
        let value = self
            .annotations
            .get(&format!("{}{}", PREDICATE_GPU_INDEX_PREFIX, index))?;
        value
            .split(',')
            .map(|id| id.trim().parse().ok())
            .collect()
    }
}

/// A container and its resource limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    /// Container name
    pub name: String,
    /// Resource limits keyed by resource name
    #[serde(default)]
    pub resources: BTreeMap<String, u64>,
}

impl Container {
    /// Create a container without resource limits
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resources: BTreeMap::new(),
        }
    }

    /// Create a container asking for virtual cores and memory
    pub fn with_gpu(name: impl Into<String>, vcore: u64, vmemory: u64) -> Self {
        let mut container = Self::new(name);
        container.resources.insert(VCORE_RESOURCE.to_string(), vcore);
        container.resources.insert(VMEMORY_RESOURCE.to_string(), vmemory);
        container
    }

    /// Quantity of a resource, zero when absent
    pub fn requested(&self, resource: &str) -> u64 {
        self.resources.get(resource).copied().unwrap_or(0)
    }
}

/// Whether the container asks for any GPU cores
pub fn is_gpu_requesting_container(container: &Container) -> bool {
    requested_cores(container) > 0
}

/// Virtual cores requested by the container
pub fn requested_cores(container: &Container) -> u64 {
    container.requested(VCORE_RESOURCE)
}

/// Virtual memory requested by the container
pub fn requested_memory(container: &Container) -> u64 {
    container.requested(VMEMORY_RESOURCE)
}

/// Estimated execution time of the container at `index`.
///
/// A missing annotation means no estimate and yields zero; an annotation that
/// is not a non-negative integer is a lookup error.
pub fn estimated_execution_time(workload: &Workload, index: usize) -> VgpuResult<u64> {
    let key = format!("{}{}", ESTIMATED_TIME_PREFIX, index);
    match workload.annotations.get(&key) {
        None => Ok(0),
        Some(value) => value.trim().parse().map_err(|e| {
            VgpuError::Lookup(format!(
                "invalid estimated time {:?} for {}/{} container {}: {}",
                value, workload.namespace, workload.name, index, e
            ))
        }),
    }
}
