//! vgpu-scheduler: GPU device selection and allocation
//!
//! This crate decides which devices of a node a container is bound to:
//! - Share mode ranking for fractional requests
//! - Exclusive mode selection for whole-device requests
//! - Per-container booking and workload annotation
//! - A registry serializing allocations per node

pub mod allocator;
pub mod comparator;
pub mod evaluator;
pub mod exclusive_mode;
pub mod registry;
pub mod share_mode;

/// Core units of one whole device. Requests below this share a device.
pub const HUNDRED_CORE: u64 = 100;

pub use allocator::{AllocationMode, Allocator, ContainerAllocation};
pub use comparator::ComparatorChain;
pub use evaluator::{Evaluator, GpuRequest};
pub use exclusive_mode::ExclusiveMode;
pub use registry::NodeRegistry;
pub use share_mode::{RankedDevice, ShareMode};
