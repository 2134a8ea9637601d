//! Per-node GPU allocation
//!
//! The allocator picks devices for every GPU-requesting container of a
//! workload and books the chosen resources on the node. Booking is fail-fast:
//! when a container or a device fails, whatever was booked earlier in the same
//! workload stays booked. A failed workload is rejected as a whole, so callers
//! are expected to discard the node state or rebuild it from the cluster.
//!
//! Bookings never expire on their own. When a container finishes, the caller
//! hands the annotated workload back to [`Allocator::release`].
//!
//! Callers must serialize calls per node (see [`crate::NodeRegistry`]); the
//! allocator reads device state, ranks it and then writes bookings without any
//! locking of its own.

use chrono::Utc;
use tracing::{debug, info, warn};
use vgpu_core::{
    estimated_execution_time, is_gpu_requesting_container, requested_cores, requested_memory,
    Container, FeasibilityMode, NodeResources, SchedulerConfig, VgpuError, VgpuResult, Workload,
    GPU_ASSIGNED, PREDICATE_GPU_INDEX_PREFIX, PREDICATE_NODE, PREDICATE_TIME,
};

use crate::evaluator::{Evaluator, GpuRequest};
use crate::exclusive_mode::ExclusiveMode;
use crate::share_mode::ShareMode;
use crate::HUNDRED_CORE;

/// How a container was placed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationMode {
    /// Fraction of one device shared with other containers
    Share,
    /// One or more whole devices
    Exclusive,
}

/// Outcome of allocating one container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerAllocation {
    /// Index of the container in the workload
    pub container_index: usize,
    /// Container name
    pub container_name: String,
    /// Placement mode
    pub mode: AllocationMode,
    /// Devices the container is bound to
    pub device_ids: Vec<u32>,
    /// Cores booked on each device
    pub vcore: u64,
    /// Memory booked on each device
    pub vmemory: u64,
}

impl ContainerAllocation {
    /// Comma separated device ids, as written into the workload annotation
    pub fn device_list(&self) -> String {
        self.device_ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// GPU allocator for a single node
pub struct Allocator<'a, N: NodeResources> {
    node: &'a mut N,
    share_mode: ShareMode,
    exclusive_mode: ExclusiveMode,
    feasibility: FeasibilityMode,
}

impl<'a, N: NodeResources> Allocator<'a, N> {
    /// Create an allocator with the default policy
    pub fn new(node: &'a mut N) -> Self {
        Self::with_config(node, &SchedulerConfig::default())
    }

    /// Create an allocator following the scheduler configuration
    pub fn with_config(node: &'a mut N, config: &SchedulerConfig) -> Self {
        Self {
            node,
            share_mode: ShareMode::new().with_capacity_filter(config.capacity_filter),
            exclusive_mode: ExclusiveMode::new(),
            feasibility: config.feasibility,
        }
    }

    /// The node being allocated on
    pub fn node(&self) -> &N {
        &*self.node
    }

    /// Check whether every GPU container of the workload can be placed.
    ///
    /// This books resources exactly like [`Allocator::allocate`]: calling it
    /// twice for the same workload books the workload twice.
    pub fn is_allocatable(&mut self, workload: &Workload) -> bool {
        self.allocate_containers(workload).is_ok()
    }

    /// Allocate devices for the workload and return an annotated copy of it
    pub fn allocate(&mut self, workload: &Workload) -> VgpuResult<Workload> {
        let allocations = self.allocate_containers(workload)?;

        let mut annotated = workload.clone();
        for allocation in &allocations {
            annotated.annotations.insert(
                format!("{}{}", PREDICATE_GPU_INDEX_PREFIX, allocation.container_index),
                allocation.device_list(),
            );
        }

        let now = Utc::now()
            .timestamp_nanos_opt()
            .ok_or_else(|| VgpuError::Internal("allocation time out of range".to_string()))?;
        annotated
            .annotations
            .insert(PREDICATE_NODE.to_string(), self.node.name().to_string());
        annotated
            .annotations
            .insert(GPU_ASSIGNED.to_string(), "false".to_string());
        annotated
            .annotations
            .insert(PREDICATE_TIME.to_string(), now.to_string());

        info!(
            workload = %workload.name,
            uid = %workload.uid,
            node = %self.node.name(),
            containers = allocations.len(),
            "Allocated workload"
        );

        Ok(annotated)
    }

    /// Return the resources booked for an annotated workload.
    ///
    /// Every GPU container must carry its device annotation. Like booking,
    /// release is fail-fast: devices released before an error stay released.
    pub fn release(&mut self, workload: &Workload) -> VgpuResult<()> {
        let device_memory = self.device_memory();
        for (index, container) in workload.containers.iter().enumerate() {
            if !is_gpu_requesting_container(container) {
                continue;
            }
            let device_ids = workload.assigned_devices(index).ok_or_else(|| {
                VgpuError::Lookup(format!(
                    "container {} of workload {} has no assigned devices",
                    container.name, workload.name
                ))
            })?;
            let estimated_time = estimated_execution_time(workload, index)?;
            let (_, vcore, vmemory) = booking_for(
                requested_cores(container),
                requested_memory(container),
                device_memory,
            );

            for id in device_ids {
                self.node
                    .remove_used_resources(id, vcore, vmemory, estimated_time)?;
            }
        }

        info!(
            workload = %workload.name,
            uid = %workload.uid,
            node = %self.node.name(),
            "Released workload"
        );

        Ok(())
    }

    /// Allocate devices for one container and book them on the node
    pub fn allocate_one(
        &mut self,
        workload: &Workload,
        container_index: usize,
        container: &Container,
    ) -> VgpuResult<ContainerAllocation> {
        let device_memory = self.device_memory();
        let cores = requested_cores(container);
        let memory = requested_memory(container);
        let estimated_time = estimated_execution_time(workload, container_index)?;
        let request = GpuRequest::new(cores, memory, estimated_time);

        let (mode, vcore, vmemory) = booking_for(cores, memory, device_memory);
        let evaluator = match mode {
            AllocationMode::Share => &self.share_mode as &dyn Evaluator,
            AllocationMode::Exclusive => &self.exclusive_mode as &dyn Evaluator,
        };

        let device_ids: Vec<u32> = evaluator
            .evaluate(self.node.devices(), &request)
            .iter()
            .map(|d| d.id())
            .collect();

        debug!(
            container = %container.name,
            evaluator = evaluator.name(),
            cores = cores,
            memory = memory,
            estimated_time = estimated_time,
            devices = ?device_ids,
            "Evaluated container"
        );

        if device_ids.is_empty() {
            return Err(VgpuError::NoFeasibleDevice {
                container: container.name.clone(),
            });
        }

        let mut booked = Vec::with_capacity(device_ids.len());
        for &id in &device_ids {
            if let Err(e) = self
                .node
                .add_used_resources(id, vcore, vmemory, estimated_time)
            {
                warn!(
                    node = %self.node.name(),
                    device = id,
                    already_booked = ?booked,
                    error = %e,
                    "Failed to update used resources"
                );
                return Err(e);
            }
            booked.push(id);
        }

        Ok(ContainerAllocation {
            container_index,
            container_name: container.name.clone(),
            mode,
            device_ids,
            vcore,
            vmemory,
        })
    }

    /// Memory booked per device by an exclusive container
    fn device_memory(&self) -> u64 {
        self.node
            .total_memory()
            .checked_div(self.node.device_count())
            .unwrap_or(0)
    }

    fn allocate_containers(&mut self, workload: &Workload) -> VgpuResult<Vec<ContainerAllocation>> {
        let mut allocations = Vec::new();
        for (index, container) in workload.containers.iter().enumerate() {
            if !is_gpu_requesting_container(container) {
                continue;
            }
            match self.allocate_one(workload, index, container) {
                Ok(allocation) => allocations.push(allocation),
                Err(e) => {
                    warn!(
                        workload = %workload.name,
                        uid = %workload.uid,
                        container = %container.name,
                        error = %e,
                        "Failed to allocate container"
                    );
                    return Err(e);
                }
            }
        }
        Ok(allocations)
    }
}

/// Placement mode and per-device booking for a request
fn booking_for(cores: u64, memory: u64, device_memory: u64) -> (AllocationMode, u64, u64) {
    if cores < HUNDRED_CORE {
        (AllocationMode::Share, cores, memory)
    } else {
        (AllocationMode::Exclusive, HUNDRED_CORE, device_memory)
    }
}

impl<N: NodeResources + Clone> Allocator<'_, N> {
    /// Allocate the workload against a copy of the node, leaving the node untouched
    pub fn dry_run(&self, workload: &Workload) -> VgpuResult<Vec<ContainerAllocation>> {
        let mut snapshot = (*self.node).clone();
        let mut scratch = Allocator {
            node: &mut snapshot,
            share_mode: self.share_mode.clone(),
            exclusive_mode: self.exclusive_mode.clone(),
            feasibility: self.feasibility,
        };
        scratch.allocate_containers(workload)
    }

    /// Feasibility check following the configured [`FeasibilityMode`]
    pub fn is_feasible(&mut self, workload: &Workload) -> bool {
        match self.feasibility {
            FeasibilityMode::Commit => self.is_allocatable(workload),
            FeasibilityMode::DryRun => self.dry_run(workload).is_ok(),
        }
    }
}
