//! GPU device and node bookkeeping
//!
//! A node owns an ordered set of devices. Each device tracks its capacity, the
//! resources booked against it and one [`Booking`] per container sharing it.
//! Bookings carry an estimated run time; the longest remaining estimate is the
//! device's isolated time.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{VgpuError, VgpuResult};

/// Resources booked on a device by one container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    /// Virtual core units (100 = one whole GPU)
    pub vcore: u64,
    /// Virtual memory units
    pub vmemory: u64,
    /// Estimated execution time of the container
    pub estimated_time: u64,
    /// Time elapsed since the booking was made
    #[serde(default)]
    pub elapsed: u64,
}

impl Booking {
    /// Time left before this container is expected to finish
    pub fn remaining(&self) -> u64 {
        self.estimated_time.saturating_sub(self.elapsed)
    }
}

/// Represents a GPU device on a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Device index, unique per node
    pub id: u32,
    /// Core capacity in virtual core units
    pub total_cores: u64,
    /// Memory capacity in virtual memory units
    pub total_memory: u64,
    /// Cores booked so far
    #[serde(default)]
    pub used_cores: u64,
    /// Memory booked so far
    #[serde(default)]
    pub used_memory: u64,
    /// Containers currently sharing this device
    #[serde(default)]
    pub bookings: Vec<Booking>,
}

impl DeviceInfo {
    /// Create an idle device
    pub fn new(id: u32, total_cores: u64, total_memory: u64) -> Self {
        Self {
            id,
            total_cores,
            total_memory,
            used_cores: 0,
            used_memory: 0,
            bookings: Vec::new(),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Cores still free on this device
    pub fn allocatable_cores(&self) -> u64 {
        self.total_cores.saturating_sub(self.used_cores)
    }

    /// Memory still free on this device
    pub fn allocatable_memory(&self) -> u64 {
        self.total_memory.saturating_sub(self.used_memory)
    }

    /// Remaining time until the longest-running booked container should finish
    pub fn isolated_time(&self) -> u64 {
        self.bookings
            .iter()
            .map(Booking::remaining)
            .max()
            .unwrap_or(0)
    }

    /// Number of containers sharing this device
    pub fn running_container_count(&self) -> u64 {
        self.bookings.len() as u64
    }

    /// Whether nothing is booked on this device
    pub fn is_idle(&self) -> bool {
        self.used_cores == 0 && self.used_memory == 0 && self.bookings.is_empty()
    }

    /// Book resources for a new container whose elapsed time starts at zero
    pub fn add_used_resources(&mut self, vcore: u64, vmemory: u64, estimated_time: u64) {
        self.used_cores = self.used_cores.saturating_add(vcore);
        self.used_memory = self.used_memory.saturating_add(vmemory);
        self.bookings.push(Booking {
            vcore,
            vmemory,
            estimated_time,
            elapsed: 0,
        });
    }

    /// Undo a booking made with the same amounts. Returns false when none matches.
    pub fn remove_used_resources(
        &mut self,
        vcore: u64,
        vmemory: u64,
        estimated_time: u64,
    ) -> bool {
        let Some(pos) = self.bookings.iter().position(|b| {
            b.vcore == vcore && b.vmemory == vmemory && b.estimated_time == estimated_time
        }) else {
            return false;
        };
        self.bookings.remove(pos);
        self.used_cores = self.used_cores.saturating_sub(vcore);
        self.used_memory = self.used_memory.saturating_sub(vmemory);
        true
    }
}

/// Read/write view of a node's devices used by the allocator
pub trait NodeResources {
    /// Node name
    fn name(&self) -> &str;

    /// Total memory capacity advertised by the node
    fn total_memory(&self) -> u64;

    /// Device count advertised by the node
    fn device_count(&self) -> u64;

    /// All devices on the node
    fn devices(&self) -> &[DeviceInfo];

    /// Look up a device by id
    fn device(&self, id: u32) -> Option<&DeviceInfo> {
        self.devices().iter().find(|d| d.id == id)
    }

    /// Book resources on a device
    fn add_used_resources(
        &mut self,
        device: u32,
        vcore: u64,
        vmemory: u64,
        estimated_time: u64,
    ) -> VgpuResult<()>;

    /// Return resources booked by [`NodeResources::add_used_resources`]
    fn remove_used_resources(
        &mut self,
        device: u32,
        vcore: u64,
        vmemory: u64,
        estimated_time: u64,
    ) -> VgpuResult<()>;
}

/// GPU state of a single node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Node name
    pub name: String,
    /// Memory capacity advertised by the node
    pub total_memory: u64,
    /// Device count advertised by the node
    pub device_count: u64,
    /// Devices on the node
    pub devices: Vec<DeviceInfo>,
}

impl NodeInfo {
    /// Create a node whose capacity is the sum of its devices
    pub fn new(name: impl Into<String>, devices: Vec<DeviceInfo>) -> Self {
        let total_memory = devices.iter().map(|d| d.total_memory).sum();
        let device_count = devices.len() as u64;
        Self {
            name: name.into(),
            total_memory,
            device_count,
            devices,
        }
    }

    /// Override the advertised node capacity
    pub fn with_capacity(mut self, total_memory: u64, device_count: u64) -> Self {
        self.total_memory = total_memory;
        self.device_count = device_count;
        self
    }

    /// Age every booking on the node
    pub fn advance(&mut self, elapsed: u64) {
        for device in &mut self.devices {
            for booking in &mut device.bookings {
                booking.elapsed = booking.elapsed.saturating_add(elapsed);
            }
        }
    }

    /// Cores booked across all devices
    pub fn used_cores(&self) -> u64 {
        self.devices.iter().map(|d| d.used_cores).sum()
    }

    /// Memory booked across all devices
    pub fn used_memory(&self) -> u64 {
        self.devices.iter().map(|d| d.used_memory).sum()
    }
}

impl NodeResources for NodeInfo {
    fn name(&self) -> &str {
        &self.name
    }

    fn total_memory(&self) -> u64 {
        self.total_memory
    }

    fn device_count(&self) -> u64 {
        self.device_count
    }

    fn devices(&self) -> &[DeviceInfo] {
        &self.devices
    }

    fn add_used_resources(
        &mut self,
        device: u32,
        vcore: u64,
        vmemory: u64,
        estimated_time: u64,
    ) -> VgpuResult<()> {
        let dev = self
            .devices
            .iter_mut()
            .find(|d| d.id == device)
            .ok_or_else(|| VgpuError::DeviceNotFound {
                node: self.name.clone(),
                device,
            })?;
        dev.add_used_resources(vcore, vmemory, estimated_time);

        debug!(
            node = %self.name,
            device = device,
            vcore = vcore,
            vmemory = vmemory,
            estimated_time = estimated_time,
            "Booked device resources"
        );

        Ok(())
    }

    fn remove_used_resources(
        &mut self,
        device: u32,
        vcore: u64,
        vmemory: u64,
        estimated_time: u64,
    ) -> VgpuResult<()> {
        let dev = self
            .devices
            .iter_mut()
            .find(|d| d.id == device)
            .ok_or_else(|| VgpuError::DeviceNotFound {
                node: self.name.clone(),
                device,
            })?;
        if !dev.remove_used_resources(vcore, vmemory, estimated_time) {
            return Err(VgpuError::BookingNotFound {
                node: self.name.clone(),
                device,
            });
        }

        debug!(
            node = %self.name,
            device = device,
            vcore = vcore,
            vmemory = vmemory,
            "Released device resources"
        );

        Ok(())
    }
}
