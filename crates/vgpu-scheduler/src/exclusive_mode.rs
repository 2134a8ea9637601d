//! Exclusive mode device selection: whole, idle devices only

use tracing::debug;
use vgpu_core::DeviceInfo;

use crate::comparator::ComparatorChain;
use crate::evaluator::{Evaluator, GpuRequest};
use crate::HUNDRED_CORE;

/// Binds one or more whole devices to a single container.
///
/// A request of `n` cores needs `ceil(n / 100)` devices. Devices with nothing
/// booked on them are taken in comparator order; if there are not enough of
/// them the result is empty.
#[derive(Clone, Default)]
pub struct ExclusiveMode {
    chain: ComparatorChain,
}

impl ExclusiveMode {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Whole devices needed for a core request
pub fn devices_needed(cores: u64) -> usize {
    cores.div_ceil(HUNDRED_CORE) as usize
}

impl Evaluator for ExclusiveMode {
    fn evaluate<'a>(&self, devices: &'a [DeviceInfo], request: &GpuRequest) -> Vec<&'a DeviceInfo> {
        let needed = devices_needed(request.cores);
        if needed == 0 {
            return Vec::new();
        }

        let mut candidates: Vec<&DeviceInfo> = devices
            .iter()
            .filter(|d| d.is_idle() && d.allocatable_cores() >= HUNDRED_CORE)
            .collect();
        self.chain.sort(&mut candidates);

        if candidates.len() < needed {
            debug!(
                needed = needed,
                idle = candidates.len(),
                "Not enough idle devices"
            );
            return Vec::new();
        }

        candidates.truncate(needed);
        candidates
    }

    fn name(&self) -> &'static str {
        "exclusive"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(devices: &[&DeviceInfo]) -> Vec<u32> {
        devices.iter().map(|d| d.id()).collect()
    }

    #[test]
    fn test_devices_needed() {
        assert_eq!(devices_needed(0), 0);
        assert_eq!(devices_needed(100), 1);
        assert_eq!(devices_needed(150), 2);
        assert_eq!(devices_needed(200), 2);
    }

    #[test]
    fn test_picks_idle_devices_in_order() {
        let mut busy = DeviceInfo::new(0, 100, 1000);
        busy.add_used_resources(10, 10, 0);
        let devices = vec![
            busy,
            DeviceInfo::new(3, 100, 1000),
            DeviceInfo::new(1, 100, 1000),
            DeviceInfo::new(2, 100, 500),
        ];

        let picked = ExclusiveMode::new().evaluate(&devices, &GpuRequest::new(200, 0, 0));
        assert_eq!(ids(&picked), vec![2, 1]);
    }

    #[test]
    fn test_not_enough_idle_devices() {
        let mut busy = DeviceInfo::new(0, 100, 1000);
        busy.add_used_resources(0, 0, 30);
        let devices = vec![busy, DeviceInfo::new(1, 100, 1000)];

        let picked = ExclusiveMode::new().evaluate(&devices, &GpuRequest::new(200, 0, 0));
        assert!(picked.is_empty());
    }

    #[test]
    fn test_no_devices() {
        let picked = ExclusiveMode::new().evaluate(&[], &GpuRequest::new(100, 0, 0));
        assert!(picked.is_empty());
    }
}
