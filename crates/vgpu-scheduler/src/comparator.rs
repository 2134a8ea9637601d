//! Device ordering built from a chain of comparators

use std::cmp::Ordering;
use vgpu_core::DeviceInfo;

/// Compares two devices on a single key
pub type DeviceOrdering = fn(&DeviceInfo, &DeviceInfo) -> Ordering;

/// Fewer allocatable cores first
pub fn by_allocatable_cores(a: &DeviceInfo, b: &DeviceInfo) -> Ordering {
    a.allocatable_cores().cmp(&b.allocatable_cores())
}

/// Less allocatable memory first
pub fn by_allocatable_memory(a: &DeviceInfo, b: &DeviceInfo) -> Ordering {
    a.allocatable_memory().cmp(&b.allocatable_memory())
}

/// Lower device id first
pub fn by_id(a: &DeviceInfo, b: &DeviceInfo) -> Ordering {
    a.id().cmp(&b.id())
}

/// Applies comparators in order; later ones only break ties of earlier ones
#[derive(Clone)]
pub struct ComparatorChain {
    keys: Vec<DeviceOrdering>,
}

impl ComparatorChain {
    /// Create a chain from comparators in priority order
    pub fn new(keys: Vec<DeviceOrdering>) -> Self {
        Self { keys }
    }

    /// Compare two devices
    pub fn compare(&self, a: &DeviceInfo, b: &DeviceInfo) -> Ordering {
        self.keys
            .iter()
            .map(|key| key(a, b))
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    }

    /// Sort devices in place
    pub fn sort(&self, devices: &mut [&DeviceInfo]) {
        devices.sort_by(|a, b| self.compare(a, b));
    }
}

impl Default for ComparatorChain {
    /// Allocatable cores, then allocatable memory, then id; all ascending.
    fn default() -> Self {
        Self::new(vec![by_allocatable_cores, by_allocatable_memory, by_id])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(id: u32, free_cores: u64, free_memory: u64) -> DeviceInfo {
        let mut dev = DeviceInfo::new(id, 100, 100);
        dev.add_used_resources(100 - free_cores, 100 - free_memory, 0);
        dev
    }

    fn sorted_ids(chain: &ComparatorChain, devices: &[DeviceInfo]) -> Vec<u32> {
        let mut refs: Vec<&DeviceInfo> = devices.iter().collect();
        chain.sort(&mut refs);
        refs.iter().map(|d| d.id()).collect()
    }

    #[test]
    fn test_default_chain_order() {
        let devices = vec![
            device(0, 50, 20),
            device(1, 10, 90),
            device(2, 50, 10),
            device(3, 50, 10),
        ];

        let chain = ComparatorChain::default();
        assert_eq!(sorted_ids(&chain, &devices), vec![1, 2, 3, 0]);
    }

    #[test]
    fn test_order_independent_of_input_order() {
        let mut devices = vec![device(4, 30, 30), device(2, 30, 30), device(7, 5, 60)];
        let chain = ComparatorChain::default();
        let first = sorted_ids(&chain, &devices);

        devices.reverse();
        assert_eq!(sorted_ids(&chain, &devices), first);
        assert_eq!(first, vec![7, 2, 4]);
    }

    #[test]
    fn test_single_key_chain() {
        let devices = vec![device(3, 10, 10), device(1, 90, 90)];
        let chain = ComparatorChain::new(vec![by_id]);
        assert_eq!(sorted_ids(&chain, &devices), vec![1, 3]);
        assert_eq!(chain.compare(&devices[0], &devices[0]), Ordering::Equal);
    }
}
