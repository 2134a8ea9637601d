//! Node registry that serializes allocation per node

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};
use vgpu_core::{NodeInfo, SchedulerConfig, VgpuError, VgpuResult, Workload};

use crate::allocator::Allocator;

type NodesMap = HashMap<String, Arc<Mutex<NodeInfo>>>;

/// Tracks GPU nodes and runs allocations against them.
///
/// Each node sits behind its own mutex, held for the whole
/// read-evaluate-book sequence, so two workloads on one node can never pick
/// the same device from the same stale view. Different nodes proceed in
/// parallel.
///
/// Aging with [`NodeRegistry::advance`] only shortens isolated times; a
/// booking leaves its device through [`NodeRegistry::release`].
pub struct NodeRegistry {
    /// Nodes indexed by name
    nodes: RwLock<NodesMap>,
    /// Policy handed to every allocator
    config: SchedulerConfig,
}

impl NodeRegistry {
    /// Create an empty registry
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            nodes: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Add a node, replacing any node with the same name
    pub async fn register(&self, node: NodeInfo) {
        info!(
            node = %node.name,
            devices = node.devices.len(),
            total_memory = node.total_memory,
            "Registered node"
        );
        self.nodes
            .write()
            .await
            .insert(node.name.clone(), Arc::new(Mutex::new(node)));
    }

    /// Remove a node and return its last state
    pub async fn remove(&self, name: &str) -> VgpuResult<NodeInfo> {
        let handle = self
            .nodes
            .write()
            .await
            .remove(name)
            .ok_or_else(|| VgpuError::NodeNotFound(name.to_string()))?;
        let node = handle.lock().await.clone();
        debug!(node = %name, "Node removed");
        Ok(node)
    }

    /// Names of all registered nodes, sorted
    pub async fn list_nodes(&self) -> Vec<String> {
        let mut names: Vec<String> = self.nodes.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Copy of a node's current state
    pub async fn snapshot(&self, name: &str) -> VgpuResult<NodeInfo> {
        let handle = self.node(name).await?;
        let node = handle.lock().await;
        Ok(node.clone())
    }

    /// Allocate a workload on a node and return the annotated copy
    pub async fn allocate(&self, name: &str, workload: &Workload) -> VgpuResult<Workload> {
        let handle = self.node(name).await?;
        let mut node = handle.lock().await;
        Allocator::with_config(&mut *node, &self.config).allocate(workload)
    }

    /// Return the resources booked for a workload annotated by [`NodeRegistry::allocate`]
    pub async fn release(&self, name: &str, workload: &Workload) -> VgpuResult<()> {
        let handle = self.node(name).await?;
        let mut node = handle.lock().await;
        Allocator::with_config(&mut *node, &self.config).release(workload)
    }

    /// Feasibility check following the configured feasibility mode
    pub async fn is_allocatable(&self, name: &str, workload: &Workload) -> VgpuResult<bool> {
        let handle = self.node(name).await?;
        let mut node = handle.lock().await;
        Ok(Allocator::with_config(&mut *node, &self.config).is_feasible(workload))
    }

    /// Age the bookings of every node
    pub async fn advance(&self, elapsed: u64) {
        let handles: Vec<Arc<Mutex<NodeInfo>>> =
            self.nodes.read().await.values().cloned().collect();
        for handle in handles {
            handle.lock().await.advance(elapsed);
        }
    }

    async fn node(&self, name: &str) -> VgpuResult<Arc<Mutex<NodeInfo>>> {
        self.nodes
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| VgpuError::NodeNotFound(name.to_string()))
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vgpu_core::{Container, DeviceInfo, FeasibilityMode, PREDICATE_NODE};

    fn create_test_node(name: &str, count: u32) -> NodeInfo {
        NodeInfo::new(
            name,
            (0..count).map(|i| DeviceInfo::new(i, 100, 1000)).collect(),
        )
    }

    fn share_workload(name: &str, cores: u64, memory: u64) -> Workload {
        Workload::new(name)
            .with_container(Container::with_gpu("main", cores, memory))
            .with_estimated_time(0, 5)
    }

    #[tokio::test]
    async fn test_allocate_unknown_node() {
        let registry = NodeRegistry::default();
        let result = registry
            .allocate("missing", &share_workload("w", 10, 10))
            .await;
        assert!(matches!(result, Err(VgpuError::NodeNotFound(_))));
    }

    #[tokio::test]
    async fn test_allocate_updates_node() {
        let registry = NodeRegistry::default();
        registry.register(create_test_node("node-a", 2)).await;

        let annotated = registry
            .allocate("node-a", &share_workload("w", 30, 200))
            .await
            .unwrap();
        assert_eq!(annotated.annotations[PREDICATE_NODE], "node-a");

        let node = registry.snapshot("node-a").await.unwrap();
        assert_eq!(node.used_cores(), 30);
        assert_eq!(node.used_memory(), 200);
    }

    #[tokio::test]
    async fn test_list_and_remove_nodes() {
        let registry = NodeRegistry::default();
        registry.register(create_test_node("node-b", 1)).await;
        registry.register(create_test_node("node-a", 1)).await;

        assert_eq!(registry.list_nodes().await, vec!["node-a", "node-b"]);

        let removed = registry.remove("node-a").await.unwrap();
        assert_eq!(removed.name, "node-a");
        assert_eq!(registry.list_nodes().await, vec!["node-b"]);
        assert!(registry.remove("node-a").await.is_err());
    }

    #[tokio::test]
    async fn test_dry_run_feasibility_keeps_node() {
        let registry = NodeRegistry::new(SchedulerConfig {
            feasibility: FeasibilityMode::DryRun,
            ..SchedulerConfig::default()
        });
        registry.register(create_test_node("node-a", 1)).await;
        let workload = share_workload("w", 40, 100);

        assert!(registry.is_allocatable("node-a", &workload).await.unwrap());
        assert!(registry.is_allocatable("node-a", &workload).await.unwrap());
        assert_eq!(registry.snapshot("node-a").await.unwrap().used_cores(), 0);
    }

    #[tokio::test]
    async fn test_commit_feasibility_books() {
        let registry = NodeRegistry::default();
        registry.register(create_test_node("node-a", 1)).await;
        let workload = share_workload("w", 40, 100);

        assert!(registry.is_allocatable("node-a", &workload).await.unwrap());
        assert!(registry.is_allocatable("node-a", &workload).await.unwrap());
        assert_eq!(registry.snapshot("node-a").await.unwrap().used_cores(), 80);
    }

    #[tokio::test]
    async fn test_advance_ages_bookings() {
        let registry = NodeRegistry::default();
        registry.register(create_test_node("node-a", 1)).await;
        registry
            .allocate("node-a", &share_workload("w", 10, 10))
            .await
            .unwrap();

        registry.advance(3).await;
        let node = registry.snapshot("node-a").await.unwrap();
        assert_eq!(node.devices[0].isolated_time(), 2);
    }

    #[tokio::test]
    async fn test_release_after_expiry_allows_exclusive() {
        let registry = NodeRegistry::default();
        registry.register(create_test_node("node-a", 1)).await;
        let annotated = registry
            .allocate("node-a", &share_workload("short", 10, 10))
            .await
            .unwrap();
        registry.advance(5).await;

        let whole = Workload::new("whole").with_container(Container::with_gpu("main", 100, 0));
        assert!(matches!(
            registry.allocate("node-a", &whole).await,
            Err(VgpuError::NoFeasibleDevice { .. })
        ));

        registry.release("node-a", &annotated).await.unwrap();
        assert!(registry.snapshot("node-a").await.unwrap().devices[0].is_idle());

        let placed = registry.allocate("node-a", &whole).await.unwrap();
        assert_eq!(placed.assigned_devices(0), Some(vec![0]));
        assert!(registry.release("missing", &placed).await.is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_allocations_are_serialized() {
        let registry = Arc::new(NodeRegistry::default());
        registry.register(create_test_node("node-a", 4)).await;

        let mut tasks = Vec::new();
        for i in 0..40 {
            let registry = Arc::clone(&registry);
            tasks.push(tokio::spawn(async move {
                let workload = share_workload(&format!("w{}", i), 5, 10);
                registry.allocate("node-a", &workload).await
            }));
        }
        for task in tasks {
            assert!(task.await.unwrap().is_ok());
        }

        let node = registry.snapshot("node-a").await.unwrap();
        assert_eq!(node.used_cores(), 200);
        assert_eq!(node.used_memory(), 400);
        let containers: u64 = node.devices.iter().map(|d| d.running_container_count()).sum();
        assert_eq!(containers, 40);
    }
}
