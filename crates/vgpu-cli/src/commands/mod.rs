//! CLI commands implementation

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use tracing::info;
use vgpu_core::{AdmissionConfig, NodeInfo, Workload};
use vgpu_scheduler::{Allocator, GpuRequest, RankedDevice, ShareMode};

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value)?;
    std::fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
}

/// Check whether a workload fits on a node
pub fn predicate(
    config: &AdmissionConfig,
    node_path: &Path,
    workload_path: &Path,
    write_node: bool,
) -> Result<()> {
    let mut node: NodeInfo = read_json(node_path)?;
    let workload: Workload = read_json(workload_path)?;

    let fits = Allocator::with_config(&mut node, &config.scheduler).is_feasible(&workload);
    println!("{}", fits);

    if write_node {
        write_json(node_path, &node)?;
        info!(path = %node_path.display(), "Node snapshot updated");
    }

    Ok(())
}

/// Allocate devices and print the annotated workload
pub fn allocate(
    config: &AdmissionConfig,
    node_path: &Path,
    workload_path: &Path,
    write_node: bool,
) -> Result<()> {
    let mut node: NodeInfo = read_json(node_path)?;
    let workload: Workload = read_json(workload_path)?;

    let annotated = Allocator::with_config(&mut node, &config.scheduler)
        .allocate(&workload)
        .with_context(|| format!("Failed to allocate workload {}", workload.name))?;
    println!("{}", serde_json::to_string_pretty(&annotated)?);

    if write_node {
        write_json(node_path, &node)?;
        info!(path = %node_path.display(), "Node snapshot updated");
    }

    Ok(())
}

/// Return a workload's bookings and write the node back
pub fn release(node_path: &Path, workload_path: &Path) -> Result<()> {
    let mut node: NodeInfo = read_json(node_path)?;
    let workload: Workload = read_json(workload_path)?;

    Allocator::new(&mut node)
        .release(&workload)
        .with_context(|| format!("Failed to release workload {}", workload.name))?;

    write_json(node_path, &node)?;
    info!(path = %node_path.display(), "Node snapshot updated");
    Ok(())
}

/// Show share mode scores for a request
pub fn rank(
    config: &AdmissionConfig,
    node_path: &Path,
    cores: u64,
    memory: u64,
    estimated_time: u64,
) -> Result<()> {
    let node: NodeInfo = read_json(node_path)?;
    let request = GpuRequest::new(cores, memory, estimated_time);
    let ranked = ShareMode::new()
        .with_capacity_filter(config.scheduler.capacity_filter)
        .rank(&node.devices, &request);

    if ranked.is_empty() {
        println!("No candidate devices on node {}", node.name);
    } else {
        print!("{}", format_ranking(&ranked));
    }

    Ok(())
}

fn format_ranking(ranked: &[RankedDevice<'_>]) -> String {
    let mut out = format!(
        "{:<8} {:<8} {:<10} {:<10} {:<11} {}\n",
        "DEVICE", "CORES", "MEMORY", "ISOLATED", "CONTAINERS", "SCORE"
    );
    out.push_str(&"-".repeat(60));
    out.push('\n');
    for r in ranked {
        out.push_str(&format!(
            "{:<8} {:<8} {:<10} {:<10} {:<11} {:.4}\n",
            r.device.id(),
            r.device.allocatable_cores(),
            r.device.allocatable_memory(),
            r.device.isolated_time(),
            r.device.running_container_count(),
            r.closeness
        ));
    }
    out
}
