//! vgpu-core: Core types for vgpu admission
//!
//! This crate provides the types shared by the scheduler and the CLI:
//! - GPU device and node bookkeeping
//! - Workload descriptors, resource names and annotation keys
//! - Configuration types
//! - Error handling

pub mod config;
pub mod error;
pub mod gpu;
pub mod model;

pub use config::*;
pub use error::*;
pub use gpu::*;
pub use model::*;
