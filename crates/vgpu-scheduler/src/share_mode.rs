//! Share mode device selection
//!
//! Several containers may share one GPU. Every candidate device is scored with
//! TOPSIS over four criteria and the device closest to the ideal wins:
//!
//! | column | criterion                                   | direction |
//! |--------|---------------------------------------------|-----------|
//! | 0      | allocatable cores                           | benefit   |
//! | 1      | allocatable memory                          | benefit   |
//! | 2      | `max(0, estimated_time - isolated_time)`    | benefit   |
//! | 3      | running container count                     | cost      |
//!
//! Columns are normalized by their Euclidean norm and weighted by
//! [`CRITERIA_WEIGHTS`]. Candidates are first put in [`ComparatorChain`] order,
//! and the earliest one wins an exact tie.

use tracing::debug;
use vgpu_core::DeviceInfo;

use crate::comparator::ComparatorChain;
use crate::evaluator::{Evaluator, GpuRequest};

/// Number of scoring criteria
pub const CRITERIA: usize = 4;

/// Criterion weights: cores, memory, wait time, container count
pub const CRITERIA_WEIGHTS: [f64; CRITERIA] = [0.3, 0.3, 0.2, 0.2];

/// [`CRITERIA_WEIGHTS`] in percent, exact for the compile-time sum check
pub const WEIGHT_PERCENT: [u32; CRITERIA] = [30, 30, 20, 20];

const _: () = assert!(
    WEIGHT_PERCENT[0] + WEIGHT_PERCENT[1] + WEIGHT_PERCENT[2] + WEIGHT_PERCENT[3] == 100,
    "criterion weights must sum to 1.0"
);

/// Whether a larger value is better for each criterion
const BENEFIT: [bool; CRITERIA] = [true, true, true, false];

type Row = [f64; CRITERIA];

/// A candidate device and its relative closeness to the ideal
#[derive(Debug, Clone, Copy)]
pub struct RankedDevice<'a> {
    pub device: &'a DeviceInfo,
    /// In `[0, 1]`; higher is better
    pub closeness: f64,
}

/// Share mode evaluator
#[derive(Clone, Default)]
pub struct ShareMode {
    capacity_filter: bool,
    chain: ComparatorChain,
}

impl ShareMode {
    /// Rank every device on the node
    pub fn new() -> Self {
        Self::default()
    }

    /// Only rank devices with enough free cores and memory for the request
    pub fn with_capacity_filter(mut self, enabled: bool) -> Self {
        self.capacity_filter = enabled;
        self
    }

    /// Score all candidates, returned in comparator order
    pub fn rank<'a>(&self, devices: &'a [DeviceInfo], request: &GpuRequest) -> Vec<RankedDevice<'a>> {
        let candidates = self.candidates(devices, request);
        if candidates.is_empty() {
            return Vec::new();
        }

        let mut matrix = decision_matrix(&candidates, request);
        normalize(&mut matrix, &CRITERIA_WEIGHTS);
        let (ideal, anti_ideal) = reference_points(&matrix);

        candidates
            .into_iter()
            .zip(matrix.iter())
            .map(|(device, row)| {
                let closeness = relative_closeness(distance(row, &ideal), distance(row, &anti_ideal));
                debug!(
                    device = device.id(),
                    cores = device.allocatable_cores(),
                    memory = device.allocatable_memory(),
                    closeness = closeness,
                    "Scored device"
                );
                RankedDevice { device, closeness }
            })
            .collect()
    }

    fn candidates<'a>(&self, devices: &'a [DeviceInfo], request: &GpuRequest) -> Vec<&'a DeviceInfo> {
        let mut candidates: Vec<&DeviceInfo> = devices
            .iter()
            .filter(|d| {
                !self.capacity_filter
                    || (d.allocatable_cores() >= request.cores
                        && d.allocatable_memory() >= request.memory)
            })
            .collect();
        self.chain.sort(&mut candidates);
        candidates
    }
}

impl Evaluator for ShareMode {
    fn evaluate<'a>(&self, devices: &'a [DeviceInfo], request: &GpuRequest) -> Vec<&'a DeviceInfo> {
        let mut ranked = self.rank(devices, request).into_iter();
        let Some(mut best) = ranked.next() else {
            return Vec::new();
        };
        for candidate in ranked {
            if candidate.closeness > best.closeness {
                best = candidate;
            }
        }

        debug!(
            device = best.device.id(),
            cores = best.device.allocatable_cores(),
            memory = best.device.allocatable_memory(),
            closeness = best.closeness,
            "Picked device"
        );

        vec![best.device]
    }

    fn name(&self) -> &'static str {
        "share"
    }
}

/// One row per candidate, one column per criterion
pub(crate) fn decision_matrix(candidates: &[&DeviceInfo], request: &GpuRequest) -> Vec<Row> {
    candidates
        .iter()
        .map(|d| {
            let wait = request.estimated_time.saturating_sub(d.isolated_time());
            [
                d.allocatable_cores() as f64,
                d.allocatable_memory() as f64,
                wait as f64,
                d.running_container_count() as f64,
            ]
        })
        .collect()
}

/// Divide each column by its Euclidean norm, then weight it. A zero column stays zero.
fn normalize(matrix: &mut [Row], weights: &[f64; CRITERIA]) {
    for col in 0..CRITERIA {
        let norm = matrix.iter().map(|row| row[col] * row[col]).sum::<f64>().sqrt();
        for row in matrix.iter_mut() {
            row[col] = if norm == 0.0 {
                0.0
            } else {
                weights[col] * (row[col] / norm)
            };
        }
    }
}

/// Ideal and anti-ideal points of a non-empty normalized matrix
fn reference_points(matrix: &[Row]) -> (Row, Row) {
    let mut ideal = matrix[0];
    let mut anti_ideal = matrix[0];
    for row in &matrix[1..] {
        for col in 0..CRITERIA {
            let (best, worst) = if BENEFIT[col] {
                (row[col].max(ideal[col]), row[col].min(anti_ideal[col]))
            } else {
                (row[col].min(ideal[col]), row[col].max(anti_ideal[col]))
            };
            ideal[col] = best;
            anti_ideal[col] = worst;
        }
    }
    (ideal, anti_ideal)
}

fn distance(a: &Row, b: &Row) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// `negative / (positive + negative)`, or 0 when the ideal and anti-ideal coincide
fn relative_closeness(positive: f64, negative: f64) -> f64 {
    let total = positive + negative;
    if total == 0.0 {
        0.0
    } else {
        negative / total
    }
}
