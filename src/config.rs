//! Solver configuration and the bootstrap validation contract.
//!
//! [`SolverConfig::validate`] is the single gate between user input and the
//! solver: it checks `side² == workers` and `dimension % side == 0` (plus the
//! numeric parameters) and yields the [`Decomposition`] every worker uses.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::algs::reduction::ConvergenceCriteria;
use crate::data::bc::BoundaryConditions;
use crate::device::DeviceConfig;
use crate::jacobi_error::JacobiError;
use crate::topology::cart::Decomposition;

/// Global interior points per axis when none is given.
pub const DEFAULT_DIMENSION: usize = 1024;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Global interior points per axis (`N`).
    pub dimension: usize,
    /// Workers per axis (`T`); `None` uses `sqrt(worker_count)`.
    pub topology: Option<usize>,
    pub criteria: ConvergenceCriteria,
    pub boundary: BoundaryConditions,
    pub device: DeviceConfig,
    /// Log progress every this many iterations on rank 0; `0` disables.
    pub report_every: u32,
    /// Longest a halo or reduction receive may wait.
    pub comm_timeout: Duration,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            dimension: DEFAULT_DIMENSION,
            topology: None,
            criteria: ConvergenceCriteria::default(),
            boundary: BoundaryConditions::default(),
            device: DeviceConfig::default(),
            report_every: 100,
            comm_timeout: Duration::from_secs(30),
        }
    }
}

impl SolverConfig {
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    pub fn with_topology(mut self, side: usize) -> Self {
        self.topology = Some(side);
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.criteria.tolerance = tolerance;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.criteria.max_iterations = max_iterations;
        self
    }

    /// Hot top edge at `value`, other edges at zero.
    pub fn with_boundary_value(mut self, value: f64) -> Self {
        self.boundary = BoundaryConditions::top_edge(value);
        self
    }

    pub fn with_boundary(mut self, boundary: BoundaryConditions) -> Self {
        self.boundary = boundary;
        self
    }

    pub fn with_device(mut self, device: DeviceConfig) -> Self {
        self.device = device;
        self
    }

    pub fn with_report_every(mut self, every: u32) -> Self {
        self.report_every = every;
        self
    }

    pub fn with_comm_timeout(mut self, timeout: Duration) -> Self {
        self.comm_timeout = timeout;
        self
    }

    /// Topology side for `workers`: the explicit value, or the integer
    /// square root of the worker count.
    pub fn side_for(&self, workers: usize) -> usize {
        self.topology.unwrap_or_else(|| workers.isqrt())
    }

    /// Check every parameter against a world of `workers` ranks.
    pub fn validate(&self, workers: usize) -> Result<Decomposition, JacobiError> {
        let c = &self.criteria;
        if !(c.tolerance.is_finite() && c.tolerance >= 0.0) {
            return Err(JacobiError::InvalidParameter(format!(
                "tolerance must be a finite non-negative number, got {}",
                c.tolerance
            )));
        }
        if c.max_iterations == 0 {
            return Err(JacobiError::InvalidParameter(
                "max_iterations must be at least 1".into(),
            ));
        }
        let b = &self.boundary;
        if ![b.top, b.bottom, b.left, b.right].iter().all(|v| v.is_finite()) {
            return Err(JacobiError::InvalidParameter(
                "boundary values must be finite".into(),
            ));
        }
        if self.device.device_count == 0 {
            return Err(JacobiError::InvalidParameter(
                "device_count must be at least 1".into(),
            ));
        }
        Decomposition::new(self.dimension, workers, self.side_for(workers))
    }
}
