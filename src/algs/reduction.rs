//! Convergence evaluation: local change, global max-reduction, stop test.
//!
//! Every worker reduces the same number of times with the same tag sequence,
//! so each one sees the same global error and takes the same decision in
//! the same round.

use serde::{Deserialize, Serialize};

use crate::algs::communicator::{CommTag, Communicator};
use crate::data::local_grid::LocalGrid;
use crate::jacobi_error::JacobiError;

/// Maximum that lets NaN win, so a diverging worker cannot be hidden by
/// the others.
#[inline]
pub fn nan_max(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else {
        a.max(b)
    }
}

/// Maximum absolute difference over the interior of two same-sized grids.
pub fn max_interior_change(current: &LocalGrid, next: &LocalGrid) -> f64 {
    debug_assert_eq!(current.dim(), next.dim());
    let dim = current.dim();
    let mut err = 0.0f64;
    for row in 1..=dim {
        for col in 1..=dim {
            err = nan_max(err, (next.get(row, col) - current.get(row, col)).abs());
        }
    }
    err
}

/// Combine per-worker local errors into the global error.
pub fn global_error<C: Communicator>(comm: &C, tag: CommTag, local: f64) -> Result<f64, JacobiError> {
    comm.all_reduce_max(tag, local)
}

/// How a run ended.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    /// Global error fell below the tolerance.
    Converged,
    /// Iteration cap reached first.
    Exhausted,
}

/// Stop rule: `error < tolerance`, or `iterations == max_iterations`.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceCriteria {
    pub tolerance: f64,
    pub max_iterations: u32,
}

impl Default for ConvergenceCriteria {
    fn default() -> Self {
        Self {
            tolerance: 1.0e-5,
            max_iterations: 1000,
        }
    }
}

impl ConvergenceCriteria {
    /// Decision after `completed` sweeps with the given global error.
    /// `None` means keep iterating. Convergence wins over exhaustion when
    /// both hold in the same round.
    pub fn check(&self, completed: u32, global_error: f64) -> Option<Termination> {
        if global_error < self.tolerance {
            Some(Termination::Converged)
        } else if completed >= self.max_iterations {
            Some(Termination::Exhausted)
        } else {
            None
        }
    }
}
