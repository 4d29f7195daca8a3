//! Single-region Jacobi solver on the whole global grid.
//!
//! No topology, no halos, no devices: a plain double-buffered loop over the
//! `(N + 2)²` field. Distributed runs must reproduce its results, so it is
//! deliberately written without any of the distributed machinery.

use itertools::iproduct;

use crate::algs::reduction::{ConvergenceCriteria, Termination, nan_max};
use crate::data::bc::BoundaryConditions;

/// Result of [`solve_serial`].
#[derive(Clone, Debug, PartialEq)]
pub struct SerialSolution {
    /// Global field including the boundary ring, row-major, `(N + 2)²` values.
    pub field: Vec<f64>,
    pub dimension: usize,
    pub iterations: u32,
    pub error: f64,
    pub termination: Termination,
}

impl SerialSolution {
    /// Value at global `(row, col)`, boundary ring included.
    pub fn at(&self, row: usize, col: usize) -> f64 {
        self.field[row * (self.dimension + 2) + col]
    }
}

/// Global field with boundary values applied and a zero interior.
pub fn initial_field(dimension: usize, bc: &BoundaryConditions) -> Vec<f64> {
    let n = dimension + 2;
    let mut field = vec![0.0; n * n];
    for k in 0..n {
        field[k * n] = bc.left;
        field[k * n + n - 1] = bc.right;
    }
    for k in 0..n {
        field[k] = bc.top;
        field[(n - 1) * n + k] = bc.bottom;
    }
    field
}

/// Iterate until the max change drops below the tolerance or the cap is hit.
pub fn solve_serial(
    dimension: usize,
    bc: &BoundaryConditions,
    criteria: &ConvergenceCriteria,
) -> SerialSolution {
    let n = dimension + 2;
    let mut a = initial_field(dimension, bc);
    let mut b = a.clone();
    let mut iterations = 0;
    let (termination, error) = loop {
        let mut error = 0.0f64;
        for (i, j) in iproduct!(1..=dimension, 1..=dimension) {
            let idx = i * n + j;
            let v = 0.25 * (a[idx - n] + a[idx + n] + a[idx - 1] + a[idx + 1]);
            error = nan_max(error, (v - a[idx]).abs());
            b[idx] = v;
        }
        std::mem::swap(&mut a, &mut b);
        iterations += 1;
        if let Some(t) = criteria.check(iterations, error) {
            break (t, error);
        }
    };
    SerialSolution {
        field: a,
        dimension,
        iterations,
        error,
        termination,
    }
}
