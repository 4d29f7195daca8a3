//! Dirichlet boundary conditions on the four global edges.
//!
//! Initialization is a pure function of the worker's topology record and its
//! local size: no communication is needed, and every worker can rebuild its
//! starting grid independently.

use serde::{Deserialize, Serialize};

use crate::data::local_grid::{GridPair, LocalGrid};
use crate::topology::cart::{Direction, Worker};

/// Fixed values held on the global top, bottom, left and right edges.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundaryConditions {
    pub top: f64,
    pub bottom: f64,
    pub left: f64,
    pub right: f64,
}

impl Default for BoundaryConditions {
    fn default() -> Self {
        Self::top_edge(300.0)
    }
}

impl BoundaryConditions {
    /// `value` along global row 0, zero on the other three edges.
    pub fn top_edge(value: f64) -> Self {
        Self {
            top: value,
            bottom: 0.0,
            left: 0.0,
            right: 0.0,
        }
    }

    #[inline]
    pub fn value(&self, dir: Direction) -> f64 {
        match dir {
            Direction::Top => self.top,
            Direction::Bottom => self.bottom,
            Direction::Left => self.left,
            Direction::Right => self.right,
        }
    }

    /// Per-direction fixed values for `worker`: `Some` only on global edges.
    pub fn fixed_sides(&self, worker: &Worker) -> [Option<f64>; 4] {
        let mut out = [None; 4];
        for dir in Direction::ALL {
            if worker.on_global_edge(dir) {
                out[dir.code() as usize] = Some(self.value(dir));
            }
        }
        out
    }
}

/// Build the starting grid for `worker`: global-edge ghost sides hold their
/// boundary value, everything else is zero until the first halo exchange.
///
/// Top and bottom rows are written last, so they own the corner cells. The
/// 4-point stencil never reads corners.
pub fn initialize_local_grid(worker: &Worker, local_dim: usize, bc: &BoundaryConditions) -> LocalGrid {
    let mut grid = LocalGrid::zeros(local_dim);
    for dir in [Direction::Left, Direction::Right, Direction::Top, Direction::Bottom] {
        if worker.on_global_edge(dir) {
            grid.fill_side(dir, bc.value(dir));
        }
    }
    grid
}

/// Initialized double buffer for `worker`.
pub fn initialize_grid_pair(worker: &Worker, local_dim: usize, bc: &BoundaryConditions) -> GridPair {
    GridPair::new(
        initialize_local_grid(worker, local_dim, bc),
        bc.fixed_sides(worker),
    )
}
