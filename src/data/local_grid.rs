//! Per-worker grid storage with a one-cell ghost border.
//!
//! A [`LocalGrid`] holds `(dim + 2)²` values in row-major order. Rows and
//! columns `1..=dim` are the interior the worker solves for; row/column `0`
//! and `dim + 1` form the ghost ring that either mirrors a neighbour's edge
//! or holds a fixed global boundary value.
//!
//! [`GridPair`] is the Jacobi double buffer: the sweep reads `current` and
//! writes `next`, then the roles swap.

use crate::debug_invariants::DebugInvariants;
use crate::jacobi_error::JacobiError;
use crate::topology::cart::Direction;

#[derive(Clone, Debug, PartialEq)]
pub struct LocalGrid {
    dim: usize,
    data: Vec<f64>,
}

impl LocalGrid {
    /// All-zero grid with `dim × dim` interior points.
    pub fn zeros(dim: usize) -> Self {
        let stride = dim + 2;
        Self {
            dim,
            data: vec![0.0; stride * stride],
        }
    }

    /// Interior points per axis.
    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Row length including both ghost columns.
    #[inline]
    pub fn stride(&self) -> usize {
        self.dim + 2
    }

    #[inline]
    fn idx(&self, row: usize, col: usize) -> usize {
        debug_assert!(row < self.stride() && col < self.stride());
        row * self.stride() + col
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[self.idx(row, col)]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        let i = self.idx(row, col);
        self.data[i] = value;
    }

    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// Copy of the interior, row-major, `dim * dim` values.
    pub fn interior(&self) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.dim * self.dim);
        for row in 1..=self.dim {
            let start = self.idx(row, 1);
            out.extend_from_slice(&self.data[start..start + self.dim]);
        }
        out
    }

    /// `(row, col)` of the ghost cells on side `dir`, excluding corners.
    pub fn ghost_cells(&self, dir: Direction) -> impl Iterator<Item = (usize, usize)> {
        let last = self.dim + 1;
        (1..=self.dim).map(move |k| match dir {
            Direction::Top => (0, k),
            Direction::Bottom => (last, k),
            Direction::Left => (k, 0),
            Direction::Right => (k, last),
        })
    }

    /// `(row, col)` of the outermost interior cells on side `dir`.
    pub fn edge_cells(&self, dir: Direction) -> impl Iterator<Item = (usize, usize)> {
        let dim = self.dim;
        (1..=dim).map(move |k| match dir {
            Direction::Top => (1, k),
            Direction::Bottom => (dim, k),
            Direction::Left => (k, 1),
            Direction::Right => (k, dim),
        })
    }

    /// Append the outermost interior row/column on side `dir` to `out`.
    pub fn pack_edge(&self, dir: Direction, out: &mut Vec<f64>) {
        out.reserve(self.dim);
        out.extend(self.edge_cells(dir).map(|(r, c)| self.get(r, c)));
    }

    /// Overwrite the ghost row/column on side `dir` with `values`.
    pub fn unpack_ghost(&mut self, dir: Direction, values: &[f64]) -> Result<(), JacobiError> {
        if values.len() != self.dim {
            return Err(JacobiError::InvalidParameter(format!(
                "ghost {dir} expects {} values, got {}",
                self.dim,
                values.len()
            )));
        }
        let cells: Vec<_> = self.ghost_cells(dir).collect();
        for ((r, c), &v) in cells.into_iter().zip(values) {
            self.set(r, c, v);
        }
        Ok(())
    }

    /// Fill every ghost cell on side `dir`, corners included.
    pub(crate) fn fill_side(&mut self, dir: Direction, value: f64) {
        let last = self.dim + 1;
        for k in 0..=last {
            match dir {
                Direction::Top => self.set(0, k, value),
                Direction::Bottom => self.set(last, k, value),
                Direction::Left => self.set(k, 0, value),
                Direction::Right => self.set(k, last, value),
            }
        }
    }
}

/// Jacobi read/write buffer pair for one worker.
///
/// `fixed` records, per direction, the boundary value that side must keep
/// because it lies on the true global edge (`None` for sides fed by a
/// neighbour's halo).
#[derive(Clone, Debug)]
pub struct GridPair {
    current: LocalGrid,
    next: LocalGrid,
    fixed: [Option<f64>; 4],
}

impl GridPair {
    /// Both buffers start as copies of `initial`, so fixed boundary cells
    /// are present in whichever buffer the sweep reads.
    pub fn new(initial: LocalGrid, fixed: [Option<f64>; 4]) -> Self {
        Self {
            next: initial.clone(),
            current: initial,
            fixed,
        }
    }

    #[inline]
    pub fn current(&self) -> &LocalGrid {
        &self.current
    }

    #[inline]
    pub fn current_mut(&mut self) -> &mut LocalGrid {
        &mut self.current
    }

    #[inline]
    pub fn next(&self) -> &LocalGrid {
        &self.next
    }

    /// Borrow `current` for reading and `next` for writing at the same time.
    #[inline]
    pub fn split(&mut self) -> (&LocalGrid, &mut LocalGrid) {
        (&self.current, &mut self.next)
    }

    /// Swap buffer roles after a completed sweep.
    #[inline]
    pub fn swap(&mut self) {
        std::mem::swap(&mut self.current, &mut self.next);
    }

    /// Fixed global-edge value on side `dir`, if that side is a global edge.
    #[inline]
    pub fn fixed_value(&self, dir: Direction) -> Option<f64> {
        self.fixed[dir.code() as usize]
    }

    pub fn into_current(self) -> LocalGrid {
        self.current
    }
}

impl DebugInvariants for GridPair {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "GridPair boundary");
    }

    fn validate_invariants(&self) -> Result<(), JacobiError> {
        if self.current.dim() != self.next.dim() {
            return Err(JacobiError::InvariantViolation(format!(
                "buffer dims differ: {} vs {}",
                self.current.dim(),
                self.next.dim()
            )));
        }
        for dir in Direction::ALL {
            let Some(expected) = self.fixed_value(dir) else {
                continue;
            };
            for grid in [&self.current, &self.next] {
                for (r, c) in grid.ghost_cells(dir) {
                    let got = grid.get(r, c);
                    if got != expected {
                        return Err(JacobiError::InvariantViolation(format!(
                            "global {dir} boundary cell ({r},{c}) holds {got}, expected {expected}"
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}
