//! 2D Cartesian worker topology and square domain decomposition.
//!
//! Workers are laid out on a non-periodic `side × side` grid. Ranks map to
//! coordinates in row-major order over `(x, y)`: `rank = x * side + y`, where
//! `x` selects the column block (left/right neighbours) and `y` selects the
//! row block (top/bottom neighbours).
//!
//! Every worker derives its own [`Worker`] record from `(rank, side)` alone,
//! so all workers agree on who their peers are without a central table.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::jacobi_error::JacobiError;

/// One of the four stencil directions, seen from the worker that owns the grid.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u16)]
pub enum Direction {
    /// Towards global row 0.
    Top = 0,
    /// Towards the last global row.
    Bottom = 1,
    /// Towards global column 0.
    Left = 2,
    /// Towards the last global column.
    Right = 3,
}

impl Direction {
    /// All directions, in exchange order.
    pub const ALL: [Direction; 4] = [
        Direction::Top,
        Direction::Bottom,
        Direction::Left,
        Direction::Right,
    ];

    /// The side the neighbour sees us on.
    #[inline]
    pub const fn opposite(self) -> Direction {
        match self {
            Direction::Top => Direction::Bottom,
            Direction::Bottom => Direction::Top,
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        }
    }

    /// Stable numeric code used on the wire.
    #[inline]
    pub const fn code(self) -> u16 {
        self as u16
    }

    /// Inverse of [`Direction::code`].
    pub fn from_code(code: u16) -> Option<Direction> {
        match code {
            0 => Some(Direction::Top),
            1 => Some(Direction::Bottom),
            2 => Some(Direction::Left),
            3 => Some(Direction::Right),
            _ => None,
        }
    }

    #[inline]
    const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Direction::Top => "top",
            Direction::Bottom => "bottom",
            Direction::Left => "left",
            Direction::Right => "right",
        };
        f.write_str(name)
    }
}

/// Position of a worker in the topology.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coord {
    /// Column block index in `[0, side)`.
    pub x: usize,
    /// Row block index in `[0, side)`.
    pub y: usize,
}

/// Neighbour ranks indexed by [`Direction`]; `None` at the domain edge.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Neighbors([Option<usize>; 4]);

impl Neighbors {
    #[inline]
    pub fn get(&self, dir: Direction) -> Option<usize> {
        self.0[dir.index()]
    }

    /// Directions that have a neighbour, paired with that neighbour's rank.
    pub fn iter(&self) -> impl Iterator<Item = (Direction, usize)> + '_ {
        Direction::ALL
            .into_iter()
            .filter_map(|d| self.get(d).map(|r| (d, r)))
    }

    /// Number of real neighbours (0..=4).
    pub fn count(&self) -> usize {
        self.0.iter().flatten().count()
    }
}

/// Immutable per-worker view of the topology.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Worker {
    pub rank: usize,
    pub coord: Coord,
    pub neighbors: Neighbors,
}

impl Worker {
    /// True if `dir` points at the true global boundary (no neighbour there).
    #[inline]
    pub fn on_global_edge(&self, dir: Direction) -> bool {
        self.neighbors.get(dir).is_none()
    }
}

/// Non-periodic `side × side` Cartesian arrangement of workers.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartTopology {
    side: usize,
}

impl CartTopology {
    /// Build the topology for `workers` participants with `side` per axis.
    ///
    /// Returns [`JacobiError::TopologyMismatch`] unless `side * side == workers`.
    pub fn new(workers: usize, side: usize) -> Result<Self, JacobiError> {
        if side == 0 || side.checked_mul(side) != Some(workers) {
            return Err(JacobiError::TopologyMismatch { workers, side });
        }
        Ok(Self { side })
    }

    #[inline]
    pub fn side(&self) -> usize {
        self.side
    }

    /// Total number of workers.
    #[inline]
    pub fn size(&self) -> usize {
        self.side * self.side
    }

    /// Coordinate of `rank`; `rank` must be `< size()`.
    #[inline]
    pub fn coords(&self, rank: usize) -> Coord {
        debug_assert!(rank < self.size(), "rank {rank} out of range");
        Coord {
            x: rank / self.side,
            y: rank % self.side,
        }
    }

    /// Inverse of [`CartTopology::coords`].
    #[inline]
    pub fn rank_at(&self, coord: Coord) -> usize {
        coord.x * self.side + coord.y
    }

    /// Shift `rank` one step in `dir`; `None` when that leaves the grid.
    pub fn shift(&self, rank: usize, dir: Direction) -> Option<usize> {
        let Coord { x, y } = self.coords(rank);
        let (nx, ny) = match dir {
            Direction::Top => (Some(x), y.checked_sub(1)),
            Direction::Bottom => (Some(x), Some(y + 1)),
            Direction::Left => (x.checked_sub(1), Some(y)),
            Direction::Right => (Some(x + 1), Some(y)),
        };
        match (nx, ny) {
            (Some(nx), Some(ny)) if nx < self.side && ny < self.side => {
                Some(self.rank_at(Coord { x: nx, y: ny }))
            }
            _ => None,
        }
    }

    /// The full per-worker record for `rank`.
    pub fn worker(&self, rank: usize) -> Result<Worker, JacobiError> {
        if rank >= self.size() {
            return Err(JacobiError::InvalidParameter(format!(
                "rank {rank} outside topology of {} workers",
                self.size()
            )));
        }
        let mut nbrs = [None; 4];
        for dir in Direction::ALL {
            nbrs[dir.index()] = self.shift(rank, dir);
        }
        Ok(Worker {
            rank,
            coord: self.coords(rank),
            neighbors: Neighbors(nbrs),
        })
    }
}

/// Square split of an `N × N` interior over a [`CartTopology`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decomposition {
    dimension: usize,
    topology: CartTopology,
    local_dim: usize,
}

impl Decomposition {
    /// Validate `(dimension, workers, side)` and compute the per-worker size.
    pub fn new(dimension: usize, workers: usize, side: usize) -> Result<Self, JacobiError> {
        let topology = CartTopology::new(workers, side)?;
        if dimension == 0 || dimension % side != 0 {
            return Err(JacobiError::IndivisibleDimension { dimension, side });
        }
        let cells = dimension.checked_mul(dimension).ok_or_else(|| {
            JacobiError::InvalidParameter(format!("dimension {dimension} is too large"))
        })?;
        let local_dim = (cells / workers).isqrt();
        debug_assert_eq!(local_dim, dimension / side);
        Ok(Self {
            dimension,
            topology,
            local_dim,
        })
    }

    /// Global interior points per axis.
    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn topology(&self) -> &CartTopology {
        &self.topology
    }

    /// Interior points per axis owned by each worker.
    #[inline]
    pub fn local_dim(&self) -> usize {
        self.local_dim
    }

    /// Global `(row, col)` of the worker's first interior cell, counting the
    /// global boundary ring as row/column 0.
    pub fn global_origin(&self, coord: Coord) -> (usize, usize) {
        (coord.y * self.local_dim + 1, coord.x * self.local_dim + 1)
    }
}
