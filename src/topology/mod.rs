//! Worker topology: Cartesian layout, neighbours and domain decomposition.

pub mod cart;

pub use cart::{CartTopology, Coord, Decomposition, Direction, Neighbors, Worker};
