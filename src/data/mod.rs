//! Grid storage and boundary conditions.

pub mod bc;
pub mod local_grid;
