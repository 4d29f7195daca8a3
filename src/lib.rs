#![cfg_attr(docsrs, feature(doc_cfg))]
//! # laplace-jacobi
//!
//! laplace-jacobi computes the steady state of the 2D Laplace equation on a
//! square grid with the Jacobi method, split over a square Cartesian grid of
//! workers. Each worker owns one block of the domain plus a one-cell ghost
//! border, exchanges that border with its four neighbours every iteration,
//! runs the 4-point averaging sweep on a compute device, and joins a global
//! max-reduction that decides whether to stop.
//!
//! ## Features
//! - Cartesian topology and square domain decomposition
//! - Double-buffered local grids with fixed global boundary conditions
//! - Halo exchange over pluggable communication backends (serial, threads, MPI)
//! - Serial and thread-pool sweep devices
//! - Lock-step global convergence test
//! - A serial reference solver for comparison runs
//!
//! ## Determinism
//!
//! The result does not depend on how the domain is split: every interior
//! cell sees exactly the values of the previous iteration, whichever worker
//! owns its neighbours. A `1 × 1` topology reproduces the serial solver.
//!
//! ## Usage
//!
//! ```no_run
//! use laplace_jacobi::prelude::*;
//!
//! let config = SolverConfig::default().with_dimension(64).with_topology(2);
//! let outcomes = run_threaded(&config).expect("solver failed");
//! for out in &outcomes {
//!     println!("rank {}: {} iterations", out.report.rank, out.report.iterations);
//! }
//! ```

pub mod algs;
pub mod config;
pub mod data;
pub mod debug_invariants;
pub mod device;
pub mod jacobi_error;
pub mod solver;
pub mod topology;
pub mod world;

pub use debug_invariants::DebugInvariants;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::algs::communicator::{CommTag, Communicator, NoComm, RayonComm, Wait};
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::algs::reduction::{ConvergenceCriteria, Termination};
    pub use crate::algs::serial::solve_serial;
    pub use crate::config::SolverConfig;
    pub use crate::data::bc::BoundaryConditions;
    pub use crate::data::local_grid::{GridPair, LocalGrid};
    pub use crate::debug_invariants::DebugInvariants;
    pub use crate::device::{DeviceConfig, DeviceKind, SweepDevice};
    pub use crate::jacobi_error::JacobiError;
    pub use crate::solver::{JacobiSolver, SolveReport, WorkerOutcome};
    pub use crate::topology::cart::{CartTopology, Coord, Decomposition, Direction, Worker};
    pub use crate::world::{run_threaded, run_threaded_with, stitch_global};
}
