//! Re-export public algorithms.

pub mod communicator;
pub mod halo_exchange;
pub mod reduction;
pub mod serial;
pub mod wire;

pub use halo_exchange::exchange_halos;
pub use serial::solve_serial;
