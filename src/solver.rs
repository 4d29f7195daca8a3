//! The per-worker Jacobi driver.
//!
//! Every worker runs the same loop in lock-step:
//!
//! ```text
//! RUNNING → (EXCHANGE → SWEEP → REDUCE → check)* → CONVERGED | EXHAUSTED
//! ```
//!
//! The only synchronization points are the neighbour halo exchange and the
//! global error reduction. Because the stop decision is taken from the
//! reduced error, all workers leave the loop in the same round with the same
//! iteration count. Any error is fatal: the worker aborts the world so its
//! peers do not wait for messages that will never come.

use std::time::Instant;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::algs::communicator::{Communicator, SolverCommTags};
use crate::algs::halo_exchange::exchange_halos;
#[cfg(any(debug_assertions, feature = "check-invariants"))]
use crate::algs::reduction::max_interior_change;
use crate::algs::reduction::{Termination, global_error};
use crate::config::SolverConfig;
use crate::data::bc::initialize_grid_pair;
use crate::data::local_grid::{GridPair, LocalGrid};
use crate::debug_invariants::DebugInvariants;
use crate::device::{SweepDevice, bind_device};
use crate::jacobi_error::JacobiError;
use crate::topology::cart::{Coord, Decomposition, Worker};

/// What one worker reports at the end of a run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SolveReport {
    pub rank: usize,
    pub coord: Coord,
    /// Completed sweeps; identical on every worker.
    pub iterations: u32,
    /// Reduced error of the last round; identical on every worker.
    pub global_error: f64,
    /// This worker's own error in the last round.
    pub local_error: f64,
    pub termination: Termination,
    pub device: usize,
    pub device_kind: String,
    pub init_secs: f64,
    pub compute_secs: f64,
}

/// Report plus the final grid of one worker.
#[derive(Clone, Debug)]
pub struct WorkerOutcome {
    pub report: SolveReport,
    pub grid: LocalGrid,
}

/// Errors of a single iteration.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct StepErrors {
    pub local: f64,
    pub global: f64,
}

pub struct JacobiSolver<C: Communicator> {
    comm: C,
    config: SolverConfig,
    decomp: Decomposition,
    worker: Worker,
    tags: SolverCommTags,
    device: OnceCell<Box<dyn SweepDevice>>,
}

impl<C: Communicator> JacobiSolver<C> {
    /// Validate `config` against the communicator's world and derive this
    /// worker's place in the topology.
    pub fn new(comm: C, config: SolverConfig) -> Result<Self, JacobiError> {
        let decomp = config.validate(comm.size())?;
        let worker = decomp.topology().worker(comm.rank())?;
        Ok(Self {
            comm,
            config,
            decomp,
            worker,
            tags: SolverCommTags::default(),
            device: OnceCell::new(),
        })
    }

    pub fn with_tags(mut self, tags: SolverCommTags) -> Self {
        self.tags = tags;
        self
    }

    /// Use `device` instead of binding one from the configuration.
    ///
    /// The first device wins: once a device has been injected or bound,
    /// later calls return [`JacobiError::DeviceError`] and keep it.
    pub fn with_device(self, device: Box<dyn SweepDevice>) -> Result<Self, JacobiError> {
        let id = device.id();
        match self.device.set(device) {
            Ok(()) => Ok(self),
            Err(_) => Err(JacobiError::DeviceError {
                device: id,
                reason: "worker already has a device".into(),
            }),
        }
    }

    pub fn worker(&self) -> &Worker {
        &self.worker
    }

    pub fn decomposition(&self) -> &Decomposition {
        &self.decomp
    }

    pub fn comm(&self) -> &C {
        &self.comm
    }

    /// Bind this worker's device; repeated calls return the same device.
    pub fn device(&self) -> Result<&dyn SweepDevice, JacobiError> {
        self.device
            .get_or_try_init(|| bind_device(self.worker.rank, self.comm.size(), &self.config.device))
            .map(|d| d.as_ref())
    }

    /// Fresh double buffer with this worker's boundary conditions.
    pub fn initial_grids(&self) -> GridPair {
        initialize_grid_pair(&self.worker, self.decomp.local_dim(), &self.config.boundary)
    }

    /// One round: exchange halos of `current`, sweep into `next`, reduce the
    /// error, swap. `iteration` is the zero-based round number.
    pub fn step(&self, grids: &mut GridPair, iteration: u32) -> Result<StepErrors, JacobiError> {
        let device = self.device()?;
        exchange_halos(
            grids.current_mut(),
            &self.worker,
            &self.comm,
            self.tags.halo,
            iteration,
        )?;
        let (current, next) = grids.split();
        let local = device.sweep(current, next)?;
        #[cfg(any(debug_assertions, feature = "check-invariants"))]
        {
            let seen = max_interior_change(current, next);
            if seen != local && !(seen.is_nan() && local.is_nan()) {
                return Err(JacobiError::InvariantViolation(format!(
                    "device {} reported error {local}, buffers differ by {seen}",
                    device.id()
                )));
            }
        }
        grids.debug_assert_invariants();
        let global = global_error(&self.comm, self.tags.reduce, local)?;
        grids.swap();
        Ok(StepErrors { local, global })
    }

    /// Run to convergence or exhaustion. On failure the world is aborted
    /// before the error is returned.
    pub fn solve(&self) -> Result<WorkerOutcome, JacobiError> {
        match self.run() {
            Ok(out) => Ok(out),
            Err(err) => {
                log::warn!("[rank {}] aborting run: {err}", self.worker.rank);
                self.comm.abort();
                Err(err)
            }
        }
    }

    fn announce(&self) {
        let n = self.decomp.dimension();
        let d = self.decomp.local_dim();
        log::info!(
            "Global matrix with {n} by {n} interior points is being divided across {} workers",
            self.comm.size()
        );
        log::info!("(Actual global size is {} by {} with border)", n + 2, n + 2);
        log::info!(
            "Workers are laid out in a Cartesian grid with {} workers in each dimension",
            self.decomp.topology().side()
        );
        log::info!("Each worker is working on sub-matrices with {d} by {d} interior points");
        if self.comm.is_no_comm() {
            log::debug!("single worker without a communicator: no halo exchange");
        }
    }

    fn run(&self) -> Result<WorkerOutcome, JacobiError> {
        let rank = self.worker.rank;
        if rank == 0 {
            self.announce();
        }
        self.comm.barrier()?;

        let t0 = Instant::now();
        let device = self.device()?;
        let mut grids = self.initial_grids();
        grids.debug_assert_invariants();
        let init_secs = t0.elapsed().as_secs_f64();
        log::info!("[rank {rank}] init took {init_secs:.6} s, begin compute");

        let criteria = self.config.criteria;
        let t1 = Instant::now();
        let mut iteration = 0u32;
        let (termination, last) = loop {
            let errs = self.step(&mut grids, iteration)?;
            iteration += 1;
            if rank == 0 && self.config.report_every > 0 && iteration % self.config.report_every == 0 {
                log::debug!("iteration {iteration}: global error {:.6e}", errs.global);
            }
            if let Some(t) = criteria.check(iteration, errs.global) {
                break (t, errs);
            }
        };
        let compute_secs = t1.elapsed().as_secs_f64();

        log::info!(
            "[rank {rank}] Jacobi solver took {compute_secs:.6} s for {iteration} iterations to reach error {:.6}, local {:.6} ({termination:?})",
            last.global,
            last.local
        );

        Ok(WorkerOutcome {
            report: SolveReport {
                rank,
                coord: self.worker.coord,
                iterations: iteration,
                global_error: last.global,
                local_error: last.local,
                termination,
                device: device.id(),
                device_kind: device.name().to_string(),
                init_secs,
                compute_secs,
            },
            grid: grids.into_current(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::NoComm;
    use crate::device::{DeviceConfig, DeviceKind, HostDevice};

    fn small(dim: usize) -> SolverConfig {
        SolverConfig::default()
            .with_dimension(dim)
            .with_device(DeviceConfig {
                kind: DeviceKind::Host,
                device_count: 1,
                threads_per_device: 1,
            })
    }

    #[test]
    fn rejects_bad_world_before_computing() {
        let cfg = small(4).with_topology(2);
        assert!(matches!(
            JacobiSolver::new(NoComm, cfg),
            Err(JacobiError::TopologyMismatch { workers: 1, side: 2 })
        ));
    }

    #[test]
    fn device_binding_is_idempotent() {
        let solver = JacobiSolver::new(NoComm, small(4)).unwrap();
        let a = solver.device().unwrap() as *const dyn SweepDevice as *const ();
        let b = solver.device().unwrap() as *const dyn SweepDevice as *const ();
        assert_eq!(a, b);
    }

    #[test]
    fn injected_device_is_used() {
        let solver = JacobiSolver::new(NoComm, small(4))
            .unwrap()
            .with_device(Box::new(HostDevice::new(7)))
            .unwrap();
        assert_eq!(solver.device().unwrap().id(), 7);
    }

    #[test]
    fn second_device_is_rejected_and_first_kept() {
        let solver = JacobiSolver::new(NoComm, small(4))
            .unwrap()
            .with_device(Box::new(HostDevice::new(7)))
            .unwrap();
        let err = solver.with_device(Box::new(HostDevice::new(8))).err().unwrap();
        assert!(matches!(err, JacobiError::DeviceError { device: 8, .. }));

        let bound = JacobiSolver::new(NoComm, small(4)).unwrap();
        assert_eq!(bound.device().unwrap().id(), 0);
        assert!(bound.with_device(Box::new(HostDevice::new(3))).is_err());
    }

    #[test]
    fn stops_at_iteration_cap() {
        let cfg = small(8).with_tolerance(0.0).with_max_iterations(5);
        let out = JacobiSolver::new(NoComm, cfg).unwrap().solve().unwrap();
        assert_eq!(out.report.iterations, 5);
        assert_eq!(out.report.termination, Termination::Exhausted);
    }

    #[test]
    fn converges_on_tiny_grid() {
        let cfg = small(4).with_tolerance(1e-6).with_max_iterations(10_000);
        let out = JacobiSolver::new(NoComm, cfg).unwrap().solve().unwrap();
        assert_eq!(out.report.termination, Termination::Converged);
        assert!(out.report.global_error < 1e-6);
        assert_eq!(out.report.global_error, out.report.local_error);
    }
}
