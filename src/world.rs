//! In-process worker worlds: bootstrap, run, and gather.
//!
//! [`run_threaded`] plays the role of a process launcher: it builds a
//! `side × side` [`RayonComm`] world, runs one [`JacobiSolver`] per OS
//! thread and collects every worker's outcome. [`stitch_global`] puts the
//! worker interiors back together into one global field.

use crate::algs::communicator::{Communicator, RayonComm};
use crate::algs::serial::initial_field;
use crate::config::SolverConfig;
use crate::device::SweepDevice;
use crate::jacobi_error::JacobiError;
use crate::solver::{JacobiSolver, WorkerOutcome};
use crate::topology::cart::Decomposition;

/// Aborts the world if the owning worker thread unwinds.
struct AbortOnPanic(RayonComm);

impl Drop for AbortOnPanic {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.abort();
        }
    }
}

/// Number of workers a threaded run of `config` uses: `topology²`, one
/// worker when no topology is set.
pub fn threaded_world_size(config: &SolverConfig) -> Result<usize, JacobiError> {
    let side = config.topology.unwrap_or(1);
    side.checked_mul(side).ok_or_else(|| {
        JacobiError::InvalidParameter(format!("topology {side} is too large"))
    })
}

/// Solve `config` with one thread per worker. Outcomes are ordered by rank.
///
/// If any worker fails, the world is aborted and the most informative
/// error is returned: a worker's own failure is preferred over the
/// communication errors its peers observe as a consequence.
pub fn run_threaded(config: &SolverConfig) -> Result<Vec<WorkerOutcome>, JacobiError> {
    run_threaded_with(config, |_| None)
}

/// [`run_threaded`] where `device_for(rank)` may supply a worker's device;
/// ranks it returns `None` for bind one from the configuration.
pub fn run_threaded_with<F>(
    config: &SolverConfig,
    device_for: F,
) -> Result<Vec<WorkerOutcome>, JacobiError>
where
    F: Fn(usize) -> Option<Box<dyn SweepDevice>> + Sync,
{
    let workers = threaded_world_size(config)?;
    config.validate(workers)?;

    let world: Vec<RayonComm> = RayonComm::world(workers)
        .into_iter()
        .map(|c| c.with_timeout(config.comm_timeout))
        .collect();
    let controller = world[0].clone();
    let device_for = &device_for;

    let results: Vec<Result<WorkerOutcome, JacobiError>> = std::thread::scope(|s| {
        let mut handles = Vec::with_capacity(workers);
        for comm in world {
            let rank = comm.rank();
            let cfg = config.clone();
            let spawned = std::thread::Builder::new()
                .name(format!("jacobi-worker-{rank}"))
                .spawn_scoped(s, move || {
                    let _guard = AbortOnPanic(comm.clone());
                    let mut solver = JacobiSolver::new(comm, cfg)?;
                    if let Some(device) = device_for(rank) {
                        solver = solver.with_device(device)?;
                    }
                    solver.solve()
                });
            match spawned {
                Ok(h) => handles.push((rank, Some(h))),
                Err(e) => {
                    log::warn!("failed to spawn worker {rank}: {e}");
                    controller.abort();
                    handles.push((rank, None));
                }
            }
        }
        handles
            .into_iter()
            .map(|(rank, h)| match h {
                Some(h) => h.join().unwrap_or(Err(JacobiError::WorkerPanicked(rank))),
                None => Err(JacobiError::comm(rank, "worker thread could not be spawned")),
            })
            .collect()
    });

    let mut outcomes = Vec::with_capacity(workers);
    let mut first_comm_err = None;
    let mut first_other_err = None;
    for res in results {
        match res {
            Ok(out) => outcomes.push(out),
            Err(e @ JacobiError::CommError { .. }) => {
                first_comm_err.get_or_insert(e);
            }
            Err(e) => {
                first_other_err.get_or_insert(e);
            }
        }
    }
    match first_other_err.or(first_comm_err) {
        Some(err) => Err(err),
        None => Ok(outcomes),
    }
}

/// Global `(N + 2)²` field: boundary ring from the configuration, interior
/// copied from every worker's final grid.
pub fn stitch_global(
    decomp: &Decomposition,
    config: &SolverConfig,
    outcomes: &[WorkerOutcome],
) -> Result<Vec<f64>, JacobiError> {
    let n = decomp.dimension() + 2;
    let d = decomp.local_dim();
    if outcomes.len() != decomp.topology().size() {
        return Err(JacobiError::InvalidParameter(format!(
            "expected {} worker outcomes, got {}",
            decomp.topology().size(),
            outcomes.len()
        )));
    }
    let mut field = initial_field(decomp.dimension(), &config.boundary);
    for out in outcomes {
        if out.grid.dim() != d {
            return Err(JacobiError::InvalidParameter(format!(
                "worker {} returned a {}-wide grid, expected {d}",
                out.report.rank,
                out.grid.dim()
            )));
        }
        let (row0, col0) = decomp.global_origin(out.report.coord);
        for (r, chunk) in out.grid.interior().chunks_exact(d).enumerate() {
            let start = (row0 + r) * n + col0;
            field[start..start + d].copy_from_slice(chunk);
        }
    }
    Ok(field)
}
