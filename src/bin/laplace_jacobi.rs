//! Command-line front end: parse, validate, run, report.
//!
//! ```text
//! laplace-jacobi [DIMENSION] [TOPOLOGY] [--tolerance T] [--max-iterations K] ...
//! ```
//!
//! `TOPOLOGY * TOPOLOGY` workers are started, and `TOPOLOGY` must evenly
//! divide `DIMENSION`. Malformed arguments and invalid combinations exit
//! with status 1 before any computation; runtime failures exit with status 2.

use std::process::ExitCode;
use std::time::Duration;

use clap::error::ErrorKind;
use clap::{Parser, ValueEnum};
use laplace_jacobi::config::DEFAULT_DIMENSION;
use laplace_jacobi::prelude::*;

const USAGE_NOTE: &str = "note: topology*topology must equal the number of workers \
and topology must evenly divide dimension";

#[derive(Copy, Clone, Debug, ValueEnum)]
enum DeviceArg {
    Host,
    Pool,
}

impl From<DeviceArg> for DeviceKind {
    fn from(arg: DeviceArg) -> Self {
        match arg {
            DeviceArg::Host => DeviceKind::Host,
            DeviceArg::Pool => DeviceKind::Pool,
        }
    }
}

/// Distributed Jacobi solver for the 2D Laplace equation
#[derive(Parser, Debug)]
#[command(name = "laplace-jacobi", version, after_help = USAGE_NOTE)]
struct Cli {
    /// Global interior points per axis
    dimension: Option<usize>,

    /// Workers per axis
    topology: Option<usize>,

    /// Stop once the largest change of an iteration drops below this
    #[arg(long, default_value_t = 1.0e-5)]
    tolerance: f64,

    /// Iteration cap
    #[arg(long, default_value_t = 1000)]
    max_iterations: u32,

    /// Fixed value of the top edge (other edges are zero)
    #[arg(long, default_value_t = 300.0)]
    boundary_value: f64,

    /// Sweep device kind
    #[arg(long, value_enum, default_value_t = DeviceArg::Pool)]
    device: DeviceArg,

    /// Number of devices workers are bound to round-robin
    #[arg(long, default_value_t = 1)]
    devices: usize,

    /// Threads per pool device (0 = share the machine evenly)
    #[arg(long, default_value_t = 0)]
    threads: usize,

    /// Log progress every this many iterations (0 = never)
    #[arg(long, default_value_t = 100)]
    report_every: u32,

    /// Seconds a worker waits for a neighbour message before giving up
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    /// Print the per-worker reports as JSON
    #[arg(long)]
    json: bool,

    /// Run one worker per MPI process instead of one per thread
    #[cfg(feature = "mpi-support")]
    #[arg(long)]
    mpi: bool,
}

impl Cli {
    fn config(&self) -> SolverConfig {
        let mut cfg = SolverConfig::default()
            .with_dimension(self.dimension.unwrap_or(DEFAULT_DIMENSION))
            .with_tolerance(self.tolerance)
            .with_max_iterations(self.max_iterations)
            .with_boundary_value(self.boundary_value)
            .with_device(DeviceConfig {
                kind: self.device.into(),
                device_count: self.devices,
                threads_per_device: self.threads,
            })
            .with_report_every(self.report_every)
            .with_comm_timeout(Duration::from_secs(self.timeout));
        cfg.topology = self.topology;
        cfg
    }
}

fn run_threads(mut config: SolverConfig) -> Result<Vec<SolveReport>, JacobiError> {
    config.topology.get_or_insert(1);
    let outcomes = run_threaded(&config)?;
    Ok(outcomes.into_iter().map(|o| o.report).collect())
}

#[cfg(feature = "mpi-support")]
fn run_mpi(config: SolverConfig) -> Result<Vec<SolveReport>, JacobiError> {
    let comm = MpiComm::new()?;
    let out = JacobiSolver::new(comm, config)?.solve()?;
    Ok(vec![out.report])
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => {
            eprint!("{e}");
            eprintln!("{USAGE_NOTE}");
            return ExitCode::from(1);
        }
    };
    let config = cli.config();

    #[cfg(feature = "mpi-support")]
    let result = if cli.mpi {
        run_mpi(config)
    } else {
        run_threads(config)
    };
    #[cfg(not(feature = "mpi-support"))]
    let result = run_threads(config);

    match result {
        Ok(reports) => {
            if cli.json {
                match serde_json::to_string_pretty(&reports) {
                    Ok(s) => println!("{s}"),
                    Err(e) => {
                        eprintln!("ERROR: could not encode reports: {e}");
                        return ExitCode::from(2);
                    }
                }
            } else {
                for r in &reports {
                    println!(
                        "Rank:{} {} Jacobi solver took {:.6} secs for {} iterations to achieve error of {:.6} (local {:.6})",
                        r.rank, r.device_kind, r.compute_secs, r.iterations, r.global_error, r.local_error
                    );
                }
            }
            ExitCode::SUCCESS
        }
        Err(e) if e.is_configuration() => {
            eprintln!("ERROR: {e}");
            eprintln!("Usage: laplace-jacobi [DIMENSION] [TOPOLOGY] [OPTIONS]\n{USAGE_NOTE}");
            ExitCode::from(1)
        }
        Err(e) => {
            eprintln!("ERROR: {e}");
            ExitCode::from(2)
        }
    }
}
