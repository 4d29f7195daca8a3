mod util;

use std::time::Duration;

use laplace_jacobi::data::local_grid::LocalGrid;
use laplace_jacobi::device::HostDevice;
use laplace_jacobi::prelude::*;
use serial_test::serial;
use util::{host_config, in_world};

fn ghost_values(g: &LocalGrid, dir: Direction) -> Vec<f64> {
    g.ghost_cells(dir).map(|(r, c)| g.get(r, c)).collect()
}

#[test]
fn global_boundary_never_changes() {
    let cfg = host_config(5, 1);
    let solver = JacobiSolver::new(NoComm, cfg.clone()).unwrap();
    let mut grids = solver.initial_grids();
    for it in 0..25 {
        solver.step(&mut grids, it).unwrap();
        for dir in Direction::ALL {
            let want = cfg.boundary.value(dir);
            assert!(
                ghost_values(grids.current(), dir).iter().all(|&v| v == want),
                "iteration {it}, {dir}"
            );
        }
    }
}

#[test]
#[serial]
fn edge_workers_keep_their_boundary_in_a_grid_of_workers() {
    let cfg = host_config(6, 3).with_max_iterations(15);
    let outcomes = run_threaded(&cfg).unwrap();
    let topo = CartTopology::new(9, 3).unwrap();
    for out in &outcomes {
        let w = topo.worker(out.report.rank).unwrap();
        for dir in Direction::ALL {
            if w.on_global_edge(dir) {
                let want = cfg.boundary.value(dir);
                assert!(ghost_values(&out.grid, dir).iter().all(|&v| v == want));
            }
        }
    }
}

#[test]
fn converged_field_is_a_fixed_point() {
    let criteria = ConvergenceCriteria {
        tolerance: 1e-10,
        max_iterations: 100_000,
    };
    let bc = BoundaryConditions::default();
    let sol = solve_serial(4, &bc, &criteria);
    assert_eq!(sol.termination, Termination::Converged);

    let mut current = LocalGrid::zeros(4);
    current.as_mut_slice().copy_from_slice(&sol.field);
    let mut next = current.clone();
    let change = HostDevice::new(0).sweep(&current, &mut next).unwrap();
    assert!(change < 1e-10, "{change}");
    for (a, b) in current.interior().iter().zip(next.interior()) {
        assert!((a - b).abs() < 1e-9);
    }
}

#[test]
fn values_stay_within_boundary_range() {
    let sol = solve_serial(
        6,
        &BoundaryConditions::default(),
        &ConvergenceCriteria::default(),
    );
    assert!(sol.field.iter().all(|&v| (0.0..=300.0).contains(&v)));
}

#[test]
#[serial]
fn every_worker_stops_at_the_cap() {
    let cfg = host_config(4, 2).with_tolerance(0.0).with_max_iterations(7);
    let outcomes = run_threaded(&cfg).unwrap();
    assert_eq!(outcomes.len(), 4);
    for out in outcomes {
        assert_eq!(out.report.iterations, 7);
        assert_eq!(out.report.termination, Termination::Exhausted);
    }
}

#[test]
fn convergence_wins_on_the_last_allowed_iteration() {
    let cfg = host_config(4, 1).with_tolerance(1e9).with_max_iterations(1);
    let out = &run_threaded(&cfg).unwrap()[0];
    assert_eq!(out.report.iterations, 1);
    assert_eq!(out.report.termination, Termination::Converged);
}

#[test]
#[serial]
fn reports_agree_on_the_global_error() {
    let cfg = host_config(8, 2).with_max_iterations(50);
    let outcomes = run_threaded(&cfg).unwrap();
    let g = outcomes[0].report.global_error;
    for out in &outcomes {
        assert_eq!(out.report.global_error, g);
        assert!(out.report.local_error <= g);
    }
    assert!(outcomes.iter().any(|o| o.report.local_error == g));
}

#[test]
fn indivisible_dimension_fails_before_running() {
    let err = run_threaded(&host_config(10, 3)).unwrap_err();
    assert!(matches!(
        err,
        JacobiError::IndivisibleDimension { dimension: 10, side: 3 }
    ));
    assert!(err.is_configuration());
}

#[test]
fn missing_peer_aborts_instead_of_hanging() {
    // four-rank world, rank 3 never shows up
    let cfg = host_config(4, 2).with_max_iterations(5);
    let results = in_world(4, Duration::from_millis(300), |comm| {
        if comm.rank() == 3 {
            return None;
        }
        let res = JacobiSolver::new(comm.clone(), cfg.clone()).unwrap().solve();
        Some((res.is_err(), comm.is_aborted()))
    });
    for r in results.into_iter().flatten() {
        assert_eq!(r, (true, true));
    }
}

#[test]
#[serial]
fn runs_with_logging_enabled() {
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(log::LevelFilter::Trace)
        .try_init();
    let cfg = host_config(4, 2).with_max_iterations(3).with_report_every(1);
    let outcomes = run_threaded(&cfg).unwrap();
    assert_eq!(outcomes.len(), 4);
}

#[test]
fn reports_serialize_to_json() {
    let out = run_threaded(&host_config(4, 1).with_max_iterations(2)).unwrap();
    let json = serde_json::to_string(&out[0].report).unwrap();
    let back: SolveReport = serde_json::from_str(&json).unwrap();
    assert_eq!(back, out[0].report);
}

/// Device that fails every dispatch.
struct BrokenDevice;

impl SweepDevice for BrokenDevice {
    fn id(&self) -> usize {
        9
    }

    fn name(&self) -> &'static str {
        "broken"
    }

    fn sweep(&self, _current: &LocalGrid, _next: &mut LocalGrid) -> Result<f64, JacobiError> {
        Err(JacobiError::DeviceError {
            device: 9,
            reason: "dispatch failed".into(),
        })
    }
}

/// Device that panics on its first dispatch.
struct PanickingDevice;

impl SweepDevice for PanickingDevice {
    fn id(&self) -> usize {
        5
    }

    fn name(&self) -> &'static str {
        "panicking"
    }

    fn sweep(&self, _current: &LocalGrid, _next: &mut LocalGrid) -> Result<f64, JacobiError> {
        panic!("device lost");
    }
}

#[test]
fn device_error_stops_every_worker() {
    let cfg = host_config(4, 2).with_max_iterations(10);
    let results = in_world(4, Duration::from_secs(5), |comm| {
        let mut solver = JacobiSolver::new(comm.clone(), cfg.clone()).unwrap();
        if comm.rank() == 2 {
            solver = solver.with_device(Box::new(BrokenDevice)).unwrap();
        }
        (solver.solve().err(), comm.is_aborted())
    });
    for (rank, (err, aborted)) in results.into_iter().enumerate() {
        assert!(aborted, "rank {rank}");
        match err {
            Some(JacobiError::DeviceError { device: 9, .. }) => assert_eq!(rank, 2),
            Some(JacobiError::CommError { .. }) => assert_ne!(rank, 2),
            other => panic!("rank {rank}: unexpected {other:?}"),
        }
    }
}

#[test]
#[serial]
fn threaded_run_reports_the_device_error_not_peer_failures() {
    let cfg = host_config(4, 2)
        .with_max_iterations(10)
        .with_comm_timeout(Duration::from_secs(5));
    let err = run_threaded_with(&cfg, |rank| {
        (rank == 1).then(|| Box::new(BrokenDevice) as Box<dyn SweepDevice>)
    })
    .unwrap_err();
    assert!(matches!(err, JacobiError::DeviceError { device: 9, .. }), "{err}");
}

#[test]
#[serial]
fn panicking_worker_releases_peers() {
    let cfg = host_config(4, 2)
        .with_max_iterations(10)
        .with_comm_timeout(Duration::from_secs(30));
    let t0 = std::time::Instant::now();
    let err = run_threaded_with(&cfg, |rank| {
        (rank == 3).then(|| Box::new(PanickingDevice) as Box<dyn SweepDevice>)
    })
    .unwrap_err();
    assert!(matches!(err, JacobiError::WorkerPanicked(3)), "{err}");
    // peers were released by the abort, not by their receive timeout
    assert!(t0.elapsed() < Duration::from_secs(30));
}

#[test]
fn oversized_topology_is_a_configuration_error() {
    let err = run_threaded(&host_config(4, usize::MAX / 2)).unwrap_err();
    assert!(matches!(err, JacobiError::InvalidParameter(_)), "{err}");
}
