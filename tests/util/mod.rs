#![allow(dead_code)]

use std::time::Duration;

use laplace_jacobi::prelude::*;

/// Serial host devices keep integration runs deterministic and light.
pub fn host_config(dimension: usize, side: usize) -> SolverConfig {
    SolverConfig::default()
        .with_dimension(dimension)
        .with_topology(side)
        .with_report_every(0)
        .with_comm_timeout(Duration::from_secs(10))
        .with_device(DeviceConfig {
            kind: DeviceKind::Host,
            device_count: 1,
            threads_per_device: 1,
        })
}

/// Run `f` once per rank of a fresh `n`-rank in-process world, one thread
/// each, and return the results ordered by rank.
pub fn in_world<T, F>(n: usize, timeout: Duration, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(RayonComm) -> T + Sync,
{
    let world: Vec<RayonComm> = RayonComm::world(n)
        .into_iter()
        .map(|c| c.with_timeout(timeout))
        .collect();
    std::thread::scope(|s| {
        let f = &f;
        let handles: Vec<_> = world
            .into_iter()
            .map(|comm| s.spawn(move || f(comm)))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
}

/// Largest absolute difference between two equally sized fields.
pub fn max_abs_diff(a: &[f64], b: &[f64]) -> f64 {
    assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f64::max)
}
