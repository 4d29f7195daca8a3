//! Compute devices that run the local Jacobi sweep.
//!
//! A device receives the read buffer and the write buffer of one worker,
//! updates every interior cell of the write buffer and returns the local
//! error. `sweep` returns only after all of its work has completed, so the
//! caller can immediately pack halo edges from the result.
//!
//! Two devices are provided: [`HostDevice`] runs the stencil on the calling
//! thread, [`PoolDevice`] splits interior rows over a dedicated rayon pool.

mod host;
mod pool;

pub use host::HostDevice;
pub use pool::PoolDevice;

use serde::{Deserialize, Serialize};

use crate::algs::reduction::nan_max;
use crate::data::local_grid::LocalGrid;
use crate::jacobi_error::JacobiError;

/// Offload target for the interior update.
pub trait SweepDevice: Send + Sync {
    /// Device index this worker is bound to.
    fn id(&self) -> usize;

    /// Short backend name for reports.
    fn name(&self) -> &'static str;

    /// `next[i][j] = 0.25 * (up + down + left + right)` from `current` for
    /// every interior cell; ghost cells of `next` are not written.
    ///
    /// Returns `max |next - current|` over the interior.
    fn sweep(&self, current: &LocalGrid, next: &mut LocalGrid) -> Result<f64, JacobiError>;
}

/// Which [`SweepDevice`] implementation workers bind to.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    /// Serial loop on the worker thread.
    Host,
    /// Row-parallel sweep on a per-device thread pool.
    #[default]
    Pool,
}

/// Device binding policy.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub kind: DeviceKind,
    /// Number of distinct devices; ranks are bound round-robin.
    pub device_count: usize,
    /// Threads per pool device; `0` splits the machine evenly across workers.
    pub threads_per_device: usize,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            kind: DeviceKind::Pool,
            device_count: 1,
            threads_per_device: 0,
        }
    }
}

impl DeviceConfig {
    /// Device index for `rank`.
    #[inline]
    pub fn device_for(&self, rank: usize) -> usize {
        rank % self.device_count.max(1)
    }

    fn threads_for(&self, workers: usize) -> usize {
        if self.threads_per_device > 0 {
            return self.threads_per_device;
        }
        let cores = std::thread::available_parallelism().map_or(1, |n| n.get());
        (cores / workers.max(1)).max(1)
    }
}

/// Create the device `rank` is bound to in a world of `workers` ranks.
pub fn bind_device(
    rank: usize,
    workers: usize,
    cfg: &DeviceConfig,
) -> Result<Box<dyn SweepDevice>, JacobiError> {
    if cfg.device_count == 0 {
        return Err(JacobiError::DeviceError {
            device: 0,
            reason: "no devices configured".into(),
        });
    }
    let id = cfg.device_for(rank);
    let dev: Box<dyn SweepDevice> = match cfg.kind {
        DeviceKind::Host => Box::new(HostDevice::new(id)),
        DeviceKind::Pool => Box::new(PoolDevice::new(id, cfg.threads_for(workers))?),
    };
    log::debug!("[rank {rank}] bound to {} device {id}", dev.name());
    Ok(dev)
}

/// Reject buffer pairs a device cannot sweep.
pub(crate) fn check_buffers(
    device: usize,
    current: &LocalGrid,
    next: &LocalGrid,
) -> Result<(), JacobiError> {
    if current.dim() != next.dim() {
        return Err(JacobiError::DeviceError {
            device,
            reason: format!(
                "read buffer has dim {}, write buffer {}",
                current.dim(),
                next.dim()
            ),
        });
    }
    Ok(())
}

/// Update interior row `i` of the grid (`1..=dim`) into `dst_row`, a full
/// row of the write buffer, and return the largest change in that row.
#[inline]
pub(crate) fn sweep_row(src: &[f64], stride: usize, i: usize, dst_row: &mut [f64]) -> f64 {
    let dim = stride - 2;
    let up = &src[(i - 1) * stride..i * stride];
    let mid = &src[i * stride..(i + 1) * stride];
    let down = &src[(i + 1) * stride..(i + 2) * stride];
    let mut err = 0.0f64;
    for j in 1..=dim {
        let v = 0.25 * (up[j] + down[j] + mid[j - 1] + mid[j + 1]);
        err = nan_max(err, (v - mid[j]).abs());
        dst_row[j] = v;
    }
    err
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_robin_binding() {
        let cfg = DeviceConfig {
            kind: DeviceKind::Host,
            device_count: 3,
            threads_per_device: 1,
        };
        let ids: Vec<usize> = (0..5).map(|r| bind_device(r, 5, &cfg).unwrap().id()).collect();
        assert_eq!(ids, vec![0, 1, 2, 0, 1]);
    }

    #[test]
    fn zero_devices_is_a_device_error() {
        let cfg = DeviceConfig {
            device_count: 0,
            ..DeviceConfig::default()
        };
        assert!(matches!(
            bind_device(0, 1, &cfg),
            Err(JacobiError::DeviceError { .. })
        ));
    }

    #[test]
    fn host_and_pool_agree() {
        let mut cur = LocalGrid::zeros(6);
        for (i, v) in cur.as_mut_slice().iter_mut().enumerate() {
            *v = ((i * 37) % 11) as f64;
        }
        let mut a = cur.clone();
        let mut b = cur.clone();
        let ea = HostDevice::new(0).sweep(&cur, &mut a).unwrap();
        let eb = PoolDevice::new(0, 3).unwrap().sweep(&cur, &mut b).unwrap();
        assert_eq!(a, b);
        assert_eq!(ea, eb);
    }

    #[test]
    fn mismatched_buffers_rejected() {
        let cur = LocalGrid::zeros(2);
        let mut next = LocalGrid::zeros(3);
        assert!(matches!(
            HostDevice::new(1).sweep(&cur, &mut next),
            Err(JacobiError::DeviceError { device: 1, .. })
        ));
    }
}
