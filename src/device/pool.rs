use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::algs::reduction::nan_max;
use crate::data::local_grid::LocalGrid;
use crate::device::{SweepDevice, check_buffers, sweep_row};
use crate::jacobi_error::JacobiError;

/// Row-parallel sweep on a dedicated rayon pool.
///
/// Write rows are handed out with `par_chunks_mut`, so every task owns its
/// destination row exclusively and reads only the shared read buffer.
/// `install` returns once every row is done.
pub struct PoolDevice {
    id: usize,
    pool: ThreadPool,
}

impl std::fmt::Debug for PoolDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolDevice")
            .field("id", &self.id)
            .field("threads", &self.pool.current_num_threads())
            .finish()
    }
}

impl PoolDevice {
    /// Dedicated pool of `threads` workers; `0` lets rayon pick.
    pub fn new(id: usize, threads: usize) -> Result<Self, JacobiError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(move |t| format!("jacobi-dev{id}-{t}"))
            .build()
            .map_err(|e| JacobiError::DeviceError {
                device: id,
                reason: e.to_string(),
            })?;
        Ok(Self { id, pool })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl SweepDevice for PoolDevice {
    fn id(&self) -> usize {
        self.id
    }

    fn name(&self) -> &'static str {
        "pool"
    }

    fn sweep(&self, current: &LocalGrid, next: &mut LocalGrid) -> Result<f64, JacobiError> {
        check_buffers(self.id, current, next)?;
        let stride = current.stride();
        let dim = current.dim();
        let src = current.as_slice();
        // interior rows 1..=dim of the write buffer
        let interior = &mut next.as_mut_slice()[stride..(dim + 1) * stride];
        let err = self.pool.install(|| {
            interior
                .par_chunks_mut(stride)
                .enumerate()
                .map(|(r, row)| sweep_row(src, stride, r + 1, row))
                .reduce(|| 0.0, nan_max)
        });
        Ok(err)
    }
}
