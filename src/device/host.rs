use crate::algs::reduction::nan_max;
use crate::data::local_grid::LocalGrid;
use crate::device::{SweepDevice, check_buffers, sweep_row};
use crate::jacobi_error::JacobiError;

/// Runs the stencil on the calling thread.
#[derive(Clone, Debug)]
pub struct HostDevice {
    id: usize,
}

impl HostDevice {
    pub fn new(id: usize) -> Self {
        Self { id }
    }
}

impl SweepDevice for HostDevice {
    fn id(&self) -> usize {
        self.id
    }

    fn name(&self) -> &'static str {
        "host"
    }

    fn sweep(&self, current: &LocalGrid, next: &mut LocalGrid) -> Result<f64, JacobiError> {
        check_buffers(self.id, current, next)?;
        let stride = current.stride();
        let dim = current.dim();
        let src = current.as_slice();
        let err = next
            .as_mut_slice()
            .chunks_mut(stride)
            .enumerate()
            .skip(1)
            .take(dim)
            .fold(0.0, |acc, (i, row)| nan_max(acc, sweep_row(src, stride, i, row)));
        Ok(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn averages_four_neighbours() {
        // 1x1 interior surrounded by 1, 2, 3, 4
        let mut cur = LocalGrid::zeros(1);
        cur.set(0, 1, 1.0);
        cur.set(2, 1, 2.0);
        cur.set(1, 0, 3.0);
        cur.set(1, 2, 4.0);
        let mut next = cur.clone();
        let err = HostDevice::new(0).sweep(&cur, &mut next).unwrap();
        assert_eq!(next.get(1, 1), 2.5);
        assert_eq!(err, 2.5);
        // ghost cells of the write buffer untouched
        assert_eq!(next.get(0, 1), 1.0);
    }
}
