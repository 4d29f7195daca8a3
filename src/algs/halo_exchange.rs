//! Ghost-border exchange between neighbouring workers.
//!
//! Once per iteration, before the sweep, every worker sends its outermost
//! interior row/column towards each neighbour and receives the neighbour's
//! edge into its own ghost row/column on that side.
//!
//! 1. Post every receive (one per neighbour).
//! 2. Pack and post every send.
//! 3. Wait for all receives and validate them (never early-return).
//! 4. Drain all send handles.
//! 5. Only if every exchange succeeded, write the ghost cells.
//!
//! Sides without a neighbour are skipped, so the fixed global boundary stored
//! there is never touched.

use crate::algs::communicator::{CommTag, Communicator, Wait};
use crate::algs::wire::{decode_halo, encode_halo, halo_message_len};
use crate::data::local_grid::LocalGrid;
use crate::jacobi_error::JacobiError;
use crate::topology::cart::{Direction, Worker};

/// Exchange all halos of `grid` for `iteration`.
///
/// Returns the number of neighbours exchanged with. On error no ghost cell
/// has been modified.
pub fn exchange_halos<C>(
    grid: &mut LocalGrid,
    worker: &Worker,
    comm: &C,
    tag: CommTag,
    iteration: u32,
) -> Result<usize, JacobiError>
where
    C: Communicator,
{
    let dim = grid.dim();
    let msg_len = halo_message_len(dim);

    // 1) post all receives
    let mut pending_recvs: Vec<(Direction, usize, C::RecvHandle)> =
        Vec::with_capacity(worker.neighbors.count());
    for (dir, nbr) in worker.neighbors.iter() {
        let mut buf = vec![0u8; msg_len];
        let h = comm.irecv(nbr, tag.as_u16(), &mut buf);
        pending_recvs.push((dir, nbr, h));
    }

    // 2) pack and post all sends
    let mut pending_sends = Vec::with_capacity(pending_recvs.len());
    let mut edge = Vec::with_capacity(dim);
    for (dir, nbr) in worker.neighbors.iter() {
        edge.clear();
        grid.pack_edge(dir, &mut edge);
        let bytes = encode_halo(dir, iteration, &edge);
        log::trace!(
            "[rank {}] iter {iteration}: send {dir} edge to rank {nbr}",
            worker.rank
        );
        pending_sends.push(comm.isend(nbr, tag.as_u16(), &bytes));
    }

    // 3) wait for every receive, keep the first error
    let mut received = Vec::with_capacity(pending_recvs.len());
    let mut maybe_err = None;
    for (dir, nbr, h) in pending_recvs {
        match h.wait() {
            // the neighbour on our `dir` side sends its `dir.opposite()` edge
            Some(raw) => match decode_halo(&raw, dir.opposite(), iteration, dim) {
                Ok(values) => received.push((dir, values)),
                Err(reason) if maybe_err.is_none() => {
                    maybe_err = Some(JacobiError::comm(nbr, format!("{dir} halo: {reason}")));
                }
                Err(_) => {}
            },
            None if maybe_err.is_none() => {
                maybe_err = Some(JacobiError::comm(
                    nbr,
                    format!("{dir} halo for iteration {iteration} never arrived"),
                ));
            }
            None => {}
        }
    }

    // 4) always drain all send handles before returning
    for send in pending_sends {
        let _ = send.wait();
    }

    if let Some(err) = maybe_err {
        return Err(err);
    }

    // 5) all exchanges complete: publish the ghosts
    let exchanged = received.len();
    for (dir, values) in received {
        grid.unpack_ghost(dir, &values)?;
    }
    Ok(exchanged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::NoComm;
    use crate::topology::cart::CartTopology;

    #[test]
    fn single_worker_exchanges_nothing() {
        let topo = CartTopology::new(1, 1).unwrap();
        let w = topo.worker(0).unwrap();
        let mut g = LocalGrid::zeros(3);
        g.set(0, 1, 300.0);
        let before = g.clone();
        let n = exchange_halos(&mut g, &w, &NoComm, CommTag::new(1), 0).unwrap();
        assert_eq!(n, 0);
        assert_eq!(g, before);
    }

    #[test]
    fn missing_neighbor_message_is_fatal_and_leaves_ghosts() {
        // rank 0 of a 2x2 world talking to NoComm never receives anything
        let topo = CartTopology::new(4, 2).unwrap();
        let w = topo.worker(0).unwrap();
        let mut g = LocalGrid::zeros(2);
        let before = g.clone();
        let err = exchange_halos(&mut g, &w, &NoComm, CommTag::new(1), 0).unwrap_err();
        assert!(matches!(err, JacobiError::CommError { .. }));
        assert_eq!(g, before);
    }
}
