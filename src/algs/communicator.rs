//! Thin façade over intra-process (threaded) or inter-process (MPI) message passing.
//!
//! Messages are *contiguous byte slices* (no zero-copy guarantees).
//! All handles are **waitable** but non-blocking: the halo exchange posts every
//! receive and send first and only then calls `.wait()` before it trusts
//! that a buffer is ready.
//!
//! Handles posted on the same `(peer, tag)` pair must be waited in posting
//! order; messages on one pair are delivered FIFO.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};

use crate::algs::reduction::nan_max;
use crate::jacobi_error::JacobiError;

/// Typed message tag.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct CommTag(pub u16);

impl CommTag {
    #[inline]
    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Tag `k` steps after this one (wrapping).
    #[inline]
    pub const fn offset(self, k: u16) -> Self {
        Self(self.0.wrapping_add(k))
    }
}

/// Tags used by one solver run. `reduce` occupies two consecutive values
/// (gather and broadcast).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SolverCommTags {
    pub halo: CommTag,
    pub reduce: CommTag,
}

impl SolverCommTags {
    pub const fn from_base(base: CommTag) -> Self {
        Self {
            halo: base,
            reduce: base.offset(1),
        }
    }
}

impl Default for SolverCommTags {
    fn default() -> Self {
        Self::from_base(CommTag::new(0x1AC0))
    }
}

/// Reserved for [`Communicator::barrier`] built on the point-to-point layer.
const BARRIER_TAG: CommTag = CommTag::new(0xFFF0);

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion and return the received data (if any).
    /// `None` from a receive handle means the message never arrived.
    fn wait(self) -> Option<Vec<u8>>;
}

/// Non-blocking communication interface (minimal by design).
pub trait Communicator {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle;
    /// Post a receive of at most `buf.len()` bytes; the payload is returned
    /// by [`Wait::wait`], longer messages are truncated.
    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle;

    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    /// Release every peer blocked on this world. The default does nothing.
    fn abort(&self) {}

    fn is_no_comm(&self) -> bool {
        false
    }

    /// Maximum of `value` over all ranks, identical on every rank.
    ///
    /// The default gathers to rank 0 on `tag` and broadcasts the result on
    /// `tag + 1`. NaN on any rank propagates to the result.
    fn all_reduce_max(&self, tag: CommTag, value: f64) -> Result<f64, JacobiError> {
        let size = self.size();
        if size <= 1 {
            return Ok(value);
        }
        let gather = tag.as_u16();
        let bcast = tag.offset(1).as_u16();
        const W: usize = std::mem::size_of::<f64>();

        if self.rank() == 0 {
            let mut pending = Vec::with_capacity(size - 1);
            for peer in 1..size {
                let mut buf = [0u8; W];
                pending.push((peer, self.irecv(peer, gather, &mut buf)));
            }
            let mut acc = value;
            let mut maybe_err = None;
            // drain every handle even after a failure
            for (peer, h) in pending {
                match h.wait().as_deref().and_then(decode_f64) {
                    Some(v) => acc = nan_max(acc, v),
                    None if maybe_err.is_none() => {
                        maybe_err = Some(JacobiError::comm(peer, "missing reduction contribution"));
                    }
                    None => {}
                }
            }
            if let Some(err) = maybe_err {
                return Err(err);
            }
            let bytes = acc.to_le_bytes();
            let sends: Vec<_> = (1..size).map(|p| self.isend(p, bcast, &bytes)).collect();
            for s in sends {
                let _ = s.wait();
            }
            Ok(acc)
        } else {
            let mut buf = [0u8; W];
            let h = self.irecv(0, bcast, &mut buf);
            let _ = self.isend(0, gather, &value.to_le_bytes()).wait();
            h.wait()
                .as_deref()
                .and_then(decode_f64)
                .ok_or_else(|| JacobiError::comm(0, "missing reduction result"))
        }
    }

    /// Block until every rank has reached the barrier.
    fn barrier(&self) -> Result<(), JacobiError> {
        self.all_reduce_max(BARRIER_TAG, 0.0).map(|_| ())
    }
}

fn decode_f64(raw: &[u8]) -> Option<f64> {
    <[u8; 8]>::try_from(raw).ok().map(f64::from_le_bytes)
}

/// Compile-time no-op comm for single-worker runs and serial unit tests.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn isend(&self, _peer: usize, _tag: u16, _buf: &[u8]) {}
    fn irecv(&self, _peer: usize, _tag: u16, _buf: &mut [u8]) {}

    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn is_no_comm(&self) -> bool {
        true
    }

    fn barrier(&self) -> Result<(), JacobiError> {
        Ok(())
    }
}

// --- RayonComm: intra-process / multi-thread ---
type Key = (usize, usize, u16); // (src, dst, tag)

/// Shared message store of one in-process world.
#[derive(Default)]
struct Mailbox {
    slots: DashMap<Key, VecDeque<Bytes>>,
    lock: Mutex<()>,
    arrived: Condvar,
    aborted: AtomicBool,
}

impl Mailbox {
    fn push(&self, key: Key, bytes: Bytes) {
        // The shard guard is released at the end of this statement, before
        // `lock` is taken; receivers take the locks in the opposite order.
        self.slots.entry(key).or_default().push_back(bytes);
        let _g = self.lock.lock();
        self.arrived.notify_all();
    }

    fn pop(&self, key: &Key) -> Option<Bytes> {
        self.slots.get_mut(key).and_then(|mut q| q.pop_front())
    }

    fn abort(&self) {
        self.aborted.store(true, Ordering::Release);
        let _g = self.lock.lock();
        self.arrived.notify_all();
    }
}

/// Receive handle of [`RayonComm`]; the message is taken from the mailbox
/// when waited on.
pub struct LocalHandle {
    mailbox: Arc<Mailbox>,
    key: Key,
    len: usize,
    timeout: Duration,
}

impl Wait for LocalHandle {
    fn wait(self) -> Option<Vec<u8>> {
        let take = |b: Bytes| b[..b.len().min(self.len)].to_vec();
        let deadline = Instant::now() + self.timeout;
        let mut guard = self.mailbox.lock.lock();
        loop {
            if let Some(bytes) = self.mailbox.pop(&self.key) {
                return Some(take(bytes));
            }
            if self.mailbox.aborted.load(Ordering::Acquire) {
                log::warn!("receive {:?} released by world abort", self.key);
                return None;
            }
            if self
                .mailbox
                .arrived
                .wait_until(&mut guard, deadline)
                .timed_out()
            {
                let last = self.mailbox.pop(&self.key).map(take);
                if last.is_none() {
                    log::warn!("receive {:?} timed out after {:?}", self.key, self.timeout);
                }
                return last;
            }
        }
    }
}

/// One rank of an in-process world; every worker runs on its own thread.
#[derive(Clone)]
pub struct RayonComm {
    rank: usize,
    size: usize,
    timeout: Duration,
    mailbox: Arc<Mailbox>,
}

impl std::fmt::Debug for RayonComm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RayonComm")
            .field("rank", &self.rank)
            .field("size", &self.size)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl RayonComm {
    /// Default bound on how long a receive waits for its message.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Create `size` connected ranks sharing one mailbox.
    pub fn world(size: usize) -> Vec<RayonComm> {
        let mailbox = Arc::new(Mailbox::default());
        (0..size)
            .map(|rank| RayonComm {
                rank,
                size,
                timeout: Self::DEFAULT_TIMEOUT,
                mailbox: Arc::clone(&mailbox),
            })
            .collect()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// True once any rank of this world called [`Communicator::abort`].
    pub fn is_aborted(&self) -> bool {
        self.mailbox.aborted.load(Ordering::Acquire)
    }
}

impl Communicator for RayonComm {
    type SendHandle = ();
    type RecvHandle = LocalHandle;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle {
        self.mailbox
            .push((self.rank, peer, tag), Bytes::copy_from_slice(buf));
    }

    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle {
        LocalHandle {
            mailbox: Arc::clone(&self.mailbox),
            key: (peer, self.rank, tag),
            len: buf.len(),
            timeout: self.timeout,
        }
    }

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn abort(&self) {
        self.mailbox.abort();
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::{CommTag, Communicator, Wait};
    use crate::jacobi_error::JacobiError;
    use mpi::collective::SystemOperation;
    use mpi::environment::Universe;
    use mpi::request::{Request, StaticScope};
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::{
        Communicator as _, CommunicatorCollectives as _, Destination as _, Source as _,
    };

    /// One MPI process = one worker.
    pub struct MpiComm {
        pub world: SimpleCommunicator,
        pub rank: usize,
        _universe: Universe,
    }

    impl MpiComm {
        pub fn new() -> Result<Self, JacobiError> {
            let universe = mpi::initialize()
                .ok_or_else(|| JacobiError::comm(0, "MPI unavailable or already initialized"))?;
            let world = universe.world();
            let rank = world.rank() as usize;
            Ok(Self {
                world,
                rank,
                _universe: universe,
            })
        }
    }

    /// Pending request plus the heap buffer it borrows. The buffer is leaked
    /// for `'static` and reclaimed once the request has completed.
    pub struct MpiHandle {
        req: Option<Request<'static, [u8], StaticScope>>,
        buf: Option<*mut [u8]>,
        returns_data: bool,
    }

    impl MpiHandle {
        fn finish(&mut self) -> Option<Vec<u8>> {
            let req = self.req.take()?;
            req.wait();
            let raw = self.buf.take()?;
            // SAFETY: `raw` came from `Box::leak` in `isend`/`irecv`, and the
            // only request borrowing it has just completed.
            let data = unsafe { Box::from_raw(raw) }.into_vec();
            self.returns_data.then_some(data)
        }
    }

    impl Wait for MpiHandle {
        fn wait(mut self) -> Option<Vec<u8>> {
            self.finish()
        }
    }

    impl Drop for MpiHandle {
        fn drop(&mut self) {
            let _ = self.finish();
        }
    }

    impl Communicator for MpiComm {
        type SendHandle = MpiHandle;
        type RecvHandle = MpiHandle;

        fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> MpiHandle {
            let leaked: &'static mut [u8] = Box::leak(buf.to_vec().into_boxed_slice());
            let raw: *mut [u8] = leaked;
            // SAFETY: `raw` stays valid until `finish` reclaims it.
            let shared: &'static [u8] = unsafe { &*raw };
            let req = self
                .world
                .process_at_rank(peer as i32)
                .immediate_send_with_tag(StaticScope, shared, i32::from(tag));
            MpiHandle {
                req: Some(req),
                buf: Some(raw),
                returns_data: false,
            }
        }

        fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> MpiHandle {
            let leaked: &'static mut [u8] = Box::leak(vec![0u8; buf.len()].into_boxed_slice());
            let raw: *mut [u8] = leaked;
            // SAFETY: `raw` stays valid until `finish` reclaims it.
            let target: &'static mut [u8] = unsafe { &mut *raw };
            let req = self
                .world
                .process_at_rank(peer as i32)
                .immediate_receive_into_with_tag(StaticScope, target, i32::from(tag));
            MpiHandle {
                req: Some(req),
                buf: Some(raw),
                returns_data: true,
            }
        }

        fn rank(&self) -> usize {
            self.rank
        }

        fn size(&self) -> usize {
            self.world.size() as usize
        }

        fn abort(&self) {
            self.world.abort(1)
        }

        fn all_reduce_max(&self, _tag: CommTag, value: f64) -> Result<f64, JacobiError> {
            let mut out = 0.0f64;
            self.world
                .all_reduce_into(&value, &mut out, SystemOperation::max());
            Ok(out)
        }

        fn barrier(&self) -> Result<(), JacobiError> {
            self.world.barrier();
            Ok(())
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rayon_roundtrip_two_ranks() {
        let world = RayonComm::world(2);
        let (comm0, comm1) = (&world[0], &world[1]);

        // Prepare a 4-byte receive buffer on “rank 1”:
        let mut recv_buf = [0u8; 4];
        let recv_handle = comm1.irecv(0, 7, &mut recv_buf);

        // On rank 0: send the 4 bytes [1,2,3,4] to peer 1 with tag 7
        comm0.isend(1, 7, &[1, 2, 3, 4]).wait();

        let data = recv_handle
            .wait()
            .expect("Expected to receive data from rank 0");
        recv_buf.copy_from_slice(&data);
        assert_eq!(&recv_buf, &[1, 2, 3, 4]);
    }

    #[test]
    fn receive_times_out_instead_of_blocking() {
        let world: Vec<_> = RayonComm::world(2)
            .into_iter()
            .map(|c| c.with_timeout(Duration::from_millis(20)))
            .collect();
        let mut buf = [0u8; 1];
        assert!(world[1].irecv(0, 3, &mut buf).wait().is_none());
    }

    #[test]
    fn abort_releases_blocked_receiver() {
        let world = RayonComm::world(2);
        let waiter = world[1].clone();
        let t = std::thread::spawn(move || {
            let mut buf = [0u8; 1];
            waiter.irecv(0, 5, &mut buf).wait()
        });
        std::thread::sleep(Duration::from_millis(20));
        world[0].abort();
        assert!(t.join().unwrap().is_none());
        assert!(world[1].is_aborted());
    }

    #[test]
    fn no_comm_reduces_to_identity() {
        let comm = NoComm;
        assert_eq!(comm.all_reduce_max(CommTag::new(1), 2.5).unwrap(), 2.5);
        assert!(comm.barrier().is_ok());
    }

    #[test]
    fn nan_contribution_poisons_the_reduction() {
        let world = RayonComm::world(2);
        let tag = CommTag::new(0x300);
        let out: Vec<f64> = std::thread::scope(|s| {
            let hs: Vec<_> = world
                .iter()
                .map(|c| {
                    let v = if c.rank() == 1 { f64::NAN } else { 1.0 };
                    s.spawn(move || c.all_reduce_max(tag, v).unwrap())
                })
                .collect();
            hs.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert!(out.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn tags_are_disjoint() {
        let tags = SolverCommTags::from_base(CommTag::new(10));
        assert_eq!(tags.halo.as_u16(), 10);
        assert_eq!(tags.reduce.as_u16(), 11);
        assert_eq!(tags.reduce.offset(1).as_u16(), 12);
    }
}
