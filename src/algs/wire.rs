//! Fixed, versioned, little-endian wire format for halo messages.
//!
//! A halo message is one [`WireHaloHdr`] followed by `count` values, each an
//! `f64` bit pattern stored as little-endian `u64`. Receive buffers are plain
//! `Vec<u8>` with no alignment guarantee, so decoding never casts in place.

use bytemuck::{Pod, Zeroable};
use static_assertions::const_assert_eq;
use std::mem::size_of;

use crate::topology::cart::Direction;

/// Bump when the layout or semantics change in incompatible ways.
pub const WIRE_VERSION: u16 = 1;

/// All multi-byte integers are stored pre-LE with `.to_le()` and decoded
/// with `.from_le()`.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireHaloHdr {
    pub version_le: u16,
    /// Side of the *sender's* grid the values come from.
    pub dir_le: u16,
    pub iteration_le: u32,
    pub count_le: u32,
    pub reserved_le: u32, // keep zero
}

const_assert_eq!(size_of::<WireHaloHdr>(), 16);

impl WireHaloHdr {
    pub fn new(dir: Direction, iteration: u32, count: usize) -> Self {
        Self {
            version_le: WIRE_VERSION.to_le(),
            dir_le: dir.code().to_le(),
            iteration_le: iteration.to_le(),
            count_le: (count as u32).to_le(),
            reserved_le: 0,
        }
    }
    pub fn version(&self) -> u16 {
        u16::from_le(self.version_le)
    }
    pub fn dir(&self) -> Option<Direction> {
        Direction::from_code(u16::from_le(self.dir_le))
    }
    pub fn iteration(&self) -> u32 {
        u32::from_le(self.iteration_le)
    }
    pub fn count(&self) -> usize {
        u32::from_le(self.count_le) as usize
    }
}

/// Total byte length of a halo message carrying `count` values.
#[inline]
pub const fn halo_message_len(count: usize) -> usize {
    size_of::<WireHaloHdr>() + count * size_of::<u64>()
}

/// Serialize an edge row/column taken from side `dir` of the sender's grid.
pub fn encode_halo(dir: Direction, iteration: u32, values: &[f64]) -> Vec<u8> {
    let hdr = WireHaloHdr::new(dir, iteration, values.len());
    let mut out = Vec::with_capacity(halo_message_len(values.len()));
    out.extend_from_slice(bytemuck::bytes_of(&hdr));
    for v in values {
        out.extend_from_slice(&v.to_bits().to_le_bytes());
    }
    out
}

/// Parse a halo message and check it is the one the receiver expects:
/// same protocol version, sent from side `expected_dir`, produced in
/// `expected_iteration`, with exactly `expected_count` values.
pub fn decode_halo(
    raw: &[u8],
    expected_dir: Direction,
    expected_iteration: u32,
    expected_count: usize,
) -> Result<Vec<f64>, String> {
    let hdr_len = size_of::<WireHaloHdr>();
    if raw.len() < hdr_len {
        return Err(format!("expected at least {hdr_len} header bytes, got {}", raw.len()));
    }
    let hdr: WireHaloHdr = bytemuck::pod_read_unaligned(&raw[..hdr_len]);
    if hdr.version() != WIRE_VERSION {
        return Err(format!(
            "wire version {} does not match {WIRE_VERSION}",
            hdr.version()
        ));
    }
    match hdr.dir() {
        Some(d) if d == expected_dir => {}
        other => return Err(format!("expected {expected_dir} edge, got {other:?}")),
    }
    if hdr.iteration() != expected_iteration {
        return Err(format!(
            "stale halo: iteration {} while expecting {expected_iteration}",
            hdr.iteration()
        ));
    }
    if hdr.count() != expected_count || raw.len() != halo_message_len(expected_count) {
        return Err(format!(
            "expected {expected_count} values ({} bytes), header says {} ({} bytes received)",
            halo_message_len(expected_count),
            hdr.count(),
            raw.len()
        ));
    }
    Ok(raw[hdr_len..]
        .chunks_exact(size_of::<u64>())
        .map(|c| {
            let mut b = [0u8; 8];
            b.copy_from_slice(c);
            f64::from_bits(u64::from_le_bytes(b))
        })
        .collect())
}
