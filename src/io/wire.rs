//! Fixed little-endian wire records for the frame stream and matrix files.

use bytemuck::{Pod, Zeroable};
use std::mem::{align_of, size_of};

use crate::field::FrameHeader;
use crate::topology::chirality::Chirality;
use crate::track_error::TrackError;

/// All multi-byte fields in these structs are **little-endian** on the wire.
/// Integers are stored pre-LE with `.to_le()`; floats are stored as their
/// LE bit patterns.

/// Message type tag preceding every stream message.
pub const TAG_PUNCTURED_FACES: i32 = 0;
pub const TAG_PUNCTURED_EDGES: i32 = 1;

pub fn expect_exact_len(what: &'static str, actual: usize, expected: usize) -> Result<(), TrackError> {
    if actual == expected {
        Ok(())
    } else if actual < expected {
        Err(TrackError::Truncated {
            what,
            expected,
            actual,
        })
    } else {
        Err(TrackError::ByteCountMismatch { expected, actual })
    }
}

/// Decode a record from the front of `bytes`.
pub fn read_record<T: Pod>(what: &'static str, bytes: &[u8]) -> Result<T, TrackError> {
    let n = size_of::<T>();
    if bytes.len() < n {
        return Err(TrackError::Truncated {
            what,
            expected: n,
            actual: bytes.len(),
        });
    }
    Ok(bytemuck::pod_read_unaligned(&bytes[..n]))
}

#[inline]
fn f32_le(v: f32) -> u32 {
    v.to_bits().to_le()
}

#[inline]
fn f32_from_le(v: u32) -> f32 {
    f32::from_bits(u32::from_le(v))
}

#[inline]
fn vec3_le(v: [f64; 3]) -> [u32; 3] {
    v.map(|x| f32_le(x as f32))
}

#[inline]
fn vec3_from_le(v: [u32; 3]) -> [f64; 3] {
    v.map(|x| f32_from_le(x) as f64)
}

// ===== Punctured faces =====================================================

/// A face id packed with its crossing chirality: low 31 bits id, high bit
/// set for `+1`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PackedFace {
    pub id: u32,
    pub chirality: Chirality,
}

impl PackedFace {
    pub const ID_MASK: u32 = 0x7fff_ffff;
    pub const CHIRALITY_BIT: u32 = 0x8000_0000;

    /// Pack a face; ids wider than 31 bits are rejected.
    pub fn new(id: u32, chirality: Chirality) -> Option<Self> {
        (id & !Self::ID_MASK == 0).then_some(Self { id, chirality })
    }

    #[inline]
    pub fn encode(self) -> u32 {
        let bit = if self.chirality.is_positive() {
            Self::CHIRALITY_BIT
        } else {
            0
        };
        (self.id & Self::ID_MASK) | bit
    }

    #[inline]
    pub fn decode(raw: u32) -> Self {
        Self {
            id: raw & Self::ID_MASK,
            chirality: Chirality::from(raw & Self::CHIRALITY_BIT != 0),
        }
    }
}

/// One punctured-face record: packed id/chirality plus crossing position.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WirePuncturedFace {
    pub fid_and_chirality_le: u32,
    pub pos_le: [u32; 3],
}

impl WirePuncturedFace {
    pub const SIZE: usize = 16;

    pub fn new(face: PackedFace, pos: [f32; 3]) -> Self {
        Self {
            fid_and_chirality_le: face.encode().to_le(),
            pos_le: pos.map(f32_le),
        }
    }

    pub fn face(&self) -> PackedFace {
        PackedFace::decode(u32::from_le(self.fid_and_chirality_le))
    }

    pub fn pos(&self) -> [f32; 3] {
        self.pos_le.map(f32_from_le)
    }
}

/// Frame header preceding a PF message's face array.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireFrameHeader {
    pub frame_le: i32,
    pub dims_le: [i32; 3],
    /// Producer-side face count; the authoritative count follows the header.
    pub count_le: u32,
    pub pbc: [u8; 3],
    pub _pad: u8,
    pub origins_le: [u32; 3],
    pub lengths_le: [u32; 3],
    pub cell_lengths_le: [u32; 3],
    pub b_le: [u32; 3],
    pub kx_le: u32,
}

impl WireFrameHeader {
    pub const SIZE: usize = 76;

    pub fn from_header(h: &FrameHeader, count: u32) -> Self {
        Self {
            frame_le: h.frame.to_le(),
            dims_le: h.dims.map(|d| (d as i32).to_le()),
            count_le: count.to_le(),
            pbc: h.pbc.map(u8::from),
            _pad: 0,
            origins_le: vec3_le(h.origins),
            lengths_le: vec3_le(h.lengths),
            cell_lengths_le: vec3_le(h.cell_lengths),
            b_le: vec3_le(h.b),
            kx_le: f32_le(h.kx as f32),
        }
    }

    /// Decode into a [`FrameHeader`]. Negative dimensions clamp to zero and
    /// are rejected later when the lattice is built.
    pub fn to_header(&self) -> FrameHeader {
        FrameHeader {
            frame: i32::from_le(self.frame_le),
            dims: self.dims_le.map(|d| i32::from_le(d).max(0) as usize),
            pbc: self.pbc.map(|b| b != 0),
            origins: vec3_from_le(self.origins_le),
            lengths: vec3_from_le(self.lengths_le),
            cell_lengths: vec3_from_le(self.cell_lengths_le),
            b: vec3_from_le(self.b_le),
            kx: f32_from_le(self.kx_le) as f64,
        }
    }

    pub fn count(&self) -> u32 {
        u32::from_le(self.count_le)
    }
}

// ===== Punctured edges =====================================================

/// Frame pair and record count of a PE message.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireEdgePairHdr {
    pub f0_le: i32,
    pub f1_le: i32,
    pub count_le: i32,
}

impl WireEdgePairHdr {
    pub fn new(f0: i32, f1: i32, count: i32) -> Self {
        Self {
            f0_le: f0.to_le(),
            f1_le: f1.to_le(),
            count_le: count.to_le(),
        }
    }
    pub fn frames(&self) -> (i32, i32) {
        (i32::from_le(self.f0_le), i32::from_le(self.f1_le))
    }
    pub fn count(&self) -> i32 {
        i32::from_le(self.count_le)
    }
}

// ===== Transition matrix files =============================================

/// Header of a persisted transition matrix; `n0 * n1` i32 entries follow.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireMatrixHdr {
    pub t0_le: i32,
    pub t1_le: i32,
    pub n0_le: i32,
    pub n1_le: i32,
}

impl WireMatrixHdr {
    pub fn new(t0: i32, t1: i32, n0: i32, n1: i32) -> Self {
        Self {
            t0_le: t0.to_le(),
            t1_le: t1.to_le(),
            n0_le: n0.to_le(),
            n1_le: n1.to_le(),
        }
    }
    pub fn decode(&self) -> (i32, i32, i32, i32) {
        (
            i32::from_le(self.t0_le),
            i32::from_le(self.t1_le),
            i32::from_le(self.n0_le),
            i32::from_le(self.n1_le),
        )
    }
}

// ===== Compile-time sanity checks =========================================

const _: () = {
    assert!(size_of::<WirePuncturedFace>() == WirePuncturedFace::SIZE);
    assert!(size_of::<WireFrameHeader>() == WireFrameHeader::SIZE);
    assert!(align_of::<WireFrameHeader>() == 4);
    assert!(size_of::<WireEdgePairHdr>() == 12);
    assert!(size_of::<WireMatrixHdr>() == 16);
};

static_assertions::assert_eq_size!(PackedFace, [u8; 8]);

#[cfg(test)]
mod tests {
    use super::*;
    use bytemuck::{Zeroable, cast_slice};

    #[test]
    fn packed_face_bits() {
        let p = PackedFace::decode(0x8000_002a);
        assert_eq!(p.id, 42);
        assert_eq!(p.chirality, Chirality::Positive);
        let n = PackedFace::decode(42);
        assert_eq!(n.chirality, Chirality::Negative);
        assert_eq!(n.encode(), 42);
        assert_eq!(p.encode(), 0x8000_002a);
        assert!(PackedFace::new(0x8000_0000, Chirality::Positive).is_none());
    }

    #[test]
    fn header_layout_offsets() {
        let h = FrameHeader {
            frame: 7,
            dims: [4, 5, 6],
            pbc: [true, false, true],
            origins: [-1.0, -2.0, -3.0],
            lengths: [4.0, 5.0, 6.0],
            cell_lengths: [1.0, 1.0, 1.0],
            b: [0.0, 0.5, 0.0],
            kx: 0.25,
        };
        let w = WireFrameHeader::from_header(&h, 3);
        let bytes: Vec<u8> = cast_slice(&[w]).to_vec();
        assert_eq!(bytes.len(), 76);
        assert_eq!(&bytes[0..4], &7i32.to_le_bytes());
        assert_eq!(&bytes[8..12], &5i32.to_le_bytes());
        assert_eq!(&bytes[16..20], &3u32.to_le_bytes());
        assert_eq!(&bytes[20..24], &[1, 0, 1, 0]);
        assert_eq!(&bytes[72..76], &0.25f32.to_le_bytes());
        let back: WireFrameHeader = read_record("header", &bytes).unwrap();
        assert_eq!(back.to_header(), h);
    }

    #[test]
    fn face_record_layout() {
        let r = WirePuncturedFace::new(
            PackedFace::new(9, Chirality::Positive).unwrap(),
            [1.5, 2.5, 3.5],
        );
        let bytes: Vec<u8> = cast_slice(&[r]).to_vec();
        assert_eq!(&bytes[0..4], &0x8000_0009u32.to_le_bytes());
        assert_eq!(&bytes[4..8], &1.5f32.to_le_bytes());
        let z = WirePuncturedFace::zeroed();
        assert_eq!(z.face().id, 0);
    }

    #[test]
    fn short_reads_are_truncation() {
        let e = read_record::<WireMatrixHdr>("matrix header", &[0u8; 10]).unwrap_err();
        assert!(e.is_truncation());
        assert!(expect_exact_len("m", 12, 16).unwrap_err().is_truncation());
        assert!(matches!(
            expect_exact_len("m", 20, 16),
            Err(TrackError::ByteCountMismatch { .. })
        ));
    }
}
