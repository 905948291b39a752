//! Read-only access to the sampled order-parameter field of one frame.
//!
//! The extractor only needs a narrow view of the simulation data: grid
//! geometry (dims, origin, cell size, periodic axes), complex samples at grid
//! points, and the gauge transformation between two physical positions. The
//! [`VolumeField`] trait captures that view; dataset readers live outside
//! this crate and implement it.
//!
//! [`RegularVolume`] is the implementation for structured grids described by
//! a [`FrameHeader`]. Samples are optional: a header alone is enough to
//! interpret punctured-face crossings geometrically.

use num_complex::Complex64;
use once_cell::sync::OnceCell;
use std::f64::consts::{PI, TAU};

use crate::topology::lattice::{Idx3, RegularLattice};
use crate::track_error::TrackError;

/// Geometry and physical parameters of one frame.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FrameHeader {
    pub frame: i32,
    pub dims: [usize; 3],
    pub pbc: [bool; 3],
    pub origins: [f64; 3],
    pub lengths: [f64; 3],
    pub cell_lengths: [f64; 3],
    /// External magnetic field.
    pub b: [f64; 3],
    /// External current (gauge parameter along x).
    pub kx: f64,
}

impl Default for FrameHeader {
    fn default() -> Self {
        Self {
            frame: 0,
            dims: [2; 3],
            pbc: [false; 3],
            origins: [0.0; 3],
            lengths: [1.0; 3],
            cell_lengths: [1.0; 3],
            b: [0.0; 3],
            kx: 0.0,
        }
    }
}

impl FrameHeader {
    /// Unit-spaced header over `dims` grid points starting at the origin.
    pub fn unit(frame: i32, dims: [usize; 3], pbc: [bool; 3]) -> Self {
        Self {
            frame,
            dims,
            pbc,
            origins: [0.0; 3],
            lengths: dims.map(|d| d as f64),
            cell_lengths: [1.0; 3],
            ..Self::default()
        }
    }

    pub fn lattice(&self) -> Result<RegularLattice, TrackError> {
        RegularLattice::new(self.dims, self.pbc)
    }
}

/// Wrap an angle into `[0, 2π)`.
#[inline]
pub fn mod2pi(x: f64) -> f64 {
    x.rem_euclid(TAU)
}

/// Narrow, read-only query interface over one frame's field.
pub trait VolumeField: Send + Sync {
    fn dims(&self) -> [usize; 3];
    fn pbc(&self) -> [bool; 3];
    /// Physical extent of the domain per axis.
    fn lengths(&self) -> [f64; 3];
    /// Complex order parameter at a grid point, when samples are attached.
    fn value(&self, idx: Idx3) -> Option<Complex64>;
    /// Physical position of a grid point.
    fn position(&self, idx: Idx3) -> [f64; 3];
    /// Phase accumulated by the gauge field along the segment `x0 -> x1`.
    fn gauge_transformation(&self, _x0: [f64; 3], _x1: [f64; 3]) -> f64 {
        0.0
    }
}

/// Structured-grid field described by a [`FrameHeader`].
#[derive(Debug)]
pub struct RegularVolume {
    header: FrameHeader,
    samples: Option<Vec<Complex64>>,
    supercurrent: OnceCell<Vec<[f64; 3]>>,
}

impl RegularVolume {
    /// Geometry-only field (no samples).
    pub fn new(header: FrameHeader) -> Self {
        Self {
            header,
            samples: None,
            supercurrent: OnceCell::new(),
        }
    }

    /// Field with one complex sample per grid point, in node-index order.
    pub fn with_samples(header: FrameHeader, samples: Vec<Complex64>) -> Result<Self, TrackError> {
        let expected = header.dims.iter().product::<usize>();
        if samples.len() != expected {
            return Err(TrackError::InvalidMesh(format!(
                "expected {expected} samples for dims {:?}, got {}",
                header.dims,
                samples.len()
            )));
        }
        Ok(Self {
            header,
            samples: Some(samples),
            supercurrent: OnceCell::new(),
        })
    }

    #[inline]
    pub fn header(&self) -> &FrameHeader {
        &self.header
    }

    #[inline]
    fn offset(&self, idx: Idx3) -> Option<usize> {
        let d = self.header.dims;
        (idx[0] < d[0] && idx[1] < d[1] && idx[2] < d[2])
            .then(|| idx[0] + d[0] * (idx[1] + d[1] * idx[2]))
    }

    /// Continuous grid coordinates of a physical position.
    pub fn pos_to_grid(&self, pos: [f64; 3]) -> [f64; 3] {
        let h = &self.header;
        std::array::from_fn(|a| (pos[a] - h.origins[a]) / h.cell_lengths[a])
    }

    /// Grid point at or below a physical position; `None` outside the grid.
    pub fn pos_to_idx(&self, pos: [f64; 3]) -> Option<Idx3> {
        let g = self.pos_to_grid(pos);
        let mut out = [0usize; 3];
        for a in 0..3 {
            if !g[a].is_finite() || g[a] < 0.0 || g[a] >= self.header.dims[a] as f64 {
                return None;
            }
            out[a] = g[a] as usize;
        }
        Some(out)
    }

    /// Phase of the order parameter at a grid point.
    pub fn phase(&self, idx: Idx3) -> Option<f64> {
        self.value(idx).map(|z| z.arg())
    }

    /// Magnetic vector potential at a physical position.
    ///
    /// With `By > 0` the Y-Z gauge `A = (K, -x Bz, x By)` is used, otherwise
    /// the X-Z gauge `A = (y Bz + K, 0, -y Bx)`.
    pub fn vector_potential(&self, pos: [f64; 3]) -> [f64; 3] {
        let [bx, by, bz] = self.header.b;
        let k = self.header.kx;
        if by > 0.0 {
            [k, -pos[0] * bz, pos[0] * by]
        } else {
            [pos[1] * bz + k, 0.0, -pos[1] * bx]
        }
    }

    /// Displacement `x1 - x0` under the minimum-image convention on
    /// periodic axes, plus the per-axis wrap sign: `+1` when the raw
    /// difference exceeds `L/2`, `-1` when it is below `-L/2`.
    fn min_image(&self, x0: [f64; 3], x1: [f64; 3]) -> ([f64; 3], [i32; 3]) {
        let l = self.header.lengths;
        let mut d = [0.0; 3];
        let mut p = [0; 3];
        for a in 0..3 {
            d[a] = x1[a] - x0[a];
            if self.header.pbc[a] {
                if d[a] > l[a] / 2.0 {
                    d[a] -= l[a];
                    p[a] = 1;
                } else if d[a] < -l[a] / 2.0 {
                    d[a] += l[a];
                    p[a] = -1;
                }
            }
        }
        (d, p)
    }

    /// Gauge jump picked up when a segment crosses a periodic boundary.
    ///
    /// Only x and y wraps contribute; the z extent scales the field terms
    /// normal to the wrapped axis. Evaluated at `x0`, not at the crossing.
    pub fn periodic_flux_correction(&self, x0: [f64; 3], x1: [f64; 3]) -> f64 {
        let (_, p) = self.min_image(x0, x1);
        let l = self.header.lengths;
        let [bx, by, bz] = self.header.b;
        if p[0] != 0 {
            p[0] as f64 * (l[0] * bz * x0[1] - l[2] * by * x0[2])
        } else if p[1] != 0 {
            p[1] as f64 * (-l[2] * bz * x0[0] + l[2] * bx * x0[2])
        } else {
            0.0
        }
    }

    /// Supercurrent `J = ∇θ - A` at every interior grid point.
    ///
    /// Computed once on first use by central differences of the wrapped
    /// phase; boundary points are zero. `None` without samples.
    pub fn supercurrent(&self) -> Option<&[[f64; 3]]> {
        self.samples.as_ref()?;
        Some(self.supercurrent.get_or_init(|| self.compute_supercurrent()))
    }

    fn compute_supercurrent(&self) -> Vec<[f64; 3]> {
        let d = self.header.dims;
        let h = self.header.cell_lengths;
        let mut j = vec![[0.0; 3]; d.iter().product()];
        let phase = |i: Idx3| self.phase(i).unwrap_or(0.0);
        for z in 1..d[2].saturating_sub(1) {
            for y in 1..d[1].saturating_sub(1) {
                for x in 1..d[0].saturating_sub(1) {
                    let idx = [x, y, z];
                    let a = self.vector_potential(self.position(idx));
                    let mut jv = [0.0; 3];
                    for axis in 0..3 {
                        let mut hi = idx;
                        let mut lo = idx;
                        hi[axis] += 1;
                        lo[axis] -= 1;
                        let dphi = mod2pi(phase(hi) - phase(lo) + PI) - PI;
                        jv[axis] = 0.5 * dphi / h[axis] - a[axis];
                    }
                    if let Some(o) = self.offset(idx) {
                        j[o] = jv;
                    }
                }
            }
        }
        j
    }

    /// Trilinearly interpolated supercurrent at a physical position.
    ///
    /// Only defined strictly inside the interior cells where central
    /// differences exist.
    pub fn supercurrent_at(&self, pos: [f64; 3]) -> Option<[f64; 3]> {
        let field = self.supercurrent()?;
        let g = self.pos_to_grid(pos);
        let d = self.header.dims;
        let mut base = [0usize; 3];
        let mut frac = [0.0; 3];
        for a in 0..3 {
            if !g[a].is_finite() || g[a] <= 1.0 || g[a] >= d[a] as f64 - 2.0 {
                return None;
            }
            base[a] = g[a].floor() as usize;
            frac[a] = g[a] - base[a] as f64;
        }
        let mut out = [0.0; 3];
        for corner in 0..8usize {
            let mut idx = base;
            let mut w = 1.0;
            for a in 0..3 {
                if corner >> a & 1 == 1 {
                    idx[a] += 1;
                    w *= frac[a];
                } else {
                    w *= 1.0 - frac[a];
                }
            }
            let v = field[self.offset(idx)?];
            for a in 0..3 {
                out[a] += w * v[a];
            }
        }
        Some(out)
    }
}

impl VolumeField for RegularVolume {
    fn dims(&self) -> [usize; 3] {
        self.header.dims
    }

    fn pbc(&self) -> [bool; 3] {
        self.header.pbc
    }

    fn lengths(&self) -> [f64; 3] {
        self.header.lengths
    }

    fn value(&self, idx: Idx3) -> Option<Complex64> {
        let o = self.offset(idx)?;
        self.samples.as_ref().map(|s| s[o])
    }

    fn position(&self, idx: Idx3) -> [f64; 3] {
        let h = &self.header;
        std::array::from_fn(|a| idx[a] as f64 * h.cell_lengths[a] + h.origins[a])
    }

    /// Line integral of the vector potential, evaluated at the segment
    /// midpoint, plus the flux correction when the segment wraps.
    fn gauge_transformation(&self, x0: [f64; 3], x1: [f64; 3]) -> f64 {
        let (d, _) = self.min_image(x0, x1);
        let mid = std::array::from_fn(|a| x0[a] + 0.5 * d[a]);
        let a = self.vector_potential(mid);
        a[0] * d[0] + a[1] * d[1] + a[2] * d[2] + self.periodic_flux_correction(x0, x1)
    }
}
