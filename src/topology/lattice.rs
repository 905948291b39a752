//! Closed-form index arithmetic for structured i/j/k lattices.
//!
//! A lattice with `dims = [nx, ny, nz]` grid points has node index
//! `i + nx * (j + ny * k)`. Along axis `a` there are `cells(a)` cells (and
//! edges per grid line): `dims[a] - 1` normally, `dims[a]` when the axis is
//! periodic and wraps around.
//!
//! Edges and faces carry two numberings:
//! - the *lattice id* `3 * node + axis`, used by detection producers (for a
//!   face, `axis` is its normal);
//! - the *dense id*, a position in the [`MeshGraph`](super::mesh_graph::MeshGraph)
//!   arena. Dense ids are grouped by axis, each group in mixed-radix order.
//!
//! The face normal to `t` anchored at node `n` is wound
//! `n, n+u, n+u+v, n+v` with `(t, u, v)` a cyclic permutation of `(x, y, z)`,
//! so its orientation normal points along `+t`.

use crate::topology::ids::{EdgeId, ElemId, FaceId, NodeId};
use crate::track_error::TrackError;

/// Lattice coordinates of a grid point or cell corner.
pub type Idx3 = [usize; 3];

/// Structured lattice description.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RegularLattice {
    dims: [usize; 3],
    pbc: [bool; 3],
}

#[inline]
const fn in_plane(t: usize) -> (usize, usize) {
    ((t + 1) % 3, (t + 2) % 3)
}

impl RegularLattice {
    /// Describe a lattice. Each axis needs at least two grid points.
    pub fn new(dims: [usize; 3], pbc: [bool; 3]) -> Result<Self, TrackError> {
        if dims.iter().any(|&d| d < 2) {
            return Err(TrackError::InvalidMesh(format!(
                "lattice dims must be >= 2 on every axis, got {dims:?}"
            )));
        }
        let nodes = dims[0]
            .checked_mul(dims[1])
            .and_then(|v| v.checked_mul(dims[2]))
            .and_then(|v| v.checked_mul(3));
        match nodes {
            Some(n) if n <= u32::MAX as usize => Ok(Self { dims, pbc }),
            _ => Err(TrackError::InvalidMesh(format!(
                "lattice dims {dims:?} exceed the 32-bit id space"
            ))),
        }
    }

    #[inline]
    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    #[inline]
    pub fn pbc(&self) -> [bool; 3] {
        self.pbc
    }

    /// Number of cells along axis `a`.
    #[inline]
    pub fn cells(&self, a: usize) -> usize {
        if self.pbc[a] {
            self.dims[a]
        } else {
            self.dims[a] - 1
        }
    }

    #[inline]
    pub fn node_count(&self) -> usize {
        self.dims[0] * self.dims[1] * self.dims[2]
    }

    #[inline]
    pub fn elem_count(&self) -> usize {
        self.cells(0) * self.cells(1) * self.cells(2)
    }

    fn edge_ranges(&self, a: usize) -> [usize; 3] {
        let mut r = self.dims;
        r[a] = self.cells(a);
        r
    }

    fn face_ranges(&self, t: usize) -> [usize; 3] {
        let (u, v) = in_plane(t);
        let mut r = self.dims;
        r[u] = self.cells(u);
        r[v] = self.cells(v);
        r
    }

    fn group_len(r: [usize; 3]) -> usize {
        r[0] * r[1] * r[2]
    }

    pub fn edge_count(&self) -> usize {
        (0..3).map(|a| Self::group_len(self.edge_ranges(a))).sum()
    }

    pub fn face_count(&self) -> usize {
        (0..3).map(|t| Self::group_len(self.face_ranges(t))).sum()
    }

    #[inline]
    fn radix(idx: Idx3, r: [usize; 3]) -> Option<usize> {
        if idx[0] < r[0] && idx[1] < r[1] && idx[2] < r[2] {
            Some(idx[0] + r[0] * (idx[1] + r[1] * idx[2]))
        } else {
            None
        }
    }

    #[inline]
    fn unradix(mut i: usize, r: [usize; 3]) -> Idx3 {
        let x = i % r[0];
        i /= r[0];
        let y = i % r[1];
        [x, y, i / r[1]]
    }

    /// Node id of a grid point.
    #[inline]
    pub fn node(&self, idx: Idx3) -> Option<NodeId> {
        Self::radix(idx, self.dims).map(NodeId::from_index)
    }

    #[inline]
    pub fn node_idx(&self, n: NodeId) -> Idx3 {
        Self::unradix(n.index(), self.dims)
    }

    /// Apply periodic wrap to signed coordinates; `None` if they leave a
    /// non-periodic axis.
    pub fn wrap(&self, idx: [i64; 3]) -> Option<Idx3> {
        let mut out = [0usize; 3];
        for a in 0..3 {
            let d = self.dims[a] as i64;
            let mut x = idx[a];
            if self.pbc[a] {
                x = x.rem_euclid(d);
            } else if x < 0 || x >= d {
                return None;
            }
            out[a] = x as usize;
        }
        Some(out)
    }

    /// Grid point reached from `idx` by a signed step along axis `a`.
    #[inline]
    pub fn step(&self, idx: Idx3, a: usize, delta: i64) -> Option<Idx3> {
        let mut s = idx.map(|x| x as i64);
        s[a] += delta;
        self.wrap(s)
    }

    /// Element whose minimum corner is `idx`.
    #[inline]
    pub fn elem(&self, idx: Idx3) -> Option<ElemId> {
        Self::radix(idx, [self.cells(0), self.cells(1), self.cells(2)]).map(ElemId::from_index)
    }

    #[inline]
    pub fn elem_idx(&self, e: ElemId) -> Idx3 {
        Self::unradix(e.index(), [self.cells(0), self.cells(1), self.cells(2)])
    }

    /// Dense id of the edge leaving `idx` along `+a`.
    pub fn edge(&self, idx: Idx3, a: usize) -> Option<EdgeId> {
        let offset: usize = (0..a).map(|b| Self::group_len(self.edge_ranges(b))).sum();
        Self::radix(idx, self.edge_ranges(a)).map(|i| EdgeId::from_index(offset + i))
    }

    /// Anchor point and axis of a dense edge id.
    pub fn edge_of(&self, e: EdgeId) -> Option<(Idx3, usize)> {
        let mut i = e.index();
        for a in 0..3 {
            let r = self.edge_ranges(a);
            let len = Self::group_len(r);
            if i < len {
                return Some((Self::unradix(i, r), a));
            }
            i -= len;
        }
        None
    }

    /// Dense id of the face normal to `t` anchored at `idx`.
    pub fn face(&self, idx: Idx3, t: usize) -> Option<FaceId> {
        let offset: usize = (0..t).map(|b| Self::group_len(self.face_ranges(b))).sum();
        Self::radix(idx, self.face_ranges(t)).map(|i| FaceId::from_index(offset + i))
    }

    /// Anchor point and normal axis of a dense face id.
    pub fn face_of(&self, f: FaceId) -> Option<(Idx3, usize)> {
        let mut i = f.index();
        for t in 0..3 {
            let r = self.face_ranges(t);
            let len = Self::group_len(r);
            if i < len {
                return Some((Self::unradix(i, r), t));
            }
            i -= len;
        }
        None
    }

    /// Map a producer-side lattice face id (`3 * node + normal`) to a dense id.
    pub fn resolve_face(&self, lattice_id: u32) -> Option<FaceId> {
        let node = lattice_id as usize / 3;
        let t = lattice_id as usize % 3;
        if node >= self.node_count() {
            return None;
        }
        self.face(self.node_idx(NodeId::from_index(node)), t)
    }

    /// Map a producer-side lattice edge id (`3 * node + axis`) to a dense id.
    pub fn resolve_edge(&self, lattice_id: u32) -> Option<EdgeId> {
        let node = lattice_id as usize / 3;
        let a = lattice_id as usize % 3;
        if node >= self.node_count() {
            return None;
        }
        self.edge(self.node_idx(NodeId::from_index(node)), a)
    }

    /// Lattice id of a dense face, the inverse of [`resolve_face`](Self::resolve_face).
    pub fn lattice_face_id(&self, f: FaceId) -> Option<u32> {
        let (idx, t) = self.face_of(f)?;
        let n = self.node(idx)?;
        Some(3 * n.get() + t as u32)
    }

    /// Corner grid points of a face in orientation order.
    pub fn face_corners(&self, idx: Idx3, t: usize) -> Option<[Idx3; 4]> {
        let (u, v) = in_plane(t);
        let pu = self.step(idx, u, 1)?;
        let puv = self.step(pu, v, 1)?;
        let pv = self.step(idx, v, 1)?;
        Some([idx, pu, puv, pv])
    }

    /// Faces sharing the edge anchored at `idx` along axis `a`.
    ///
    /// Each of the two face normals perpendicular to `a` contributes the
    /// face anchored at `idx` and the one anchored one step back along the
    /// remaining axis; faces outside a non-periodic lattice are skipped.
    pub fn faces_around_edge(&self, idx: Idx3, a: usize) -> Vec<FaceId> {
        let mut out = Vec::with_capacity(4);
        for t in (0..3).filter(|&t| t != a) {
            let w = 3 - a - t;
            out.extend(self.face(idx, t));
            if let Some(back) = self.step(idx, w, -1) {
                out.extend(self.face(back, t));
            }
        }
        out
    }

    /// In-plane axes `(u, v)` of a face normal to `t`.
    #[inline]
    pub fn in_plane(t: usize) -> (usize, usize) {
        in_plane(t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_open_and_periodic() {
        let open = RegularLattice::new([4, 4, 4], [false; 3]).unwrap();
        assert_eq!(open.elem_count(), 27);
        assert_eq!(open.edge_count(), 3 * 3 * 16);
        assert_eq!(open.face_count(), 3 * 4 * 9);

        let wrapped = RegularLattice::new([4, 4, 4], [true; 3]).unwrap();
        assert_eq!(wrapped.elem_count(), 64);
        assert_eq!(wrapped.edge_count(), 3 * 64);
        assert_eq!(wrapped.face_count(), 3 * 64);
    }

    #[test]
    fn dense_ids_roundtrip() {
        let l = RegularLattice::new([3, 4, 5], [false, true, false]).unwrap();
        for f in 0..l.face_count() {
            let f = FaceId::from_index(f);
            let (idx, t) = l.face_of(f).unwrap();
            assert_eq!(l.face(idx, t), Some(f));
            let lat = l.lattice_face_id(f).unwrap();
            assert_eq!(l.resolve_face(lat), Some(f));
        }
        for e in 0..l.edge_count() {
            let e = EdgeId::from_index(e);
            let (idx, a) = l.edge_of(e).unwrap();
            assert_eq!(l.edge(idx, a), Some(e));
        }
        assert!(l.face_of(FaceId::from_index(l.face_count())).is_none());
    }

    #[test]
    fn wrap_only_on_periodic_axes() {
        let l = RegularLattice::new([4, 4, 4], [true, false, false]).unwrap();
        assert_eq!(l.wrap([-1, 0, 0]), Some([3, 0, 0]));
        assert_eq!(l.wrap([0, -1, 0]), None);
        assert_eq!(l.step([3, 2, 2], 0, 1), Some([0, 2, 2]));
        assert_eq!(l.step([2, 3, 2], 1, 1), None);
    }

    #[test]
    fn boundary_faces_have_no_lattice_slot_beyond_the_last_cell() {
        let l = RegularLattice::new([4, 4, 4], [false; 3]).unwrap();
        // XY face anchored at the last x column would span x=3..4.
        let node = l.node([3, 1, 1]).unwrap();
        assert_eq!(l.resolve_face(3 * node.get() + 2), None);
        // ...but the YZ face there is a domain-boundary face.
        assert!(l.resolve_face(3 * node.get()).is_some());
    }

    #[test]
    fn interior_edges_touch_four_faces() {
        let l = RegularLattice::new([4, 4, 4], [false; 3]).unwrap();
        let around = l.faces_around_edge([1, 1, 1], 2);
        assert_eq!(around.len(), 4);
        for f in &around {
            let (idx, t) = l.face_of(*f).unwrap();
            assert_ne!(t, 2);
            let corners = l.face_corners(idx, t).unwrap();
            assert!(corners.contains(&[1, 1, 1]) && corners.contains(&[1, 1, 2]));
        }
        // A corner edge of the box borders a single face per normal.
        assert_eq!(l.faces_around_edge([0, 0, 0], 2).len(), 2);
    }

    #[test]
    fn rejects_degenerate_dims() {
        assert!(RegularLattice::new([1, 4, 4], [false; 3]).is_err());
    }
}
