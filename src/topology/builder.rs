//! Construction of [`MeshGraph`]s from element connectivity.
//!
//! Two strategies share the [`MeshGraphBuilder`] contract:
//!
//! - [`IncidenceBuilder`] takes, per element, its node list, face-aligned
//!   neighbor ids and face node tuples, and deduplicates shared faces and
//!   edges through canonical-key registries. It serves tetrahedral meshes and
//!   unstructured hexahedral meshes.
//! - [`RegularGridBuilder`] produces the hexahedral graph of a structured
//!   i/j/k lattice (with optional periodic wrap per axis) directly from index
//!   arithmetic, without any lookup tables.
//!
//! Element faces are expected to be wound outward. The local face tables
//! [`TET_FACES`] and [`HEX_FACES`] give that winding for the usual node
//! orderings.

use hashbrown::HashMap;

use crate::debug_invariants::DebugInvariants;
use crate::topology::canonical::{canonical_edge, canonical_face};
use crate::topology::cell_type::CellType;
use crate::topology::chirality::Chirality;
use crate::topology::ids::{EdgeId, ElemId, FaceId, NodeId};
use crate::topology::lattice::{Idx3, RegularLattice};
use crate::topology::mesh_graph::{
    Edge, EdgeIncidence, Element, Face, FaceNeighbor, MeshGraph,
};
use crate::track_error::TrackError;

/// Outward faces of a positively oriented tetrahedron; face `i` is opposite node `i`.
pub const TET_FACES: [[usize; 3]; 4] = [[1, 2, 3], [0, 3, 2], [0, 1, 3], [0, 2, 1]];

/// Outward faces of a hexahedron with nodes ordered bottom ring `0..4`, top
/// ring `4..8`; faces ordered `-x, -y, -z, +x, +y, +z`.
pub const HEX_FACES: [[usize; 4]; 6] = [
    [0, 4, 7, 3],
    [0, 1, 5, 4],
    [0, 3, 2, 1],
    [1, 2, 6, 5],
    [3, 7, 6, 2],
    [4, 5, 6, 7],
];

/// Common contract of mesh-topology builders.
pub trait MeshGraphBuilder {
    /// Element topology produced by this builder.
    fn cell_type(&self) -> CellType;

    /// Produce the fully linked graph.
    fn build(self) -> Result<MeshGraph, TrackError>;
}

#[derive(Clone, Debug)]
struct ElemInput {
    nodes: Vec<NodeId>,
    neighbors: Vec<Option<ElemId>>,
    faces: Vec<Vec<NodeId>>,
}

/// Map-based builder for unstructured connectivity.
#[derive(Clone, Debug)]
pub struct IncidenceBuilder {
    cell_type: CellType,
    elems: Vec<Option<ElemInput>>,
}

impl IncidenceBuilder {
    /// Builder expecting exactly `n_elems` elements of type `cell_type`.
    pub fn new(cell_type: CellType, n_elems: usize) -> Self {
        Self {
            cell_type,
            elems: vec![None; n_elems],
        }
    }

    pub fn tetrahedral(n_elems: usize) -> Self {
        Self::new(CellType::Tetrahedron, n_elems)
    }

    pub fn hexahedral(n_elems: usize) -> Self {
        Self::new(CellType::Hexahedron, n_elems)
    }

    /// Register element `id` with explicit face tuples.
    ///
    /// `neighbors[f]` is the element across `faces[f]`, `None` on the boundary.
    pub fn add_elem(
        &mut self,
        id: ElemId,
        nodes: &[NodeId],
        neighbors: &[Option<ElemId>],
        faces: &[Vec<NodeId>],
    ) -> Result<(), TrackError> {
        let n_elems = self.elems.len();
        let ct = self.cell_type;
        if id.index() >= n_elems {
            return Err(TrackError::InvalidMesh(format!(
                "element {id:?} out of range (n_elems = {n_elems})"
            )));
        }
        if nodes.len() != ct.node_count() {
            return Err(TrackError::InvalidMesh(format!(
                "element {id:?} has {} nodes, {ct:?} needs {}",
                nodes.len(),
                ct.node_count()
            )));
        }
        if faces.len() != ct.face_count() || neighbors.len() != ct.face_count() {
            return Err(TrackError::InvalidMesh(format!(
                "element {id:?} has {} faces / {} neighbors, {ct:?} needs {}",
                faces.len(),
                neighbors.len(),
                ct.face_count()
            )));
        }
        if let Some(f) = faces.iter().find(|f| f.len() != ct.nodes_per_face()) {
            return Err(TrackError::InvalidMesh(format!(
                "element {id:?} has a face with {} nodes, {ct:?} needs {}",
                f.len(),
                ct.nodes_per_face()
            )));
        }
        if let Some(bad) = neighbors.iter().flatten().find(|n| n.index() >= n_elems) {
            return Err(TrackError::InvalidMesh(format!(
                "element {id:?} lists neighbor {bad:?} out of range"
            )));
        }
        let slot = &mut self.elems[id.index()];
        if slot.is_some() {
            return Err(TrackError::InvalidMesh(format!("element {id:?} added twice")));
        }
        *slot = Some(ElemInput {
            nodes: nodes.to_vec(),
            neighbors: neighbors.to_vec(),
            faces: faces.to_vec(),
        });
        Ok(())
    }

    /// Register element `id`, deriving its faces from the local face table of
    /// the builder's cell type.
    pub fn add_elem_local(
        &mut self,
        id: ElemId,
        nodes: &[NodeId],
        neighbors: &[Option<ElemId>],
    ) -> Result<(), TrackError> {
        if nodes.len() != self.cell_type.node_count() {
            return Err(TrackError::InvalidMesh(format!(
                "element {id:?} has {} nodes, {:?} needs {}",
                nodes.len(),
                self.cell_type,
                self.cell_type.node_count()
            )));
        }
        let faces: Vec<Vec<NodeId>> = match self.cell_type {
            CellType::Tetrahedron => TET_FACES
                .iter()
                .map(|f| f.iter().map(|&i| nodes[i]).collect())
                .collect(),
            CellType::Hexahedron => HEX_FACES
                .iter()
                .map(|f| f.iter().map(|&i| nodes[i]).collect())
                .collect(),
        };
        self.add_elem(id, nodes, neighbors, &faces)
    }
}

struct Registries {
    faces: HashMap<Vec<NodeId>, FaceId>,
    edges: HashMap<[NodeId; 2], EdgeId>,
}

impl Registries {
    fn edge(&mut self, g: &mut MeshGraph, a: NodeId, b: NodeId) -> (EdgeId, Chirality) {
        let (key, chirality) = canonical_edge(a, b);
        let id = *self.edges.entry(key).or_insert_with(|| {
            g.edges.push(Edge {
                nodes: key,
                faces: Vec::new(),
            });
            EdgeId::from_index(g.edges.len() - 1)
        });
        (id, chirality)
    }

    /// Look up or create the face for a raw tuple; returns the face and the
    /// raw tuple's chirality relative to the stored winding.
    fn face(&mut self, g: &mut MeshGraph, raw: &[NodeId]) -> (FaceId, Chirality) {
        let (key, twist) = canonical_face(raw);
        if let Some(&id) = self.faces.get(&key) {
            return (id, twist.chirality);
        }
        let fid = FaceId::from_index(g.faces.len());
        let mut face = Face::new(key.clone());
        let n = key.len();
        for k in 0..n {
            let (eid, chirality) = self.edge(g, key[k], key[(k + 1) % n]);
            g.edges[eid.index()].faces.push(EdgeIncidence {
                face: fid,
                chirality,
                local_index: k as u8,
            });
            face.edges.push((eid, chirality));
        }
        g.faces.push(face);
        self.faces.insert(key, fid);
        (fid, twist.chirality)
    }
}

impl MeshGraphBuilder for IncidenceBuilder {
    fn cell_type(&self) -> CellType {
        self.cell_type
    }

    fn build(self) -> Result<MeshGraph, TrackError> {
        let n_elems = self.elems.len();
        let ct = self.cell_type;
        let mut g = MeshGraph::with_capacity(
            ct,
            n_elems * ct.edge_count() / 2,
            n_elems * ct.face_count() / 2 + 1,
            n_elems,
        );
        let mut reg = Registries {
            faces: HashMap::with_capacity(n_elems * ct.face_count() / 2 + 1),
            edges: HashMap::with_capacity(n_elems * ct.edge_count() / 2),
        };

        for (i, input) in self.elems.into_iter().enumerate() {
            let Some(input) = input else {
                return Err(TrackError::InvalidMesh(format!(
                    "element {i} of {n_elems} was never added"
                )));
            };
            let eid = ElemId::from_index(i);
            let mut faces = Vec::with_capacity(input.faces.len());
            for (local, raw) in input.faces.iter().enumerate() {
                let (fid, wound) = reg.face(&mut g, raw);
                let face = &mut g.faces[fid.index()];
                // A second owner that winds the face the same way as the
                // first takes the opposite slot.
                let chirality = match (face.neighbor(wound), face.neighbor(wound.invert())) {
                    (None, _) => wound,
                    (Some(_), None) => wound.invert(),
                    (Some(_), Some(_)) => {
                        return Err(TrackError::NonManifoldFace {
                            nodes: face.nodes.iter().map(|n| n.get()).collect(),
                            side: if wound.is_positive() { "+1" } else { "-1" },
                        });
                    }
                };
                let slot = match chirality {
                    Chirality::Positive => &mut face.elem1,
                    Chirality::Negative => &mut face.elem0,
                };
                *slot = Some(FaceNeighbor {
                    elem: eid,
                    local_index: local as u8,
                });
                faces.push((fid, chirality));
            }
            g.elems.push(Element {
                nodes: input.nodes,
                faces,
                neighbors: input.neighbors,
            });
        }

        g.debug_assert_invariants();
        log::debug!(
            "built {:?} mesh graph: {} elems, {} faces, {} edges",
            ct,
            g.elems.len(),
            g.faces.len(),
            g.edges.len()
        );
        Ok(g)
    }
}

/// Closed-form builder for structured hexahedral lattices.
#[derive(Clone, Copy, Debug)]
pub struct RegularGridBuilder {
    lattice: RegularLattice,
}

impl RegularGridBuilder {
    pub fn new(dims: [usize; 3], pbc: [bool; 3]) -> Result<Self, TrackError> {
        Ok(Self {
            lattice: RegularLattice::new(dims, pbc)?,
        })
    }

    pub fn from_lattice(lattice: RegularLattice) -> Self {
        Self { lattice }
    }

    pub fn lattice(&self) -> &RegularLattice {
        &self.lattice
    }
}

fn lattice_gap(what: &str, idx: Idx3) -> TrackError {
    TrackError::InvalidMesh(format!("lattice {what} missing at {idx:?}"))
}

impl MeshGraphBuilder for RegularGridBuilder {
    fn cell_type(&self) -> CellType {
        CellType::Hexahedron
    }

    fn build(self) -> Result<MeshGraph, TrackError> {
        let l = self.lattice;
        let node = |idx: Idx3| l.node(idx).ok_or_else(|| lattice_gap("node", idx));
        let mut g = MeshGraph::with_capacity(
            CellType::Hexahedron,
            l.edge_count(),
            l.face_count(),
            l.elem_count(),
        );

        for e in 0..l.edge_count() {
            let (idx, a) = l
                .edge_of(EdgeId::from_index(e))
                .ok_or_else(|| lattice_gap("edge", [e, 0, 0]))?;
            let far = l.step(idx, a, 1).ok_or_else(|| lattice_gap("edge end", idx))?;
            g.edges.push(Edge {
                nodes: [node(idx)?, node(far)?],
                faces: Vec::with_capacity(4),
            });
        }

        for f in 0..l.face_count() {
            let fid = FaceId::from_index(f);
            let (idx, t) = l.face_of(fid).ok_or_else(|| lattice_gap("face", [f, 0, 0]))?;
            let (u, v) = RegularLattice::in_plane(t);
            let c = l.face_corners(idx, t).ok_or_else(|| lattice_gap("face corner", idx))?;
            let mut face = Face::new(vec![node(c[0])?, node(c[1])?, node(c[2])?, node(c[3])?]);

            let sides = [
                (c[0], u, Chirality::Positive),
                (c[1], v, Chirality::Positive),
                (c[3], u, Chirality::Negative),
                (c[0], v, Chirality::Negative),
            ];
            for (k, (at, axis, chirality)) in sides.into_iter().enumerate() {
                let eid = l.edge(at, axis).ok_or_else(|| lattice_gap("face edge", at))?;
                g.edges[eid.index()].faces.push(EdgeIncidence {
                    face: fid,
                    chirality,
                    local_index: k as u8,
                });
                face.edges.push((eid, chirality));
            }

            // The cell below the face sees it as its +t face (normal outward).
            face.elem1 = l
                .step(idx, t, -1)
                .and_then(|below| l.elem(below))
                .map(|elem| FaceNeighbor {
                    elem,
                    local_index: (3 + t) as u8,
                });
            face.elem0 = l.elem(idx).map(|elem| FaceNeighbor {
                elem,
                local_index: t as u8,
            });
            g.faces.push(face);
        }

        for e in 0..l.elem_count() {
            let c = l.elem_idx(ElemId::from_index(e));
            let corner = |dx: i64, dy: i64, dz: i64| {
                l.wrap([c[0] as i64 + dx, c[1] as i64 + dy, c[2] as i64 + dz])
                    .ok_or_else(|| lattice_gap("cell corner", c))
                    .and_then(node)
            };
            let nodes = vec![
                corner(0, 0, 0)?,
                corner(1, 0, 0)?,
                corner(1, 1, 0)?,
                corner(0, 1, 0)?,
                corner(0, 0, 1)?,
                corner(1, 0, 1)?,
                corner(1, 1, 1)?,
                corner(0, 1, 1)?,
            ];
            let mut faces = Vec::with_capacity(6);
            let mut neighbors = Vec::with_capacity(6);
            for t in 0..3 {
                let f = l.face(c, t).ok_or_else(|| lattice_gap("cell face", c))?;
                faces.push((f, Chirality::Negative));
                neighbors.push(l.step(c, t, -1).and_then(|p| l.elem(p)));
            }
            for t in 0..3 {
                let up = l.step(c, t, 1).ok_or_else(|| lattice_gap("cell face", c))?;
                let f = l.face(up, t).ok_or_else(|| lattice_gap("cell face", up))?;
                faces.push((f, Chirality::Positive));
                neighbors.push(l.elem(up));
            }
            g.elems.push(Element {
                nodes,
                faces,
                neighbors,
            });
        }

        g.lattice = Some(l);
        g.debug_assert_invariants();
        log::debug!(
            "built regular mesh graph dims={:?} pbc={:?}: {} elems, {} faces, {} edges",
            l.dims(),
            l.pbc(),
            g.elems.len(),
            g.faces.len(),
            g.edges.len()
        );
        Ok(g)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debug_invariants::DebugInvariants;

    fn n(v: &[u32]) -> Vec<NodeId> {
        v.iter().copied().map(NodeId).collect()
    }

    // Two positively oriented tets sharing the triangle {1, 2, 3}.
    fn two_tets() -> IncidenceBuilder {
        let mut b = IncidenceBuilder::tetrahedral(2);
        b.add_elem_local(ElemId(0), &n(&[0, 1, 2, 3]), &[Some(ElemId(1)), None, None, None])
            .unwrap();
        b.add_elem_local(ElemId(1), &n(&[4, 1, 3, 2]), &[Some(ElemId(0)), None, None, None])
            .unwrap();
        b
    }

    #[test]
    fn shared_tet_face_is_deduplicated() {
        let g = two_tets().build().unwrap();
        g.validate_invariants().unwrap();
        assert_eq!(g.elem_count(), 2);
        assert_eq!(g.face_count(), 7);
        assert_eq!(g.edge_count(), 9);
        assert_eq!(g.boundary_faces().count(), 6);

        let shared = g.elem(ElemId(0)).unwrap().faces[0].0;
        assert_eq!(g.elem(ElemId(1)).unwrap().faces[0].0, shared);
        let face = g.face(shared).unwrap();
        assert!(!face.on_boundary());
        assert_ne!(
            g.face_chirality(ElemId(0), shared),
            g.face_chirality(ElemId(1), shared)
        );
    }

    #[test]
    fn third_owner_of_a_face_is_rejected() {
        let mut b = IncidenceBuilder::tetrahedral(3);
        for (i, apex) in [0u32, 4, 5].into_iter().enumerate() {
            b.add_elem_local(ElemId(i as u32), &n(&[apex, 1, 2, 3]), &[None; 4])
                .unwrap();
        }
        assert!(matches!(b.build(), Err(TrackError::NonManifoldFace { .. })));
    }

    #[test]
    fn arity_and_completeness_are_checked() {
        let mut b = IncidenceBuilder::tetrahedral(2);
        assert!(b.add_elem_local(ElemId(0), &n(&[0, 1, 2]), &[None; 4]).is_err());
        assert!(b.add_elem_local(ElemId(5), &n(&[0, 1, 2, 3]), &[None; 4]).is_err());
        b.add_elem_local(ElemId(0), &n(&[0, 1, 2, 3]), &[None; 4]).unwrap();
        assert!(b.add_elem_local(ElemId(0), &n(&[0, 1, 2, 3]), &[None; 4]).is_err());
        assert!(matches!(b.build(), Err(TrackError::InvalidMesh(_))));
    }

    #[test]
    fn regular_grid_links_faces_and_cells() {
        let g = RegularGridBuilder::new([4, 4, 4], [false; 3])
            .unwrap()
            .build()
            .unwrap();
        g.validate_invariants().unwrap();
        assert_eq!(g.elem_count(), 27);
        assert_eq!(g.face_count(), 108);
        assert_eq!(g.edge_count(), 144);
        // 6 sides of 3x3 boundary faces each
        assert_eq!(g.boundary_faces().count(), 54);

        let l = *g.lattice().unwrap();
        let c = l.elem([1, 1, 1]).unwrap();
        let top = l.face([1, 1, 2], 2).unwrap();
        let face = g.face(top).unwrap();
        assert_eq!(face.elem1.map(|n| n.elem), Some(c));
        assert_eq!(face.elem0.map(|n| n.elem), l.elem([1, 1, 2]));
        assert_eq!(g.face_chirality(c, top), Some(Chirality::Positive));
    }

    #[test]
    fn periodic_grid_has_no_boundary() {
        let g = RegularGridBuilder::new([3, 3, 3], [true; 3])
            .unwrap()
            .build()
            .unwrap();
        g.validate_invariants().unwrap();
        assert_eq!(g.boundary_faces().count(), 0);
        assert!(g
            .elems()
            .all(|(_, e)| e.neighbors.iter().all(|n| n.is_some())));
    }

    #[test]
    fn regular_and_incidence_builders_agree() {
        let l = RegularLattice::new([3, 4, 3], [false, false, false]).unwrap();
        let regular = RegularGridBuilder::from_lattice(l).build().unwrap();

        let mut b = IncidenceBuilder::hexahedral(l.elem_count());
        for (id, elem) in regular.elems() {
            b.add_elem_local(id, &elem.nodes, &elem.neighbors).unwrap();
        }
        let generic = b.build().unwrap();
        generic.validate_invariants().unwrap();

        assert_eq!(generic.face_count(), regular.face_count());
        assert_eq!(generic.edge_count(), regular.edge_count());
        assert_eq!(
            generic.boundary_faces().count(),
            regular.boundary_faces().count()
        );
        for (id, elem) in regular.elems() {
            let other = generic.elem(id).unwrap();
            for (local, &(f, _)) in elem.faces.iter().enumerate() {
                let mut a = regular.face(f).unwrap().nodes.clone();
                let mut b = generic.face(other.faces[local].0).unwrap().nodes.clone();
                a.sort();
                b.sort();
                assert_eq!(a, b, "element {id:?} face {local}");
                assert_eq!(
                    regular.face(f).unwrap().on_boundary(),
                    generic.face(other.faces[local].0).unwrap().on_boundary()
                );
            }
        }
    }
}
