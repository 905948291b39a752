//! Explicit edge/face/element adjacency over a volumetric discretization.
//!
//! A [`MeshGraph`] is a single arena: it exclusively owns every [`Edge`],
//! [`Face`] and [`Element`] record, and all cross references between them
//! are dense ids into that arena. Dropping the graph releases everything at
//! once; ids from one graph are meaningless in another.
//!
//! Orientation conventions:
//! - a face's `nodes` winding defines its normal;
//! - a face lists its two neighbor elements by chirality: `elem1` is the
//!   element for which the face normal points outward (chirality `+1`),
//!   `elem0` the element it points into (chirality `-1`);
//! - each edge records, per referencing face, the edge's chirality within
//!   that face and its local position in the face's edge list.

use crate::debug_invariants::DebugInvariants;
use crate::topology::cell_type::CellType;
use crate::topology::chirality::Chirality;
use crate::topology::ids::{EdgeId, ElemId, FaceId, NodeId};
use crate::topology::lattice::RegularLattice;
use crate::track_error::TrackError;

/// One face referencing an edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EdgeIncidence {
    pub face: FaceId,
    /// Orientation of the edge within the face's winding.
    pub chirality: Chirality,
    /// Position of the edge in the face's edge list.
    pub local_index: u8,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Edge {
    /// Endpoints in the edge's canonical orientation.
    pub nodes: [NodeId; 2],
    /// Faces referencing this edge, in insertion order.
    pub faces: Vec<EdgeIncidence>,
}

/// An element adjacent to a face, with the face's local index inside it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FaceNeighbor {
    pub elem: ElemId,
    pub local_index: u8,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Face {
    /// Ordered nodes; the winding defines the face orientation.
    pub nodes: Vec<NodeId>,
    /// Ordered edges with their chirality inside this face.
    pub edges: Vec<(EdgeId, Chirality)>,
    /// Neighbor the face normal points into (chirality −1).
    pub elem0: Option<FaceNeighbor>,
    /// Neighbor the face normal points out of (chirality +1).
    pub elem1: Option<FaceNeighbor>,
}

impl Face {
    pub(crate) fn new(nodes: Vec<NodeId>) -> Self {
        Self {
            nodes,
            edges: Vec::new(),
            elem0: None,
            elem1: None,
        }
    }

    /// Fewer than two neighbor elements: the face lies on the domain boundary.
    #[inline]
    pub fn on_boundary(&self) -> bool {
        self.elem0.is_none() || self.elem1.is_none()
    }

    #[inline]
    pub fn neighbor_count(&self) -> usize {
        self.elem0.is_some() as usize + self.elem1.is_some() as usize
    }

    /// Neighbor slot for an element-relative chirality.
    #[inline]
    pub fn neighbor(&self, chirality: Chirality) -> Option<FaceNeighbor> {
        match chirality {
            Chirality::Negative => self.elem0,
            Chirality::Positive => self.elem1,
        }
    }

    /// Chirality of this face as seen from `elem`, if `elem` is a neighbor.
    pub fn chirality_in(&self, elem: ElemId) -> Option<Chirality> {
        if self.elem1.is_some_and(|n| n.elem == elem) {
            Some(Chirality::Positive)
        } else if self.elem0.is_some_and(|n| n.elem == elem) {
            Some(Chirality::Negative)
        } else {
            None
        }
    }

    /// Elements on either side of a directed crossing.
    ///
    /// A crossing with `Positive` chirality follows the face normal, leaving
    /// `elem1` and entering `elem0`; `Negative` goes the other way. Returns
    /// `(source, destination)`.
    pub fn crossing(&self, chirality: Chirality) -> (Option<FaceNeighbor>, Option<FaceNeighbor>) {
        (self.neighbor(chirality), self.neighbor(chirality.invert()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Element {
    /// Ordered nodes.
    pub nodes: Vec<NodeId>,
    /// Ordered faces with their chirality relative to this element.
    pub faces: Vec<(FaceId, Chirality)>,
    /// Element across each face, aligned with `faces`.
    pub neighbors: Vec<Option<ElemId>>,
}

/// Arena-owned mesh adjacency graph.
#[derive(Clone, Debug)]
pub struct MeshGraph {
    pub(crate) cell_type: CellType,
    pub(crate) edges: Vec<Edge>,
    pub(crate) faces: Vec<Face>,
    pub(crate) elems: Vec<Element>,
    pub(crate) lattice: Option<RegularLattice>,
}

impl MeshGraph {
    pub(crate) fn with_capacity(
        cell_type: CellType,
        n_edges: usize,
        n_faces: usize,
        n_elems: usize,
    ) -> Self {
        Self {
            cell_type,
            edges: Vec::with_capacity(n_edges),
            faces: Vec::with_capacity(n_faces),
            elems: Vec::with_capacity(n_elems),
            lattice: None,
        }
    }

    #[inline]
    pub fn cell_type(&self) -> CellType {
        self.cell_type
    }

    /// Lattice description when the graph was built from a structured grid.
    #[inline]
    pub fn lattice(&self) -> Option<&RegularLattice> {
        self.lattice.as_ref()
    }

    #[inline]
    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(id.index())
    }

    #[inline]
    pub fn face(&self, id: FaceId) -> Option<&Face> {
        self.faces.get(id.index())
    }

    #[inline]
    pub fn elem(&self, id: ElemId) -> Option<&Element> {
        self.elems.get(id.index())
    }

    pub fn edges(&self) -> impl Iterator<Item = (EdgeId, &Edge)> + '_ {
        self.edges
            .iter()
            .enumerate()
            .map(|(i, e)| (EdgeId::from_index(i), e))
    }

    pub fn faces(&self) -> impl Iterator<Item = (FaceId, &Face)> + '_ {
        self.faces
            .iter()
            .enumerate()
            .map(|(i, f)| (FaceId::from_index(i), f))
    }

    pub fn elems(&self) -> impl Iterator<Item = (ElemId, &Element)> + '_ {
        self.elems
            .iter()
            .enumerate()
            .map(|(i, e)| (ElemId::from_index(i), e))
    }

    #[inline]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    #[inline]
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    #[inline]
    pub fn elem_count(&self) -> usize {
        self.elems.len()
    }

    /// Faces with fewer than two neighbor elements.
    pub fn boundary_faces(&self) -> impl Iterator<Item = FaceId> + '_ {
        self.faces()
            .filter(|(_, f)| f.on_boundary())
            .map(|(id, _)| id)
    }

    /// Map an external face id to an arena id.
    ///
    /// Structured graphs interpret the id as a lattice face id
    /// (`3 * node + normal`); other graphs use arena ids directly.
    pub fn resolve_face(&self, external: u32) -> Option<FaceId> {
        match &self.lattice {
            Some(l) => l.resolve_face(external),
            None => {
                let id = FaceId::new(external);
                self.face(id).map(|_| id)
            }
        }
    }

    /// Map an external edge id to an arena id; see [`resolve_face`](Self::resolve_face).
    pub fn resolve_edge(&self, external: u32) -> Option<EdgeId> {
        match &self.lattice {
            Some(l) => l.resolve_edge(external),
            None => {
                let id = EdgeId::new(external);
                self.edge(id).map(|_| id)
            }
        }
    }

    /// Chirality of `face` inside `elem`, if they are incident.
    pub fn face_chirality(&self, elem: ElemId, face: FaceId) -> Option<Chirality> {
        self.elem(elem)?
            .faces
            .iter()
            .find(|(f, _)| *f == face)
            .map(|(_, c)| *c)
    }
}

impl DebugInvariants for MeshGraph {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "MeshGraph");
    }

    fn validate_invariants(&self) -> Result<(), TrackError> {
        let bad = |msg: String| Err(TrackError::Invariant(msg));

        for (eid, edge) in self.edges() {
            if edge.faces.is_empty() {
                return bad(format!("edge {eid:?} is referenced by no face"));
            }
            for inc in &edge.faces {
                let Some(face) = self.face(inc.face) else {
                    return bad(format!("edge {eid:?} references missing {:?}", inc.face));
                };
                match face.edges.get(inc.local_index as usize) {
                    Some(&(e, c)) if e == eid && c == inc.chirality => {}
                    _ => {
                        return bad(format!(
                            "edge {eid:?} back-link to {:?}[{}] is not mirrored",
                            inc.face, inc.local_index
                        ));
                    }
                }
            }
        }

        for (fid, face) in self.faces() {
            for (slot, chir) in [
                (face.elem0, Chirality::Negative),
                (face.elem1, Chirality::Positive),
            ] {
                let Some(n) = slot else { continue };
                let Some(elem) = self.elem(n.elem) else {
                    return bad(format!("face {fid:?} references missing {:?}", n.elem));
                };
                match elem.faces.get(n.local_index as usize) {
                    Some(&(f, c)) if f == fid && c == chir => {}
                    _ => {
                        return bad(format!(
                            "face {fid:?} neighbor {:?} does not list it with {chir:?}",
                            n.elem
                        ));
                    }
                }
            }
        }

        let arity = self.cell_type.face_count();
        for (cid, elem) in self.elems() {
            if elem.faces.len() != arity || elem.neighbors.len() != arity {
                return bad(format!(
                    "element {cid:?} has {} faces / {} neighbors, expected {arity}",
                    elem.faces.len(),
                    elem.neighbors.len()
                ));
            }
        }
        Ok(())
    }
}
