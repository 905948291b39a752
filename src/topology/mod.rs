//! Mesh topology: ids, orientation, and the edge/face/element adjacency graph.
//!
//! This module provides:
//! - strong ids for nodes, edges, faces and elements
//! - [`Chirality`] and canonical node-tuple keys for edges and faces
//! - the arena-owned [`MeshGraph`] and its builders
//! - closed-form index arithmetic for structured lattices
//!
//! Most users construct a graph through [`RegularGridBuilder`] (structured
//! grids) or [`IncidenceBuilder`] (unstructured tetrahedral or hexahedral
//! connectivity) and then query faces and elements by id.

pub mod builder;
pub mod canonical;
pub mod cell_type;
pub mod chirality;
pub mod ids;
pub mod lattice;
pub mod mesh_graph;

pub use builder::{IncidenceBuilder, MeshGraphBuilder, RegularGridBuilder};
pub use cell_type::CellType;
pub use chirality::Chirality;
pub use ids::{EdgeId, ElemId, FaceId, NodeId};
pub use lattice::RegularLattice;
pub use mesh_graph::{Edge, Element, Face, MeshGraph};
