//! Cell type metadata for volumetric elements.

/// Volumetric element topologies understood by the mesh graph builders.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum CellType {
    /// 3D simplex (tet): 4 triangular faces.
    Tetrahedron,
    /// 3D tensor-product cell (hex): 6 quadrilateral faces.
    Hexahedron,
}

impl Default for CellType {
    fn default() -> Self {
        CellType::Hexahedron
    }
}

impl CellType {
    /// Topological dimension of the cell.
    pub const fn dimension(self) -> u8 {
        3
    }

    /// Number of nodes of one element.
    pub const fn node_count(self) -> usize {
        match self {
            CellType::Tetrahedron => 4,
            CellType::Hexahedron => 8,
        }
    }

    /// Number of faces (and therefore of face-aligned neighbor slots).
    pub const fn face_count(self) -> usize {
        match self {
            CellType::Tetrahedron => 4,
            CellType::Hexahedron => 6,
        }
    }

    /// Number of nodes on each face.
    pub const fn nodes_per_face(self) -> usize {
        match self {
            CellType::Tetrahedron => 3,
            CellType::Hexahedron => 4,
        }
    }

    /// Number of distinct edges of one element.
    pub const fn edge_count(self) -> usize {
        match self {
            CellType::Tetrahedron => 6,
            CellType::Hexahedron => 12,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn euler_characteristic_of_a_cell_boundary() {
        for ct in [CellType::Tetrahedron, CellType::Hexahedron] {
            let v = ct.node_count() as i32;
            let e = ct.edge_count() as i32;
            let f = ct.face_count() as i32;
            assert_eq!(v - e + f, 2, "{ct:?}");
            assert_eq!(ct.face_count() * ct.nodes_per_face(), 2 * ct.edge_count());
        }
    }
}
