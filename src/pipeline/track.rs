//! Building transition matrices from two frames' lines and their punctured
//! edges.
//!
//! Line `a` of `t0` and line `b` of `t1` correspond when they cross a common
//! face, or when some punctured edge borders a face crossed by `a` and a
//! face crossed by `b`. Edge ids are lattice ids (`3 * node + axis`) of the
//! frames' shared grid.

use std::collections::BTreeSet;

use hashbrown::HashMap;

use crate::algs::transition::VortexTransitionMatrix;
use crate::pipeline::registry::FrameOutput;
use crate::topology::ids::{FaceId, NodeId};
use crate::topology::lattice::RegularLattice;

fn face_index(out: &FrameOutput) -> HashMap<FaceId, usize> {
    let mut m = HashMap::new();
    for line in &out.lines {
        for f in &line.faces {
            m.entry(*f).or_insert(line.id);
        }
    }
    m
}

/// Correspondence pairs `(line of t0, line of t1)`, deduplicated and sorted.
pub fn correspondences(a: &FrameOutput, b: &FrameOutput, edges: &[u32]) -> Vec<(usize, usize)> {
    let mut pairs = BTreeSet::new();
    if a.header.dims != b.header.dims || a.header.pbc != b.header.pbc {
        log::warn!(
            "frames {} and {} have different grids; no spatial correspondence",
            a.frame,
            b.frame
        );
        return Vec::new();
    }
    let fa = face_index(a);
    let fb = face_index(b);

    for (f, &la) in &fa {
        if let Some(&lb) = fb.get(f) {
            pairs.insert((la, lb));
        }
    }

    if let Ok(lattice) = RegularLattice::new(a.header.dims, a.header.pbc) {
        for &e in edges {
            let node = e as usize / 3;
            if node >= lattice.node_count() {
                continue;
            }
            let idx = lattice.node_idx(NodeId::new(node as u32));
            let around = lattice.faces_around_edge(idx, e as usize % 3);
            let la: BTreeSet<usize> = around.iter().filter_map(|f| fa.get(f).copied()).collect();
            let lb: BTreeSet<usize> = around.iter().filter_map(|f| fb.get(f).copied()).collect();
            for &i in &la {
                for &j in &lb {
                    pairs.insert((i, j));
                }
            }
        }
    }
    pairs.into_iter().collect()
}

/// Normalized transition matrix between two extracted frames.
pub fn build_matrix(a: &FrameOutput, b: &FrameOutput, edges: &[u32]) -> VortexTransitionMatrix {
    let pairs = correspondences(a, b, edges);
    let n0 = a.lines.len();
    let n1 = b.lines.len();
    // Line ids are dense per frame, so every pair is in range.
    let mut m = VortexTransitionMatrix::from_correspondences(a.frame, b.frame, n0, n1, pairs)
        .unwrap_or_else(|_| VortexTransitionMatrix::new(a.frame, b.frame, n0, n1));
    m.normalize();
    m
}
