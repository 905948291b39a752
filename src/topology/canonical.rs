//! Canonical keys for edges and faces given as node tuples.
//!
//! Two elements sharing a face generally describe it with different windings
//! (rotated, and reversed because each element winds its faces outward). The
//! canonical key is a pure function of the node tuple: the lexicographically
//! smallest sequence among all rotations of the tuple and of its reversal.
//! The rotation and reversal that produced it form a dihedral group element
//! ([`FaceTwist`]); its chirality is the face's orientation relative to the
//! canonical winding.

use crate::topology::chirality::Chirality;
use crate::topology::ids::NodeId;

/// Dihedral transform mapping the canonical face key back to a raw tuple.
///
/// `rotation` is the index in the raw tuple of the key's first node;
/// `chirality` is `Negative` when the raw tuple winds opposite to the key.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct FaceTwist {
    pub rotation: u8,
    pub chirality: Chirality,
}

/// Canonical `(min, max)` edge key and the orientation of `(a, b)` relative to it.
#[inline]
pub fn canonical_edge(a: NodeId, b: NodeId) -> ([NodeId; 2], Chirality) {
    if a <= b {
        ([a, b], Chirality::Positive)
    } else {
        ([b, a], Chirality::Negative)
    }
}

/// Inverse of [`canonical_edge`].
#[inline]
pub fn alternate_edge(key: [NodeId; 2], chirality: Chirality) -> [NodeId; 2] {
    match chirality {
        Chirality::Positive => key,
        Chirality::Negative => [key[1], key[0]],
    }
}

#[inline]
fn walk(nodes: &[NodeId], start: usize, reversed: bool, i: usize) -> NodeId {
    let n = nodes.len();
    if reversed {
        nodes[(start + n - i % n) % n]
    } else {
        nodes[(start + i) % n]
    }
}

/// Canonicalize a face tuple.
///
/// Ties between equal sequences (which only occur for tuples with repeated
/// nodes) are broken by preferring `Positive` chirality, then the smallest
/// rotation, so the result is deterministic for every input.
pub fn canonical_face(nodes: &[NodeId]) -> (Vec<NodeId>, FaceTwist) {
    let n = nodes.len();
    if n == 0 {
        return (Vec::new(), FaceTwist::default());
    }

    let mut best: Option<(usize, bool)> = None;
    for reversed in [false, true] {
        for start in 0..n {
            let better = match best {
                None => true,
                Some((bs, br)) => (0..n)
                    .map(|i| walk(nodes, start, reversed, i).cmp(&walk(nodes, bs, br, i)))
                    .find(|o| o.is_ne())
                    .is_some_and(|o| o.is_lt()),
            };
            if better {
                best = Some((start, reversed));
            }
        }
    }

    let (start, reversed) = best.unwrap_or((0, false));
    let key = (0..n).map(|i| walk(nodes, start, reversed, i)).collect();
    let twist = FaceTwist {
        rotation: start as u8,
        chirality: if reversed {
            Chirality::Negative
        } else {
            Chirality::Positive
        },
    };
    (key, twist)
}

/// Rebuild the raw tuple a key was canonicalized from.
pub fn alternate_face(key: &[NodeId], twist: FaceTwist) -> Vec<NodeId> {
    let n = key.len();
    let mut raw = vec![NodeId::default(); n];
    let r = twist.rotation as usize;
    for (i, &k) in key.iter().enumerate() {
        let pos = match twist.chirality {
            Chirality::Positive => (r + i) % n,
            Chirality::Negative => (r + n - i % n) % n,
        };
        raw[pos] = k;
    }
    raw
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ids(v: &[u32]) -> Vec<NodeId> {
        v.iter().copied().map(NodeId).collect()
    }

    #[test]
    fn edge_orientation() {
        let (k, c) = canonical_edge(NodeId(7), NodeId(3));
        assert_eq!(k, [NodeId(3), NodeId(7)]);
        assert_eq!(c, Chirality::Negative);
        assert_eq!(alternate_edge(k, c), [NodeId(7), NodeId(3)]);
    }

    #[test]
    fn face_rotation_and_reversal_share_a_key() {
        let (k0, t0) = canonical_face(&ids(&[5, 2, 9, 4]));
        let (k1, t1) = canonical_face(&ids(&[9, 4, 5, 2]));
        let (k2, t2) = canonical_face(&ids(&[4, 9, 2, 5]));
        assert_eq!(k0, ids(&[2, 5, 4, 9]));
        assert_eq!(k0, k1);
        assert_eq!(k0, k2);
        assert_eq!(t0.chirality, Chirality::Negative);
        assert_eq!(t1.chirality, Chirality::Negative);
        assert_eq!(t2.chirality, Chirality::Positive);
    }

    #[test]
    fn triangle_reversed_has_negative_chirality() {
        let (k, t) = canonical_face(&ids(&[3, 2, 1]));
        assert_eq!(k, ids(&[1, 2, 3]));
        assert_eq!(t.chirality, Chirality::Negative);
        assert_eq!(alternate_face(&k, t), ids(&[3, 2, 1]));
    }

    proptest! {
        #[test]
        fn key_is_invariant_under_dihedral_moves(
            mut nodes in prop::collection::hash_set(0u32..64, 3..=4)
                .prop_map(|s| s.into_iter().collect::<Vec<_>>()),
            rot in 0usize..4,
            flip in any::<bool>(),
        ) {
            nodes.sort_unstable();
            let n = nodes.len();
            nodes.rotate_left(rot % n);
            let raw = ids(&nodes);
            let mut moved = raw.clone();
            let m = moved.len();
            moved.rotate_left((rot + 1) % m);
            if flip {
                moved.reverse();
            }
            let (k0, t0) = canonical_face(&raw);
            let (k1, t1) = canonical_face(&moved);
            prop_assert_eq!(&k0, &k1);
            prop_assert_eq!(t0.chirality == t1.chirality, !flip);
            prop_assert_eq!(alternate_face(&k0, t0), raw);
            prop_assert_eq!(alternate_face(&k1, t1), moved);
        }
    }
}
