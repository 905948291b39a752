//! Strong index handles for mesh entities.
//!
//! Every node, edge, face and element of a [`MeshGraph`](crate::topology::mesh_graph::MeshGraph)
//! is addressed by a small `u32` newtype. Edge, face and element ids are dense
//! indices into the owning graph's arenas; they carry no meaning across graphs.
//!
//! The handles are `repr(transparent)` so they have the same layout as `u32`
//! and can be cast to and from wire buffers without conversion.

use std::fmt;

macro_rules! arena_id {
    ($(#[$meta:meta])* $name:ident, $tag:literal) => {
        $(#[$meta])*
        #[derive(
            Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
            serde::Serialize, serde::Deserialize,
        )]
        #[repr(transparent)]
        pub struct $name(pub u32);

        impl $name {
            /// Wrap a raw index.
            #[inline]
            pub const fn new(raw: u32) -> Self {
                Self(raw)
            }

            /// Raw `u32` value.
            #[inline]
            pub const fn get(self) -> u32 {
                self.0
            }

            /// Value as a `usize` index into the owning arena.
            #[inline]
            pub const fn index(self) -> usize {
                self.0 as usize
            }

            /// Build from a `usize` arena position.
            ///
            /// Arena sizes are bounded by `u32::MAX` at construction time, so the
            /// narrowing here is lossless for every position a graph hands out.
            #[inline]
            pub(crate) const fn from_index(i: usize) -> Self {
                Self(i as u32)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($tag, "({})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u32> for $name {
            #[inline]
            fn from(raw: u32) -> Self {
                Self(raw)
            }
        }

        impl From<$name> for u32 {
            #[inline]
            fn from(id: $name) -> u32 {
                id.0
            }
        }
    };
}

arena_id!(
    /// Mesh vertex. Nodes have no storage of their own; they are referenced by
    /// edges, faces and elements.
    NodeId,
    "N"
);
arena_id!(
    /// Index of an [`Edge`](crate::topology::mesh_graph::Edge) record.
    EdgeId,
    "E"
);
arena_id!(
    /// Index of a [`Face`](crate::topology::mesh_graph::Face) record.
    FaceId,
    "F"
);
arena_id!(
    /// Index of an [`Element`](crate::topology::mesh_graph::Element) record.
    ElemId,
    "C"
);

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::{assert_eq_align, assert_eq_size};

    assert_eq_size!(NodeId, u32);
    assert_eq_size!(FaceId, u32);
    assert_eq_align!(ElemId, u32);

    #[test]
    fn debug_and_display() {
        let f = FaceId::new(17);
        assert_eq!(format!("{f:?}"), "F(17)");
        assert_eq!(format!("{f}"), "17");
        assert_eq!(f.index(), 17);
        assert_eq!(u32::from(f), 17);
    }

    #[test]
    fn ordering_follows_raw_value() {
        let mut v = vec![ElemId(3), ElemId(1), ElemId(2)];
        v.sort();
        assert_eq!(v, vec![ElemId(1), ElemId(2), ElemId(3)]);
    }

    #[test]
    fn serde_is_transparent_enough() {
        let j = serde_json::to_string(&EdgeId(5)).unwrap();
        assert_eq!(j, "5");
        assert_eq!(serde_json::from_str::<EdgeId>(&j).unwrap(), EdgeId(5));
    }
}
