#![cfg_attr(docsrs, feature(doc_cfg))]
//! # vortex-track
//!
//! vortex-track reconstructs vortex filaments from per-frame punctured-face
//! detections in a complex order-parameter field and follows them through
//! time. It provides mesh adjacency graphs over volumetric grids, the
//! face-to-line tracing algorithm, inter-frame transition matrices with event
//! classification, and a concurrent streaming front end.
//!
//! ## Features
//! - Arena-owned [`MeshGraph`](topology::MeshGraph) with chirality bookkeeping,
//!   built from structured lattices or unstructured tet/hex connectivity
//! - [`VortexExtractor`](algs::VortexExtractor): punctured faces to ordered
//!   polylines and closed loops
//! - [`VortexTransitionMatrix`](algs::VortexTransitionMatrix): modules and
//!   BIRTH/DEATH/SPLIT/MERGE/RECOMBINATION events, binary and JSON persistence
//! - [`StreamingPipeline`](pipeline::StreamingPipeline): ordered ingestion,
//!   bounded parallel extraction, injected frame registry
//!
//! ## Determinism
//!
//! Tracing and modularization visit their inputs in sorted order, so the
//! same detections always produce the same lines, line ids and modules,
//! independent of arrival order or worker scheduling.
//!
//! ## Logging
//!
//! The library logs through the `log` facade; install any compatible logger
//! (the `vortex-stream` binary uses `tracing-subscriber`).

pub mod algs;
pub mod debug_invariants;
pub mod field;
pub mod io;
pub mod pipeline;
pub mod topology;
pub mod track_error;

pub use debug_invariants::DebugInvariants;
pub use track_error::TrackError;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::algs::extractor::{ExtractionReport, PuncturedFace, VortexExtractor, VortexLine};
    pub use crate::algs::transition::{Module, VortexEvent, VortexTransitionMatrix};
    pub use crate::debug_invariants::DebugInvariants;
    pub use crate::field::{FrameHeader, RegularVolume, VolumeField};
    pub use crate::io::stream::{Message, MessageReader, MessageWriter};
    pub use crate::pipeline::{
        Backpressure, FrameRegistry, LineSink, MemoryLineSink, PipelineConfig, StreamingPipeline,
        VtkLineSink,
    };
    pub use crate::topology::{
        CellType, Chirality, EdgeId, ElemId, FaceId, IncidenceBuilder, MeshGraph, MeshGraphBuilder,
        NodeId, RegularGridBuilder, RegularLattice,
    };
    pub use crate::track_error::TrackError;
}
