//! Frame-indexed state shared by the ingestion thread and workers.
//!
//! Every entry is published as a single `Arc` in one map operation, so a
//! reader sees a frame's header and its full face list, or nothing. Keys
//! are written once; later writes for the same key are rejected.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};

use crate::algs::extractor::{ExtractionReport, PuncturedFace, VortexLine};
use crate::algs::transition::VortexTransitionMatrix;
use crate::field::FrameHeader;

/// `(t0, t1)` of a punctured-edge record or transition matrix.
pub type FramePair = (i32, i32);

/// Detections of one frame as received.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameRecord {
    pub header: FrameHeader,
    pub faces: Vec<PuncturedFace>,
}

/// Result of one frame's extraction task.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameOutput {
    pub frame: i32,
    pub header: FrameHeader,
    pub lines: Vec<VortexLine>,
    pub report: ExtractionReport,
}

/// Thread-safe registry owned by one pipeline (or shared by tests).
#[derive(Debug, Default)]
pub struct FrameRegistry {
    frames: DashMap<i32, Arc<FrameRecord>>,
    edges: DashMap<FramePair, Arc<Vec<u32>>>,
    outputs: DashMap<i32, Arc<FrameOutput>>,
    matrices: DashMap<FramePair, Arc<VortexTransitionMatrix>>,
    extraction_claims: DashSet<i32>,
    tracking_claims: DashSet<FramePair>,
    failed: DashSet<i32>,
}

impl FrameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a frame's detections. Returns `None` if the frame is already
    /// known; the first record wins.
    pub fn insert_frame(&self, header: FrameHeader, faces: Vec<PuncturedFace>) -> Option<Arc<FrameRecord>> {
        match self.frames.entry(header.frame) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let rec = Arc::new(FrameRecord { header, faces });
                slot.insert(rec.clone());
                Some(rec)
            }
        }
    }

    pub fn frame(&self, frame: i32) -> Option<Arc<FrameRecord>> {
        self.frames.get(&frame).map(|r| r.value().clone())
    }

    /// Claim the right to extract `frame`; true exactly once per frame.
    pub fn claim_extraction(&self, frame: i32) -> bool {
        self.extraction_claims.insert(frame)
    }

    /// Publish punctured edges for a frame pair; false if already present.
    pub fn insert_edges(&self, pair: FramePair, edges: Vec<u32>) -> bool {
        match self.edges.entry(pair) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(edges));
                true
            }
        }
    }

    pub fn edges(&self, pair: FramePair) -> Option<Arc<Vec<u32>>> {
        self.edges.get(&pair).map(|r| r.value().clone())
    }

    pub fn insert_output(&self, output: Arc<FrameOutput>) -> bool {
        match self.outputs.entry(output.frame) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(output);
                true
            }
        }
    }

    pub fn output(&self, frame: i32) -> Option<Arc<FrameOutput>> {
        self.outputs.get(&frame).map(|r| r.value().clone())
    }

    /// Pairs with punctured edges that involve `frame`, in ascending order.
    pub fn pairs_touching(&self, frame: i32) -> Vec<FramePair> {
        let mut pairs: Vec<FramePair> = self
            .edges
            .iter()
            .map(|r| *r.key())
            .filter(|(a, b)| *a == frame || *b == frame)
            .collect();
        pairs.sort_unstable();
        pairs
    }

    /// Claim the right to build the matrix of `pair`; true exactly once.
    pub fn claim_tracking(&self, pair: FramePair) -> bool {
        self.tracking_claims.insert(pair)
    }

    pub fn insert_matrix(&self, matrix: VortexTransitionMatrix) -> Arc<VortexTransitionMatrix> {
        let m = Arc::new(matrix);
        self.matrices.insert(m.interval(), m.clone());
        m
    }

    pub fn matrix(&self, pair: FramePair) -> Option<Arc<VortexTransitionMatrix>> {
        self.matrices.get(&pair).map(|r| r.value().clone())
    }

    pub fn mark_failed(&self, frame: i32) {
        self.failed.insert(frame);
    }

    pub fn is_failed(&self, frame: i32) -> bool {
        self.failed.contains(&frame)
    }

    /// Frame ids with a stored record, ascending.
    pub fn frame_ids(&self) -> Vec<i32> {
        let mut ids: Vec<i32> = self.frames.iter().map(|r| *r.key()).collect();
        ids.sort_unstable();
        ids
    }

    /// Frame ids with a finished extraction, ascending.
    pub fn output_ids(&self) -> Vec<i32> {
        let mut ids: Vec<i32> = self.outputs.iter().map(|r| *r.key()).collect();
        ids.sort_unstable();
        ids
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    pub fn matrix_count(&self) -> usize {
        self.matrices.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_write_wins() {
        let reg = FrameRegistry::new();
        let h = FrameHeader::unit(3, [4, 4, 4], [false; 3]);
        assert!(reg.insert_frame(h, Vec::new()).is_some());
        assert!(reg.insert_frame(h, Vec::new()).is_none());
        assert!(reg.claim_extraction(3));
        assert!(!reg.claim_extraction(3));
        assert!(reg.insert_edges((3, 4), vec![1]));
        assert!(!reg.insert_edges((3, 4), vec![2]));
        assert_eq!(reg.edges((3, 4)).unwrap().as_slice(), &[1]);
        assert_eq!(reg.pairs_touching(4), vec![(3, 4)]);
        assert!(reg.pairs_touching(5).is_empty());
        assert_eq!(reg.frame_ids(), vec![3]);
    }

    #[test]
    fn concurrent_inserts_publish_whole_records() {
        use rayon::prelude::*;
        let reg = FrameRegistry::new();
        (0..64).into_par_iter().for_each(|f| {
            let faces = (0..f as u32)
                .map(|k| PuncturedFace {
                    face: k,
                    time_index: f,
                    chirality: Default::default(),
                    position: [0.0; 3],
                })
                .collect();
            reg.insert_frame(FrameHeader::unit(f, [2, 2, 2], [false; 3]), faces);
        });
        assert_eq!(reg.frame_count(), 64);
        for f in 0..64 {
            let rec = reg.frame(f).unwrap();
            assert_eq!(rec.header.frame, f);
            assert_eq!(rec.faces.len(), f as usize);
            assert!(rec.faces.iter().all(|pf| pf.time_index == f));
        }
    }
}
