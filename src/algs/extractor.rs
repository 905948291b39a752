//! Tracing punctured-face detections into vortex lines.
//!
//! A punctured face is a mesh face through which the phase of the order
//! parameter winds by ±2π. The detection's chirality orients the crossing:
//! `+1` follows the face normal (leaving the face's `elem1`, entering its
//! `elem0`), `-1` goes against it. A filament that enters an element through
//! one punctured face must leave it through another, so crossings are linked
//! element by element into open paths or closed loops.
//!
//! # Example
//! ```
//! use std::sync::Arc;
//! use vortex_track::algs::extractor::VortexExtractor;
//! use vortex_track::topology::{Chirality, MeshGraphBuilder, RegularGridBuilder};
//!
//! let graph = RegularGridBuilder::new([4, 4, 4], [false; 3]).unwrap().build().unwrap();
//! let lattice = *graph.lattice().unwrap();
//! let mut ex = VortexExtractor::new();
//! ex.set_dataset(Arc::new(graph), None);
//! for z in [1, 2] {
//!     let node = lattice.node([1, 1, z]).unwrap().get();
//!     ex.add_punctured_face(3 * node + 2, 0, Chirality::Positive, [1.5, 1.5, z as f32]);
//! }
//! let (lines, report) = ex.trace_over_space(0);
//! assert_eq!(lines.len(), 1);
//! assert_eq!(lines[0].points.len(), 2);
//! assert_eq!(report.consumed, 2);
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use hashbrown::{HashMap, HashSet};

use crate::field::VolumeField;
use crate::topology::chirality::Chirality;
use crate::topology::ids::{ElemId, FaceId};
use crate::topology::mesh_graph::MeshGraph;

/// One punctured-face detection.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PuncturedFace {
    /// External face id; resolved through [`MeshGraph::resolve_face`].
    pub face: u32,
    pub time_index: i32,
    pub chirality: Chirality,
    /// Crossing position in physical coordinates.
    pub position: [f32; 3],
}

/// An ordered polyline reconstructed from successive crossings of one filament.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct VortexLine {
    pub frame: i32,
    pub id: usize,
    pub points: Vec<[f32; 3]>,
    /// Gauge transformation from the previous point; `0` for the first.
    pub gauge: Vec<f64>,
    /// Crossed faces, aligned with `points`.
    pub faces: Vec<FaceId>,
    /// The last point connects back to the first.
    pub is_loop: bool,
}

impl VortexLine {
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Polyline length in physical units (closing segment included for loops).
    pub fn arc_length(&self) -> f64 {
        let dist = |a: &[f32; 3], b: &[f32; 3]| {
            (0..3)
                .map(|k| (b[k] as f64 - a[k] as f64).powi(2))
                .sum::<f64>()
                .sqrt()
        };
        let open: f64 = self.points.windows(2).map(|w| dist(&w[0], &w[1])).sum();
        match (self.is_loop, self.points.first(), self.points.last()) {
            (true, Some(first), Some(last)) if self.points.len() > 2 => open + dist(last, first),
            _ => open,
        }
    }
}

/// Bookkeeping of one tracing pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct ExtractionReport {
    /// Detections that ended up in a line.
    pub consumed: usize,
    /// Detections discarded as unresolvable, duplicated or isolated.
    pub dropped: usize,
    pub lines: usize,
    pub loops: usize,
}

#[derive(Clone, Copy, Debug)]
struct Crossing {
    face: FaceId,
    position: [f32; 3],
    /// Element left by the crossing, with the face's local index in it.
    src: Option<(ElemId, u8)>,
    /// Element entered by the crossing, with the face's local index in it.
    dst: Option<(ElemId, u8)>,
}

/// Per-time-index accumulator of punctured faces and their traced lines.
#[derive(Default)]
pub struct VortexExtractor {
    graph: Option<Arc<MeshGraph>>,
    field: Option<Arc<dyn VolumeField>>,
    detections: BTreeMap<i32, Vec<PuncturedFace>>,
    lines: BTreeMap<i32, Vec<VortexLine>>,
}

impl std::fmt::Debug for VortexExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VortexExtractor")
            .field("has_graph", &self.graph.is_some())
            .field("has_field", &self.field.is_some())
            .field("time_indices", &self.detections.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl VortexExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the mesh graph (and optionally the field) to trace over.
    /// Drops all accumulated detections and lines.
    pub fn set_dataset(&mut self, graph: Arc<MeshGraph>, field: Option<Arc<dyn VolumeField>>) {
        self.graph = Some(graph);
        self.field = field;
        self.clear();
    }

    /// Forget all punctured faces and traced lines.
    pub fn clear(&mut self) {
        self.detections.clear();
        self.lines.clear();
    }

    pub fn add_punctured_face(
        &mut self,
        face: u32,
        time_index: i32,
        chirality: Chirality,
        position: [f32; 3],
    ) {
        self.push(PuncturedFace {
            face,
            time_index,
            chirality,
            position,
        });
    }

    pub fn push(&mut self, pf: PuncturedFace) {
        self.detections.entry(pf.time_index).or_default().push(pf);
    }

    /// Number of detections recorded for a time index.
    pub fn detection_count(&self, time_index: i32) -> usize {
        self.detections.get(&time_index).map_or(0, Vec::len)
    }

    /// Lines of the last trace of `time_index`.
    pub fn lines(&self, time_index: i32) -> &[VortexLine] {
        self.lines.get(&time_index).map_or(&[][..], Vec::as_slice)
    }

    /// Trace the detections of one time index into vortex lines.
    ///
    /// Never fails: detections that cannot be linked are dropped and
    /// counted in the returned report. Without a dataset every detection is
    /// dropped.
    pub fn trace_over_space(&mut self, time_index: i32) -> (Vec<VortexLine>, ExtractionReport) {
        let input = self.detections.get(&time_index).map_or(&[][..], Vec::as_slice);
        let Some(graph) = self.graph.as_deref() else {
            if !input.is_empty() {
                log::warn!("trace_over_space({time_index}) without a dataset; dropping input");
            }
            let report = ExtractionReport {
                dropped: input.len(),
                ..ExtractionReport::default()
            };
            return (Vec::new(), report);
        };

        let mut report = ExtractionReport::default();
        let crossings = resolve(graph, input, &mut report);
        let (next, prev) = link(&crossings);

        let mut lines = Vec::new();
        let mut visited = vec![false; crossings.len()];
        for seed in 0..crossings.len() {
            if visited[seed] {
                continue;
            }
            if next[seed].is_none() && prev[seed].is_none() {
                visited[seed] = true;
                report.dropped += 1;
                log::trace!("dropping isolated crossing through {:?}", crossings[seed].face);
                continue;
            }

            let mut start = seed;
            let mut is_loop = false;
            while let Some(p) = prev[start] {
                if p == seed {
                    is_loop = true;
                    break;
                }
                start = p;
            }
            if is_loop {
                start = seed;
            }

            let mut path = vec![start];
            visited[start] = true;
            let mut cur = start;
            while let Some(n) = next[cur] {
                if n == start || visited[n] {
                    break;
                }
                visited[n] = true;
                path.push(n);
                cur = n;
            }

            report.consumed += path.len();
            if is_loop {
                report.loops += 1;
            }
            lines.push(self.make_line(time_index, lines.len(), &crossings, &path, is_loop));
        }
        report.lines = lines.len();

        log::debug!(
            "traced time index {time_index}: {} detections, {} consumed, {} dropped, {} lines ({} loops)",
            input.len(),
            report.consumed,
            report.dropped,
            report.lines,
            report.loops
        );
        self.lines.insert(time_index, lines.clone());
        (lines, report)
    }

    fn make_line(
        &self,
        frame: i32,
        id: usize,
        crossings: &[Crossing],
        path: &[usize],
        is_loop: bool,
    ) -> VortexLine {
        let raw: Vec<[f32; 3]> = path.iter().map(|&i| crossings[i].position).collect();
        let (points, gauge) = match self.field.as_deref() {
            Some(field) => unwrap_periodic(field, &raw),
            None => (raw.clone(), vec![0.0; raw.len()]),
        };
        VortexLine {
            frame,
            id,
            points,
            gauge,
            faces: path.iter().map(|&i| crossings[i].face).collect(),
            is_loop,
        }
    }
}

/// Resolve external ids, drop unknown faces and repeats, and sort by face id.
fn resolve(graph: &MeshGraph, input: &[PuncturedFace], report: &mut ExtractionReport) -> Vec<Crossing> {
    let mut seen = HashSet::with_capacity(input.len());
    let mut out = Vec::with_capacity(input.len());
    for pf in input {
        let resolved = graph
            .resolve_face(pf.face)
            .and_then(|fid| graph.face(fid).map(|f| (fid, f)));
        let Some((fid, face)) = resolved else {
            log::trace!("dropping detection on unknown face {}", pf.face);
            report.dropped += 1;
            continue;
        };
        if !seen.insert(fid) {
            report.dropped += 1;
            continue;
        }
        let (src, dst) = face.crossing(pf.chirality);
        let (src, dst) = (src.map(|n| (n.elem, n.local_index)), dst.map(|n| (n.elem, n.local_index)));
        if src.is_none() && dst.is_none() {
            report.dropped += 1;
            continue;
        }
        out.push(Crossing {
            face: fid,
            position: pf.position,
            src,
            dst,
        });
    }
    out.sort_by_key(|c| c.face);
    out
}

/// Link each crossing entering an element to one leaving it.
///
/// Within an element, entering and leaving crossings are paired in local
/// face order; surplus crossings on either side stay open ends.
fn link(crossings: &[Crossing]) -> (Vec<Option<usize>>, Vec<Option<usize>>) {
    let mut per_elem: HashMap<ElemId, (Vec<(u8, usize)>, Vec<(u8, usize)>)> = HashMap::new();
    for (i, c) in crossings.iter().enumerate() {
        if let Some((e, local)) = c.dst {
            per_elem.entry(e).or_default().0.push((local, i));
        }
        if let Some((e, local)) = c.src {
            per_elem.entry(e).or_default().1.push((local, i));
        }
    }

    let mut next = vec![None; crossings.len()];
    let mut prev = vec![None; crossings.len()];
    for (elem, (mut entering, mut leaving)) in per_elem {
        if entering.len() != leaving.len() {
            log::trace!(
                "element {elem:?}: {} entering vs {} leaving crossings",
                entering.len(),
                leaving.len()
            );
        }
        entering.sort_unstable();
        leaving.sort_unstable();
        for (&(_, a), &(_, b)) in entering.iter().zip(&leaving) {
            if a != b {
                next[a] = Some(b);
                prev[b] = Some(a);
            }
        }
    }
    (next, prev)
}

/// Shift points across periodic boundaries so consecutive points stay
/// within half a domain length, and attach the per-step gauge.
fn unwrap_periodic(field: &dyn VolumeField, raw: &[[f32; 3]]) -> (Vec<[f32; 3]>, Vec<f64>) {
    let pbc = field.pbc();
    let lengths = field.lengths();
    let mut points = Vec::with_capacity(raw.len());
    let mut gauge = Vec::with_capacity(raw.len());
    let mut shift = [0.0f64; 3];
    for (k, p) in raw.iter().enumerate() {
        if k == 0 {
            points.push(*p);
            gauge.push(0.0);
            continue;
        }
        let q = raw[k - 1];
        let x0 = q.map(f64::from);
        let x1 = p.map(f64::from);
        for a in 0..3 {
            if !pbc[a] {
                continue;
            }
            let d = x1[a] - x0[a];
            if d > lengths[a] / 2.0 {
                shift[a] -= lengths[a];
            } else if d < -lengths[a] / 2.0 {
                shift[a] += lengths[a];
            }
        }
        points.push(std::array::from_fn(|a| (x1[a] + shift[a]) as f32));
        gauge.push(field.gauge_transformation(x0, x1));
    }
    (points, gauge)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{FrameHeader, RegularVolume};
    use crate::topology::builder::{MeshGraphBuilder, RegularGridBuilder};
    use crate::topology::lattice::RegularLattice;

    fn grid(dims: [usize; 3], pbc: [bool; 3]) -> (Arc<MeshGraph>, RegularLattice) {
        let g = RegularGridBuilder::new(dims, pbc).unwrap().build().unwrap();
        let l = *g.lattice().unwrap();
        (Arc::new(g), l)
    }

    fn lattice_face(l: &RegularLattice, idx: [usize; 3], t: u32) -> u32 {
        3 * l.node(idx).unwrap().get() + t
    }

    #[test]
    fn two_faces_of_one_cell_make_one_line() {
        let (g, l) = grid([4, 4, 4], [false; 3]);
        let mut ex = VortexExtractor::new();
        ex.set_dataset(g.clone(), None);
        // Added out of order on purpose.
        ex.add_punctured_face(lattice_face(&l, [1, 1, 2], 2), 7, Chirality::Positive, [1.5, 1.5, 2.0]);
        ex.add_punctured_face(lattice_face(&l, [1, 1, 1], 2), 7, Chirality::Positive, [1.5, 1.5, 1.0]);
        let (lines, report) = ex.trace_over_space(7);
        assert_eq!(lines.len(), 1);
        let line = &lines[0];
        assert_eq!(line.frame, 7);
        assert_eq!(line.points, vec![[1.5, 1.5, 1.0], [1.5, 1.5, 2.0]]);
        assert!(!line.is_loop);
        assert_eq!(
            report,
            ExtractionReport {
                consumed: 2,
                dropped: 0,
                lines: 1,
                loops: 0
            }
        );
        assert_eq!(ex.lines(7).len(), 1);
        assert!(ex.lines(8).is_empty());
    }

    #[test]
    fn reversed_chirality_reverses_the_line() {
        let (g, l) = grid([4, 4, 4], [false; 3]);
        let mut ex = VortexExtractor::new();
        ex.set_dataset(g, None);
        ex.add_punctured_face(lattice_face(&l, [1, 1, 1], 2), 0, Chirality::Negative, [1.5, 1.5, 1.0]);
        ex.add_punctured_face(lattice_face(&l, [1, 1, 2], 2), 0, Chirality::Negative, [1.5, 1.5, 2.0]);
        let (lines, _) = ex.trace_over_space(0);
        assert_eq!(lines[0].points, vec![[1.5, 1.5, 2.0], [1.5, 1.5, 1.0]]);
    }

    #[test]
    fn loop_around_an_edge() {
        let (g, l) = grid([4, 4, 4], [false; 3]);
        let mut ex = VortexExtractor::new();
        ex.set_dataset(g, None);
        ex.add_punctured_face(lattice_face(&l, [2, 1, 1], 0), 0, Chirality::Positive, [2.0, 1.5, 1.5]);
        ex.add_punctured_face(lattice_face(&l, [2, 2, 1], 1), 0, Chirality::Positive, [2.5, 2.0, 1.5]);
        ex.add_punctured_face(lattice_face(&l, [2, 2, 1], 0), 0, Chirality::Negative, [2.0, 2.5, 1.5]);
        ex.add_punctured_face(lattice_face(&l, [1, 2, 1], 1), 0, Chirality::Negative, [1.5, 2.0, 1.5]);
        let (lines, report) = ex.trace_over_space(0);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].is_loop);
        assert_eq!(lines[0].len(), 4);
        assert_eq!(report.loops, 1);
        assert_eq!(report.consumed, 4);
        assert!((lines[0].arc_length() - 4.0 * 0.5f64.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn unresolvable_duplicate_and_isolated_faces_are_dropped() {
        let (g, l) = grid([4, 4, 4], [false; 3]);
        let mut ex = VortexExtractor::new();
        ex.set_dataset(g, None);
        let a = lattice_face(&l, [1, 1, 1], 2);
        let b = lattice_face(&l, [1, 1, 2], 2);
        ex.add_punctured_face(a, 0, Chirality::Positive, [1.5, 1.5, 1.0]);
        ex.add_punctured_face(a, 0, Chirality::Positive, [1.5, 1.5, 1.0]);
        ex.add_punctured_face(b, 0, Chirality::Positive, [1.5, 1.5, 2.0]);
        // No XY face is anchored on the last x column.
        ex.add_punctured_face(lattice_face(&l, [3, 1, 1], 2), 0, Chirality::Positive, [0.0; 3]);
        // Far away from everything else.
        ex.add_punctured_face(lattice_face(&l, [0, 0, 0], 0), 0, Chirality::Positive, [0.0, 0.5, 0.5]);
        let (lines, report) = ex.trace_over_space(0);
        assert_eq!(lines.len(), 1);
        assert_eq!(report.consumed, 2);
        assert_eq!(report.dropped, 3);
    }

    #[test]
    fn periodic_line_is_unwrapped_with_gauge() {
        let (g, l) = grid([4, 4, 4], [true, false, false]);
        let header = FrameHeader {
            kx: 0.5,
            ..FrameHeader::unit(0, [4, 4, 4], [true, false, false])
        };
        let field: Arc<dyn VolumeField> = Arc::new(RegularVolume::new(header));
        let mut ex = VortexExtractor::new();
        ex.set_dataset(g, Some(field));
        for x in [2usize, 3, 0] {
            ex.add_punctured_face(lattice_face(&l, [x, 1, 1], 0), 0, Chirality::Positive, [x as f32, 1.5, 1.5]);
        }
        let (lines, report) = ex.trace_over_space(0);
        assert_eq!(report.lines, 1);
        let line = &lines[0];
        assert!(!line.is_loop);
        let xs: Vec<f32> = line.points.iter().map(|p| p[0]).collect();
        assert_eq!(xs, vec![2.0, 3.0, 4.0]);
        assert_eq!(line.gauge.len(), 3);
        assert!(line.gauge[0].abs() < 1e-12);
        assert!((line.gauge[1] - 0.5).abs() < 1e-9);
        assert!((line.gauge[2] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn without_dataset_everything_is_dropped() {
        let mut ex = VortexExtractor::new();
        ex.add_punctured_face(0, 0, Chirality::Positive, [0.0; 3]);
        let (lines, report) = ex.trace_over_space(0);
        assert!(lines.is_empty());
        assert_eq!(report.dropped, 1);
        ex.clear();
        assert_eq!(ex.detection_count(0), 0);
    }
}
