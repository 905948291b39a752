//! Inter-frame vortex correspondence and event classification.
//!
//! A [`VortexTransitionMatrix`] relates the `n0` vortices of frame `t0`
//! (rows, left side) to the `n1` vortices of frame `t1` (columns, right
//! side). Nonzero entries are edges of a bipartite graph whose connected
//! components ("modules") are the units of event classification.
//!
//! Persisted layout (little-endian):
//! `t0 i32, t1 i32, n0 i32, n1 i32, n0*n1 x i32` in row-major order.

use std::collections::BTreeSet;
use std::fmt;
use std::io::{Read, Write};
use std::ops::Index;
use std::path::Path;

use crate::io::wire::{WireMatrixHdr, expect_exact_len, read_record};
use crate::track_error::TrackError;

/// Classified shape of a module, by `(|left|, |right|)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum VortexEvent {
    /// `(1, 1)`: the vortex persists.
    Dummy,
    /// `(0, 1)`
    Birth,
    /// `(1, 0)`
    Death,
    /// `(1, 2)`
    Split,
    /// `(2, 1)`
    Merge,
    /// `(2, 2)`
    Recombination,
    /// Any other shape.
    Compound,
}

impl VortexEvent {
    pub fn classify(n_lhs: usize, n_rhs: usize) -> Self {
        match (n_lhs, n_rhs) {
            (1, 1) => VortexEvent::Dummy,
            (0, 1) => VortexEvent::Birth,
            (1, 0) => VortexEvent::Death,
            (1, 2) => VortexEvent::Split,
            (2, 1) => VortexEvent::Merge,
            (2, 2) => VortexEvent::Recombination,
            _ => VortexEvent::Compound,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VortexEvent::Dummy => "DUMMY",
            VortexEvent::Birth => "BIRTH",
            VortexEvent::Death => "DEATH",
            VortexEvent::Split => "SPLIT",
            VortexEvent::Merge => "MERGE",
            VortexEvent::Recombination => "RECOMBINATION",
            VortexEvent::Compound => "COMPOUND",
        }
    }
}

impl fmt::Display for VortexEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A connected component of the correspondence graph.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Module {
    pub lhs: BTreeSet<usize>,
    pub rhs: BTreeSet<usize>,
    pub event: VortexEvent,
}

/// Structured encoding with the interoperable field names.
#[derive(serde::Serialize, serde::Deserialize)]
struct MatrixRecord {
    f0: i32,
    f1: i32,
    n0: i32,
    n1: i32,
    #[serde(default)]
    mat: Vec<i32>,
}

/// `"{dataname}.match.{t0}.{t1}"`
pub fn matrix_file_name(dataname: &str, t0: i32, t1: i32) -> String {
    format!("{dataname}.match.{t0}.{t1}")
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VortexTransitionMatrix {
    interval: (i32, i32),
    n0: usize,
    n1: usize,
    mat: Vec<i32>,
    /// Derived partition; `None` until modularized or after a mutation.
    modules: Option<Vec<Module>>,
}

impl VortexTransitionMatrix {
    /// Zero matrix relating `n0` vortices of `t0` to `n1` vortices of `t1`.
    pub fn new(t0: i32, t1: i32, n0: usize, n1: usize) -> Self {
        Self {
            interval: (t0, t1),
            n0,
            n1,
            mat: vec![0; n0 * n1],
            modules: None,
        }
    }

    /// Matrix with a `1` at every listed `(left, right)` pair.
    pub fn from_correspondences<I>(t0: i32, t1: i32, n0: usize, n1: usize, pairs: I) -> Result<Self, TrackError>
    where
        I: IntoIterator<Item = (usize, usize)>,
    {
        let mut m = Self::new(t0, t1, n0, n1);
        for (i, j) in pairs {
            if i >= n0 || j >= n1 {
                return Err(TrackError::InvalidMatrix {
                    n0: n0 as i64,
                    n1: n1 as i64,
                    entries: i * n1 + j,
                });
            }
            m.mat[i * n1 + j] = 1;
        }
        Ok(m)
    }

    #[inline]
    pub fn interval(&self) -> (i32, i32) {
        self.interval
    }
    #[inline]
    pub fn t0(&self) -> i32 {
        self.interval.0
    }
    #[inline]
    pub fn t1(&self) -> i32 {
        self.interval.1
    }
    #[inline]
    pub fn n0(&self) -> usize {
        self.n0
    }
    #[inline]
    pub fn n1(&self) -> usize {
        self.n1
    }

    /// Raw entries in row-major order.
    #[inline]
    pub fn entries(&self) -> &[i32] {
        &self.mat
    }

    /// Both sides non-empty and the entry count matches `n0 * n1`.
    pub fn is_valid(&self) -> bool {
        self.n0 > 0 && self.n1 > 0 && self.mat.len() == self.n0 * self.n1
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> Option<i32> {
        (i < self.n0 && j < self.n1).then(|| self.mat[i * self.n1 + j])
    }

    /// Entry `(i, j)`.
    ///
    /// # Panics
    /// If `i >= n0` or `j >= n1`.
    #[inline]
    pub fn at(&self, i: usize, j: usize) -> i32 {
        self[(i, j)]
    }

    /// Overwrite entry `(i, j)`; derived modules are discarded.
    ///
    /// # Panics
    /// If `i >= n0` or `j >= n1`.
    pub fn set(&mut self, i: usize, j: usize, value: i32) {
        assert!(i < self.n0 && j < self.n1, "({i}, {j}) outside {}x{}", self.n0, self.n1);
        self.mat[i * self.n1 + j] = value;
        self.modules = None;
    }

    /// Fan-out of left vortex `i`.
    pub fn rowsum(&self, i: usize) -> i32 {
        self.mat[i * self.n1..(i + 1) * self.n1].iter().sum()
    }

    /// Fan-in of right vortex `j`.
    pub fn colsum(&self, j: usize) -> i32 {
        (0..self.n0).map(|i| self.mat[i * self.n1 + j]).sum()
    }

    /// Partition the bipartite graph into connected modules and classify them.
    ///
    /// Vertices `0..n0` are left vortices, `n0..n0+n1` right vortices.
    /// Components are seeded in ascending vertex order and explored with an
    /// explicit stack, so the result is deterministic.
    pub fn modularize(&mut self) -> &[Module] {
        let (n0, n1) = (self.n0, self.n1);
        let mut visited = vec![false; n0 + n1];
        let mut modules = Vec::new();
        let mut stack = Vec::new();

        for seed in 0..n0 + n1 {
            if visited[seed] {
                continue;
            }
            let mut lhs = BTreeSet::new();
            let mut rhs = BTreeSet::new();
            visited[seed] = true;
            stack.push(seed);
            while let Some(v) = stack.pop() {
                if v < n0 {
                    lhs.insert(v);
                    for j in 0..n1 {
                        if self.mat[v * n1 + j] > 0 && !visited[n0 + j] {
                            visited[n0 + j] = true;
                            stack.push(n0 + j);
                        }
                    }
                } else {
                    let j = v - n0;
                    rhs.insert(j);
                    for i in 0..n0 {
                        if self.mat[i * n1 + j] > 0 && !visited[i] {
                            visited[i] = true;
                            stack.push(i);
                        }
                    }
                }
            }
            let event = VortexEvent::classify(lhs.len(), rhs.len());
            modules.push(Module { lhs, rhs, event });
        }

        log::trace!(
            "modularized {}x{} matrix ({}, {}) into {} modules",
            n0,
            n1,
            self.interval.0,
            self.interval.1,
            modules.len()
        );
        self.modules.insert(modules)
    }

    /// Modularize if needed, then close every module into a complete block.
    pub fn normalize(&mut self) {
        if self.modules.is_none() {
            self.modularize();
        }
        let n1 = self.n1;
        if let Some(modules) = &self.modules {
            for m in modules {
                for &i in &m.lhs {
                    for &j in &m.rhs {
                        self.mat[i * n1 + j] = 1;
                    }
                }
            }
        }
    }

    /// Modules of the last modularization; empty if none has run.
    pub fn modules(&self) -> &[Module] {
        self.modules.as_deref().unwrap_or(&[])
    }

    pub fn n_modules(&self) -> usize {
        self.modules().len()
    }

    pub fn module(&self, i: usize) -> Option<&Module> {
        self.modules().get(i)
    }

    /// Events of all modules, in module order.
    pub fn events(&self) -> impl Iterator<Item = VortexEvent> + '_ {
        self.modules().iter().map(|m| m.event)
    }

    fn invalid(&self) -> TrackError {
        TrackError::InvalidMatrix {
            n0: self.n0 as i64,
            n1: self.n1 as i64,
            entries: self.mat.len(),
        }
    }

    /// Dimensions as stored on disk; both must fit in an `i32`.
    fn stored_dims(&self) -> Result<(i32, i32), TrackError> {
        match (i32::try_from(self.n0), i32::try_from(self.n1)) {
            (Ok(a), Ok(b)) => Ok((a, b)),
            _ => Err(self.invalid()),
        }
    }

    /// Write the binary layout; invalid matrices are refused.
    pub fn write_to<W: Write>(&self, mut w: W) -> Result<(), TrackError> {
        if !self.is_valid() {
            return Err(self.invalid());
        }
        let (n0, n1) = self.stored_dims()?;
        let hdr = WireMatrixHdr::new(self.interval.0, self.interval.1, n0, n1);
        w.write_all(bytemuck::bytes_of(&hdr))?;
        let body: Vec<i32> = self.mat.iter().map(|v| v.to_le()).collect();
        w.write_all(bytemuck::cast_slice(&body))?;
        w.flush()?;
        Ok(())
    }

    /// Read the binary layout, requiring exactly `n0 * n1` entries and no
    /// trailing bytes. A valid result is normalized.
    pub fn read_from<R: Read>(mut r: R) -> Result<Self, TrackError> {
        let mut head = [0u8; 16];
        let mut got = 0;
        while got < head.len() {
            match r.read(&mut head[got..])? {
                0 => break,
                n => got += n,
            }
        }
        let hdr: WireMatrixHdr = read_record("transition matrix header", &head[..got])?;
        let (t0, t1, n0, n1) = hdr.decode();
        if n0 <= 0 || n1 <= 0 {
            return Err(TrackError::InvalidMatrix {
                n0: n0 as i64,
                n1: n1 as i64,
                entries: 0,
            });
        }
        let (n0, n1) = (n0 as usize, n1 as usize);
        let expected = n0
            .checked_mul(n1)
            .and_then(|n| n.checked_mul(4))
            .ok_or(TrackError::InvalidMatrix {
                n0: n0 as i64,
                n1: n1 as i64,
                entries: 0,
            })?;
        let mut body = Vec::new();
        r.take(expected as u64 + 1).read_to_end(&mut body)?;
        expect_exact_len("transition matrix entries", body.len(), expected)?;

        let mat = body
            .chunks_exact(4)
            .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        let mut m = Self {
            interval: (t0, t1),
            n0,
            n1,
            mat,
            modules: None,
        };
        m.normalize();
        Ok(m)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), TrackError> {
        if !self.is_valid() {
            return Err(self.invalid());
        }
        let file = std::fs::File::create(path)?;
        self.write_to(std::io::BufWriter::new(file))
    }

    /// Replace `self` with the matrix stored at `path`.
    ///
    /// On any failure `self` is reset to the empty, invalid matrix.
    pub fn load_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), TrackError> {
        let loaded = std::fs::File::open(path)
            .map_err(TrackError::from)
            .and_then(|f| Self::read_from(std::io::BufReader::new(f)));
        match loaded {
            Ok(m) => {
                *self = m;
                Ok(())
            }
            Err(e) => {
                *self = Self::default();
                Err(e)
            }
        }
    }

    /// `"{dataname}.match.{t0}.{t1}"` for this matrix's interval.
    pub fn file_name(&self, dataname: &str) -> String {
        matrix_file_name(dataname, self.interval.0, self.interval.1)
    }

    pub fn to_json(&self) -> Result<String, TrackError> {
        if !self.is_valid() {
            return Err(self.invalid());
        }
        let (n0, n1) = self.stored_dims()?;
        let rec = MatrixRecord {
            f0: self.interval.0,
            f1: self.interval.1,
            n0,
            n1,
            mat: self.mat.clone(),
        };
        Ok(serde_json::to_string(&rec)?)
    }

    /// Parse the structured encoding; a valid result is normalized.
    pub fn from_json(s: &str) -> Result<Self, TrackError> {
        let rec: MatrixRecord = serde_json::from_str(s)?;
        let bad = TrackError::InvalidMatrix {
            n0: rec.n0 as i64,
            n1: rec.n1 as i64,
            entries: rec.mat.len(),
        };
        if rec.n0 <= 0 || rec.n1 <= 0 || rec.mat.len() != rec.n0 as usize * rec.n1 as usize {
            return Err(bad);
        }
        let mut m = Self {
            interval: (rec.f0, rec.f1),
            n0: rec.n0 as usize,
            n1: rec.n1 as usize,
            mat: rec.mat,
            modules: None,
        };
        m.normalize();
        Ok(m)
    }
}

impl Index<(usize, usize)> for VortexTransitionMatrix {
    type Output = i32;

    fn index(&self, (i, j): (usize, usize)) -> &i32 {
        assert!(i < self.n0 && j < self.n1, "({i}, {j}) outside {}x{}", self.n0, self.n1);
        &self.mat[i * self.n1 + j]
    }
}

impl fmt::Display for VortexTransitionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "interval=({}, {}), n0={}, n1={}",
            self.interval.0, self.interval.1, self.n0, self.n1
        )?;
        for i in 0..self.n0 {
            let row = &self.mat[i * self.n1..(i + 1) * self.n1];
            let cells: Vec<String> = row.iter().map(i32::to_string).collect();
            writeln!(f, "{}", cells.join("\t"))?;
        }
        Ok(())
    }
}
