//! TrackError: unified error type for vortex-track public APIs
//!
//! Every fallible operation in the crate (mesh construction, stream decoding,
//! transition-matrix persistence, pipeline setup) reports through this enum so
//! callers never need to catch panics at the extraction or matrix boundary.

use thiserror::Error;

/// Unified error type for vortex-track operations.
#[derive(Debug, Error)]
pub enum TrackError {
    /// The input stream ended in the middle of a record.
    #[error("Truncated input while reading {what}: expected {expected} bytes, got {actual}")]
    Truncated {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    /// A message tag other than PF (0) or PE (1).
    #[error("Unknown message type tag {0}")]
    UnknownMessage(i32),
    /// A record count field was negative.
    #[error("Negative record count {count} in {what}")]
    NegativeCount { what: &'static str, count: i32 },
    /// Transition matrix dimensions are non-positive or disagree with the payload.
    #[error("Invalid transition matrix: n0={n0}, n1={n1}, entries={entries}")]
    InvalidMatrix { n0: i64, n1: i64, entries: usize },
    /// A persisted matrix had trailing or missing bytes.
    #[error("Byte count mismatch: expected {expected} bytes, got {actual}")]
    ByteCountMismatch { expected: usize, actual: usize },
    /// Element connectivity handed to a builder is inconsistent.
    #[error("Invalid mesh input: {0}")]
    InvalidMesh(String),
    /// A face was claimed by more than two elements, or twice on one side.
    #[error("Non-manifold face {nodes:?}: already attached on the {side} side")]
    NonManifoldFace { nodes: Vec<u32>, side: &'static str },
    /// A graph-level invariant failed validation.
    #[error("Mesh graph invariant violated: {0}")]
    Invariant(String),
    /// Malformed text input (VTK line files, JSON configs).
    #[error("Parse error: {0}")]
    Parse(String),
    /// Pipeline configuration rejected.
    #[error("Invalid configuration: {0}")]
    Config(String),
    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Structured (JSON) encoding failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TrackError {
    /// True for errors caused by a short read of the message stream.
    pub fn is_truncation(&self) -> bool {
        matches!(self, TrackError::Truncated { .. })
    }
}
