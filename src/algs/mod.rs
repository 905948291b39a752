//! Re-export public algorithms.

pub mod extractor;
pub mod transition;

pub use extractor::{ExtractionReport, PuncturedFace, VortexExtractor, VortexLine};
pub use transition::{Module, VortexEvent, VortexTransitionMatrix, matrix_file_name};
