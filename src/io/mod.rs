//! Byte-level interfaces: stream framing, wire records and line output.
//!
//! - [`wire`]: fixed little-endian records shared by the stream and the
//!   transition-matrix file format
//! - [`stream`]: decoding/encoding of PF and PE messages
//! - [`vtk`]: legacy VTK polyline files for traced vortex lines

pub mod stream;
pub mod vtk;
pub mod wire;

pub use stream::{Message, MessageReader, MessageWriter};
pub use vtk::{VtkLineReader, VtkLineWriter, line_file_name};
pub use wire::PackedFace;
