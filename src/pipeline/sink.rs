//! Destinations for traced vortex lines.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use dashmap::DashMap;

use crate::algs::extractor::VortexLine;
use crate::field::FrameHeader;
use crate::io::vtk::{VtkLineWriter, line_file_name};
use crate::track_error::TrackError;

/// Consumer of one frame's lines. Called from worker threads, once per frame.
pub trait LineSink: Send + Sync {
    fn write_lines(&self, header: &FrameHeader, lines: &[VortexLine]) -> Result<(), TrackError>;
}

/// Writes `vlines-{frame}.vtk` into a directory.
#[derive(Clone, Debug)]
pub struct VtkLineSink {
    dir: PathBuf,
}

impl VtkLineSink {
    /// Creates `dir` if needed.
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self, TrackError> {
        std::fs::create_dir_all(dir.as_ref())?;
        Ok(Self {
            dir: dir.as_ref().to_path_buf(),
        })
    }

    pub fn path_for(&self, frame: i32) -> PathBuf {
        self.dir.join(line_file_name(frame))
    }
}

impl LineSink for VtkLineSink {
    fn write_lines(&self, header: &FrameHeader, lines: &[VortexLine]) -> Result<(), TrackError> {
        let path = self.path_for(header.frame);
        let file = File::create(&path)?;
        VtkLineWriter.write(BufWriter::new(file), header.frame, lines)?;
        log::debug!("wrote {} lines to {}", lines.len(), path.display());
        Ok(())
    }
}

/// Keeps every frame's lines in memory.
#[derive(Debug, Default)]
pub struct MemoryLineSink {
    frames: DashMap<i32, (FrameHeader, Vec<VortexLine>)>,
}

impl MemoryLineSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, frame: i32) -> Option<(FrameHeader, Vec<VortexLine>)> {
        self.frames.get(&frame).map(|r| r.value().clone())
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Stored frame ids, ascending.
    pub fn frames(&self) -> Vec<i32> {
        let mut ids: Vec<i32> = self.frames.iter().map(|r| *r.key()).collect();
        ids.sort_unstable();
        ids
    }
}

impl LineSink for MemoryLineSink {
    fn write_lines(&self, header: &FrameHeader, lines: &[VortexLine]) -> Result<(), TrackError> {
        self.frames.insert(header.frame, (*header, lines.to_vec()));
        Ok(())
    }
}

/// Discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullLineSink;

impl LineSink for NullLineSink {
    fn write_lines(&self, _header: &FrameHeader, _lines: &[VortexLine]) -> Result<(), TrackError> {
        Ok(())
    }
}
