//! Framing of the detection message stream.
//!
//! A stream is a sequence of messages, each introduced by an `i32` tag:
//!
//! - `0` (PF): a [`WireFrameHeader`], an `i32` face count, then that many
//!   [`WirePuncturedFace`] records;
//! - `1` (PE): two `i32` frame ids, an `i32` edge count, then that many
//!   `u32` edge ids.
//!
//! [`MessageReader`] stops at the first malformed message; a clean end of
//! input between messages is not an error.

use bytes::{BufMut, Bytes, BytesMut};
use std::io::{Read, Write};

use crate::algs::extractor::PuncturedFace;
use crate::field::FrameHeader;
use crate::io::wire::{
    PackedFace, TAG_PUNCTURED_EDGES, TAG_PUNCTURED_FACES, WireEdgePairHdr, WireFrameHeader,
    WirePuncturedFace, read_record,
};
use crate::track_error::TrackError;

/// One decoded stream message.
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    /// Punctured faces of one frame.
    PuncturedFaces {
        header: FrameHeader,
        faces: Vec<PuncturedFace>,
    },
    /// Punctured edges relating two frames.
    PuncturedEdges { f0: i32, f1: i32, edges: Vec<u32> },
}

impl Message {
    pub fn tag(&self) -> i32 {
        match self {
            Message::PuncturedFaces { .. } => TAG_PUNCTURED_FACES,
            Message::PuncturedEdges { .. } => TAG_PUNCTURED_EDGES,
        }
    }

    /// Encode into the wire layout. Face ids wider than 31 bits collide
    /// with the chirality bit and are rejected.
    pub fn encode(&self) -> Result<Bytes, TrackError> {
        let mut buf = BytesMut::new();
        buf.put_i32_le(self.tag());
        match self {
            Message::PuncturedFaces { header, faces } => {
                let hdr = WireFrameHeader::from_header(header, faces.len() as u32);
                buf.put_slice(bytemuck::bytes_of(&hdr));
                buf.put_i32_le(faces.len() as i32);
                for pf in faces {
                    let packed = PackedFace::new(pf.face, pf.chirality).ok_or_else(|| {
                        TrackError::InvalidMesh(format!("face id {} does not fit in 31 bits", pf.face))
                    })?;
                    let rec = WirePuncturedFace::new(packed, pf.position);
                    buf.put_slice(bytemuck::bytes_of(&rec));
                }
            }
            Message::PuncturedEdges { f0, f1, edges } => {
                buf.put_i32_le(*f0);
                buf.put_i32_le(*f1);
                buf.put_i32_le(edges.len() as i32);
                for e in edges {
                    buf.put_u32_le(*e);
                }
            }
        }
        Ok(buf.freeze())
    }
}

/// Pull-based decoder over any byte source.
#[derive(Debug)]
pub struct MessageReader<R> {
    inner: R,
    messages: usize,
    failed: bool,
}

impl<R: Read> MessageReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            messages: 0,
            failed: false,
        }
    }

    /// Messages decoded so far.
    pub fn messages_read(&self) -> usize {
        self.messages
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Read up to `buf.len()` bytes, returning how many arrived before EOF.
    fn fill(&mut self, buf: &mut [u8]) -> Result<usize, TrackError> {
        let mut got = 0;
        while got < buf.len() {
            match self.inner.read(&mut buf[got..]) {
                Ok(0) => break,
                Ok(n) => got += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(got)
    }

    fn read_exact(&mut self, what: &'static str, buf: &mut [u8]) -> Result<(), TrackError> {
        let got = self.fill(buf)?;
        if got < buf.len() {
            return Err(TrackError::Truncated {
                what,
                expected: buf.len(),
                actual: got,
            });
        }
        Ok(())
    }

    fn read_i32(&mut self, what: &'static str) -> Result<i32, TrackError> {
        let mut b = [0u8; 4];
        self.read_exact(what, &mut b)?;
        Ok(i32::from_le_bytes(b))
    }

    fn read_count(&mut self, what: &'static str) -> Result<usize, TrackError> {
        let count = self.read_i32(what)?;
        usize::try_from(count).map_err(|_| TrackError::NegativeCount { what, count })
    }

    /// Read `count` fixed-size records without trusting `count` for the
    /// allocation size.
    fn read_records(&mut self, what: &'static str, count: usize, size: usize) -> Result<Vec<u8>, TrackError> {
        let expected = count.saturating_mul(size);
        let mut body = Vec::new();
        (&mut self.inner)
            .take(expected as u64)
            .read_to_end(&mut body)?;
        if body.len() < expected {
            return Err(TrackError::Truncated {
                what,
                expected,
                actual: body.len(),
            });
        }
        Ok(body)
    }

    /// Decode the next message; `Ok(None)` at a clean end of input.
    ///
    /// After an error the reader is exhausted and keeps returning `Ok(None)`.
    pub fn next_message(&mut self) -> Result<Option<Message>, TrackError> {
        if self.failed {
            return Ok(None);
        }
        let result = self.decode();
        match &result {
            Ok(Some(_)) => self.messages += 1,
            Ok(None) => {}
            Err(_) => self.failed = true,
        }
        result
    }

    fn decode(&mut self) -> Result<Option<Message>, TrackError> {
        let mut tag = [0u8; 4];
        match self.fill(&mut tag)? {
            0 => return Ok(None),
            4 => {}
            n => {
                return Err(TrackError::Truncated {
                    what: "message tag",
                    expected: 4,
                    actual: n,
                });
            }
        }
        match i32::from_le_bytes(tag) {
            TAG_PUNCTURED_FACES => {
                let mut raw = [0u8; WireFrameHeader::SIZE];
                self.read_exact("frame header", &mut raw)?;
                let hdr: WireFrameHeader = read_record("frame header", &raw)?;
                let header = hdr.to_header();
                let count = self.read_count("punctured face count")?;
                let body = self.read_records("punctured faces", count, WirePuncturedFace::SIZE)?;
                let faces = body
                    .chunks_exact(WirePuncturedFace::SIZE)
                    .map(|c| {
                        let rec: WirePuncturedFace = bytemuck::pod_read_unaligned(c);
                        let packed = rec.face();
                        PuncturedFace {
                            face: packed.id,
                            time_index: header.frame,
                            chirality: packed.chirality,
                            position: rec.pos(),
                        }
                    })
                    .collect();
                Ok(Some(Message::PuncturedFaces { header, faces }))
            }
            TAG_PUNCTURED_EDGES => {
                let mut raw = [0u8; 12];
                self.read_exact("edge pair header", &mut raw)?;
                let hdr: WireEdgePairHdr = read_record("edge pair header", &raw)?;
                let (f0, f1) = hdr.frames();
                let count = usize::try_from(hdr.count()).map_err(|_| TrackError::NegativeCount {
                    what: "punctured edge count",
                    count: hdr.count(),
                })?;
                let body = self.read_records("punctured edges", count, 4)?;
                let edges = body
                    .chunks_exact(4)
                    .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .collect();
                Ok(Some(Message::PuncturedEdges { f0, f1, edges }))
            }
            other => Err(TrackError::UnknownMessage(other)),
        }
    }
}

impl<R: Read> Iterator for MessageReader<R> {
    type Item = Result<Message, TrackError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_message().transpose()
    }
}

/// Encoder writing messages to any byte sink.
#[derive(Debug)]
pub struct MessageWriter<W> {
    inner: W,
}

impl<W: Write> MessageWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn write(&mut self, msg: &Message) -> Result<(), TrackError> {
        self.inner.write_all(&msg.encode()?)?;
        Ok(())
    }

    pub fn write_faces(&mut self, header: FrameHeader, faces: Vec<PuncturedFace>) -> Result<(), TrackError> {
        self.write(&Message::PuncturedFaces { header, faces })
    }

    pub fn write_edges(&mut self, f0: i32, f1: i32, edges: Vec<u32>) -> Result<(), TrackError> {
        self.write(&Message::PuncturedEdges { f0, f1, edges })
    }

    pub fn flush(&mut self) -> Result<(), TrackError> {
        self.inner.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}
