use std::sync::Arc;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serial_test::serial;
use vortex_track::TrackError;
use vortex_track::algs::{PuncturedFace, VortexEvent, VortexLine};
use vortex_track::field::FrameHeader;
use vortex_track::io::stream::{Message, MessageWriter};
use vortex_track::io::vtk::VtkLineReader;
use vortex_track::pipeline::{
    Backpressure, FrameRegistry, LineSink, MemoryLineSink, NullLineSink, PipelineConfig,
    StreamingPipeline, VtkLineSink,
};
use vortex_track::topology::Chirality;

const DIMS: [usize; 3] = [4, 4, 4];

/// A vertical filament through column `x` of a 4x4x4 grid, crossing the
/// z-normal faces at heights 1 and 2.
fn column(frame: i32, x: usize) -> (FrameHeader, Vec<PuncturedFace>) {
    let header = FrameHeader::unit(frame, DIMS, [false; 3]);
    let l = header.lattice().unwrap();
    let faces = [1usize, 2]
        .into_iter()
        .map(|z| PuncturedFace {
            face: 3 * l.node([x, 1, z]).unwrap().get() + 2,
            time_index: frame,
            chirality: Chirality::Positive,
            position: [x as f32 + 0.5, 1.5, z as f32],
        })
        .collect();
    (header, faces)
}

fn encode(messages: &[Message]) -> Vec<u8> {
    let mut w = MessageWriter::new(Vec::new());
    for m in messages {
        w.write(m).unwrap();
    }
    w.into_inner()
}

fn faces_msg(frame: i32, x: usize) -> Message {
    let (header, faces) = column(frame, x);
    Message::PuncturedFaces { header, faces }
}

fn pipeline(config: PipelineConfig, sink: Arc<dyn LineSink>) -> StreamingPipeline {
    StreamingPipeline::new(config, Arc::new(FrameRegistry::new()), sink).unwrap()
}

/// Sleeps a frame-dependent time before storing, to scramble completion order.
struct SlowSink {
    inner: MemoryLineSink,
}

impl LineSink for SlowSink {
    fn write_lines(&self, header: &FrameHeader, lines: &[VortexLine]) -> Result<(), TrackError> {
        let ms = (header.frame as u64 * 7) % 5;
        std::thread::sleep(Duration::from_millis(ms));
        self.inner.write_lines(header, lines)
    }
}

#[test]
fn stream_of_one_frame_yields_one_line() {
    let sink = Arc::new(MemoryLineSink::new());
    let p = pipeline(PipelineConfig::default(), sink.clone());
    let bytes = encode(&[faces_msg(7, 1)]);
    let summary = p.run(&bytes[..]).unwrap();

    assert!(summary.stopped_by.is_none());
    assert_eq!((summary.messages, summary.frames, summary.extracted), (1, 1, 1));
    let (header, lines) = sink.get(7).unwrap();
    assert_eq!(header.frame, 7);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].frame, 7);
    assert_eq!(lines[0].points, vec![[1.5, 1.5, 1.0], [1.5, 1.5, 2.0]]);
    assert!(!lines[0].is_loop);
    assert_eq!(p.registry().output(7).unwrap().report.consumed, 2);
}

#[test]
fn detection_order_does_not_change_the_lines() {
    let header = FrameHeader::unit(3, [6, 6, 6], [false; 3]);
    let l = header.lattice().unwrap();
    let mut faces = Vec::new();
    for (x, y) in [(1usize, 1usize), (3, 1), (1, 4), (4, 3)] {
        for z in 1..5 {
            faces.push(PuncturedFace {
                face: 3 * l.node([x, y, z]).unwrap().get() + 2,
                time_index: 3,
                chirality: Chirality::Positive,
                position: [x as f32 + 0.5, y as f32 + 0.5, z as f32],
            });
        }
    }

    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut reference = None;
    for _ in 0..6 {
        faces.shuffle(&mut rng);
        let sink = Arc::new(MemoryLineSink::new());
        let p = pipeline(PipelineConfig::default(), sink.clone());
        p.run(&encode(&[Message::PuncturedFaces {
            header,
            faces: faces.clone(),
        }])[..])
            .unwrap();
        let (_, lines) = sink.get(3).unwrap();
        assert_eq!(lines.len(), 4);
        match &reference {
            None => reference = Some(lines),
            Some(r) => assert_eq!(r, &lines),
        }
    }
}

#[test]
fn concurrent_frames_keep_their_own_results() {
    const N: i32 = 24;
    let sink = Arc::new(SlowSink {
        inner: MemoryLineSink::new(),
    });
    let p = pipeline(
        PipelineConfig {
            workers: 4,
            max_in_flight: 3,
            ..PipelineConfig::default()
        },
        sink.clone(),
    );
    let messages: Vec<Message> = (1..=N).map(|f| faces_msg(f, 1 + f as usize % 2)).collect();
    let summary = p.run(&encode(&messages)[..]).unwrap();

    assert_eq!(summary.extracted, N as usize);
    assert_eq!(summary.failed, 0);
    assert_eq!(sink.inner.frames(), (1..=N).collect::<Vec<_>>());
    for f in 1..=N {
        let (header, lines) = sink.inner.get(f).unwrap();
        assert_eq!(header.frame, f);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].frame, f);
        let x = (1 + f as usize % 2) as f32 + 0.5;
        assert_eq!(lines[0].points[0][0], x, "frame {f}");
    }
    assert_eq!(p.registry().output_ids(), (1..=N).collect::<Vec<_>>());
}

#[test]
fn drop_policy_never_blocks_ingestion() {
    let sink = Arc::new(SlowSink {
        inner: MemoryLineSink::new(),
    });
    let p = pipeline(
        PipelineConfig {
            workers: 1,
            max_in_flight: 1,
            backpressure: Backpressure::Drop,
            ..PipelineConfig::default()
        },
        sink.clone(),
    );
    let messages: Vec<Message> = (1..=8).map(|f| faces_msg(f, 1)).collect();
    let summary = p.run(&encode(&messages)[..]).unwrap();
    assert_eq!(summary.frames, 8);
    assert_eq!(summary.scheduled + summary.dropped, 8);
    assert_eq!(summary.extracted, summary.scheduled);
    assert_eq!(sink.inner.len(), summary.extracted);
}

#[test]
fn truncated_message_stops_ingestion_only() {
    let sink = Arc::new(MemoryLineSink::new());
    let p = pipeline(PipelineConfig::default(), sink.clone());
    let mut bytes = encode(&[faces_msg(1, 1), faces_msg(2, 2)]);
    let tail = encode(&[faces_msg(3, 1)]);
    bytes.extend_from_slice(&tail[..tail.len() - 5]);

    let summary = p.run(&bytes[..]).unwrap();
    let err = summary.stopped_by.unwrap();
    assert!(err.is_truncation(), "{err}");
    assert_eq!(summary.frames, 2);
    assert_eq!(sink.frames(), vec![1, 2]);
    assert!(p.registry().frame(3).is_none());
}

#[test]
fn unknown_tag_is_reported() {
    let p = pipeline(PipelineConfig::default(), Arc::new(NullLineSink));
    let mut bytes = encode(&[faces_msg(1, 1)]);
    bytes.extend_from_slice(&9i32.to_le_bytes());
    let summary = p.run(&bytes[..]).unwrap();
    assert!(matches!(summary.stopped_by, Some(TrackError::UnknownMessage(9))));
    assert_eq!(summary.extracted, 1);
}

#[test]
fn punctured_edge_links_neighbouring_columns() {
    let header = FrameHeader::unit(0, DIMS, [false; 3]);
    let l = header.lattice().unwrap();
    // The y-aligned edge at (2, 1, 1) borders the z-normal faces anchored at
    // (1, 1, 1) and (2, 1, 1).
    let edge = 3 * l.node([2, 1, 1]).unwrap().get() + 1;

    let linked = pipeline(PipelineConfig::default(), Arc::new(NullLineSink));
    let bytes = encode(&[
        Message::PuncturedEdges {
            f0: 1,
            f1: 2,
            edges: vec![edge],
        },
        faces_msg(1, 1),
        faces_msg(2, 2),
    ]);
    let summary = linked.run(&bytes[..]).unwrap();
    assert_eq!(summary.matrices, 1);
    let m = linked.registry().matrix((1, 2)).unwrap();
    assert_eq!(m.events().collect::<Vec<_>>(), vec![VortexEvent::Dummy]);

    let unlinked = pipeline(PipelineConfig::default(), Arc::new(NullLineSink));
    let bytes = encode(&[
        faces_msg(1, 1),
        faces_msg(2, 2),
        Message::PuncturedEdges {
            f0: 1,
            f1: 2,
            edges: Vec::new(),
        },
    ]);
    unlinked.run(&bytes[..]).unwrap();
    let m = unlinked.registry().matrix((1, 2)).unwrap();
    assert_eq!(
        m.events().collect::<Vec<_>>(),
        vec![VortexEvent::Death, VortexEvent::Birth]
    );
}

#[test]
#[serial]
fn vtk_sink_and_matrices_land_in_the_output_directory() {
    let dir = std::env::temp_dir().join(format!("vortex-track-pipeline-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    let sink = Arc::new(VtkLineSink::new(&dir).unwrap());
    let p = pipeline(
        PipelineConfig {
            output_dir: Some(dir.clone()),
            dataname: "demo".into(),
            ..PipelineConfig::default()
        },
        sink.clone(),
    );
    let bytes = encode(&[
        faces_msg(4, 1),
        faces_msg(5, 1),
        Message::PuncturedEdges {
            f0: 4,
            f1: 5,
            edges: Vec::new(),
        },
    ]);
    let summary = p.run(&bytes[..]).unwrap();
    assert_eq!(summary.matrices, 1);

    let file = std::fs::File::open(sink.path_for(5)).unwrap();
    let (frame, lines) = VtkLineReader.read(std::io::BufReader::new(file)).unwrap();
    assert_eq!(frame, 5);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].points.len(), 2);
    assert!(dir.join("demo.match.4.5").is_file());
    std::fs::remove_dir_all(&dir).unwrap();
}
