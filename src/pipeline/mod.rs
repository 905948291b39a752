//! Concurrent ingestion of the detection stream.
//!
//! The [`StreamingPipeline`] reads messages on the caller's thread, strictly
//! in arrival order, and hands each new frame to a bounded [`WorkerPool`].
//! A worker builds the frame's mesh graph, traces its punctured faces and
//! passes the lines to a [`LineSink`]; the graph is dropped when the task
//! ends. Once a frame pair has both a punctured-edge record and both
//! extraction outputs, whichever thread completes that rendezvous builds the
//! pair's [`VortexTransitionMatrix`].
//!
//! All shared state lives in an injected [`FrameRegistry`].

pub mod config;
pub mod pool;
pub mod registry;
pub mod sink;
pub mod track;

pub use config::{Backpressure, PipelineConfig};
pub use pool::WorkerPool;
pub use registry::{FrameOutput, FramePair, FrameRecord, FrameRegistry};
pub use sink::{LineSink, MemoryLineSink, NullLineSink, VtkLineSink};

use std::io::Read;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::algs::extractor::VortexExtractor;
use crate::algs::transition::VortexTransitionMatrix;
use crate::field::{RegularVolume, VolumeField};
use crate::io::stream::{Message, MessageReader};
use crate::topology::builder::{MeshGraphBuilder, RegularGridBuilder};
use crate::track_error::TrackError;

/// Counters of one pipeline's lifetime.
#[derive(Debug, Default)]
pub struct PipelineSummary {
    pub messages: usize,
    pub frames: usize,
    pub edge_records: usize,
    /// PF messages for a frame id that was already stored.
    pub duplicate_frames: usize,
    pub scheduled: usize,
    /// Extractions skipped under [`Backpressure::Drop`].
    pub dropped: usize,
    pub extracted: usize,
    pub failed: usize,
    pub matrices: usize,
    /// The malformed message that ended ingestion, if any.
    pub stopped_by: Option<TrackError>,
}

#[derive(Debug, Default)]
struct Counters {
    messages: AtomicUsize,
    frames: AtomicUsize,
    edge_records: AtomicUsize,
    duplicate_frames: AtomicUsize,
    scheduled: AtomicUsize,
    dropped: AtomicUsize,
    extracted: AtomicUsize,
    failed: AtomicUsize,
    matrices: AtomicUsize,
}

/// State reachable from worker tasks.
struct Shared {
    config: PipelineConfig,
    registry: Arc<FrameRegistry>,
    sink: Arc<dyn LineSink>,
    counters: Counters,
}

pub struct StreamingPipeline {
    shared: Arc<Shared>,
    pool: WorkerPool,
}

impl std::fmt::Debug for StreamingPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingPipeline")
            .field("config", &self.shared.config)
            .field("pool", &self.pool)
            .finish()
    }
}

impl StreamingPipeline {
    pub fn new(
        config: PipelineConfig,
        registry: Arc<FrameRegistry>,
        sink: Arc<dyn LineSink>,
    ) -> Result<Self, TrackError> {
        config.validate()?;
        if let Some(dir) = &config.output_dir {
            std::fs::create_dir_all(dir)?;
        }
        let pool = WorkerPool::new(config.workers, config.max_in_flight, config.backpressure)?;
        log::info!(
            "pipeline: {} workers, {} in flight max, {:?} backpressure",
            pool.threads(),
            config.max_in_flight,
            config.backpressure
        );
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                registry,
                sink,
                counters: Counters::default(),
            }),
            pool,
        })
    }

    pub fn registry(&self) -> &Arc<FrameRegistry> {
        &self.shared.registry
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.shared.config
    }

    /// Consume messages until end of input or the first malformed message,
    /// then wait for all outstanding work.
    ///
    /// Malformed input is reported in [`PipelineSummary::stopped_by`]; only
    /// I/O failures of the reader itself are returned as errors.
    pub fn run<R: Read>(&self, reader: R) -> Result<PipelineSummary, TrackError> {
        let mut messages = MessageReader::new(reader);
        let mut stopped_by = None;
        loop {
            match messages.next_message() {
                Ok(Some(msg)) => self.ingest(msg),
                Ok(None) => break,
                Err(TrackError::Io(e)) => {
                    self.wait_idle();
                    return Err(TrackError::Io(e));
                }
                Err(e) => {
                    log::warn!(
                        "stopping ingestion after {} messages: {e}",
                        messages.messages_read()
                    );
                    stopped_by = Some(e);
                    break;
                }
            }
        }
        self.wait_idle();
        let mut summary = self.summary();
        summary.stopped_by = stopped_by;
        Ok(summary)
    }

    /// Handle one message. Never waits for extraction to finish; under
    /// [`Backpressure::Block`] it may wait for a free worker slot.
    pub fn ingest(&self, msg: Message) {
        let c = &self.shared.counters;
        c.messages.fetch_add(1, Ordering::Relaxed);
        match msg {
            Message::PuncturedFaces { header, faces } => {
                let frame = header.frame;
                let Some(record) = self.shared.registry.insert_frame(header, faces) else {
                    log::warn!("frame {frame} received twice; keeping the first record");
                    c.duplicate_frames.fetch_add(1, Ordering::Relaxed);
                    return;
                };
                c.frames.fetch_add(1, Ordering::Relaxed);
                if !self.shared.registry.claim_extraction(frame) {
                    return;
                }
                let shared = Arc::clone(&self.shared);
                let accepted = self.pool.submit(move || {
                    shared.extract(&record);
                });
                if accepted {
                    c.scheduled.fetch_add(1, Ordering::Relaxed);
                } else {
                    log::warn!("worker pool full; skipping extraction of frame {frame}");
                    c.dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
            Message::PuncturedEdges { f0, f1, edges } => {
                if !self.shared.registry.insert_edges((f0, f1), edges) {
                    log::warn!("punctured edges for ({f0}, {f1}) received twice");
                    return;
                }
                c.edge_records.fetch_add(1, Ordering::Relaxed);
                self.shared.try_track((f0, f1));
            }
        }
    }

    /// Block until all scheduled tasks have finished.
    pub fn wait_idle(&self) {
        self.pool.wait_idle();
    }

    pub fn summary(&self) -> PipelineSummary {
        let c = &self.shared.counters;
        let load = |a: &AtomicUsize| a.load(Ordering::Relaxed);
        PipelineSummary {
            messages: load(&c.messages),
            frames: load(&c.frames),
            edge_records: load(&c.edge_records),
            duplicate_frames: load(&c.duplicate_frames),
            scheduled: load(&c.scheduled),
            dropped: load(&c.dropped),
            extracted: load(&c.extracted),
            failed: load(&c.failed) + self.pool.panicked(),
            matrices: load(&c.matrices),
            stopped_by: None,
        }
    }
}

impl Shared {
    fn extract(&self, record: &FrameRecord) {
        let frame = record.header.frame;
        match self.try_extract(record) {
            Ok(out) => {
                self.counters.extracted.fetch_add(1, Ordering::Relaxed);
                log::info!(
                    "frame {frame}: {} lines from {} punctured faces ({} dropped)",
                    out.lines.len(),
                    record.faces.len(),
                    out.report.dropped
                );
                for pair in self.registry.pairs_touching(frame) {
                    self.try_track(pair);
                }
            }
            Err(e) => {
                log::error!("frame {frame}: extraction failed: {e}");
                self.registry.mark_failed(frame);
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn try_extract(&self, record: &FrameRecord) -> Result<Arc<FrameOutput>, TrackError> {
        let header = record.header;
        let graph = RegularGridBuilder::new(header.dims, header.pbc)?.build()?;
        let field: Arc<dyn VolumeField> = Arc::new(RegularVolume::new(header));
        let mut extractor = VortexExtractor::new();
        extractor.set_dataset(Arc::new(graph), Some(field));
        for pf in &record.faces {
            extractor.push(*pf);
        }
        let (lines, report) = extractor.trace_over_space(header.frame);
        self.sink.write_lines(&header, &lines)?;
        let out = Arc::new(FrameOutput {
            frame: header.frame,
            header,
            lines,
            report,
        });
        self.registry.insert_output(Arc::clone(&out));
        Ok(out)
    }

    /// Build the matrix of `pair` if everything it needs is present and no
    /// other thread has claimed it.
    fn try_track(&self, pair: (i32, i32)) {
        let reg = &self.registry;
        let (Some(edges), Some(a), Some(b)) = (reg.edges(pair), reg.output(pair.0), reg.output(pair.1))
        else {
            return;
        };
        if !reg.claim_tracking(pair) {
            return;
        }
        let matrix = track::build_matrix(&a, &b, &edges);
        self.save_matrix(&matrix);
        log::info!(
            "frames ({}, {}): {} modules [{}]",
            pair.0,
            pair.1,
            matrix.n_modules(),
            matrix.events().map(|e| e.as_str()).collect::<Vec<_>>().join(", ")
        );
        reg.insert_matrix(matrix);
        self.counters.matrices.fetch_add(1, Ordering::Relaxed);
    }

    fn save_matrix(&self, matrix: &VortexTransitionMatrix) {
        let Some(dir) = &self.config.output_dir else {
            return;
        };
        if !matrix.is_valid() {
            log::debug!(
                "not saving matrix ({}, {}): {}x{} is empty",
                matrix.t0(),
                matrix.t1(),
                matrix.n0(),
                matrix.n1()
            );
            return;
        }
        let path = dir.join(matrix.file_name(&self.config.dataname));
        if let Err(e) = matrix.save_to_file(&path) {
            log::error!("cannot save {}: {e}", path.display());
        }
    }
}
