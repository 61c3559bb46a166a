//! Drives the read, classify, aggregate and write cycle for every input layout.
//!
//! The calling thread reads and parses one batch at a time, classifies it on scoped
//! worker threads and formats the result. Formatted batches go over a bounded channel
//! to a single writer thread, which releases them in serial order, so batch N is written
//! while batch N+1 is being read and classified.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::thread;

use crossbeam::channel::{bounded, Receiver, Sender};
use log::{debug, info, warn};
use serde::Serialize;

use crate::aggregate::{Aggregator, PairPolicy};
use crate::errors::{Result, TrimError};
use crate::fastq::source::DynSource;
use crate::fastq::{Record, RecordBatcher, RecordWriter, LINES_PER_RECORD};
use crate::filter::{Filter, TrimParams, TrimStats};
use crate::threading::{distribute, run_lanes, ProcessedBatch};

/// Default byte budget of one batch.
pub const DEFAULT_BATCH_BYTES: usize = 32 << 20;

/// Where records come from and where they go.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Layout {
    Single {
        input: PathBuf,
        output: PathBuf,
    },
    /// Mates in two files, record N of one paired with record N of the other.
    SplitPaired {
        forward: PathBuf,
        reverse: PathBuf,
        output_forward: PathBuf,
        output_reverse: PathBuf,
        singles: Option<PathBuf>,
    },
    /// Mates alternate within one file, and are written the same way.
    Interleaved {
        input: PathBuf,
        output: PathBuf,
        singles: Option<PathBuf>,
    },
}

impl Layout {
    pub fn is_paired(&self) -> bool {
        !matches!(self, Layout::Single { .. })
    }

    pub fn inputs(&self) -> Vec<&Path> {
        match self {
            Layout::Single { input, .. } | Layout::Interleaved { input, .. } => vec![input.as_path()],
            Layout::SplitPaired { forward, reverse, .. } => vec![forward.as_path(), reverse.as_path()],
        }
    }

    pub fn outputs(&self) -> Vec<&Path> {
        match self {
            Layout::Single { output, .. } => vec![output.as_path()],
            Layout::SplitPaired { output_forward, output_reverse, singles, .. } => {
                let mut out = vec![output_forward.as_path(), output_reverse.as_path()];
                out.extend(singles.as_deref());
                out
            }
            Layout::Interleaved { output, singles, .. } => {
                let mut out = vec![output.as_path()];
                out.extend(singles.as_deref());
                out
            }
        }
    }

    fn singles(&self) -> Option<&Path> {
        match self {
            Layout::Single { .. } => None,
            Layout::SplitPaired { singles, .. } | Layout::Interleaved { singles, .. } => {
                singles.as_deref()
            }
        }
    }
}

/// Everything needed for one run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineConfig {
    pub params: TrimParams,
    pub layout: Layout,
    pub policy: PairPolicy,
    /// Classification threads per batch.
    pub threads: usize,
    pub batch_bytes: usize,
    /// Formatted batches that may wait for the writer.
    pub queue_depth: usize,
    pub gzip_output: bool,
    pub compression_level: u32,
}

impl PipelineConfig {
    pub fn new(params: TrimParams, layout: Layout) -> Self {
        Self {
            params,
            layout,
            policy: PairPolicy::Singles,
            threads: 1,
            batch_bytes: DEFAULT_BATCH_BYTES,
            queue_depth: 4,
            gzip_output: false,
            compression_level: 6,
        }
    }

    /// Checks that the layout and pair policy fit together.
    pub fn validate(&self) -> Result<()> {
        let singles = self.layout.singles();
        match (self.layout.is_paired(), self.policy, singles) {
            (true, PairPolicy::Singles, None) => Err(TrimError::InvalidParameter {
                parameter: "output-single".into(),
                reason: "a singles output is required unless placeholders are written".into(),
            }),
            (true, PairPolicy::Placeholder, Some(_)) => Err(TrimError::InvalidParameter {
                parameter: "output-single".into(),
                reason: "no singles are produced when placeholders are written".into(),
            }),
            _ if self.compression_level > 9 => Err(TrimError::InvalidParameter {
                parameter: "compression".into(),
                reason: format!("level {} is outside 0-9", self.compression_level),
            }),
            _ => Ok(()),
        }
    }

    fn create_output(&self, path: &Path) -> Result<RecordWriter> {
        RecordWriter::create(path, self.gzip_output, self.compression_level)
    }
}

/// Why paired input stopped before both streams ran out together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Desync {
    /// The forward file ran out while the reverse file still had records.
    ForwardShorter,
    /// The reverse file ran out while the forward file still had records.
    ReverseShorter,
    /// An interleaved file ended with an unpaired record.
    OddInterleaved,
}

impl fmt::Display for Desync {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Desync::ForwardShorter => "forward input has fewer records than reverse input",
            Desync::ReverseShorter => "reverse input has fewer records than forward input",
            Desync::OddInterleaved => "interleaved input has an odd number of records",
        };
        f.write_str(msg)
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub stats: TrimStats,
    /// Set when paired input stopped early; everything before the mismatch was written.
    pub desync: Option<Desync>,
    pub batches: u64,
}

/// Trims every record of the configured inputs.
///
/// All inputs and outputs are opened before the first batch is read. On a fatal error
/// every batch committed so far is still written and all outputs are finished before
/// the error is returned.
pub fn run(config: &PipelineConfig) -> Result<RunSummary> {
    config.validate()?;
    let mut inputs = Inputs::open(config)?;
    let outputs = Outputs::create(config)?;

    info!(
        "Trimming {} with {} thread(s), {} quality, threshold {}, minimum length {}",
        config.layout.inputs().iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(" + "),
        config.threads.max(1),
        config.params.quality_type.name(),
        config.params.quality_threshold,
        config.params.length_threshold,
    );

    let writer = OrderedWriter::spawn(outputs, config.queue_depth)?;
    let mut driver = Driver {
        filter: Filter::new(config.params.clone()),
        aggregator: Aggregator::new(
            config.params.quality_type,
            config.policy,
            matches!(config.layout, Layout::Interleaved { .. }),
        ),
        threads: config.threads.max(1),
        serial: 0,
        writer: &writer,
    };

    let outcome = match &mut inputs {
        Inputs::Single(batcher) => driver.single(batcher),
        Inputs::SplitPaired(forward, reverse) => driver.split_paired(forward, reverse),
        Inputs::Interleaved(batcher) => driver.interleaved(batcher),
    };
    let batches = driver.serial;
    let written = writer.close();

    let (desync, stats) = match (outcome, written) {
        (Ok(desync), Ok(stats)) => (desync, stats),
        // A refused send only means the writer stopped; its own error says why.
        (Err(TrimError::WriterFailed(_)), Err(writer_err)) => return Err(writer_err),
        (Err(err), _) | (Ok(_), Err(err)) => return Err(err),
    };

    if let Some(desync) = desync {
        warn!("Paired input out of sync: {desync}; stopped after {} pairs", stats.total_records / 2);
    }
    info!("Processed {} records in {} batch(es)", stats.total_records, batches);
    Ok(RunSummary { stats, desync, batches })
}

type Batcher = RecordBatcher<Box<dyn Read + Send>>;

enum Inputs {
    Single(Batcher),
    SplitPaired(Batcher, Batcher),
    Interleaved(Batcher),
}

impl Inputs {
    fn open(config: &PipelineConfig) -> Result<Self> {
        let batcher = |path: &Path, stride: usize| -> Result<_> {
            Ok(RecordBatcher::new(DynSource::open(path)?, stride, config.batch_bytes))
        };
        Ok(match &config.layout {
            Layout::Single { input, .. } => Inputs::Single(batcher(input, LINES_PER_RECORD)?),
            Layout::SplitPaired { forward, reverse, .. } => Inputs::SplitPaired(
                batcher(forward, LINES_PER_RECORD)?,
                batcher(reverse, LINES_PER_RECORD)?,
            ),
            Layout::Interleaved { input, .. } => {
                Inputs::Interleaved(batcher(input, 2 * LINES_PER_RECORD)?)
            }
        })
    }
}

/// Output handles, owned by the writer thread once the run starts.
struct Outputs {
    primary: RecordWriter,
    mate: Option<RecordWriter>,
    singles: Option<RecordWriter>,
}

impl Outputs {
    fn create(config: &PipelineConfig) -> Result<Self> {
        let singles = match (config.policy, config.layout.singles()) {
            (PairPolicy::Singles, Some(path)) => Some(config.create_output(path)?),
            _ => None,
        };
        Ok(match &config.layout {
            Layout::Single { output, .. } | Layout::Interleaved { output, .. } => {
                Outputs { primary: config.create_output(output)?, mate: None, singles }
            }
            Layout::SplitPaired { output_forward, output_reverse, .. } => Outputs {
                primary: config.create_output(output_forward)?,
                mate: Some(config.create_output(output_reverse)?),
                singles,
            },
        })
    }

    fn write(&mut self, batch: &ProcessedBatch) -> Result<()> {
        write_buffer(&mut self.primary, &batch.primary)?;
        if let Some(mate) = &mut self.mate {
            write_buffer(mate, &batch.mate)?;
        }
        if let Some(singles) = &mut self.singles {
            write_buffer(singles, &batch.singles)?;
        }
        Ok(())
    }

    /// Finishes every writer, reporting the first failure.
    fn finish(self) -> Result<()> {
        let mut first = Ok(());
        for writer in std::iter::once(self.primary).chain(self.mate).chain(self.singles) {
            let path = writer.path().to_path_buf();
            if let Err(err) = writer.finish() {
                if first.is_ok() {
                    first = Err(TrimError::WriterFailed(format!("{}: {err}", path.display())));
                }
            }
        }
        first
    }
}

fn write_buffer(writer: &mut RecordWriter, buf: &[u8]) -> Result<()> {
    if buf.is_empty() {
        return Ok(());
    }
    writer
        .write_all(buf)
        .map_err(|err| TrimError::WriterFailed(format!("{}: {err}", writer.path().display())))
}

// Min-heap entry keyed by serial.
struct OrderedBatch(ProcessedBatch);

impl PartialEq for OrderedBatch {
    fn eq(&self, other: &Self) -> bool {
        self.0.serial == other.0.serial
    }
}
impl Eq for OrderedBatch {}
impl PartialOrd for OrderedBatch {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for OrderedBatch {
    fn cmp(&self, other: &Self) -> Ordering {
        other.0.serial.cmp(&self.0.serial)
    }
}

/// The single thread that owns the outputs and the run-wide statistics.
struct OrderedWriter {
    tx: Sender<ProcessedBatch>,
    handle: thread::JoinHandle<Result<TrimStats>>,
}

impl OrderedWriter {
    fn spawn(outputs: Outputs, queue_depth: usize) -> Result<Self> {
        let (tx, rx) = bounded(queue_depth.max(1));
        let handle = thread::Builder::new()
            .name("writer".into())
            .spawn(move || write_in_order(outputs, rx))?;
        Ok(Self { tx, handle })
    }

    fn send(&self, batch: ProcessedBatch) -> Result<()> {
        self.tx
            .send(batch)
            .map_err(|_| TrimError::WriterFailed("writer thread stopped early".into()))
    }

    /// Closes the channel and waits for everything sent so far to be written.
    fn close(self) -> Result<TrimStats> {
        drop(self.tx);
        self.handle
            .join()
            .map_err(|_| TrimError::WriterFailed("writer thread panicked".into()))?
    }
}

fn write_in_order(mut outputs: Outputs, rx: Receiver<ProcessedBatch>) -> Result<TrimStats> {
    let mut stats = TrimStats::default();
    let mut pending = BinaryHeap::new();
    let mut next_serial = 0u64;
    let mut outcome = Ok(());

    'recv: for batch in rx {
        pending.push(OrderedBatch(batch));
        while pending.peek().is_some_and(|top| top.0.serial == next_serial) {
            let Some(OrderedBatch(batch)) = pending.pop() else { break };
            if let Err(err) = outputs.write(&batch) {
                outcome = Err(err);
                break 'recv;
            }
            stats.merge(&batch.stats);
            next_serial += 1;
        }
    }
    if !pending.is_empty() {
        debug!("Writer dropped {} batch(es) that arrived after a gap", pending.len());
    }

    let finished = outputs.finish();
    outcome.and(finished)?;
    Ok(stats)
}

/// Per-run state of the reading thread.
struct Driver<'w> {
    filter: Filter,
    aggregator: Aggregator,
    threads: usize,
    serial: u64,
    writer: &'w OrderedWriter,
}

impl Driver<'_> {
    fn single(&mut self, batcher: &mut Batcher) -> Result<Option<Desync>> {
        let mut next_index = 1u64;
        while let Some(batch) = batcher.next_batch()? {
            let records = batch.records(next_index)?;
            next_index += records.len() as u64;

            let lanes = distribute(records.iter().map(Record::len), self.threads);
            let filter = &self.filter;
            let cuts = run_lanes(&lanes, |slot| filter.classify(&records[slot]))?;
            let out = self.aggregator.single(self.serial, &records, &cuts);
            self.commit(out)?;
        }
        ensure_complete(batcher)?;
        Ok(None)
    }

    fn interleaved(&mut self, batcher: &mut Batcher) -> Result<Option<Desync>> {
        let mut next_index = 1u64;
        while let Some(batch) = batcher.next_batch()? {
            let records = batch.records(next_index)?;
            next_index += records.len() as u64;

            let (fwd, rev): (Vec<Record<'_>>, Vec<Record<'_>>) =
                records.chunks_exact(2).map(|pair| (pair[0], pair[1])).unzip();
            self.pairs(&fwd, &rev)?;
        }
        match batcher.dangling_lines() {
            0 => Ok(None),
            n if n == LINES_PER_RECORD => Ok(Some(Desync::OddInterleaved)),
            n => Err(TrimError::TruncatedRecord { lines: n }),
        }
    }

    fn split_paired(&mut self, forward: &mut Batcher, reverse: &mut Batcher) -> Result<Option<Desync>> {
        let mut fwd_index = 1u64;
        let mut rev_index = 1u64;
        loop {
            let Some(fwd_batch) = forward.next_batch()? else {
                ensure_complete(forward)?;
                if reverse.next_batch_with_records(1)?.is_some() {
                    return Ok(Some(Desync::ForwardShorter));
                }
                ensure_complete(reverse)?;
                return Ok(None);
            };

            let wanted = fwd_batch.record_count();
            let fwd = fwd_batch.records(fwd_index)?;
            fwd_index += fwd.len() as u64;

            let Some(rev_batch) = reverse.next_batch_with_records(wanted)? else {
                ensure_complete(reverse)?;
                return Ok(Some(Desync::ReverseShorter));
            };
            let rev = rev_batch.records(rev_index)?;
            rev_index += rev.len() as u64;

            self.pairs(&fwd[..rev.len()], &rev)?;
            if rev.len() < wanted {
                ensure_complete(reverse)?;
                return Ok(Some(Desync::ReverseShorter));
            }
        }
    }

    fn pairs(&mut self, fwd: &[Record<'_>], rev: &[Record<'_>]) -> Result<()> {
        let weights = fwd.iter().zip(rev).map(|(f, r)| f.len() + r.len());
        let lanes = distribute(weights, self.threads);
        let filter = &self.filter;
        let cuts = run_lanes(&lanes, |slot| filter.classify_pair(&fwd[slot], &rev[slot]))?;
        let out = self.aggregator.paired(self.serial, fwd, rev, &cuts);
        self.commit(out)
    }

    fn commit(&mut self, out: ProcessedBatch) -> Result<()> {
        debug!(
            "Batch {}: {} records, {} kept",
            out.serial,
            out.stats.total_records,
            out.stats.kept_records + out.stats.kept_paired + out.stats.kept_singles(),
        );
        self.writer.send(out)?;
        self.serial += 1;
        Ok(())
    }
}

fn ensure_complete(batcher: &Batcher) -> Result<()> {
    match batcher.dangling_lines() {
        0 => Ok(()),
        lines => Err(TrimError::TruncatedRecord { lines }),
    }
}
