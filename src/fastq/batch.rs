//! Reassembly of raw byte chunks into batches of whole FASTQ records.
//!
//! A [`RecordBatcher`] pulls fixed-size chunks from a [`ChunkSource`], splits them into
//! lines and hands out [`Batch`]es whose line count is always a multiple of the record
//! stride. Lines that would leave a record (or an interleaved pair) incomplete are carried
//! into the next batch instead, so no record ever straddles two batches.

use std::io::Read;
use std::ops::Range;

use crate::errors::{Result, TrimError};
use crate::fastq::source::ChunkSource;
use crate::fastq::{Record, LINES_PER_RECORD};

/// Default size of a single read from the underlying stream.
pub const DEFAULT_CHUNK_BYTES: usize = 1 << 22;

/// An owned buffer of complete lines, aligned to the record stride.
#[derive(Debug)]
pub struct Batch {
    buffer: Vec<u8>,
    lines: Vec<Range<usize>>,
    stride: usize,
}

impl Batch {
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Number of 4-line records, counting each interleaved mate separately.
    pub fn record_count(&self) -> usize {
        self.lines.len() / LINES_PER_RECORD
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn line(&self, i: usize) -> &[u8] {
        &self.buffer[self.lines[i].clone()]
    }

    /// Parses and validates every record, numbering them from `first_index`.
    pub fn records(&self, first_index: u64) -> Result<Vec<Record<'_>>> {
        (0..self.record_count())
            .map(|r| {
                let base = r * LINES_PER_RECORD;
                Record::new(
                    [self.line(base), self.line(base + 1), self.line(base + 2), self.line(base + 3)],
                    first_index + r as u64,
                )
            })
            .collect()
    }
}

/// How much a single call to the batcher should gather.
#[derive(Debug, Clone, Copy)]
enum Target {
    /// At least this many freshly read bytes.
    Bytes(usize),
    /// Exactly this many records, if the stream has them.
    Records(usize),
}

/// Turns a chunked byte stream into stride-aligned [`Batch`]es.
pub struct RecordBatcher<R> {
    source: ChunkSource<R>,
    stride: usize,
    batch_bytes: usize,
    chunk_bytes: usize,
    /// Bytes after the last newline seen so far.
    partial: Vec<u8>,
    /// Complete lines deferred from the previous call, with spans relative to `carry`.
    carry: Vec<u8>,
    carry_lines: Vec<Range<usize>>,
    /// Lines left over at end-of-stream that never formed a complete group.
    dangling: usize,
}

impl<R: Read> RecordBatcher<R> {
    /// `stride` is 4 for one record per group and 8 for interleaved pairs.
    pub fn new(source: ChunkSource<R>, stride: usize, batch_bytes: usize) -> Self {
        debug_assert!(stride > 0 && stride % LINES_PER_RECORD == 0);
        Self {
            source,
            stride,
            batch_bytes: batch_bytes.max(1),
            chunk_bytes: DEFAULT_CHUNK_BYTES.min(batch_bytes.max(1)),
            partial: Vec::new(),
            carry: Vec::new(),
            carry_lines: Vec::new(),
            dangling: 0,
        }
    }

    pub fn with_chunk_bytes(mut self, chunk_bytes: usize) -> Self {
        self.chunk_bytes = chunk_bytes.max(1);
        self
    }

    /// Next batch of roughly `batch_bytes`, or `None` once the stream is used up.
    pub fn next_batch(&mut self) -> Result<Option<Batch>> {
        self.fill(Target::Bytes(self.batch_bytes))
    }

    /// Next batch holding exactly `records` records, or fewer if the stream ends first.
    ///
    /// Used to keep a second paired stream in step with the first one.
    pub fn next_batch_with_records(&mut self, records: usize) -> Result<Option<Batch>> {
        if records == 0 {
            return Ok(None);
        }
        self.fill(Target::Records(records))
    }

    /// Lines at the end of the stream that did not make up a whole group.
    pub fn dangling_lines(&self) -> usize {
        self.dangling
    }

    fn fill(&mut self, target: Target) -> Result<Option<Batch>> {
        let mut buffer = std::mem::take(&mut self.carry);
        let mut lines = std::mem::take(&mut self.carry_lines);
        let mut line_start = buffer.len();
        buffer.append(&mut self.partial);
        let mut scan_from = buffer.len();
        let mut fresh = 0usize;

        loop {
            let satisfied = match target {
                Target::Bytes(budget) => fresh >= budget && lines.len() >= self.stride,
                Target::Records(n) => lines.len() >= n * LINES_PER_RECORD,
            };
            if satisfied || self.source.reached_end() {
                break;
            }
            fresh += self
                .source
                .read_chunk(self.chunk_bytes, &mut buffer)
                .map_err(|source| TrimError::SourceFailed { path: self.source.path().to_path_buf(), source })?;
            for nl in memchr::memchr_iter(b'\n', &buffer[scan_from..]) {
                let end = scan_from + nl;
                lines.push(line_span(&buffer, line_start, end));
                line_start = end + 1;
            }
            scan_from = buffer.len();
        }

        let at_end = self.source.reached_end();
        if at_end {
            if line_start < buffer.len() {
                lines.push(line_span(&buffer, line_start, buffer.len()));
            }
            while lines.last().is_some_and(|span| span.is_empty()) {
                lines.pop();
            }
        } else {
            self.partial.extend_from_slice(&buffer[line_start..]);
            buffer.truncate(line_start);
        }

        let total = lines.len();
        let dangling = if at_end { total % self.stride } else { 0 };
        let aligned = total - total % self.stride;
        let keep = match target {
            Target::Bytes(_) => aligned,
            Target::Records(n) => {
                let wanted = (n * LINES_PER_RECORD).min(aligned);
                wanted - wanted % self.stride
            }
        };
        let carry_end = total - dangling;
        if carry_end > keep {
            let base = lines[keep].start;
            let byte_end = if carry_end < total { lines[carry_end].start } else { buffer.len() };
            self.carry = buffer[base..byte_end].to_vec();
            self.carry_lines =
                lines[keep..carry_end].iter().map(|s| s.start - base..s.end - base).collect();
        }
        if keep < total {
            buffer.truncate(lines[keep].start);
            lines.truncate(keep);
        }
        self.dangling += dangling;

        if lines.is_empty() {
            return Ok(None);
        }
        debug_assert_eq!(lines.len() % self.stride, 0);
        Ok(Some(Batch { buffer, lines, stride: self.stride }))
    }
}

/// Span of the line in `buffer[start..end]`, without a trailing carriage return.
fn line_span(buffer: &[u8], start: usize, end: usize) -> Range<usize> {
    if end > start && buffer[end - 1] == b'\r' {
        start..end - 1
    } else {
        start..end
    }
}
