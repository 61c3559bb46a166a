pub mod batch;
pub mod source;

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;

use crate::errors::{RecordDefect, Result, TrimError};
use crate::filter::{CutWindow, QualityType};

pub use self::batch::{Batch, RecordBatcher};
pub use self::source::ChunkSource;

/// Lines per FASTQ record.
pub const LINES_PER_RECORD: usize = 4;

const RECORD_START: u8 = b'@';

/// One FASTQ record, borrowed from the [`Batch`] that holds its bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record<'a> {
    /// Full id line, including the leading '@' and any comment.
    pub id: &'a [u8],
    pub seq: &'a [u8],
    /// The '+' line; read but never interpreted.
    pub separator: &'a [u8],
    pub qual: &'a [u8],
    /// 1-based position of the record within its input stream.
    pub index: u64,
}

impl<'a> Record<'a> {
    /// Builds a record from its four lines and validates its shape.
    pub fn new(lines: [&'a [u8]; LINES_PER_RECORD], index: u64) -> Result<Self> {
        let [id, seq, separator, qual] = lines;
        let record = Self { id, seq, separator, qual, index };
        record.validate()?;
        Ok(record)
    }

    fn validate(&self) -> Result<()> {
        let defect = if self.id.len() <= 1 {
            Some(RecordDefect::IdTooShort)
        } else if self.id[0] != RECORD_START {
            Some(RecordDefect::MissingSentinel(self.id_lossy()))
        } else if self.seq.is_empty() {
            Some(RecordDefect::EmptySequence)
        } else if self.qual.is_empty() {
            Some(RecordDefect::EmptyQuality)
        } else if self.seq.len() != self.qual.len() {
            Some(RecordDefect::LengthMismatch { sequence: self.seq.len(), quality: self.qual.len() })
        } else {
            None
        };
        match defect {
            Some(defect) => {
                Err(TrimError::InvalidRecord { index: self.index, line: self.line_number(), defect })
            }
            None => Ok(()),
        }
    }

    /// Line number of the id line in the input stream.
    pub fn line_number(&self) -> u64 {
        self.index.saturating_sub(1) * LINES_PER_RECORD as u64 + 1
    }

    pub fn id_lossy(&self) -> String {
        String::from_utf8_lossy(self.id).into_owned()
    }

    pub fn len(&self) -> usize {
        self.seq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seq.is_empty()
    }

    /// Appends the retained part of this record to `out`. Discarded windows append nothing.
    pub fn write_trimmed(&self, cut: CutWindow, out: &mut Vec<u8>) {
        if let CutWindow::Retained { start, end } = cut {
            out.reserve(self.id.len() + 2 * (end - start) + 6);
            out.extend_from_slice(self.id);
            out.push(b'\n');
            out.extend_from_slice(&self.seq[start..end]);
            out.extend_from_slice(b"\n+\n");
            out.extend_from_slice(&self.qual[start..end]);
            out.push(b'\n');
        }
    }

    /// Appends a one-base stand-in for this record, used to keep paired output paired.
    pub fn write_placeholder(&self, quality_type: QualityType, out: &mut Vec<u8>) {
        out.extend_from_slice(self.id);
        out.extend_from_slice(b"\nN\n+\n");
        out.push(quality_type.placeholder());
        out.push(b'\n');
    }
}

/// Output destination: a plain file, a gzip file, or stdout.
pub struct RecordWriter {
    path: PathBuf,
    inner: Sink,
}

enum Sink {
    Plain(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
    Stdout(BufWriter<io::Stdout>),
}

impl RecordWriter {
    /// Opens `path` for writing. `-` means stdout; gzip is used when requested or when the
    /// path ends in `.gz`.
    pub fn create(path: &Path, gzip: bool, level: u32) -> Result<Self> {
        let inner = if path.as_os_str() == "-" {
            Sink::Stdout(BufWriter::new(io::stdout()))
        } else {
            let f = File::create(path).map_err(|source| TrimError::OutputUnavailable {
                path: path.to_path_buf(),
                source,
            })?;
            let buffered = BufWriter::with_capacity(1 << 20, f);
            if gzip || path.extension().is_some_and(|ext| ext == "gz") {
                Sink::Gzip(GzEncoder::new(buffered, Compression::new(level)))
            } else {
                Sink::Plain(buffered)
            }
        };
        Ok(Self { path: path.to_path_buf(), inner })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flushes buffered data and, for gzip, writes the trailer.
    pub fn finish(self) -> io::Result<()> {
        match self.inner {
            Sink::Plain(mut w) => w.flush(),
            Sink::Gzip(enc) => enc.finish()?.flush(),
            Sink::Stdout(mut w) => w.flush(),
        }
    }
}

impl Write for RecordWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.inner {
            Sink::Plain(w) => w.write(buf),
            Sink::Gzip(w) => w.write(buf),
            Sink::Stdout(w) => w.write(buf),
        }
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match &mut self.inner {
            Sink::Plain(w) => w.write_all(buf),
            Sink::Gzip(w) => w.write_all(buf),
            Sink::Stdout(w) => w.write_all(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.inner {
            Sink::Plain(w) => w.flush(),
            Sink::Gzip(w) => w.flush(),
            Sink::Stdout(w) => w.flush(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(lines: [&'static str; 4]) -> Result<Record<'static>> {
        Record::new(lines.map(str::as_bytes), 1)
    }

    #[test]
    fn test_valid_record() {
        let rec = record(["@r1 comment", "ACGT", "+", "IIII"]).unwrap();
        assert_eq!(rec.len(), 4);
        assert_eq!(rec.id_lossy(), "@r1 comment");
    }

    #[test]
    fn test_rejects_bare_sentinel() {
        let err = record(["@", "ACGT", "+", "IIII"]).unwrap_err();
        assert!(matches!(err, TrimError::InvalidRecord { defect: RecordDefect::IdTooShort, .. }));
    }

    #[test]
    fn test_rejects_missing_sentinel() {
        let err = record(["r1", "ACGT", "+", "IIII"]).unwrap_err();
        assert!(matches!(
            err,
            TrimError::InvalidRecord { defect: RecordDefect::MissingSentinel(_), .. }
        ));
    }

    #[test]
    fn test_rejects_empty_and_mismatched() {
        assert!(matches!(
            record(["@r1", "", "+", "IIII"]).unwrap_err(),
            TrimError::InvalidRecord { defect: RecordDefect::EmptySequence, .. }
        ));
        assert!(matches!(
            record(["@r1", "ACGT", "+", ""]).unwrap_err(),
            TrimError::InvalidRecord { defect: RecordDefect::EmptyQuality, .. }
        ));
        assert!(matches!(
            record(["@r1", "ACGT", "+", "III"]).unwrap_err(),
            TrimError::InvalidRecord {
                defect: RecordDefect::LengthMismatch { sequence: 4, quality: 3 },
                ..
            }
        ));
    }

    #[test]
    fn test_line_number_follows_index() {
        let lines = ["@r1", "A", "+", "I"].map(str::as_bytes);
        let err = Record::new([lines[1], lines[1], lines[2], lines[3]], 3).unwrap_err();
        match err {
            TrimError::InvalidRecord { index, line, .. } => {
                assert_eq!(index, 3);
                assert_eq!(line, 9);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_write_trimmed_slices_both_lines() {
        let rec = record(["@r1 x", "AACCGGTT", "+r1 x", "!!IIII!!"]).unwrap();
        let mut out = Vec::new();
        rec.write_trimmed(CutWindow::Retained { start: 2, end: 6 }, &mut out);
        assert_eq!(out, b"@r1 x\nCCGG\n+\nIIII\n");

        out.clear();
        rec.write_trimmed(CutWindow::Discarded, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_write_placeholder() {
        let rec = record(["@r2", "ACGT", "+", "IIII"]).unwrap();
        let mut out = Vec::new();
        rec.write_placeholder(QualityType::Sanger, &mut out);
        assert_eq!(out, b"@r2\nN\n+\n!\n");
    }
}
