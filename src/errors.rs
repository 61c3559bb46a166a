//! Error types for the trimming pipeline.

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for trimming operations
pub type Result<T> = std::result::Result<T, TrimError>;

/// Error type for trimming operations
#[derive(Error, Debug)]
pub enum TrimError {
    /// Invalid parameter value or combination provided
    #[error("Invalid parameter '{parameter}': {reason}")]
    InvalidParameter {
        /// The parameter name
        parameter: String,
        /// Explanation of why it's invalid
        reason: String,
    },

    /// An input file could not be opened
    #[error("Could not open input file '{}': {source}", path.display())]
    SourceUnavailable {
        /// Path of the input
        path: PathBuf,
        /// Underlying I/O error
        source: io::Error,
    },

    /// Reading an already opened input failed part way through
    #[error("Could not read input file '{}': {source}", path.display())]
    SourceFailed {
        /// Path of the input
        path: PathBuf,
        /// Underlying I/O or decompression error
        source: io::Error,
    },

    /// An output file could not be created
    #[error("Could not open output file '{}': {source}", path.display())]
    OutputUnavailable {
        /// Path of the output
        path: PathBuf,
        /// Underlying I/O error
        source: io::Error,
    },

    /// A record failed structural validation
    #[error("Invalid FASTQ record #{index} (line {line}): {defect}")]
    InvalidRecord {
        /// 1-based record index within its stream
        index: u64,
        /// 1-based line number of the record's id line
        line: u64,
        /// What is wrong with it
        defect: RecordDefect,
    },

    /// A quality character is outside the configured encoding's range
    #[error(
        "Quality value ({value}) '{character}' at position {position} of record '{record}' \
         does not fall within the {encoding} range {min}-{max}"
    )]
    QualityOutOfRange {
        /// Id line of the offending record
        record: String,
        /// 1-based position within the quality string
        position: usize,
        /// The offending character
        character: char,
        /// Its raw byte value
        value: u8,
        /// Name of the configured encoding
        encoding: &'static str,
        /// Smallest valid byte value
        min: u8,
        /// Largest valid byte value
        max: u8,
    },

    /// The stream ended in the middle of a record
    #[error("Input ended inside a record: {lines} trailing line(s) do not form a complete record")]
    TruncatedRecord {
        /// Number of dangling lines
        lines: usize,
    },

    /// A classification worker panicked
    #[error("Classification worker panicked")]
    WorkerPanicked,

    /// The output writer thread failed or panicked
    #[error("Output writer failed: {0}")]
    WriterFailed(String),

    /// The JSON report could not be serialized
    #[error("Could not write JSON report: {0}")]
    Json(#[from] serde_json::Error),

    /// Any other I/O failure
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Structural problems a record can have.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordDefect {
    /// Id line is empty or only the sentinel
    IdTooShort,
    /// Id line does not begin with '@'
    MissingSentinel(String),
    /// Sequence line is empty
    EmptySequence,
    /// Quality line is empty
    EmptyQuality,
    /// Sequence and quality lines differ in length
    LengthMismatch {
        /// Sequence length
        sequence: usize,
        /// Quality length
        quality: usize,
    },
}

impl fmt::Display for RecordDefect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordDefect::IdTooShort => write!(f, "sequence id is too short"),
            RecordDefect::MissingSentinel(id) => {
                write!(f, "invalid character at the beginning of id '{id}'")
            }
            RecordDefect::EmptySequence => write!(f, "sequence line is empty"),
            RecordDefect::EmptyQuality => write!(f, "quality line is empty"),
            RecordDefect::LengthMismatch { sequence, quality } => write!(
                f,
                "sequence and quality lines have different lengths ({sequence} vs {quality})"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_record_message() {
        let error = TrimError::InvalidRecord {
            index: 3,
            line: 9,
            defect: RecordDefect::LengthMismatch { sequence: 10, quality: 9 },
        };
        let msg = format!("{error}");
        assert!(msg.contains("#3"));
        assert!(msg.contains("line 9"));
        assert!(msg.contains("10 vs 9"));
    }

    #[test]
    fn test_quality_out_of_range_message() {
        let error = TrimError::QualityOutOfRange {
            record: "@read1".to_string(),
            position: 4,
            character: ' ',
            value: 32,
            encoding: "Sanger",
            min: 33,
            max: 126,
        };
        let msg = format!("{error}");
        assert!(msg.contains("@read1"));
        assert!(msg.contains("position 4"));
        assert!(msg.contains("Sanger range 33-126"));
    }

    #[test]
    fn test_source_unavailable_names_path() {
        let error = TrimError::SourceUnavailable {
            path: PathBuf::from("/no/such/reads.fq"),
            source: io::Error::new(io::ErrorKind::NotFound, "not found"),
        };
        assert!(format!("{error}").contains("/no/such/reads.fq"));
    }

    #[test]
    fn test_source_failed_names_path() {
        let error = TrimError::SourceFailed {
            path: PathBuf::from("reads_R2.fq.gz"),
            source: io::Error::new(io::ErrorKind::InvalidData, "corrupt deflate stream"),
        };
        let msg = format!("{error}");
        assert!(msg.contains("reads_R2.fq.gz"));
        assert!(msg.contains("corrupt deflate stream"));
    }

    #[test]
    fn test_missing_sentinel_display() {
        let defect = RecordDefect::MissingSentinel("read1".to_string());
        assert_eq!(format!("{defect}"), "invalid character at the beginning of id 'read1'");
    }
}
