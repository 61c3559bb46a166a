mod quality;
mod sliding_window;

use serde::Serialize;

use crate::errors::Result;
use crate::fastq::Record;

pub use self::quality::QualityType;
pub use self::sliding_window::{CutWindow, SlidingWindow};

/// Thresholds and switches for quality trimming.
#[derive(Debug, Clone, Serialize)]
pub struct TrimParams {
    pub quality_type: QualityType,
    /// Minimum mean quality of a window, and minimum quality of a boundary base.
    pub quality_threshold: i32,
    /// Reads shorter than this, before or after trimming, are discarded.
    pub length_threshold: usize,
    /// Never trim the 5' end.
    pub skip_five_prime: bool,
    /// End the retained part before the first `N`.
    pub truncate_at_n: bool,
}

impl Default for TrimParams {
    fn default() -> Self {
        Self {
            quality_type: QualityType::Sanger,
            quality_threshold: 20,
            length_threshold: 20,
            skip_five_prime: false,
            truncate_at_n: false,
        }
    }
}

/// Running counts of what happened to each record.
///
/// Paired counts are in records, two per pair. Only the output writer updates the
/// run-wide instance; everything else builds per-batch deltas and hands them over.
#[derive(Debug, Default, Serialize, Clone, PartialEq, Eq)]
pub struct TrimStats {
    pub total_records: u64,
    pub kept_records: u64,
    pub discarded_records: u64,
    pub kept_paired: u64,
    pub discarded_paired: u64,
    pub kept_single_fwd: u64,
    pub kept_single_rev: u64,
    pub discarded_single_fwd: u64,
    pub discarded_single_rev: u64,
}

impl TrimStats {
    pub fn record_single(&mut self, kept: bool) {
        self.total_records += 1;
        if kept {
            self.kept_records += 1;
        } else {
            self.discarded_records += 1;
        }
    }

    pub fn record_pair(&mut self, fwd_kept: bool, rev_kept: bool) {
        self.total_records += 2;
        match (fwd_kept, rev_kept) {
            (true, true) => self.kept_paired += 2,
            (true, false) => {
                self.kept_single_fwd += 1;
                self.discarded_single_rev += 1;
            }
            (false, true) => {
                self.kept_single_rev += 1;
                self.discarded_single_fwd += 1;
            }
            (false, false) => self.discarded_paired += 2,
        }
    }

    pub fn merge(&mut self, other: &TrimStats) {
        self.total_records += other.total_records;
        self.kept_records += other.kept_records;
        self.discarded_records += other.discarded_records;
        self.kept_paired += other.kept_paired;
        self.discarded_paired += other.discarded_paired;
        self.kept_single_fwd += other.kept_single_fwd;
        self.kept_single_rev += other.kept_single_rev;
        self.discarded_single_fwd += other.discarded_single_fwd;
        self.discarded_single_rev += other.discarded_single_rev;
    }

    pub fn kept_singles(&self) -> u64 {
        self.kept_single_fwd + self.kept_single_rev
    }

    pub fn discarded_singles(&self) -> u64 {
        self.discarded_single_fwd + self.discarded_single_rev
    }
}

/// Applies the configured trimming to records; shared read-only by all workers.
pub struct Filter {
    params: TrimParams,
}

impl Filter {
    pub fn new(params: TrimParams) -> Self {
        Self { params }
    }

    pub fn classify(&self, rec: &Record<'_>) -> Result<CutWindow> {
        SlidingWindow::classify(rec, &self.params)
    }

    pub fn classify_pair(&self, fwd: &Record<'_>, rev: &Record<'_>) -> Result<(CutWindow, CutWindow)> {
        Ok((self.classify(fwd)?, self.classify(rev)?))
    }
}
