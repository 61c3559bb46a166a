//! Routing of classified records to output buffers.

use serde::Serialize;

use crate::fastq::Record;
use crate::filter::{CutWindow, QualityType};
use crate::threading::ProcessedBatch;

/// What to do with a pair when only one mate survives trimming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PairPolicy {
    /// Write the surviving mate to the singles output.
    Singles,
    /// Keep the output fully paired by writing a one-base `N` record for every
    /// discarded mate, including pairs where both mates were discarded.
    Placeholder,
}

/// Builds the output of one batch from its records and their cut windows.
#[derive(Debug, Clone)]
pub struct Aggregator {
    quality_type: QualityType,
    policy: PairPolicy,
    /// Both mates go to the primary buffer, forward first.
    interleaved: bool,
}

impl Aggregator {
    pub fn new(quality_type: QualityType, policy: PairPolicy, interleaved: bool) -> Self {
        Self { quality_type, policy, interleaved }
    }

    pub fn single(&self, serial: u64, records: &[Record<'_>], cuts: &[CutWindow]) -> ProcessedBatch {
        debug_assert_eq!(records.len(), cuts.len());
        let mut out = ProcessedBatch { serial, ..ProcessedBatch::default() };
        for (rec, &cut) in records.iter().zip(cuts) {
            out.stats.record_single(cut.is_kept());
            rec.write_trimmed(cut, &mut out.primary);
        }
        out
    }

    pub fn paired(
        &self,
        serial: u64,
        fwd: &[Record<'_>],
        rev: &[Record<'_>],
        cuts: &[(CutWindow, CutWindow)],
    ) -> ProcessedBatch {
        debug_assert!(fwd.len() == rev.len() && rev.len() == cuts.len());
        let mut out = ProcessedBatch { serial, ..ProcessedBatch::default() };
        for ((f, r), &(fcut, rcut)) in fwd.iter().zip(rev).zip(cuts) {
            out.stats.record_pair(fcut.is_kept(), rcut.is_kept());
            match (fcut.is_kept(), rcut.is_kept(), self.policy) {
                (true, true, _) => {
                    f.write_trimmed(fcut, &mut out.primary);
                    r.write_trimmed(rcut, self.mate_buffer(&mut out));
                }
                (true, false, PairPolicy::Singles) => f.write_trimmed(fcut, &mut out.singles),
                (false, true, PairPolicy::Singles) => r.write_trimmed(rcut, &mut out.singles),
                (false, false, PairPolicy::Singles) => {}
                (_, _, PairPolicy::Placeholder) => {
                    self.write_or_placeholder(f, fcut, &mut out.primary);
                    self.write_or_placeholder(r, rcut, self.mate_buffer(&mut out));
                }
            }
        }
        out
    }

    fn mate_buffer<'b>(&self, out: &'b mut ProcessedBatch) -> &'b mut Vec<u8> {
        if self.interleaved {
            &mut out.primary
        } else {
            &mut out.mate
        }
    }

    fn write_or_placeholder(&self, rec: &Record<'_>, cut: CutWindow, buf: &mut Vec<u8>) {
        if cut.is_kept() {
            rec.write_trimmed(cut, buf);
        } else {
            rec.write_placeholder(self.quality_type, buf);
        }
    }
}
