use std::ops::Range;

use crate::errors::{Result, TrimError};
use crate::fastq::Record;
use crate::filter::{QualityType, TrimParams};

/// Part of a read to keep, as a half-open range over its bases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CutWindow {
    Retained { start: usize, end: usize },
    Discarded,
}

impl CutWindow {
    pub fn is_kept(&self) -> bool {
        matches!(self, CutWindow::Retained { .. })
    }

    pub fn range(&self) -> Option<Range<usize>> {
        match *self {
            CutWindow::Retained { start, end } => Some(start..end),
            CutWindow::Discarded => None,
        }
    }
}

/// Decoded quality scores of one record, checked position by position.
struct Scores<'r, 'a> {
    rec: &'r Record<'a>,
    quality_type: QualityType,
}

impl Scores<'_, '_> {
    #[inline]
    fn at(&self, pos: usize) -> Result<i32> {
        let byte = self.rec.qual[pos];
        self.quality_type.decode(byte).ok_or_else(|| TrimError::QualityOutOfRange {
            record: self.rec.id_lossy(),
            position: pos + 1,
            character: char::from(byte),
            value: byte,
            encoding: self.quality_type.name(),
            min: self.quality_type.min(),
            max: self.quality_type.max(),
        })
    }

    fn first_where(&self, window: Range<usize>, pred: impl Fn(i32) -> bool) -> Result<Option<usize>> {
        for pos in window {
            if pred(self.at(pos)?) {
                return Ok(Some(pos));
            }
        }
        Ok(None)
    }
}

pub struct SlidingWindow;

impl SlidingWindow {
    /// Finds the high-quality core of a read.
    ///
    /// A window of a tenth of the read (the whole read when that rounds to zero) slides
    /// from the 5' end. The 5' cut is the first base reaching `quality_threshold` inside
    /// the first window whose mean reaches it; the 3' cut is the first base below the
    /// threshold inside the first later window whose mean drops below it. Reads whose
    /// retained part is shorter than `length_threshold` are discarded.
    pub fn classify(rec: &Record<'_>, params: &TrimParams) -> Result<CutWindow> {
        let len = rec.seq.len();
        if len < params.length_threshold || len == 0 {
            return Ok(CutWindow::Discarded);
        }

        let scores = Scores { rec, quality_type: params.quality_type };
        let threshold = params.quality_threshold;
        let window = match len / 10 {
            0 => len,
            w => w,
        };
        // mean >= threshold  <=>  sum >= threshold * window
        let passing_total = i64::from(threshold) * window as i64;

        let mut window_total: i64 = 0;
        for pos in 0..window {
            window_total += i64::from(scores.at(pos)?);
        }

        let mut found_five_prime = params.skip_five_prime;
        let mut five_prime = 0;
        let mut three_prime = len;

        for start in 0..=len - window {
            let span = start..start + window;
            let passes = window_total >= passing_total;

            if !found_five_prime && passes {
                five_prime = scores.first_where(span.clone(), |q| q >= threshold)?.unwrap_or(start);
                found_five_prime = true;
            }

            if found_five_prime && !passes {
                three_prime = scores.first_where(span, |q| q < threshold)?.unwrap_or(start);
                break;
            }

            window_total -= i64::from(scores.at(start)?);
            if start + window < len {
                window_total += i64::from(scores.at(start + window)?);
            }
        }

        if params.truncate_at_n {
            if let Some(n) = rec.seq.iter().position(|&b| b == b'N' || b == b'n') {
                three_prime = three_prime.min(n);
            }
        }

        if !found_five_prime
            || three_prime <= five_prime
            || three_prime - five_prime < params.length_threshold
        {
            return Ok(CutWindow::Discarded);
        }
        Ok(CutWindow::Retained { start: five_prime, end: three_prime })
    }
}
