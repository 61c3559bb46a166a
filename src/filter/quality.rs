use clap::ValueEnum;
use serde::Serialize;

/// Quality score encodings understood by the trimmer.
///
/// Each encoding is a fixed `(offset, min, max)` triple over raw bytes. Solexa
/// scores are treated as linear, which is only an approximation for low qualities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityType {
    Phred,
    /// CASAVA >= 1.8
    Sanger,
    /// CASAVA < 1.3
    Solexa,
    /// CASAVA 1.3 to 1.7
    Illumina,
}

impl QualityType {
    pub const fn offset(self) -> u8 {
        match self {
            QualityType::Phred => 0,
            QualityType::Sanger => 33,
            QualityType::Solexa | QualityType::Illumina => 64,
        }
    }

    pub const fn min(self) -> u8 {
        match self {
            QualityType::Phred => 4,
            QualityType::Sanger => 33,
            QualityType::Solexa => 58,
            QualityType::Illumina => 64,
        }
    }

    pub const fn max(self) -> u8 {
        match self {
            QualityType::Phred => 60,
            QualityType::Sanger => 126,
            QualityType::Solexa => 112,
            QualityType::Illumina => 110,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            QualityType::Phred => "Phred",
            QualityType::Sanger => "Sanger",
            QualityType::Solexa => "Solexa",
            QualityType::Illumina => "Illumina",
        }
    }

    /// Numeric score for a raw quality byte, or `None` when the byte is outside the range.
    #[inline]
    pub fn decode(self, byte: u8) -> Option<i32> {
        if byte < self.min() || byte > self.max() {
            None
        } else {
            Some(i32::from(byte) - i32::from(self.offset()))
        }
    }

    /// Quality byte written for placeholder records.
    pub const fn placeholder(self) -> u8 {
        self.min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanger_decode() {
        assert_eq!(QualityType::Sanger.decode(b'!'), Some(0));
        assert_eq!(QualityType::Sanger.decode(b'I'), Some(40));
        assert_eq!(QualityType::Sanger.decode(b' '), None);
    }

    #[test]
    fn test_illumina_and_solexa_ranges() {
        assert_eq!(QualityType::Illumina.decode(b'@'), Some(0));
        assert_eq!(QualityType::Illumina.decode(b'h'), Some(40));
        assert_eq!(QualityType::Illumina.decode(b'?'), None);
        assert_eq!(QualityType::Solexa.decode(b';'), Some(-5));
        assert_eq!(QualityType::Solexa.decode(b'q'), None);
    }

    #[test]
    fn test_placeholder_is_minimum() {
        assert_eq!(QualityType::Sanger.placeholder(), b'!');
        assert_eq!(QualityType::Illumina.placeholder(), b'@');
    }
}
