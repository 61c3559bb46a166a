use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use crate::errors::{Result, TrimError};
use crate::filter::TrimStats;
use crate::pipeline::{Layout, PipelineConfig, RunSummary};

/// End-of-run summary in the traditional sickle layout.
pub fn summary_text(layout: &Layout, stats: &TrimStats) -> String {
    let mut out = String::new();
    match layout {
        Layout::Single { input, .. } => {
            let _ = write!(
                out,
                "\nSE input file: {}\n\nTotal FastQ records: {}\nFastQ records kept: {}\nFastQ records discarded: {}\n\n",
                input.display(),
                stats.total_records,
                stats.kept_records,
                stats.discarded_records,
            );
        }
        Layout::SplitPaired { forward, reverse, .. } => {
            let _ = write!(out, "\nPE forward file: {}\nPE reverse file: {}\n", forward.display(), reverse.display());
            paired_counts(&mut out, stats, true);
        }
        Layout::Interleaved { input, .. } => {
            let _ = write!(out, "\nPE interleaved file: {}\n", input.display());
            paired_counts(&mut out, stats, false);
        }
    }
    out
}

fn paired_counts(out: &mut String, stats: &TrimStats, per_side: bool) {
    let _ = writeln!(out, "\nTotal input FastQ records: {} ({} pairs)", stats.total_records, stats.total_records / 2);
    let _ = writeln!(out, "\nFastQ paired records kept: {} ({} pairs)", stats.kept_paired, stats.kept_paired / 2);
    if per_side {
        let _ = writeln!(
            out,
            "FastQ single records kept: {} (from PE1: {}, from PE2: {})",
            stats.kept_singles(),
            stats.kept_single_fwd,
            stats.kept_single_rev
        );
    } else {
        let _ = writeln!(out, "FastQ single records kept: {}", stats.kept_singles());
    }
    let _ = writeln!(
        out,
        "FastQ paired records discarded: {} ({} pairs)",
        stats.discarded_paired,
        stats.discarded_paired / 2
    );
    if per_side {
        let _ = writeln!(
            out,
            "FastQ single records discarded: {} (from PE1: {}, from PE2: {})\n",
            stats.discarded_singles(),
            stats.discarded_single_fwd,
            stats.discarded_single_rev
        );
    } else {
        let _ = writeln!(out, "FastQ single records discarded: {}\n", stats.discarded_singles());
    }
}

#[derive(Serialize)]
struct JsonReport<'a> {
    version: &'static str,
    config: &'a PipelineConfig,
    summary: &'a RunSummary,
}

/// Writes the resolved settings and final counts as pretty-printed JSON.
pub fn write_json_report(path: &Path, config: &PipelineConfig, summary: &RunSummary) -> Result<()> {
    let file = File::create(path)
        .map_err(|source| TrimError::OutputUnavailable { path: path.to_path_buf(), source })?;
    let mut w = BufWriter::new(file);
    let report = JsonReport { version: env!("CARGO_PKG_VERSION"), config, summary };
    serde_json::to_writer_pretty(&mut w, &report)?;
    w.write_all(b"\n")?;
    w.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::TrimParams;
    use tempfile::TempDir;

    #[test]
    fn test_single_end_summary() {
        let layout = Layout::Single { input: "reads.fq".into(), output: "out.fq".into() };
        let mut stats = TrimStats::default();
        stats.record_single(true);
        stats.record_single(false);
        stats.record_single(true);
        assert_eq!(
            summary_text(&layout, &stats),
            "\nSE input file: reads.fq\n\nTotal FastQ records: 3\nFastQ records kept: 2\nFastQ records discarded: 1\n\n"
        );
    }

    #[test]
    fn test_split_paired_summary_lists_sides() {
        let layout = Layout::SplitPaired {
            forward: "r1.fq".into(),
            reverse: "r2.fq".into(),
            output_forward: "o1.fq".into(),
            output_reverse: "o2.fq".into(),
            singles: Some("s.fq".into()),
        };
        let mut stats = TrimStats::default();
        stats.record_pair(true, true);
        stats.record_pair(true, false);
        let text = summary_text(&layout, &stats);
        assert!(text.starts_with("\nPE forward file: r1.fq\nPE reverse file: r2.fq\n"));
        assert!(text.contains("Total input FastQ records: 4 (2 pairs)"));
        assert!(text.contains("FastQ paired records kept: 2 (1 pairs)"));
        assert!(text.contains("FastQ single records kept: 1 (from PE1: 1, from PE2: 0)"));
        assert!(text.contains("FastQ single records discarded: 1 (from PE1: 0, from PE2: 1)"));
    }

    #[test]
    fn test_interleaved_summary_has_no_sides() {
        let layout = Layout::Interleaved { input: "i.fq".into(), output: "o.fq".into(), singles: None };
        let mut stats = TrimStats::default();
        stats.record_pair(false, true);
        let text = summary_text(&layout, &stats);
        assert!(text.contains("FastQ single records kept: 1\n"));
        assert!(!text.contains("from PE1"));
    }

    #[test]
    fn test_json_report_contents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.json");
        let layout = Layout::Single { input: "in.fq".into(), output: "out.fq".into() };
        let config = PipelineConfig::new(TrimParams::default(), layout);
        let mut stats = TrimStats::default();
        stats.record_single(true);
        let summary = RunSummary { stats, desync: None, batches: 1 };

        write_json_report(&path, &config, &summary).unwrap();
        let value: serde_json::Value = serde_json::from_reader(File::open(&path).unwrap()).unwrap();
        assert_eq!(value["summary"]["stats"]["kept_records"], 1);
        assert_eq!(value["config"]["params"]["quality_type"], "sanger");
        assert_eq!(value["config"]["layout"]["mode"], "single");
        assert!(value["summary"]["desync"].is_null());
    }
}
