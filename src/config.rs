use std::path::{Path, PathBuf};

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::aggregate::PairPolicy;
use crate::errors::{Result, TrimError};
use crate::filter::{QualityType, TrimParams};
use crate::pipeline::{Layout, PipelineConfig};

#[derive(Parser, Debug, Clone)]
#[command(name = "sickle", version, about = "Windowed adaptive quality trimming of FASTQ reads")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Trim single-end reads
    Se(SingleArgs),
    /// Trim paired-end reads, from two files or one interleaved file
    Pe(PairedArgs),
}

#[derive(Args, Debug, Clone)]
pub struct SingleArgs {
    #[arg(short = 'f', long = "fastq-file")]
    pub fastq_file: PathBuf,
    #[arg(short = 'o', long = "output-file")]
    pub output_file: PathBuf,
    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Args, Debug, Clone)]
pub struct PairedArgs {
    #[arg(short = 'f', long = "pe-file1")]
    pub pe_file1: Option<PathBuf>,
    #[arg(short = 'r', long = "pe-file2")]
    pub pe_file2: Option<PathBuf>,
    /// Interleaved input
    #[arg(short = 'c', long = "pe-combo")]
    pub pe_combo: Option<PathBuf>,
    #[arg(short = 'o', long = "output-pe1")]
    pub output_pe1: Option<PathBuf>,
    #[arg(short = 'p', long = "output-pe2")]
    pub output_pe2: Option<PathBuf>,
    #[arg(short = 's', long = "output-single")]
    pub output_single: Option<PathBuf>,
    /// Interleaved output of kept pairs; singles go to -s
    #[arg(short = 'm', long = "output-combo")]
    pub output_combo: Option<PathBuf>,
    /// Interleaved output of every pair, discarded mates written as placeholders
    #[arg(short = 'M', long = "output-combo-all")]
    pub output_combo_all: Option<PathBuf>,
    /// Write placeholders instead of a singles file for split output
    #[arg(long = "placeholders", action = ArgAction::SetTrue)]
    pub placeholders: bool,
    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    #[arg(short = 't', long = "qual-type", value_enum)]
    pub qual_type: QualityType,
    #[arg(short = 'q', long = "qual-threshold", default_value_t = 20, allow_negative_numbers = true)]
    pub qual_threshold: i32,
    #[arg(short = 'l', long = "length-threshold", default_value_t = 20)]
    pub length_threshold: usize,
    /// Do not trim the 5' end
    #[arg(short = 'x', long = "no-fiveprime", action = ArgAction::SetTrue)]
    pub no_fiveprime: bool,
    /// Truncate reads at the first N
    #[arg(short = 'n', long = "trunc-n", visible_aliases = ["truncate-n", "discard-n"], action = ArgAction::SetTrue)]
    pub trunc_n: bool,
    #[arg(short = 'g', long = "gzip-output", action = ArgAction::SetTrue)]
    pub gzip_output: bool,
    #[arg(long = "compression", default_value_t = 6)]
    pub compression: u32,
    /// Do not print the trimming summary
    #[arg(long = "quiet", action = ArgAction::SetTrue)]
    pub quiet: bool,
    /// Worker threads; 0 uses every available core
    #[arg(short = 'a', long = "threads", default_value_t = 0)]
    pub threads: usize,
    /// Batch size in MiB
    #[arg(short = 'b', long = "batch-mb", default_value_t = 32)]
    pub batch_mb: usize,
    #[arg(long = "queue-depth", default_value_t = 4)]
    pub queue_depth: usize,
    /// Write statistics and settings as JSON
    #[arg(short = 'j', long = "json")]
    pub json: Option<PathBuf>,
}

/// A validated run request.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub pipeline: PipelineConfig,
    pub quiet: bool,
    pub json: Option<PathBuf>,
}

fn invalid(parameter: &str, reason: impl Into<String>) -> TrimError {
    TrimError::InvalidParameter { parameter: parameter.to_string(), reason: reason.into() }
}

impl Command {
    /// Checks option combinations and resolves defaults.
    pub fn into_options(self) -> Result<RunOptions> {
        let (layout, policy, common) = match self {
            Command::Se(args) => (
                Layout::Single { input: args.fastq_file, output: args.output_file },
                PairPolicy::Singles,
                args.common,
            ),
            Command::Pe(args) => {
                let (layout, policy) = args.layout()?;
                (layout, policy, args.common)
            }
        };
        check_distinct(&layout)?;

        if common.qual_threshold < 0 {
            return Err(invalid("qual-threshold", "must be >= 0"));
        }
        if common.batch_mb == 0 {
            return Err(invalid("batch-mb", "must be at least 1"));
        }
        if common.queue_depth == 0 {
            return Err(invalid("queue-depth", "must be at least 1"));
        }

        let params = TrimParams {
            quality_type: common.qual_type,
            quality_threshold: common.qual_threshold,
            length_threshold: common.length_threshold,
            skip_five_prime: common.no_fiveprime,
            truncate_at_n: common.trunc_n,
        };
        let pipeline = PipelineConfig {
            policy,
            threads: if common.threads == 0 { num_cpus::get() } else { common.threads },
            batch_bytes: common.batch_mb << 20,
            queue_depth: common.queue_depth,
            gzip_output: common.gzip_output,
            compression_level: common.compression,
            ..PipelineConfig::new(params, layout)
        };
        pipeline.validate()?;
        Ok(RunOptions { pipeline, quiet: common.quiet, json: common.json })
    }
}

impl PairedArgs {
    fn layout(&self) -> Result<(Layout, PairPolicy)> {
        if let Some(input) = &self.pe_combo {
            if self.pe_file1.is_some() || self.pe_file2.is_some() {
                return Err(invalid("pe-combo", "cannot be combined with -f or -r"));
            }
            if self.output_pe1.is_some() || self.output_pe2.is_some() {
                return Err(invalid("pe-combo", "interleaved input is written with -m or -M, not -o/-p"));
            }
            if self.placeholders {
                return Err(invalid("placeholders", "use -M for interleaved output with placeholders"));
            }
            return match (&self.output_combo, &self.output_combo_all) {
                (Some(_), Some(_)) => Err(invalid("output-combo", "-m and -M are mutually exclusive")),
                (None, None) => Err(invalid("output-combo", "-c requires -m or -M")),
                (Some(output), None) => {
                    let singles = self
                        .output_single
                        .clone()
                        .ok_or_else(|| invalid("output-single", "-m requires -s"))?;
                    let layout = Layout::Interleaved {
                        input: input.clone(),
                        output: output.clone(),
                        singles: Some(singles),
                    };
                    Ok((layout, PairPolicy::Singles))
                }
                (None, Some(output)) => {
                    if self.output_single.is_some() {
                        return Err(invalid("output-single", "-M writes no singles file"));
                    }
                    let layout = Layout::Interleaved { input: input.clone(), output: output.clone(), singles: None };
                    Ok((layout, PairPolicy::Placeholder))
                }
            };
        }

        if self.output_combo.is_some() || self.output_combo_all.is_some() {
            return Err(invalid("output-combo", "-m and -M require interleaved input (-c)"));
        }
        let (Some(forward), Some(reverse)) = (&self.pe_file1, &self.pe_file2) else {
            return Err(invalid("pe-file1", "give -f and -r, or -c"));
        };
        let output_forward = self.output_pe1.clone().ok_or_else(|| invalid("output-pe1", "-f requires -o"))?;
        let output_reverse = self.output_pe2.clone().ok_or_else(|| invalid("output-pe2", "-f requires -p"))?;
        let policy = match (self.placeholders, &self.output_single) {
            (false, None) => return Err(invalid("output-single", "-f requires -s")),
            (true, Some(_)) => {
                return Err(invalid("output-single", "--placeholders writes no singles file"))
            }
            (false, Some(_)) => PairPolicy::Singles,
            (true, None) => PairPolicy::Placeholder,
        };
        let layout = Layout::SplitPaired {
            forward: forward.clone(),
            reverse: reverse.clone(),
            output_forward,
            output_reverse,
            singles: self.output_single.clone(),
        };
        Ok((layout, policy))
    }
}

fn is_stdio(path: &Path) -> bool {
    path.as_os_str() == "-"
}

/// Rejects any file used twice; `-` may appear once as input and once as output, and
/// never for both mates.
fn check_distinct(layout: &Layout) -> Result<()> {
    let inputs = layout.inputs();
    let outputs = layout.outputs();
    for (i, a) in outputs.iter().enumerate() {
        for b in &outputs[i + 1..] {
            if a == b {
                return Err(invalid("output", format!("'{}' is used for more than one output", a.display())));
            }
        }
        if !is_stdio(a) && inputs.contains(a) {
            return Err(invalid("output", format!("'{}' is both an input and an output", a.display())));
        }
    }
    if let [a, b] = inputs.as_slice() {
        if a == b {
            return Err(invalid("pe-file2", format!("'{}' is given as both mates", a.display())));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(args: &[&str]) -> Result<RunOptions> {
        let cli = Cli::try_parse_from(std::iter::once("sickle").chain(args.iter().copied())).unwrap();
        cli.command.into_options()
    }

    fn parameter(err: TrimError) -> String {
        match err {
            TrimError::InvalidParameter { parameter, .. } => parameter,
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_single_end_defaults() {
        let opts = options(&["se", "-f", "in.fq", "-o", "out.fq", "-t", "sanger", "-a", "3"]).unwrap();
        let p = &opts.pipeline;
        assert_eq!(p.params.quality_threshold, 20);
        assert_eq!(p.params.length_threshold, 20);
        assert_eq!(p.params.quality_type, QualityType::Sanger);
        assert_eq!(p.threads, 3);
        assert_eq!(p.batch_bytes, 32 << 20);
        assert!(!opts.quiet);
        assert!(matches!(p.layout, Layout::Single { .. }));
    }

    #[test]
    fn test_quality_type_is_required() {
        let cli = Cli::try_parse_from(["sickle", "se", "-f", "in.fq", "-o", "out.fq"]);
        assert!(cli.is_err());
    }

    #[test]
    fn test_flags_map_to_params() {
        let opts = options(&[
            "se", "-f", "in.fq", "-o", "out.fq", "-t", "illumina", "-q", "30", "-l", "50", "-x", "-n",
            "--quiet", "-g",
        ])
        .unwrap();
        let p = &opts.pipeline;
        assert_eq!(p.params.quality_type, QualityType::Illumina);
        assert_eq!(p.params.quality_threshold, 30);
        assert_eq!(p.params.length_threshold, 50);
        assert!(p.params.skip_five_prime);
        assert!(p.params.truncate_at_n);
        assert!(p.gzip_output);
        assert!(opts.quiet);
    }

    #[test]
    fn test_negative_quality_threshold_rejected() {
        let err = options(&["se", "-f", "in.fq", "-o", "out.fq", "-t", "sanger", "-q", "-1"]).unwrap_err();
        assert_eq!(parameter(err), "qual-threshold");
    }

    #[test]
    fn test_split_paired_requires_every_path() {
        let err = options(&["pe", "-t", "sanger", "-f", "a.fq", "-r", "b.fq", "-o", "oa.fq", "-p", "ob.fq"])
            .unwrap_err();
        assert_eq!(parameter(err), "output-single");

        let opts = options(&[
            "pe", "-t", "sanger", "-f", "a.fq", "-r", "b.fq", "-o", "oa.fq", "-p", "ob.fq", "-s", "s.fq",
        ])
        .unwrap();
        assert_eq!(opts.pipeline.policy, PairPolicy::Singles);
        assert!(matches!(opts.pipeline.layout, Layout::SplitPaired { singles: Some(_), .. }));
    }

    #[test]
    fn test_split_paired_placeholders() {
        let opts = options(&[
            "pe", "-t", "sanger", "-f", "a.fq", "-r", "b.fq", "-o", "oa.fq", "-p", "ob.fq", "--placeholders",
        ])
        .unwrap();
        assert_eq!(opts.pipeline.policy, PairPolicy::Placeholder);
    }

    #[test]
    fn test_interleaved_combinations() {
        let err = options(&["pe", "-t", "sanger", "-c", "i.fq", "-m", "o.fq"]).unwrap_err();
        assert_eq!(parameter(err), "output-single");

        let err = options(&["pe", "-t", "sanger", "-c", "i.fq", "-M", "o.fq", "-s", "s.fq"]).unwrap_err();
        assert_eq!(parameter(err), "output-single");

        let err = options(&["pe", "-t", "sanger", "-c", "i.fq", "-m", "o.fq", "-M", "p.fq", "-s", "s.fq"])
            .unwrap_err();
        assert_eq!(parameter(err), "output-combo");

        let err = options(&["pe", "-t", "sanger", "-c", "i.fq"]).unwrap_err();
        assert_eq!(parameter(err), "output-combo");

        let opts = options(&["pe", "-t", "sanger", "-c", "i.fq", "-M", "o.fq"]).unwrap();
        assert_eq!(opts.pipeline.policy, PairPolicy::Placeholder);
        assert!(matches!(opts.pipeline.layout, Layout::Interleaved { singles: None, .. }));
    }

    #[test]
    fn test_combo_output_needs_combo_input() {
        let err = options(&[
            "pe", "-t", "sanger", "-f", "a.fq", "-r", "b.fq", "-o", "oa.fq", "-p", "ob.fq", "-m", "m.fq",
        ])
        .unwrap_err();
        assert_eq!(parameter(err), "output-combo");
    }

    #[test]
    fn test_duplicate_paths_rejected() {
        let err = options(&["se", "-t", "sanger", "-f", "x.fq", "-o", "x.fq"]).unwrap_err();
        assert_eq!(parameter(err), "output");

        let err = options(&[
            "pe", "-t", "sanger", "-f", "a.fq", "-r", "b.fq", "-o", "o.fq", "-p", "o.fq", "-s", "s.fq",
        ])
        .unwrap_err();
        assert_eq!(parameter(err), "output");

        let err = options(&[
            "pe", "-t", "sanger", "-f", "a.fq", "-r", "a.fq", "-o", "oa.fq", "-p", "ob.fq", "-s", "s.fq",
        ])
        .unwrap_err();
        assert_eq!(parameter(err), "pe-file2");

        let err = options(&[
            "pe", "-t", "sanger", "-f", "-", "-r", "-", "-o", "o1.fq", "-p", "o2.fq", "-s", "s.fq",
        ])
        .unwrap_err();
        assert_eq!(parameter(err), "pe-file2");
    }

    #[test]
    fn test_stdin_for_one_mate_only() {
        let opts = options(&[
            "pe", "-t", "sanger", "-f", "-", "-r", "b.fq", "-o", "o1.fq", "-p", "o2.fq", "-s", "s.fq",
        ])
        .unwrap();
        assert!(matches!(opts.pipeline.layout, Layout::SplitPaired { .. }));
    }

    #[test]
    fn test_stdio_allowed_on_both_sides() {
        let opts = options(&["se", "-t", "sanger", "-f", "-", "-o", "-"]).unwrap();
        assert!(matches!(opts.pipeline.layout, Layout::Single { .. }));
    }

    #[test]
    fn test_zero_threads_uses_all_cores() {
        let opts = options(&["se", "-t", "sanger", "-f", "in.fq", "-o", "out.fq"]).unwrap();
        assert_eq!(opts.pipeline.threads, num_cpus::get());
    }
}
