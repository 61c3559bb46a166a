//! Sliding-window quality trimming of FASTQ reads.
//!
//! Input is read in large batches of whole records, every batch is classified on a pool
//! of scoped worker threads, and a single writer thread emits the results in input order.

pub mod aggregate;
pub mod config;
pub mod errors;
pub mod fastq;
pub mod filter;
pub mod pipeline;
pub mod report;
pub mod threading;

pub use errors::{Result, TrimError};
pub use pipeline::{run, Desync, Layout, PipelineConfig, RunSummary};
