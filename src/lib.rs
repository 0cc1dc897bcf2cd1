//! Unpack a saved container image into a plain directory tree and report
//! on what it contains: directory shape, where the bytes go, and files that
//! look like they leak credentials.
//!
//! The pipeline is strictly two-phase. [`unpack`] owns the destination
//! tree and must finish before any analyzer runs; [`report::analyze`] then
//! fans the read-only analyzers out over the finished tree.

pub mod analyzer;
pub mod config;
pub mod error;
pub mod render;
pub mod report;
pub mod unpack;

pub use error::{Error, ItemError, Result};
pub use report::{AnalysisReport, AnalyzeOptions, analyze};
