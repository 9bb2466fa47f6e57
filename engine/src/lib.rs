//! Diagnosis engine — cascading traceback analysis over pattern rules and
//! tiered model backends.
//!
//! This crate provides the `raildebug_diagnose_engine` Python module via
//! PyO3, implementing language detection, frame extraction, source and
//! version-control context collection, project profiling, pattern
//! matching, chained/batch traceback splitting, durable recall of prior
//! diagnoses, and a pluggable model gateway.
//!
//! The module is imported as:
//! ```python
//! from raildebug_diagnose_engine import Analyzer, AnalyzerConfig, diagnose
//! ```

// PyO3-generated code triggers this lint on PyResult return types — suppress globally.
#![allow(clippy::useless_conversion)]

pub mod batch;
pub mod bindings;
pub mod chain;
pub mod config;
pub mod engine;
pub mod frames;
pub mod gateway;
pub mod language;
pub mod memory;
pub mod normalize;
pub mod patterns;
pub mod project;
pub mod report;
pub mod source_window;
pub mod types;
pub mod vcs;

use pyo3::prelude::*;

/// The Python module exposed by this crate.
///
/// Importable as: `from raildebug_diagnose_engine import Analyzer`
#[pymodule]
fn raildebug_diagnose_engine(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Initialize Rust logging → Python logging bridge
    pyo3_log::init();

    bindings::register_module(m)?;

    Ok(())
}
