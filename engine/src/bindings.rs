//! PyO3 bindings exposing the diagnosis engine to Python.
//!
//! Importable as:
//! ```python
//! from raildebug_diagnose_engine import Analyzer, AnalyzerConfig, diagnose, diagnose_chain, diagnose_batch
//! ```
//!
//! This module owns zero diagnosis logic; it only adapts [`crate::engine::Analyzer`]
//! at the PyO3 boundary.

use pyo3::prelude::*;

use crate::config::AnalyzerConfig;
use crate::engine::{Analyzer as RustAnalyzer, DiagnoseFlags};
use crate::gateway::ProviderRegistry;
use crate::memory::MemoryStore;
use crate::report::{BatchResult, ChainResult};
use crate::types::DiagnosisReport;

/// Flags controlling one diagnosis call, mirrored 1:1 from [`DiagnoseFlags`].
#[pyclass(name = "DiagnoseRequest", get_all, set_all)]
#[derive(Clone, Default)]
pub struct PyDiagnoseRequest {
    pub deep: bool,
    pub haiku: bool,
    pub project_root: Option<String>,
    pub use_memory: bool,
    pub skip_vcs: bool,
    pub repo_id: Option<String>,
}

#[pymethods]
impl PyDiagnoseRequest {
    #[new]
    #[pyo3(signature = (deep=false, haiku=false, project_root=None, use_memory=false, skip_vcs=false, repo_id=None))]
    fn new(
        deep: bool,
        haiku: bool,
        project_root: Option<String>,
        use_memory: bool,
        skip_vcs: bool,
        repo_id: Option<String>,
    ) -> Self {
        Self { deep, haiku, project_root, use_memory, skip_vcs, repo_id }
    }
}

impl From<&PyDiagnoseRequest> for DiagnoseFlags {
    fn from(req: &PyDiagnoseRequest) -> Self {
        Self {
            deep: req.deep,
            haiku: req.haiku,
            project_root: req.project_root.clone(),
            use_memory: req.use_memory,
            skip_vcs: req.skip_vcs,
            repo_id: req.repo_id.clone(),
        }
    }
}

#[pyclass(get_all)]
#[derive(Clone)]
pub struct PyChainResult {
    pub reports: Vec<DiagnosisReport>,
}

impl From<ChainResult> for PyChainResult {
    fn from(r: ChainResult) -> Self {
        Self { reports: r.reports }
    }
}

#[pyclass(get_all)]
#[derive(Clone)]
pub struct PyBatchResult {
    pub reports: Vec<DiagnosisReport>,
    pub low: u32,
    pub medium: u32,
    pub high: u32,
    pub critical: u32,
}

impl From<BatchResult> for PyBatchResult {
    fn from(r: BatchResult) -> Self {
        Self {
            reports: r.reports,
            low: r.severity_counts.low,
            medium: r.severity_counts.medium,
            high: r.severity_counts.high,
            critical: r.severity_counts.critical,
        }
    }
}

/// Python-facing analyzer wrapper.
///
/// Usage from Python:
/// ```python
/// from raildebug_diagnose_engine import Analyzer, AnalyzerConfig
/// analyzer = Analyzer(AnalyzerConfig())
/// report = analyzer.diagnose(trace_text)
/// ```
#[pyclass(name = "Analyzer")]
pub struct PyAnalyzer {
    inner: RustAnalyzer,
}

#[pymethods]
impl PyAnalyzer {
    #[new]
    fn new(config: AnalyzerConfig) -> Self {
        let memory = config
            .memory_backend
            .as_ref()
            .and_then(|path| MemoryStore::open(std::path::Path::new(path)).ok());
        Self { inner: RustAnalyzer::new(config, ProviderRegistry::new(), memory) }
    }

    #[pyo3(signature = (trace, request=None))]
    fn diagnose(&self, trace: &str, request: Option<PyDiagnoseRequest>) -> DiagnosisReport {
        let flags = request.as_ref().map(DiagnoseFlags::from).unwrap_or_default();
        self.inner.diagnose(trace, &flags)
    }

    #[pyo3(signature = (trace, request=None))]
    fn diagnose_chain(&self, trace: &str, request: Option<PyDiagnoseRequest>) -> PyChainResult {
        let flags = request.as_ref().map(DiagnoseFlags::from).unwrap_or_default();
        self.inner.diagnose_chain(trace, &flags).into()
    }

    #[pyo3(signature = (blob, request=None))]
    fn diagnose_batch(&self, blob: &str, request: Option<PyDiagnoseRequest>) -> PyBatchResult {
        let flags = request.as_ref().map(DiagnoseFlags::from).unwrap_or_default();
        self.inner.diagnose_batch(blob, &flags).into()
    }

    fn __repr__(&self) -> String {
        "Analyzer(...)".to_owned()
    }
}

/// One-shot diagnosis (default configuration, no flags).
///
/// # Errors
///
/// Never fails — a tier-0 fallback report is returned when nothing else
/// can diagnose the trace.
#[pyfunction]
pub fn diagnose(trace: &str) -> PyResult<DiagnosisReport> {
    let analyzer = RustAnalyzer::new(AnalyzerConfig::default(), ProviderRegistry::new(), None);
    Ok(analyzer.diagnose(trace, &DiagnoseFlags::default()))
}

#[pyfunction]
pub fn diagnose_chain(trace: &str) -> PyResult<PyChainResult> {
    let analyzer = RustAnalyzer::new(AnalyzerConfig::default(), ProviderRegistry::new(), None);
    Ok(analyzer.diagnose_chain(trace, &DiagnoseFlags::default()).into())
}

#[pyfunction]
pub fn diagnose_batch(blob: &str) -> PyResult<PyBatchResult> {
    let analyzer = RustAnalyzer::new(AnalyzerConfig::default(), ProviderRegistry::new(), None);
    Ok(analyzer.diagnose_batch(blob, &DiagnoseFlags::default()).into())
}

/// Register all PyO3 classes and functions into the Python module.
pub fn register_module(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyAnalyzer>()?;
    m.add_class::<PyDiagnoseRequest>()?;
    m.add_class::<PyChainResult>()?;
    m.add_class::<PyBatchResult>()?;
    m.add_class::<AnalyzerConfig>()?;
    m.add_class::<DiagnosisReport>()?;
    m.add_class::<crate::types::Severity>()?;
    m.add_class::<crate::types::LanguageTag>()?;
    m.add_class::<crate::types::ChainRelationship>()?;
    m.add_function(wrap_pyfunction!(diagnose, m)?)?;
    m.add_function(wrap_pyfunction!(diagnose_chain, m)?)?;
    m.add_function(wrap_pyfunction!(diagnose_batch, m)?)?;
    Ok(())
}
