//! Configuration loading and resolution for the diagnosis engine.
//!
//! Supports a 2-level resolution order:
//! 1. An optional `rail_debug.toml` at a caller-supplied path.
//! 2. Built-in defaults.
//!
//! Simplified from the teacher's 4-level per-rule-override scheme down to
//! the core's actual knobs, but keeping the same canonical-JSON + SHA-256
//! hashing idiom for cache invalidation.

use std::path::Path;

use pyo3::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadError(String, String),

    #[error("failed to parse config file {0}: {1}")]
    ParseError(String, String),
}

/// Per-tier model identifiers, resolved from configuration rather than
/// hardcoded so a deployment can point at whichever hosted models it has
/// credentials for.
#[pyclass(get_all)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelTierConfig {
    pub tier2: String,
    pub tier3: String,
    pub tier4: String,
}

impl Default for ModelTierConfig {
    fn default() -> Self {
        Self {
            tier2: "tier2-fast".to_owned(),
            tier3: "tier3-standard".to_owned(),
            tier4: "tier4-deep".to_owned(),
        }
    }
}

/// Resolved engine configuration.
#[pyclass(get_all)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Default radius (lines above/below) for the source window reader.
    pub source_window_radius: u32,
    /// Max frames collected per side-context kind (source windows, vcs contexts).
    pub max_context_frames: u32,
    /// When false, the version-control context step is skipped entirely.
    pub vcs_enabled: bool,
    /// Per-tier model identifiers.
    pub models: ModelTierConfig,
    /// Connection string for the memory store backend; `None` disables it.
    pub memory_backend: Option<String>,
    /// Timeout, in seconds, applied to each external git invocation.
    pub vcs_timeout_secs: u64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            source_window_radius: 5,
            max_context_frames: 3,
            vcs_enabled: true,
            models: ModelTierConfig::default(),
            memory_backend: Some("rail_debug_memory.sqlite3".to_owned()),
            vcs_timeout_secs: 10,
        }
    }
}

#[pymethods]
impl AnalyzerConfig {
    /// Construct a config from built-in defaults. Python callers needing
    /// the TOML-layered resolution should use [`AnalyzerConfig::load`] from
    /// Rust, or pre-resolve the file and pass overrides here.
    #[new]
    fn py_new() -> Self {
        Self::default()
    }

    fn __repr__(&self) -> String {
        format!(
            "AnalyzerConfig(source_window_radius={}, vcs_enabled={})",
            self.source_window_radius, self.vcs_enabled
        )
    }
}

#[pymethods]
impl ModelTierConfig {
    #[new]
    fn py_new() -> Self {
        Self::default()
    }
}

#[derive(Debug, Deserialize)]
struct TomlConfigFile {
    #[serde(default)]
    source_window_radius: Option<u32>,
    #[serde(default)]
    max_context_frames: Option<u32>,
    #[serde(default)]
    vcs_enabled: Option<bool>,
    #[serde(default)]
    models: Option<TomlModelSection>,
    #[serde(default)]
    memory_backend: Option<String>,
    #[serde(default)]
    vcs_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TomlModelSection {
    tier2: Option<String>,
    tier3: Option<String>,
    tier4: Option<String>,
}

impl AnalyzerConfig {
    /// Load configuration: built-in defaults, overridden by `config_path`
    /// if it exists. A missing `config_path` is not an error — defaults
    /// are returned as-is, matching the teacher's "first file found wins,
    /// absence is not a failure" convention.
    ///
    /// # Errors
    ///
    /// Returns an error if `config_path` exists but cannot be read or parsed.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        let Some(path) = config_path else {
            return Ok(config);
        };
        if !path.is_file() {
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(path.display().to_string(), e.to_string()))?;
        let parsed: TomlConfigFile = toml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.display().to_string(), e.to_string()))?;

        if let Some(v) = parsed.source_window_radius {
            config.source_window_radius = v;
        }
        if let Some(v) = parsed.max_context_frames {
            config.max_context_frames = v;
        }
        if let Some(v) = parsed.vcs_enabled {
            config.vcs_enabled = v;
        }
        if let Some(v) = parsed.vcs_timeout_secs {
            config.vcs_timeout_secs = v;
        }
        config.memory_backend = parsed.memory_backend.or(config.memory_backend);
        if let Some(models) = parsed.models {
            if let Some(v) = models.tier2 {
                config.models.tier2 = v;
            }
            if let Some(v) = models.tier3 {
                config.models.tier3 = v;
            }
            if let Some(v) = models.tier4 {
                config.models.tier4 = v;
            }
        }

        Ok(config)
    }

    /// SHA-256 hash of the configuration, used solely to invalidate the
    /// project profile cache when profiler-affecting configuration changes.
    ///
    /// Uses canonical JSON (sorted keys) so the hash is deterministic
    /// regardless of serialization order.
    #[must_use]
    pub fn config_hash(&self) -> String {
        use sha2::{Digest, Sha256};

        let value = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        let canonical = canonical_json(&value);
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Produce a canonical JSON string with sorted object keys.
fn canonical_json(value: &serde_json::Value) -> String {
    let mut buf = String::new();
    write_canonical(value, &mut buf);
    buf
}

fn write_canonical(value: &serde_json::Value, buf: &mut String) {
    use std::fmt::Write;

    match value {
        serde_json::Value::Null => buf.push_str("null"),
        serde_json::Value::Bool(b) => {
            let _ = write!(buf, "{b}");
        }
        serde_json::Value::Number(n) => {
            let _ = write!(buf, "{n}");
        }
        serde_json::Value::String(s) => {
            let _ = write!(buf, "{}", serde_json::to_string(s).unwrap_or_default());
        }
        serde_json::Value::Array(arr) => {
            buf.push('[');
            for (i, v) in arr.iter().enumerate() {
                if i > 0 {
                    buf.push(',');
                }
                write_canonical(v, buf);
            }
            buf.push(']');
        }
        serde_json::Value::Object(map) => {
            buf.push('{');
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for (i, k) in keys.iter().enumerate() {
                if i > 0 {
                    buf.push(',');
                }
                let _ = write!(buf, "{}", serde_json::to_string(*k).unwrap_or_default());
                buf.push(':');
                write_canonical(&map[*k], buf);
            }
            buf.push('}');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_has_sane_values() {
        let config = AnalyzerConfig::default();
        assert_eq!(config.source_window_radius, 5);
        assert!(config.vcs_enabled);
    }

    #[test]
    fn missing_config_path_returns_defaults() {
        let config = AnalyzerConfig::load(Some(Path::new("/no/such/rail_debug.toml"))).unwrap();
        assert_eq!(config, AnalyzerConfig::default());
    }

    #[test]
    fn load_overrides_only_specified_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "source_window_radius = 8\nvcs_enabled = false").unwrap();
        let config = AnalyzerConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.source_window_radius, 8);
        assert!(!config.vcs_enabled);
        assert_eq!(config.max_context_frames, AnalyzerConfig::default().max_context_frames);
    }

    #[test]
    fn config_hash_is_deterministic() {
        let a = AnalyzerConfig::default();
        let b = AnalyzerConfig::default();
        assert_eq!(a.config_hash(), b.config_hash());
    }

    #[test]
    fn config_hash_changes_with_content() {
        let mut a = AnalyzerConfig::default();
        let hash_before = a.config_hash();
        a.source_window_radius = 12;
        assert_ne!(hash_before, a.config_hash());
    }
}
