//! Load `.indexpipe.toml` (CLI only). Lib callers build a [`PipelineConfig`] directly.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use super::config::{ExecutionMode, PackagePaths, PipelineConfig};

#[derive(Debug, Default, Deserialize)]
pub struct ConfigToml {
    #[serde(default)]
    pipeline: PipelineSection,
}

#[derive(Debug, Default, Deserialize)]
struct PipelineSection {
    batch_size: Option<usize>,
    grouping: Option<ExecutionMode>,
    loading: Option<ExecutionMode>,
    documents: Option<ExecutionMode>,
    publishing: Option<ExecutionMode>,
    worker_threads: Option<usize>,
    pool_queue_capacity: Option<usize>,
    status_queue_capacity: Option<usize>,
    degraded_probe_interval_ms: Option<u64>,
    strict: Option<bool>,
}

/// Parse a config file body. Unknown keys are ignored; every key is optional.
pub fn parse_config_toml(s: &str) -> Result<ConfigToml, toml::de::Error> {
    toml::from_str(s)
}

/// Load the config file at `path`, or `.indexpipe.toml` in `dir` when `path` is None.
/// Returns None if the file is missing or unreadable; parse errors are logged and ignored.
pub fn load_config_toml(dir: &Path, path: Option<&Path>) -> Option<ConfigToml> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => dir.join(PackagePaths::get().config_filename()),
    };
    let s = std::fs::read_to_string(&path).ok()?;
    parse_config_toml(&s)
        .map_err(|e| log::warn!("{}: {}", path.display(), e))
        .ok()
}

/// Overwrite config field from file when present.
macro_rules! apply_file_opt {
    ($section:expr, $cfg:expr, $field:ident) => {
        if let Some(v) = $section.$field {
            $cfg.$field = v;
        }
    };
}

/// Apply file config (only fields present in the file). Call before applying CLI flags.
pub fn apply_file_to_config(file: &ConfigToml, cfg: &mut PipelineConfig) {
    let section = &file.pipeline;
    apply_file_opt!(section, cfg, batch_size);
    apply_file_opt!(section, cfg, grouping);
    apply_file_opt!(section, cfg, loading);
    apply_file_opt!(section, cfg, documents);
    apply_file_opt!(section, cfg, publishing);
    apply_file_opt!(section, cfg, pool_queue_capacity);
    apply_file_opt!(section, cfg, status_queue_capacity);
    apply_file_opt!(section, cfg, strict);
    if let Some(n) = section.worker_threads {
        cfg.worker_threads = Some(n);
    }
    if let Some(ms) = section.degraded_probe_interval_ms {
        cfg.degraded_probe_interval = Duration::from_millis(ms);
    }
}
