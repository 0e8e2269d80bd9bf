use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub filters: Option<FiltersConfig>,
    pub sampling: Option<SamplingConfig>,
    pub concurrency: Option<ConcurrencyConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FiltersConfig {
    pub min_linked_bibs: Option<u32>,
    pub require_doi: Option<bool>,
    pub require_arxiv: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SamplingConfig {
    pub shard_size: Option<usize>,
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    pub workers: Option<usize>,
}

/// Platform config directory path: `<config_dir>/citectx/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("citectx").join("config.toml"))
}

/// Load config by cascading CWD `.citectx.toml` over platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(&PathBuf::from(".citectx.toml"));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &PathBuf) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    toml::from_str(&content).ok()
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    ConfigFile {
        filters: Some(FiltersConfig {
            min_linked_bibs: overlay
                .filters
                .as_ref()
                .and_then(|f| f.min_linked_bibs)
                .or_else(|| base.filters.as_ref().and_then(|f| f.min_linked_bibs)),
            require_doi: overlay
                .filters
                .as_ref()
                .and_then(|f| f.require_doi)
                .or_else(|| base.filters.as_ref().and_then(|f| f.require_doi)),
            require_arxiv: overlay
                .filters
                .as_ref()
                .and_then(|f| f.require_arxiv)
                .or_else(|| base.filters.as_ref().and_then(|f| f.require_arxiv)),
        }),
        sampling: Some(SamplingConfig {
            shard_size: overlay
                .sampling
                .as_ref()
                .and_then(|s| s.shard_size)
                .or_else(|| base.sampling.as_ref().and_then(|s| s.shard_size)),
            seed: overlay
                .sampling
                .as_ref()
                .and_then(|s| s.seed)
                .or_else(|| base.sampling.as_ref().and_then(|s| s.seed)),
        }),
        concurrency: Some(ConcurrencyConfig {
            workers: overlay
                .concurrency
                .as_ref()
                .and_then(|c| c.workers)
                .or_else(|| base.concurrency.as_ref().and_then(|c| c.workers)),
        }),
    }
}
