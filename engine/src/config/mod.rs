//! Configuration management
//!
//! Engine settings from `~/.jobplug/engine.json` and `JOBPLUG_*` environment
//! variables. Builder arguments passed to the engine override both.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::common::{jobplug_dir, EngineError, EngineResult};

pub const ENV_TOKEN_POLICY: &str = "JOBPLUG_TOKEN_POLICY";
pub const ENV_SEARCH_DIRS: &str = "JOBPLUG_SEARCH_DIRS";
pub const ENV_MAX_MANIFEST_BYTES: &str = "JOBPLUG_MAX_MANIFEST_BYTES";

const DEFAULT_MAX_MANIFEST_BYTES: u64 = 1_000_000;

/// What to do with a manifest token that has the wrong shape (part count or
/// an empty part). A well-shaped token with an invalid type name is always a
/// configuration error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenPolicy {
    /// Drop it with a warning
    #[default]
    Lenient,
    /// Fail manifest loading
    Strict,
}

impl FromStr for TokenPolicy {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lenient" => Ok(TokenPolicy::Lenient),
            "strict" => Ok(TokenPolicy::Strict),
            other => Err(EngineError::configuration(format!(
                "unknown token policy '{}' (expected lenient or strict)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub token_policy: TokenPolicy,
    /// Explicit module search directories; empty means "use the manifest's"
    #[serde(default)]
    pub search_directories: Vec<PathBuf>,
    #[serde(default = "default_max_manifest_bytes")]
    pub max_manifest_bytes: u64,
}

fn default_max_manifest_bytes() -> u64 {
    DEFAULT_MAX_MANIFEST_BYTES
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            token_policy: TokenPolicy::default(),
            search_directories: Vec::new(),
            max_manifest_bytes: DEFAULT_MAX_MANIFEST_BYTES,
        }
    }
}

fn get_engine_config_path() -> Option<PathBuf> {
    jobplug_dir().map(|dir| dir.join("engine.json"))
}

impl EngineConfig {
    /// Load `~/.jobplug/engine.json` (if present) and apply environment overrides
    pub fn load() -> EngineResult<Self> {
        let mut config = match get_engine_config_path() {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> EngineResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            EngineError::configuration(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config: EngineConfig = serde_json::from_str(&content).map_err(|e| {
            EngineError::configuration(format!("failed to parse {}: {}", path.display(), e))
        })?;
        debug!("Loaded engine config from {:?}", path);
        Ok(config)
    }

    /// Apply `JOBPLUG_*` overrides read through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> EngineResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(policy) = lookup(ENV_TOKEN_POLICY) {
            self.token_policy = policy.parse()?;
        }

        if let Some(dirs) = lookup(ENV_SEARCH_DIRS) {
            self.search_directories = std::env::split_paths(&dirs)
                .filter(|p| !p.as_os_str().is_empty())
                .collect();
        }

        if let Some(max) = lookup(ENV_MAX_MANIFEST_BYTES) {
            self.max_manifest_bytes = max.trim().parse().map_err(|e| {
                EngineError::configuration(format!(
                    "{} must be a byte count: {}",
                    ENV_MAX_MANIFEST_BYTES, e
                ))
            })?;
        }

        Ok(())
    }
}
