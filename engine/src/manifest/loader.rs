//! Manifest Loader
//!
//! Reads the manifest JSON, splits `a;b` tokens, and applies the token policy.

use std::fs;
use std::path::{Path, PathBuf};

use jobplug_abi::{KeyError, TypeKey};
use tracing::{info, warn};

use super::types::{Manifest, ManifestDocument, MappingToken, Mappings, ModuleTypeToken};
use crate::common::{EngineError, EngineResult};
use crate::config::TokenPolicy;

#[derive(Debug, Clone, Copy)]
pub struct LoadOptions {
    pub token_policy: TokenPolicy,
    pub max_bytes: u64,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            token_policy: TokenPolicy::Lenient,
            max_bytes: 1_000_000,
        }
    }
}

/// Split a two-part token. `None` unless there are exactly two non-empty parts.
pub fn split_token(raw: &str) -> Option<(&str, &str)> {
    let mut parts = raw.split(';');
    let first = parts.next()?.trim();
    let second = parts.next()?.trim();
    if parts.next().is_some() || first.is_empty() || second.is_empty() {
        return None;
    }
    Some((first, second))
}

// Token parsers return `Ok(None)` for a wrong shape (part count or empty
// part), which the token policy handles, and `Err` for a well-shaped token
// carrying an invalid type name, which is always fatal.

fn parse_module_token(raw: &str) -> Result<Option<ModuleTypeToken>, KeyError> {
    let Some((module, type_name)) = split_token(raw) else {
        return Ok(None);
    };
    Ok(Some(ModuleTypeToken {
        module: module.to_string(),
        type_name: TypeKey::parse(type_name)?,
    }))
}

fn parse_mapping_token(raw: &str) -> Result<Option<MappingToken>, KeyError> {
    let Some((job, target)) = split_token(raw) else {
        return Ok(None);
    };
    Ok(Some(MappingToken {
        job: TypeKey::parse(job)?,
        target: TypeKey::parse(target)?,
    }))
}

fn parse_scalar(raw: &str) -> Result<Option<String>, KeyError> {
    let trimmed = raw.trim();
    Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
}

/// Applies the token policy to one manifest section
struct SectionParser<'a> {
    source: &'a Path,
    policy: TokenPolicy,
    dropped: usize,
}

impl SectionParser<'_> {
    fn parse<T>(
        &mut self,
        section: &str,
        raw: &[String],
        parse: impl Fn(&str) -> Result<Option<T>, KeyError>,
    ) -> EngineResult<Vec<T>> {
        let mut out = Vec::with_capacity(raw.len());
        for token in raw {
            let parsed = parse(token).map_err(|e| {
                EngineError::configuration(format!(
                    "invalid type name in {} entry {:?} of {}: {}",
                    section,
                    token,
                    self.source.display(),
                    e
                ))
            })?;
            match parsed {
                Some(parsed) => out.push(parsed),
                None if self.policy == TokenPolicy::Strict => {
                    return Err(EngineError::configuration(format!(
                        "malformed entry {:?} in section {} of {}",
                        token,
                        section,
                        self.source.display()
                    )));
                }
                None => {
                    warn!("Dropping malformed {} entry {:?}", section, token);
                    self.dropped += 1;
                }
            }
        }
        Ok(out)
    }
}

/// Load and parse a manifest file
pub fn load_manifest(path: &Path, options: &LoadOptions) -> EngineResult<Manifest> {
    let metadata = fs::metadata(path).map_err(|e| {
        EngineError::configuration(format!("cannot read manifest {}: {}", path.display(), e))
    })?;
    if metadata.len() > options.max_bytes {
        return Err(EngineError::configuration(format!(
            "manifest {} too large ({} bytes, max {})",
            path.display(),
            metadata.len(),
            options.max_bytes
        )));
    }

    let content = fs::read_to_string(path).map_err(|e| {
        EngineError::configuration(format!("cannot read manifest {}: {}", path.display(), e))
    })?;

    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let manifest = parse_manifest(&content, path, base_dir, options.token_policy)?;

    info!(
        "Loaded manifest {:?}: {} categories, {} jobs, {} repository mappings, {} manager mappings",
        path,
        manifest.categories.len(),
        manifest.jobs.len(),
        manifest.mappings.repositories.len(),
        manifest.mappings.managers.len()
    );
    if manifest.dropped_tokens > 0 {
        warn!(
            "Manifest {:?}: {} malformed entries dropped",
            path, manifest.dropped_tokens
        );
    }
    Ok(manifest)
}

/// Parse manifest JSON. `source` is only used in messages.
pub fn parse_manifest(
    content: &str,
    source: &Path,
    base_dir: &Path,
    policy: TokenPolicy,
) -> EngineResult<Manifest> {
    let document: ManifestDocument = serde_json::from_str(content).map_err(|e| {
        EngineError::configuration(format!(
            "failed to parse manifest {}: {}",
            source.display(),
            e
        ))
    })?;

    let mut parser = SectionParser {
        source,
        policy,
        dropped: 0,
    };

    let categories = parser.parse("Categories", &document.categories, parse_scalar)?;
    let jobs = parser.parse("Jobs", &document.jobs, parse_module_token)?;
    let repositories = parser.parse("Repositories", &document.repositories, parse_module_token)?;
    let managers = parser.parse("Managers", &document.managers, parse_module_token)?;
    let directories = parser.parse(
        "DefaultSearchDirectories",
        &document.default_search_directories,
        parse_scalar,
    )?;
    let mappings = Mappings {
        repositories: parser.parse(
            "Mappings.Repositories",
            &document.mappings.repositories,
            parse_mapping_token,
        )?,
        managers: parser.parse(
            "Mappings.Managers",
            &document.mappings.managers,
            parse_mapping_token,
        )?,
    };

    let default_search_directories = directories
        .into_iter()
        .map(|d| resolve_dir(base_dir, &d))
        .collect();

    Ok(Manifest {
        source: source.to_path_buf(),
        categories,
        jobs,
        repositories,
        managers,
        default_search_directories,
        mappings,
        dropped_tokens: parser.dropped,
    })
}

fn resolve_dir(base_dir: &Path, dir: &str) -> PathBuf {
    let path = PathBuf::from(dir);
    if path.is_absolute() {
        path
    } else {
        base_dir.join(path)
    }
}
