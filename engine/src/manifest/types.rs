//! Manifest Types
//!
//! The on-disk JSON document and the token lists parsed out of it.

use std::path::PathBuf;

use jobplug_abi::TypeKey;
use serde::{Deserialize, Serialize};

/// Manifest document as written on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestDocument {
    #[serde(rename = "Categories")]
    pub categories: Vec<String>,
    #[serde(rename = "Jobs")]
    pub jobs: Vec<String>,
    #[serde(default, rename = "Repositories")]
    pub repositories: Vec<String>,
    #[serde(default, rename = "Managers")]
    pub managers: Vec<String>,
    #[serde(default, rename = "DefaultSearchDirectories")]
    pub default_search_directories: Vec<String>,
    #[serde(default, rename = "Mappings")]
    pub mappings: MappingsDocument,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MappingsDocument {
    #[serde(default, rename = "Repositories")]
    pub repositories: Vec<String>,
    #[serde(default, rename = "Managers")]
    pub managers: Vec<String>,
}

/// `"<module>;<type>"`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleTypeToken {
    pub module: String,
    pub type_name: TypeKey,
}

/// `"<jobType>;<targetType>"`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MappingToken {
    pub job: TypeKey,
    pub target: TypeKey,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Mappings {
    pub repositories: Vec<MappingToken>,
    pub managers: Vec<MappingToken>,
}

/// Parsed manifest: every section reduced to well-formed entries
#[derive(Debug, Clone, Serialize)]
pub struct Manifest {
    pub source: PathBuf,
    pub categories: Vec<String>,
    pub jobs: Vec<ModuleTypeToken>,
    pub repositories: Vec<ModuleTypeToken>,
    pub managers: Vec<ModuleTypeToken>,
    /// Absolute; relative entries are resolved against the manifest's directory
    pub default_search_directories: Vec<PathBuf>,
    pub mappings: Mappings,
    /// Malformed entries discarded under the lenient policy
    pub dropped_tokens: usize,
}

impl Manifest {
    /// Module tokens in load order: jobs, then repositories, then managers
    pub fn module_tokens(&self) -> impl Iterator<Item = &ModuleTypeToken> {
        self.jobs
            .iter()
            .chain(self.repositories.iter())
            .chain(self.managers.iter())
    }
}
