//! Mapping Resolver
//!
//! Joins manifest mapping tokens against registered jobs and the types
//! exported by loaded modules, producing the Job→Repository and Job→Manager
//! tables.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use jobplug_abi::{TypeDescriptor, TypeKey, TypeRole};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::manifest::MappingToken;
use crate::module::ModuleHandle;
use crate::registry::Registry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingKind {
    Repository,
    Manager,
}

impl MappingKind {
    pub fn role(&self) -> TypeRole {
        match self {
            MappingKind::Repository => TypeRole::Repository,
            MappingKind::Manager => TypeRole::Manager,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MappingEntry {
    pub job: TypeKey,
    pub kind: MappingKind,
    pub target: Arc<TypeDescriptor>,
    /// Module the target was found in
    pub module: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct MappingSummary {
    pub job: String,
    pub kind: MappingKind,
    pub target: String,
    pub module: PathBuf,
}

impl MappingEntry {
    pub fn summary(&self) -> MappingSummary {
        MappingSummary {
            job: self.job.to_string(),
            kind: self.kind,
            target: self.target.key.to_string(),
            module: self.module.clone(),
        }
    }
}

#[derive(Debug, Default)]
pub struct MappingResolver {
    repositories: HashMap<TypeKey, MappingEntry>,
    managers: HashMap<TypeKey, MappingEntry>,
}

impl MappingResolver {
    /// Resolve every mapping token once. Unresolvable tokens are logged and
    /// left out; they are not errors.
    pub fn build(
        repositories: &[MappingToken],
        managers: &[MappingToken],
        registry: &Registry,
        modules: &[Arc<ModuleHandle>],
    ) -> Self {
        let resolver = Self {
            repositories: resolve_table(MappingKind::Repository, repositories, registry, modules),
            managers: resolve_table(MappingKind::Manager, managers, registry, modules),
        };
        info!(
            "Resolved {} repository and {} manager mappings",
            resolver.repositories.len(),
            resolver.managers.len()
        );
        resolver
    }

    pub fn resolve_repository_mapping(&self, job_type: &str) -> Option<&MappingEntry> {
        lookup(&self.repositories, job_type)
    }

    pub fn resolve_manager_mapping(&self, job_type: &str) -> Option<&MappingEntry> {
        lookup(&self.managers, job_type)
    }

    pub fn resolve(&self, kind: MappingKind, job_type: &str) -> Option<&MappingEntry> {
        match kind {
            MappingKind::Repository => self.resolve_repository_mapping(job_type),
            MappingKind::Manager => self.resolve_manager_mapping(job_type),
        }
    }

    /// All entries, sorted by job then kind
    pub fn entries(&self) -> Vec<&MappingEntry> {
        let mut out: Vec<&MappingEntry> = self
            .repositories
            .values()
            .chain(self.managers.values())
            .collect();
        out.sort_by(|a, b| {
            a.job
                .cmp(&b.job)
                .then((a.kind as u8).cmp(&(b.kind as u8)))
        });
        out
    }
}

fn lookup<'a>(
    table: &'a HashMap<TypeKey, MappingEntry>,
    job_type: &str,
) -> Option<&'a MappingEntry> {
    let key = TypeKey::parse(job_type).ok()?;
    table.get(&key)
}

fn resolve_table(
    kind: MappingKind,
    tokens: &[MappingToken],
    registry: &Registry,
    modules: &[Arc<ModuleHandle>],
) -> HashMap<TypeKey, MappingEntry> {
    let mut table = HashMap::new();
    // Jobs that already had a token, resolved or not
    let mut seen: HashSet<&TypeKey> = HashSet::new();
    for token in tokens {
        if !seen.insert(&token.job) {
            warn!(
                "Ignoring extra {:?} mapping {} -> {}: an earlier token names this job",
                kind, token.job, token.target
            );
            continue;
        }
        if let Some(entry) = resolve_token(kind, token, registry, modules) {
            table.insert(entry.job.clone(), entry);
        }
    }
    table
}

fn resolve_token(
    kind: MappingKind,
    token: &MappingToken,
    registry: &Registry,
    modules: &[Arc<ModuleHandle>],
) -> Option<MappingEntry> {
    let Some(job) = registry.job(&token.job) else {
        warn!(
            "{:?} mapping {} -> {} names an unregistered job",
            kind, token.job, token.target
        );
        return None;
    };

    for module in modules {
        if let Some(target) = module.descriptor.find(kind.role(), &token.target) {
            debug!(
                "Mapped {} -> {} ({:?}) from {:?}",
                job.type_identity, target.key, kind, module.path
            );
            return Some(MappingEntry {
                job: job.type_identity.clone(),
                kind,
                target: Arc::clone(target),
                module: module.path.clone(),
            });
        }
    }

    let other_role = modules
        .iter()
        .find_map(|m| m.descriptor.find_any(&token.target))
        .map(|t| t.role());
    match other_role {
        Some(role) => warn!(
            "{:?} mapping {} -> {}: target is exported as a {} type",
            kind, token.job, token.target, role
        ),
        None => warn!(
            "{:?} mapping {} -> {}: no loaded module exports the target",
            kind, token.job, token.target
        ),
    }
    None
}
