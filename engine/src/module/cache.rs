//! Module Cache
//!
//! Append-only table of bound modules keyed by normalized absolute path.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use jobplug_abi::ModuleDescriptor;
use once_cell::sync::Lazy;
use serde::Serialize;

/// A bound module. Never unloaded.
#[derive(Debug)]
pub struct ModuleHandle {
    /// Reference as written in the manifest that first caused the load
    pub reference: String,
    pub path: PathBuf,
    pub descriptor: ModuleDescriptor,
    pub loaded_at: DateTime<Utc>,
    /// Position in the owning cache's load order
    pub sequence: usize,
}

impl ModuleHandle {
    pub fn summary(&self) -> ModuleSummary {
        ModuleSummary {
            name: self.descriptor.name().to_string(),
            reference: self.reference.clone(),
            path: self.path.clone(),
            types: self
                .descriptor
                .types()
                .iter()
                .map(|t| format!("{} ({})", t.key, t.role()))
                .collect(),
            loaded_at: self.loaded_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ModuleSummary {
    pub name: String,
    pub reference: String,
    pub path: PathBuf,
    pub types: Vec<String>,
    pub loaded_at: DateTime<Utc>,
}

#[derive(Default)]
struct CacheInner {
    modules: Vec<Arc<ModuleHandle>>,
    by_path: HashMap<PathBuf, usize>,
}

/// Shared, append-only module table.
///
/// An engine owns its own cache unless one is handed to it; pass
/// [`ModuleCache::global`] to share modules across engines for the life of
/// the process.
#[derive(Default)]
pub struct ModuleCache {
    inner: RwLock<CacheInner>,
}

static GLOBAL_CACHE: Lazy<Arc<ModuleCache>> = Lazy::new(|| Arc::new(ModuleCache::new()));

impl ModuleCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global() -> Arc<ModuleCache> {
        Arc::clone(&GLOBAL_CACHE)
    }

    /// `path` must already be normalized
    pub fn get(&self, path: &Path) -> Option<Arc<ModuleHandle>> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner
            .by_path
            .get(path)
            .map(|i| Arc::clone(&inner.modules[*i]))
    }

    /// Insert a freshly bound module, or return the one already cached for
    /// the same path. The cache never replaces or removes an entry.
    pub fn insert(
        &self,
        reference: &str,
        path: PathBuf,
        descriptor: ModuleDescriptor,
    ) -> Arc<ModuleHandle> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if let Some(i) = inner.by_path.get(&path) {
            return Arc::clone(&inner.modules[*i]);
        }

        let sequence = inner.modules.len();
        let handle = Arc::new(ModuleHandle {
            reference: reference.to_string(),
            path: path.clone(),
            descriptor,
            loaded_at: Utc::now(),
            sequence,
        });
        inner.modules.push(Arc::clone(&handle));
        inner.by_path.insert(path, sequence);
        handle
    }

    /// Snapshot of every module in load order
    pub fn modules(&self) -> Vec<Arc<ModuleHandle>> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.modules.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobplug_abi::ModuleBuilder;

    fn empty_module(name: &str) -> ModuleDescriptor {
        ModuleBuilder::new(name).build().unwrap()
    }

    #[test]
    fn test_insert_is_append_only() {
        let cache = ModuleCache::new();
        let a = cache.insert("a", PathBuf::from("/m/a.so"), empty_module("a"));
        let again = cache.insert("a-again", PathBuf::from("/m/a.so"), empty_module("other"));
        let b = cache.insert("b", PathBuf::from("/m/b.so"), empty_module("b"));

        assert!(Arc::ptr_eq(&a, &again));
        assert_eq!(again.descriptor.name(), "a");
        assert_eq!(cache.len(), 2);
        assert_eq!(a.sequence, 0);
        assert_eq!(b.sequence, 1);

        let order: Vec<String> = cache.modules().iter().map(|m| m.reference.clone()).collect();
        assert_eq!(order, vec!["a", "b"]);
    }

    #[test]
    fn test_get_by_path() {
        let cache = ModuleCache::new();
        assert!(cache.get(Path::new("/m/a.so")).is_none());
        cache.insert("a", PathBuf::from("/m/a.so"), empty_module("a"));
        assert!(cache.get(Path::new("/m/a.so")).is_some());
    }
}
