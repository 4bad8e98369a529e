//! Module Loader
//!
//! Resolves module references against search directories and binds each
//! resolved file at most once.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use tracing::{debug, info};

use super::binder::ModuleBinder;
use super::cache::{ModuleCache, ModuleHandle};
use crate::common::{normalize_path, EngineError, EngineResult};

pub struct ModuleLoader {
    search_dirs: Vec<PathBuf>,
    binder: Arc<dyn ModuleBinder>,
    cache: Arc<ModuleCache>,
    /// reference → normalized path, so repeat references skip probing
    resolved: RwLock<HashMap<String, PathBuf>>,
}

impl ModuleLoader {
    pub fn new(
        search_dirs: Vec<PathBuf>,
        binder: Arc<dyn ModuleBinder>,
        cache: Arc<ModuleCache>,
    ) -> Self {
        Self {
            search_dirs,
            binder,
            cache,
            resolved: RwLock::new(HashMap::new()),
        }
    }

    pub fn search_dirs(&self) -> &[PathBuf] {
        &self.search_dirs
    }

    pub fn cache(&self) -> &Arc<ModuleCache> {
        &self.cache
    }

    /// Candidate file paths for `reference`, in probe order
    pub fn candidates(&self, reference: &str) -> Vec<PathBuf> {
        let platform_name = libloading::library_filename(reference);
        let mut out = Vec::with_capacity(self.search_dirs.len() * 2);
        for dir in &self.search_dirs {
            out.push(dir.join(reference));
            let platform = dir.join(&platform_name);
            if platform != dir.join(reference) {
                out.push(platform);
            }
        }
        out
    }

    /// Resolve a reference to the normalized path of an existing file
    pub fn resolve(&self, reference: &str) -> EngineResult<PathBuf> {
        if let Some(path) = self
            .resolved
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(reference)
        {
            return Ok(path.clone());
        }

        let direct = Path::new(reference);
        let found = if direct.is_file() {
            direct.to_path_buf()
        } else {
            let candidates = self.candidates(reference);
            match candidates.iter().find(|p| p.is_file()) {
                Some(path) => path.clone(),
                None => {
                    let mut searched = vec![direct.to_path_buf()];
                    searched.extend(candidates);
                    return Err(EngineError::ModuleNotFound {
                        reference: reference.to_string(),
                        searched,
                    });
                }
            }
        };

        let path = normalize_path(&found);
        debug!("Resolved module {} to {:?}", reference, path);
        self.resolved
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(reference.to_string(), path.clone());
        Ok(path)
    }

    /// Load a module, binding it only if its resolved path is not cached yet
    pub fn load_module(&self, reference: &str) -> EngineResult<Arc<ModuleHandle>> {
        let path = self.resolve(reference)?;

        if let Some(handle) = self.cache.get(&path) {
            debug!("Module {} already loaded from {:?}", reference, path);
            return Ok(handle);
        }

        let descriptor = self.binder.bind(&path)?;
        info!(
            "Loaded module {} from {:?} ({} types)",
            reference,
            path,
            descriptor.len()
        );
        Ok(self.cache.insert(reference, path, descriptor))
    }
}
