//! Module Binders
//!
//! Turn a resolved module path into its registration table.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use jobplug_abi::{ModuleBuilder, ModuleDeclaration, ModuleDescriptor, ABI_VERSION, MODULE_SYMBOL};
use libloading::{Library, Symbol};
use tracing::debug;

use crate::common::{normalize_path, EngineError, EngineResult};

pub type RegisterFn = Arc<dyn Fn(&mut ModuleBuilder) + Send + Sync>;

/// Binds a module file that exists on disk.
pub trait ModuleBinder: Send + Sync {
    fn bind(&self, path: &Path) -> EngineResult<ModuleDescriptor>;
}

fn module_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn build(path: &Path, builder: ModuleBuilder) -> EngineResult<ModuleDescriptor> {
    builder
        .build()
        .map_err(|e| EngineError::module_load(path, e))
}

/// Loads shared libraries exporting [`jobplug_abi::export_module!`].
///
/// Libraries are leaked on purpose: instances dispensed from a module may
/// outlive the engine, so their code must never be unmapped.
#[derive(Debug, Default, Clone, Copy)]
pub struct DylibBinder;

impl ModuleBinder for DylibBinder {
    fn bind(&self, path: &Path) -> EngineResult<ModuleDescriptor> {
        // SAFETY: loading runs the library's initialisers; module files are
        // trusted the same way the manifest naming them is.
        let library =
            unsafe { Library::new(path) }.map_err(|e| EngineError::module_load(path, e))?;
        let library: &'static Library = Box::leak(Box::new(library));

        // SAFETY: the symbol is declared by `export_module!` with this exact type.
        let declaration: Symbol<'static, *const ModuleDeclaration> =
            unsafe { library.get(MODULE_SYMBOL) }
                .map_err(|e| EngineError::module_load(path, e))?;
        let declaration: &'static ModuleDeclaration = unsafe { &**declaration };

        let module = bind_declaration(path, declaration)?;
        debug!("Bound dynamic module {:?}", path);
        Ok(module)
    }
}

/// Check an exported declaration's ABI version and run its register function
fn bind_declaration(
    path: &Path,
    declaration: &ModuleDeclaration,
) -> EngineResult<ModuleDescriptor> {
    if declaration.abi_version != ABI_VERSION {
        return Err(EngineError::module_load(
            path,
            format!(
                "ABI version {} (host expects {})",
                declaration.abi_version, ABI_VERSION
            ),
        ));
    }

    let mut builder = ModuleBuilder::new(module_name(path));
    (declaration.register)(&mut builder);
    build(path, builder)
}

/// Modules linked into the host process.
///
/// Lookup is by exact (normalized) path first, then by file name, compared
/// case-insensitively. The file still has to exist for the loader to find it.
#[derive(Default, Clone)]
pub struct StaticBinder {
    by_path: HashMap<PathBuf, RegisterFn>,
    by_name: HashMap<String, RegisterFn>,
}

impl StaticBinder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_path<F>(mut self, path: impl AsRef<Path>, register: F) -> Self
    where
        F: Fn(&mut ModuleBuilder) + Send + Sync + 'static,
    {
        self.by_path
            .insert(normalize_path(path.as_ref()), Arc::new(register));
        self
    }

    pub fn with_name<F>(mut self, file_name: &str, register: F) -> Self
    where
        F: Fn(&mut ModuleBuilder) + Send + Sync + 'static,
    {
        self.by_name
            .insert(file_name.to_lowercase(), Arc::new(register));
        self
    }

    fn lookup(&self, path: &Path) -> Option<&RegisterFn> {
        if let Some(register) = self.by_path.get(&normalize_path(path)) {
            return Some(register);
        }
        let file_name = path.file_name()?.to_string_lossy().to_lowercase();
        self.by_name.get(&file_name)
    }
}

impl ModuleBinder for StaticBinder {
    fn bind(&self, path: &Path) -> EngineResult<ModuleDescriptor> {
        let register = self.lookup(path).ok_or_else(|| {
            EngineError::module_load(path, "no statically linked module registered for this file")
        })?;

        let mut builder = ModuleBuilder::new(module_name(path));
        register(&mut builder);
        debug!("Bound static module {:?}", path);
        build(path, builder)
    }
}
