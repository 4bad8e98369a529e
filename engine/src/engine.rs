//! Engine
//!
//! Loads a manifest, its modules, the registry and the mapping tables, then
//! dispenses prototypes, repositories and managers per request.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use jobplug_abi::{CategoryId, Context, Job, ManagerHandle, RepositoryHandle, TypeKey, TypeRole};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::common::{execution_dir, EngineError, EngineResult};
use crate::config::{EngineConfig, TokenPolicy};
use crate::factory::InstanceFactory;
use crate::manifest::{self, LoadOptions, Manifest};
use crate::mapping::{MappingEntry, MappingResolver, MappingSummary};
use crate::module::{
    DylibBinder, ModuleBinder, ModuleCache, ModuleHandle, ModuleLoader, ModuleSummary,
};
use crate::registry::{Category, JobSet, Registry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum EngineState {
    Unloaded = 0,
    Loading = 1,
    Ready = 2,
    Dispensing = 3,
}

impl EngineState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => EngineState::Unloaded,
            1 => EngineState::Loading,
            2 => EngineState::Ready,
            _ => EngineState::Dispensing,
        }
    }
}

/// Configures and constructs an [`Engine`]
pub struct EngineBuilder {
    manifest_path: PathBuf,
    config: EngineConfig,
    search_directories: Option<Vec<PathBuf>>,
    token_policy: Option<TokenPolicy>,
    binder: Option<Arc<dyn ModuleBinder>>,
    cache: Option<Arc<ModuleCache>>,
}

impl EngineBuilder {
    pub fn new(manifest_path: impl Into<PathBuf>) -> Self {
        Self {
            manifest_path: manifest_path.into(),
            config: EngineConfig::default(),
            search_directories: None,
            token_policy: None,
            binder: None,
            cache: None,
        }
    }

    /// Base settings; explicit builder calls take precedence
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Explicit search directories; an empty list defers to the manifest
    pub fn search_directories<I, P>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.search_directories = Some(dirs.into_iter().map(Into::into).collect());
        self
    }

    pub fn token_policy(mut self, policy: TokenPolicy) -> Self {
        self.token_policy = Some(policy);
        self
    }

    pub fn binder(mut self, binder: Arc<dyn ModuleBinder>) -> Self {
        self.binder = Some(binder);
        self
    }

    /// Share a module cache (e.g. [`ModuleCache::global`]) instead of owning one
    pub fn module_cache(mut self, cache: Arc<ModuleCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn build(self) -> EngineResult<Engine> {
        let state = AtomicU8::new(EngineState::Unloaded as u8);
        transition(&state, EngineState::Loading);

        let options = LoadOptions {
            token_policy: self.token_policy.unwrap_or(self.config.token_policy),
            max_bytes: self.config.max_manifest_bytes,
        };
        let manifest = manifest::load_manifest(&self.manifest_path, &options)?;

        let explicit = self
            .search_directories
            .unwrap_or_else(|| self.config.search_directories.clone());
        let search_dirs = select_search_dirs(explicit, &manifest);

        let loader = ModuleLoader::new(
            search_dirs,
            self.binder.unwrap_or_else(|| Arc::new(DylibBinder)),
            self.cache.unwrap_or_else(|| Arc::new(ModuleCache::new())),
        );

        let (modules, registry) = load_modules_and_jobs(&manifest, &loader)?;
        let mappings = Arc::new(MappingResolver::build(
            &manifest.mappings.repositories,
            &manifest.mappings.managers,
            &registry,
            &modules,
        ));

        let engine = Engine {
            manifest_path: manifest.source.clone(),
            search_dirs: loader.search_dirs().to_vec(),
            dropped_tokens: manifest.dropped_tokens,
            registry,
            factory: InstanceFactory::new(mappings),
            modules,
            state,
        };
        transition(&engine.state, EngineState::Ready);
        info!(
            "Engine ready: {} modules, {} jobs",
            engine.modules.len(),
            engine.registry.job_count()
        );
        Ok(engine)
    }
}

fn transition(state: &AtomicU8, next: EngineState) {
    let previous = EngineState::from_u8(state.swap(next as u8, Ordering::AcqRel));
    if previous != next {
        debug!("Engine state {:?} -> {:?}", previous, next);
    }
}

/// Explicit directories beat the manifest's, which beat the executable's own
fn select_search_dirs(explicit: Vec<PathBuf>, manifest: &Manifest) -> Vec<PathBuf> {
    let dirs = if !explicit.is_empty() {
        explicit
    } else if !manifest.default_search_directories.is_empty() {
        manifest.default_search_directories.clone()
    } else {
        vec![execution_dir()]
    };

    for dir in &dirs {
        if !dir.is_dir() {
            warn!("Module search directory {:?} does not exist", dir);
        }
    }
    debug!("Module search directories: {:?}", dirs);
    dirs
}

/// Load every referenced module in manifest order and build the registry
/// from the job prototypes they construct
fn load_modules_and_jobs(
    manifest: &Manifest,
    loader: &ModuleLoader,
) -> EngineResult<(Vec<Arc<ModuleHandle>>, Registry)> {
    let mut modules: Vec<Arc<ModuleHandle>> = Vec::new();
    let mut builder = Registry::builder();
    for category in &manifest.categories {
        builder.add_category(category);
    }

    let job_count = manifest.jobs.len();
    for (i, token) in manifest.module_tokens().enumerate() {
        let module = loader.load_module(&token.module)?;
        if !modules.iter().any(|m| Arc::ptr_eq(m, &module)) {
            modules.push(Arc::clone(&module));
        }

        if i < job_count {
            let descriptor = module
                .descriptor
                .find(TypeRole::Job, &token.type_name)
                .ok_or_else(|| {
                    EngineError::instantiation(
                        &token.type_name,
                        format!("module {} exports no job type with this name", token.module),
                    )
                })?;
            let job = InstanceFactory::create_job_prototype(descriptor)?;
            debug!("Registered job {} in category {}", job.type_identity, job.category_id);
            builder.add_job(job)?;
        } else if module.descriptor.find_any(&token.type_name).is_none() {
            warn!(
                "Module {} does not export {} named in the manifest",
                token.module, token.type_name
            );
        }
    }

    Ok((modules, builder.build()?))
}

/// A loaded engine. Exists only in the Ready/Dispensing states; all tables
/// are immutable, so every method takes `&self` and is safe to call from
/// many threads.
pub struct Engine {
    manifest_path: PathBuf,
    search_dirs: Vec<PathBuf>,
    dropped_tokens: usize,
    registry: Registry,
    factory: InstanceFactory,
    /// Modules this engine loaded, in load order
    modules: Vec<Arc<ModuleHandle>>,
    state: AtomicU8,
}

impl Engine {
    /// Load `manifest_path` with explicit search directories (may be empty)
    pub fn new(manifest_path: impl Into<PathBuf>, explicit_dirs: &[PathBuf]) -> EngineResult<Self> {
        Self::builder(manifest_path)
            .search_directories(explicit_dirs.iter().cloned())
            .build()
    }

    pub fn builder(manifest_path: impl Into<PathBuf>) -> EngineBuilder {
        EngineBuilder::new(manifest_path)
    }

    pub fn state(&self) -> EngineState {
        EngineState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn dispensing(&self) {
        if self
            .state
            .compare_exchange(
                EngineState::Ready as u8,
                EngineState::Dispensing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
        {
            debug!("Engine state Ready -> Dispensing");
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn available_categories(&self) -> &[Category] {
        self.registry.available_categories()
    }

    pub fn available_jobs(&self) -> &BTreeMap<CategoryId, JobSet> {
        self.registry.available_jobs()
    }

    pub fn modules(&self) -> &[Arc<ModuleHandle>] {
        &self.modules
    }

    pub fn search_directories(&self) -> &[PathBuf] {
        &self.search_dirs
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    pub fn resolve_repository_mapping(&self, job_type: &str) -> Option<&MappingEntry> {
        self.factory.mappings().resolve_repository_mapping(job_type)
    }

    pub fn resolve_manager_mapping(&self, job_type: &str) -> Option<&MappingEntry> {
        self.factory.mappings().resolve_manager_mapping(job_type)
    }

    /// Fresh copy of a registered prototype; `None` for unknown job types
    pub fn create_job_prototype(&self, job_type: &str) -> Option<Job> {
        self.dispensing();
        let key = TypeKey::parse(job_type).ok()?;
        self.registry.job(&key).cloned()
    }

    /// Repository mapped to `job_type`; `Ok(None)` when there is no mapping
    pub fn get_repository(
        &self,
        job_type: &str,
        primary: Context,
        secondary: Option<Context>,
    ) -> EngineResult<Option<RepositoryHandle>> {
        self.dispensing();
        self.factory.create_repository(job_type, primary, secondary)
    }

    /// Manager mapped to `job_type`, wired to `repository`
    pub fn get_manager(
        &self,
        job_type: &str,
        repository: RepositoryHandle,
    ) -> EngineResult<Option<ManagerHandle>> {
        self.dispensing();
        self.factory.create_manager(job_type, repository)
    }

    /// Repository and manager in one call; `Ok(None)` if either mapping is missing
    pub fn open_manager(
        &self,
        job_type: &str,
        primary: Context,
        secondary: Option<Context>,
    ) -> EngineResult<Option<ManagerHandle>> {
        if self.resolve_manager_mapping(job_type).is_none() {
            return Ok(None);
        }
        match self.get_repository(job_type, primary, secondary)? {
            Some(repository) => self.get_manager(job_type, repository),
            None => Ok(None),
        }
    }

    pub fn summary(&self) -> EngineSummary {
        EngineSummary {
            manifest: self.manifest_path.clone(),
            state: self.state(),
            search_directories: self.search_dirs.clone(),
            dropped_tokens: self.dropped_tokens,
            categories: self.registry.available_categories().to_vec(),
            jobs: self
                .registry
                .available_jobs()
                .iter()
                .map(|(category, jobs)| CategoryJobs {
                    category: category.clone(),
                    jobs: jobs.values().cloned().collect(),
                })
                .collect(),
            mappings: self
                .factory
                .mappings()
                .entries()
                .into_iter()
                .map(MappingEntry::summary)
                .collect(),
            modules: self.modules.iter().map(|m| m.summary()).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryJobs {
    pub category: CategoryId,
    pub jobs: Vec<Job>,
}

/// Serializable snapshot of a loaded engine
#[derive(Debug, Clone, Serialize)]
pub struct EngineSummary {
    pub manifest: PathBuf,
    pub state: EngineState,
    pub search_directories: Vec<PathBuf>,
    pub dropped_tokens: usize,
    pub categories: Vec<Category>,
    pub jobs: Vec<CategoryJobs>,
    pub mappings: Vec<MappingSummary>,
    pub modules: Vec<ModuleSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ErrorKind;
    use crate::module::StaticBinder;
    use jobplug_abi::{ConstructError, Manager, ModuleBuilder, Repository};
    use serde_json::json;
    use std::any::Any;
    use tempfile::TempDir;

    struct LedgerRepository {
        dsn: String,
        archive: Option<String>,
    }

    impl Repository for LedgerRepository {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    struct InvoiceManager {
        repository: RepositoryHandle,
    }

    impl Manager for InvoiceManager {
        fn repository(&self) -> &RepositoryHandle {
            &self.repository
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn text(ctx: &Context) -> Result<String, ConstructError> {
        ctx.downcast_ref::<String>()
            .cloned()
            .ok_or_else(|| "expected a string context".into())
    }

    fn register_billing(module: &mut ModuleBuilder) {
        module
            .job("Jobs.Invoice", || {
                Ok(Job::new(TypeKey::parse("Jobs.Invoice")?, CategoryId::new("Billing"))
                    .with_display_name("Invoice")
                    .with_state("currency", json!("EUR")))
            })
            .job("Jobs.Refund", || {
                Ok(Job::new(TypeKey::parse("Jobs.Refund")?, CategoryId::new("Billing")))
            })
            .repository("Repo.Ledger", |ctx| {
                Ok(Arc::new(LedgerRepository {
                    dsn: text(&ctx)?,
                    archive: None,
                }) as RepositoryHandle)
            })
            .repository_with_secondary("Repo.Archive", |ctx, archive| {
                Ok(Arc::new(LedgerRepository {
                    dsn: text(&ctx)?,
                    archive: Some(text(&archive)?),
                }) as RepositoryHandle)
            })
            .manager("Mgr.Invoice", |repository| {
                Ok(Box::new(InvoiceManager { repository }) as ManagerHandle)
            });
    }

    fn register_shipping(module: &mut ModuleBuilder) {
        module.job("Jobs.Ship", || {
            Ok(Job::new(TypeKey::parse("Jobs.Ship")?, CategoryId::new("Logistics/Shipping")))
        });
    }

    fn binder() -> Arc<dyn ModuleBinder> {
        Arc::new(
            StaticBinder::new()
                .with_name("billing.jobmod", register_billing)
                .with_name("shipping.jobmod", register_shipping),
        )
    }

    struct Fixture {
        dir: TempDir,
        manifest: PathBuf,
    }

    fn fixture(manifest: serde_json::Value) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let modules = dir.path().join("modules");
        std::fs::create_dir_all(&modules).unwrap();
        std::fs::write(modules.join("billing.jobmod"), b"").unwrap();
        std::fs::write(modules.join("shipping.jobmod"), b"").unwrap();

        let path = dir.path().join("jobs.json");
        std::fs::write(&path, serde_json::to_vec_pretty(&manifest).unwrap()).unwrap();
        Fixture { dir, manifest: path }
    }

    fn billing_manifest() -> serde_json::Value {
        json!({
            "Categories": ["Billing", "Logistics/Shipping"],
            "Jobs": [
                "billing.jobmod;Jobs.Invoice",
                "billing.jobmod;Jobs.Refund",
                "shipping.jobmod;Jobs.Ship"
            ],
            "Repositories": ["billing.jobmod;Repo.Ledger", "billing.jobmod;Repo.Archive"],
            "Managers": ["billing.jobmod;Mgr.Invoice"],
            "DefaultSearchDirectories": ["modules"],
            "Mappings": {
                "Repositories": [
                    "Jobs.Invoice;Repo.Ledger",
                    "Jobs.Refund;Repo.Archive",
                    "Jobs.Unknown;Repo.Ledger"
                ],
                "Managers": ["jobs.invoice;MGR.INVOICE"]
            }
        })
    }

    fn load(fixture: &Fixture) -> Engine {
        Engine::builder(&fixture.manifest)
            .binder(binder())
            .build()
            .unwrap()
    }

    fn ctx(value: &str) -> Context {
        Arc::new(value.to_string())
    }

    #[test]
    fn test_engine_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Engine>();
    }

    #[test]
    fn test_billing_jobs_and_categories() {
        let fixture = fixture(billing_manifest());
        let engine = load(&fixture);
        assert_eq!(engine.state(), EngineState::Ready);

        let billing = engine.registry().jobs_in(&CategoryId::new("billing")).unwrap();
        let names: Vec<&str> = billing.keys().map(|k| k.as_str()).collect();
        assert_eq!(names, vec!["Jobs.Invoice", "Jobs.Refund"]);

        let categories: Vec<String> = engine
            .available_categories()
            .iter()
            .map(|c| c.id.to_string())
            .collect();
        assert_eq!(categories, vec!["/", "billing", "logistics", "logistics/shipping"]);

        assert_eq!(engine.available_jobs().len(), 2);
        assert_eq!(engine.modules().len(), 2);
        assert_eq!(engine.search_directories(), &[fixture.dir.path().join("modules")]);
    }

    #[test]
    fn test_prototypes_are_independent_copies() {
        let fixture = fixture(billing_manifest());
        let engine = load(&fixture);

        let mut first = engine.create_job_prototype("JOBS.invoice").unwrap();
        let second = engine.create_job_prototype("Jobs.Invoice").unwrap();
        assert_eq!(first, second);
        assert!(!std::ptr::eq(&first, &second));
        assert_eq!(first.name(), "Invoice");

        first.set_state("currency", json!("USD"));
        let third = engine.create_job_prototype("Jobs.Invoice").unwrap();
        assert_eq!(third.get_state::<String>("currency").as_deref(), Some("EUR"));
        assert!(engine.create_job_prototype("Jobs.Unknown").is_none());
        assert_eq!(engine.state(), EngineState::Dispensing);
    }

    #[test]
    fn test_repository_and_manager_dispensing() {
        let fixture = fixture(billing_manifest());
        let engine = load(&fixture);

        let repository = engine
            .get_repository("Jobs.Invoice", ctx("db://ledger"), None)
            .unwrap()
            .unwrap();
        let ledger = repository.as_any().downcast_ref::<LedgerRepository>().unwrap();
        assert_eq!(ledger.dsn, "db://ledger");

        let manager = engine
            .get_manager("JOBS.INVOICE", Arc::clone(&repository))
            .unwrap()
            .unwrap();
        assert!(Arc::ptr_eq(manager.repository(), &repository));

        let archive = engine
            .get_repository("Jobs.Refund", ctx("db://ledger"), Some(ctx("db://archive")))
            .unwrap()
            .unwrap();
        let archive = archive.as_any().downcast_ref::<LedgerRepository>().unwrap();
        assert_eq!(archive.archive.as_deref(), Some("db://archive"));

        let opened = engine
            .open_manager("Jobs.Invoice", ctx("db://ledger"), None)
            .unwrap()
            .unwrap();
        assert!(opened.as_any().downcast_ref::<InvoiceManager>().is_some());
        assert!(engine
            .open_manager("Jobs.Refund", ctx("db://ledger"), Some(ctx("db://archive")))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_unmapped_and_unknown_jobs() {
        let fixture = fixture(billing_manifest());
        let engine = load(&fixture);

        assert!(engine.resolve_repository_mapping("Jobs.Unknown").is_none());
        assert!(engine.resolve_manager_mapping("Jobs.Refund").is_none());
        assert!(engine
            .get_repository("Jobs.Ship", ctx("db://ledger"), None)
            .unwrap()
            .is_none());

        let entry = engine.resolve_manager_mapping("Jobs.Invoice").unwrap();
        assert_eq!(entry.target.full_name(), "Mgr.Invoice");
    }

    #[test]
    fn test_missing_module_aborts_load() {
        let mut manifest = billing_manifest();
        manifest["Jobs"] = json!(["missing.jobmod;Jobs.Invoice"]);
        let fixture = fixture(manifest);

        let err = Engine::builder(&fixture.manifest)
            .binder(binder())
            .build()
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::ModuleNotFound);
    }

    #[test]
    fn test_missing_job_type_is_instantiation_error() {
        let mut manifest = billing_manifest();
        manifest["Jobs"] = json!(["billing.jobmod;Jobs.Payroll"]);
        let fixture = fixture(manifest);

        let err = Engine::builder(&fixture.manifest)
            .binder(binder())
            .build()
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Instantiation);
    }

    #[test]
    fn test_token_policy() {
        let mut manifest = billing_manifest();
        manifest["Jobs"]
            .as_array_mut()
            .unwrap()
            .push(json!("no-separator"));
        let fixture = fixture(manifest);

        let lenient = load(&fixture);
        assert_eq!(lenient.summary().dropped_tokens, 1);
        assert_eq!(lenient.registry().job_count(), 3);

        let err = Engine::builder(&fixture.manifest)
            .binder(binder())
            .token_policy(TokenPolicy::Strict)
            .build()
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_explicit_directories_override_manifest() {
        let fixture = fixture(billing_manifest());
        let elsewhere = tempfile::tempdir().unwrap();

        let err = Engine::builder(&fixture.manifest)
            .binder(binder())
            .search_directories([elsewhere.path()])
            .build()
            .err()
            .unwrap();
        match err {
            EngineError::ModuleNotFound { searched, .. } => {
                assert!(searched.iter().any(|p| p.starts_with(elsewhere.path())));
                assert!(!searched.iter().any(|p| p.starts_with(fixture.dir.path())));
            }
            other => panic!("expected ModuleNotFound, got {}", other),
        }

        let empty: Vec<PathBuf> = Vec::new();
        let engine = Engine::builder(&fixture.manifest)
            .binder(binder())
            .search_directories(empty)
            .build()
            .unwrap();
        assert_eq!(engine.search_directories(), &[fixture.dir.path().join("modules")]);
    }

    #[test]
    fn test_new_uses_dynamic_binder() {
        let fixture = fixture(billing_manifest());
        let err = Engine::new(&fixture.manifest, &[]).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::ModuleLoad);

        let err = Engine::new(fixture.dir.path().join("absent.json"), &[])
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_shared_cache_binds_once() {
        let fixture = fixture(billing_manifest());
        let cache = Arc::new(ModuleCache::new());

        let first = Engine::builder(&fixture.manifest)
            .binder(binder())
            .module_cache(Arc::clone(&cache))
            .build()
            .unwrap();
        let second = Engine::builder(&fixture.manifest)
            .binder(binder())
            .module_cache(Arc::clone(&cache))
            .build()
            .unwrap();

        assert_eq!(cache.len(), 2);
        assert!(Arc::ptr_eq(&first.modules()[0], &second.modules()[0]));
    }

    #[test]
    fn test_global_cache_shared_across_engines() {
        let fixture = fixture(billing_manifest());
        let build = || {
            Engine::builder(&fixture.manifest)
                .binder(binder())
                .module_cache(ModuleCache::global())
                .build()
                .unwrap()
        };

        let first = build();
        let second = build();
        assert!(Arc::ptr_eq(&first.modules()[0], &second.modules()[0]));
        assert!(Arc::ptr_eq(&first.modules()[1], &second.modules()[1]));

        let billing = &first.modules()[0];
        let cached = ModuleCache::global().get(&billing.path).unwrap();
        assert!(Arc::ptr_eq(&cached, billing));
    }

    #[test]
    fn test_concurrent_dispensing() {
        let fixture = fixture(billing_manifest());
        let engine = load(&fixture);

        std::thread::scope(|scope| {
            for i in 0..8 {
                let engine = &engine;
                scope.spawn(move || {
                    for _ in 0..50 {
                        let job = engine.create_job_prototype("Jobs.Invoice").unwrap();
                        assert_eq!(job.type_identity.as_str(), "Jobs.Invoice");
                        let repository = engine
                            .get_repository("Jobs.Invoice", ctx(&format!("db://{}", i)), None)
                            .unwrap()
                            .unwrap();
                        assert!(engine.get_manager("Jobs.Invoice", repository).unwrap().is_some());
                    }
                });
            }
        });
        assert_eq!(engine.state(), EngineState::Dispensing);
    }

    #[test]
    fn test_summary_serializes() {
        let fixture = fixture(billing_manifest());
        let engine = load(&fixture);

        let summary = serde_json::to_value(engine.summary()).unwrap();
        assert_eq!(summary["state"], "ready");
        assert_eq!(summary["mappings"].as_array().unwrap().len(), 3);
        assert_eq!(summary["modules"].as_array().unwrap().len(), 2);
    }
}
