//! jobplug
//!
//! Manifest-driven registration and resolution of job plugins. A manifest
//! names job types, the modules exporting them, and which repository and
//! manager types serve each job; the [`Engine`] loads it once and then
//! dispenses job prototypes, repositories and managers by job type.

pub mod common;
pub mod config;
pub mod engine;
pub mod factory;
pub mod manifest;
pub mod mapping;
pub mod module;
pub mod registry;

pub use common::{EngineError, EngineResult, ErrorKind};
pub use config::{EngineConfig, TokenPolicy};
pub use engine::{CategoryJobs, Engine, EngineBuilder, EngineState, EngineSummary};
pub use factory::InstanceFactory;
pub use mapping::{MappingEntry, MappingKind, MappingResolver};
pub use module::{DylibBinder, ModuleBinder, ModuleCache, ModuleHandle, StaticBinder};
pub use registry::{Category, Registry};

pub use jobplug_abi as abi;
pub use jobplug_abi::{
    export_module, CategoryId, Context, Job, Manager, ManagerHandle, ModuleBuilder, Repository,
    RepositoryHandle, TypeKey,
};
