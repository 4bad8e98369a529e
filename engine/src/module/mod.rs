//! Module System
//!
//! Locates, binds, and caches the code modules a manifest references.

pub mod binder;
pub mod cache;
pub mod loader;

pub use binder::{DylibBinder, ModuleBinder, RegisterFn, StaticBinder};
pub use cache::{ModuleCache, ModuleHandle, ModuleSummary};
pub use loader::ModuleLoader;
