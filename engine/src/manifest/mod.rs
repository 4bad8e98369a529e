//! Manifest System
//!
//! Parses the job manifest: categories, job/module tokens, search directories,
//! and job→repository/manager mappings.

pub mod loader;
pub mod types;

pub use loader::{load_manifest, parse_manifest, split_token, LoadOptions};
pub use types::{Manifest, ManifestDocument, MappingToken, Mappings, ModuleTypeToken};
