//! Common Utilities
//!
//! Error taxonomy, result alias, and path helpers shared across the engine.

pub mod error;
pub mod paths;
pub mod result;

pub use error::{EngineError, ErrorKind};
pub use paths::{execution_dir, jobplug_dir, normalize_path};
pub use result::EngineResult;
