//! Common Error Types
//!
//! Engine error taxonomy with stable numeric codes.

use std::path::{Path, PathBuf};

use jobplug_abi::ConstructError;
use thiserror::Error;

/// Error categories with stable codes (used as CLI exit codes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration = 2,
    ModuleNotFound = 3,
    ModuleLoad = 4,
    Instantiation = 5,
    Construction = 6,
}

impl ErrorKind {
    pub fn code(&self) -> i32 {
        *self as i32
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::ModuleNotFound => "module_not_found",
            ErrorKind::ModuleLoad => "module_load",
            ErrorKind::Instantiation => "instantiation",
            ErrorKind::Construction => "construction",
        }
    }
}

/// Errors raised while loading an engine or dispensing instances.
///
/// A missing mapping is not an error; lookups return `None` instead.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Manifest or engine configuration unreadable, malformed, or inconsistent
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Module reference absent from the direct path and every search directory
    #[error("module not found: {reference} (searched {} location(s))", .searched.len())]
    ModuleNotFound {
        reference: String,
        searched: Vec<PathBuf>,
    },

    /// Module file exists but could not be bound
    #[error("failed to load module {}: {reason}", .path.display())]
    ModuleLoad { path: PathBuf, reason: String },

    /// Target type offers no constructor for the supplied arguments
    #[error("cannot instantiate {type_name}: {reason}")]
    Instantiation { type_name: String, reason: String },

    /// Constructor ran and failed
    #[error("constructor for {type_name} failed: {source}")]
    Construction {
        type_name: String,
        #[source]
        source: ConstructError,
    },
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Configuration(_) => ErrorKind::Configuration,
            EngineError::ModuleNotFound { .. } => ErrorKind::ModuleNotFound,
            EngineError::ModuleLoad { .. } => ErrorKind::ModuleLoad,
            EngineError::Instantiation { .. } => ErrorKind::Instantiation,
            EngineError::Construction { .. } => ErrorKind::Construction,
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn module_load(path: &Path, reason: impl ToString) -> Self {
        Self::ModuleLoad {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    pub fn instantiation(type_name: impl ToString, reason: impl Into<String>) -> Self {
        Self::Instantiation {
            type_name: type_name.to_string(),
            reason: reason.into(),
        }
    }

    pub fn construction(type_name: impl ToString, source: ConstructError) -> Self {
        Self::Construction {
            type_name: type_name.to_string(),
            source,
        }
    }
}
