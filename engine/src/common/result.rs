//! Common Result Type
//!
//! Type alias for engine results.

use super::error::EngineError;

/// Engine result type
pub type EngineResult<T> = Result<T, EngineError>;
