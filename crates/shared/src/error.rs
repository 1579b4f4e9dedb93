use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse classification of orchestrator failures, used for logging and by callers
/// deciding how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Configuration,
    Transport,
    Parse,
    Read,
    Extension,
    Capability,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported file type: {0}")]
pub struct UnsupportedFormat(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown HTTP method: {0}")]
pub struct UnknownMethod(pub String);
