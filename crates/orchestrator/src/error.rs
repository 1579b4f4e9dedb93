use std::path::PathBuf;

use shared::error::{ErrorCategory, UnsupportedFormat};
use thiserror::Error;

use crate::hooks::HookName;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid JSON: {0}")]
    Json(#[source] serde_json::Error),
    #[error("invalid YAML: {0}")]
    Yaml(String),
    #[error(transparent)]
    Unsupported(#[from] UnsupportedFormat),
    #[error("failed to serialize state as {format}: {reason}")]
    Serialize {
        format: &'static str,
        reason: String,
    },
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("WebSocket URL not provided")]
    MissingWebsocketUrl,
    #[error("invalid WebSocket URL '{url}': {source}")]
    InvalidWebsocketUrl {
        url: String,
        source: url::ParseError,
    },
    #[error("invalid request header '{name}': {reason}")]
    InvalidHeader { name: String, reason: String },
    #[error("push channel is not supported in this environment")]
    PushChannelUnsupported,
    #[error("failed to connect push channel {url}: {source}")]
    PushChannelConnect { url: String, source: anyhow::Error },
    #[error("API request failed: {status_text}")]
    RequestStatus {
        url: String,
        status: u16,
        status_text: String,
    },
    #[error("API request to {url} failed: {source}")]
    Request { url: String, source: reqwest::Error },
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("failed to read file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{event} hook failed: {source}")]
    Hook {
        event: HookName,
        source: anyhow::Error,
    },
    #[error("middleware failed: {0}")]
    Middleware(#[source] anyhow::Error),
    #[error("state update re-entered from a state hook")]
    ReentrantStateUpdate,
}

impl OrchestratorError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::MissingWebsocketUrl | Self::InvalidWebsocketUrl { .. } | Self::InvalidHeader { .. } => {
                ErrorCategory::Configuration
            }
            Self::PushChannelUnsupported => ErrorCategory::Capability,
            Self::PushChannelConnect { .. } | Self::RequestStatus { .. } | Self::Request { .. } => {
                ErrorCategory::Transport
            }
            Self::Codec(_) => ErrorCategory::Parse,
            Self::Read { .. } => ErrorCategory::Read,
            Self::Hook { .. } | Self::Middleware(_) | Self::ReentrantStateUpdate => {
                ErrorCategory::Extension
            }
        }
    }
}

impl From<UnsupportedFormat> for OrchestratorError {
    fn from(value: UnsupportedFormat) -> Self {
        Self::Codec(CodecError::Unsupported(value))
    }
}
