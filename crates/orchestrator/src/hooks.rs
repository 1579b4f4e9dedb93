//! Named extension points and their typed payloads.

use std::{collections::BTreeMap, fmt, sync::Arc};

use serde_json::Value;
use shared::{domain::FileUpload, protocol::RequestOptions};

use crate::{error::OrchestratorError, store::StateSnapshot};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HookName {
    BeforeStateUpdate,
    AfterStateUpdate,
    WebsocketConnect,
    WebsocketDisconnect,
    FileUpload,
    ApiRequest,
    Custom(String),
}

impl HookName {
    pub const DEFAULTS: [HookName; 6] = [
        HookName::BeforeStateUpdate,
        HookName::AfterStateUpdate,
        HookName::WebsocketConnect,
        HookName::WebsocketDisconnect,
        HookName::FileUpload,
        HookName::ApiRequest,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            Self::BeforeStateUpdate => "beforeStateUpdate",
            Self::AfterStateUpdate => "afterStateUpdate",
            Self::WebsocketConnect => "websocketConnect",
            Self::WebsocketDisconnect => "websocketDisconnect",
            Self::FileUpload => "fileUpload",
            Self::ApiRequest => "apiRequest",
            Self::Custom(name) => name,
        }
    }

    pub fn is_default(&self) -> bool {
        !matches!(self, Self::Custom(_))
    }
}

impl From<&str> for HookName {
    fn from(value: &str) -> Self {
        Self::DEFAULTS
            .into_iter()
            .find(|name| name.as_str() == value)
            .unwrap_or_else(|| Self::Custom(value.to_string()))
    }
}

impl From<String> for HookName {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl fmt::Display for HookName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload handed to a hook. Each default event name always receives its own variant;
/// hooks registered under a custom name receive [`HookEvent::Custom`].
#[derive(Debug, Clone, Copy)]
pub enum HookEvent<'a> {
    BeforeStateUpdate {
        key: &'a str,
        value: &'a Value,
    },
    AfterStateUpdate {
        key: &'a str,
        value: &'a Value,
        snapshot: &'a StateSnapshot,
    },
    WebsocketConnect {
        url: &'a str,
    },
    WebsocketDisconnect {
        url: &'a str,
    },
    FileUpload(&'a FileUpload),
    ApiRequest {
        url: &'a str,
        options: &'a RequestOptions,
    },
    Custom {
        name: &'a str,
        payload: &'a Value,
    },
}

impl HookEvent<'_> {
    pub fn name(&self) -> HookName {
        match self {
            Self::BeforeStateUpdate { .. } => HookName::BeforeStateUpdate,
            Self::AfterStateUpdate { .. } => HookName::AfterStateUpdate,
            Self::WebsocketConnect { .. } => HookName::WebsocketConnect,
            Self::WebsocketDisconnect { .. } => HookName::WebsocketDisconnect,
            Self::FileUpload(_) => HookName::FileUpload,
            Self::ApiRequest { .. } => HookName::ApiRequest,
            Self::Custom { name, .. } => HookName::from(*name),
        }
    }
}

pub type Hook = Arc<dyn Fn(&HookEvent<'_>) -> anyhow::Result<()> + Send + Sync>;

pub fn hook_fn<F>(callback: F) -> Hook
where
    F: Fn(&HookEvent<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(callback)
}

/// Event name to ordered callbacks. Registration is append-only and not deduplicated.
#[derive(Clone, Default)]
pub struct HookRegistry {
    hooks: BTreeMap<HookName, Vec<Hook>>,
}

impl HookRegistry {
    pub fn with_defaults() -> Self {
        let hooks = HookName::DEFAULTS
            .into_iter()
            .map(|name| (name, Vec::new()))
            .collect();
        Self { hooks }
    }

    /// Default names with `configured` hooks appended in order.
    pub fn seeded(configured: &[(HookName, Hook)]) -> Self {
        let mut registry = Self::with_defaults();
        for (name, hook) in configured {
            registry.register(name.clone(), Arc::clone(hook));
        }
        registry
    }

    pub fn register(&mut self, name: HookName, hook: Hook) {
        self.hooks.entry(name).or_default().push(hook);
    }

    pub fn callbacks(&self, name: &HookName) -> Vec<Hook> {
        self.hooks.get(name).cloned().unwrap_or_default()
    }

    pub fn count(&self, name: &HookName) -> usize {
        self.hooks.get(name).map_or(0, Vec::len)
    }

    pub fn names(&self) -> Vec<HookName> {
        self.hooks.keys().cloned().collect()
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.hooks.iter().map(|(name, hooks)| (name.as_str(), hooks.len())))
            .finish()
    }
}

/// Runs `hooks` in order. The first failure stops the remaining hooks.
pub(crate) fn run_hooks(hooks: &[Hook], event: &HookEvent<'_>) -> Result<(), OrchestratorError> {
    for hook in hooks {
        hook(event).map_err(|source| OrchestratorError::Hook {
            event: event.name(),
            source,
        })?;
    }
    Ok(())
}
