use std::{collections::HashMap, fmt, fs, path::Path};

use tracing::warn;

use crate::hooks::{hook_fn, Hook, HookEvent, HookName};

pub const SETTINGS_FILE: &str = "orchestrator.toml";

/// Construction-time configuration. Hooks given here are appended to the default hook
/// map and survive [`crate::Orchestrator::reset`].
#[derive(Clone, Default)]
pub struct OrchestratorConfig {
    pub websocket_url: Option<String>,
    pub api_base_url: Option<String>,
    hooks: Vec<(HookName, Hook)>,
}

impl OrchestratorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_websocket_url(mut self, url: impl Into<String>) -> Self {
        self.websocket_url = non_empty(url.into());
        self
    }

    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = non_empty(url.into());
        self
    }

    pub fn with_hook<F>(mut self, name: impl Into<HookName>, callback: F) -> Self
    where
        F: Fn(&HookEvent<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.hooks.push((name.into(), hook_fn(callback)));
        self
    }

    pub fn hooks(&self) -> &[(HookName, Hook)] {
        &self.hooks
    }
}

impl fmt::Debug for OrchestratorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrchestratorConfig")
            .field("websocket_url", &self.websocket_url)
            .field("api_base_url", &self.api_base_url)
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pub websocket_url: Option<String>,
    pub api_base_url: Option<String>,
}

impl From<Settings> for OrchestratorConfig {
    fn from(settings: Settings) -> Self {
        Self {
            websocket_url: settings.websocket_url.and_then(non_empty),
            api_base_url: settings.api_base_url.and_then(non_empty),
            hooks: Vec::new(),
        }
    }
}

pub fn load_settings() -> Settings {
    load_settings_from(Path::new(SETTINGS_FILE), |name| std::env::var(name).ok())
}

/// Defaults, then `path` if it exists and parses, then environment overrides. The
/// `APP__` prefixed variables win over the bare ones.
pub fn load_settings_from(path: &Path, env: impl Fn(&str) -> Option<String>) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<HashMap<String, String>>(&raw) {
            Ok(file_cfg) => {
                if let Some(v) = file_cfg.get("websocket_url") {
                    settings.websocket_url = Some(v.clone());
                }
                if let Some(v) = file_cfg.get("api_base_url") {
                    settings.api_base_url = Some(v.clone());
                }
            }
            Err(err) => warn!(path = %path.display(), "ignoring unreadable settings file: {err}"),
        }
    }

    if let Some(v) = env("WEBSOCKET_URL") {
        settings.websocket_url = Some(v);
    }
    if let Some(v) = env("APP__WEBSOCKET_URL") {
        settings.websocket_url = Some(v);
    }

    if let Some(v) = env("API_BASE_URL") {
        settings.api_base_url = Some(v);
    }
    if let Some(v) = env("APP__API_BASE_URL") {
        settings.api_base_url = Some(v);
    }

    settings
}
