use std::{
    cell::Cell,
    path::Path,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use reqwest::Client;
use serde_json::Value;
use shared::{
    domain::{ExportFormat, FileFormat, FileUpload, UPLOADED_FILE_KEY, WEBSOCKET_DATA_KEY},
    protocol::RequestOptions,
};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

pub mod codec;
pub mod config;
pub mod error;
pub mod hooks;
pub mod middleware;
pub mod push_channel;
mod request;
pub mod store;

pub use config::{load_settings, OrchestratorConfig, Settings};
pub use error::{CodecError, OrchestratorError};
pub use hooks::{hook_fn, Hook, HookEvent, HookName, HookRegistry};
pub use middleware::{Middleware, MiddlewareChain};
pub use push_channel::{
    PushChannelConnector, PushChannelSession, TungsteniteConnector, UnsupportedPushChannel,
};
pub use store::{StateSnapshot, StateStore, StateSubscription};

use hooks::run_hooks;
use push_channel::ActivePushChannel;

pub type Result<T, E = OrchestratorError> = std::result::Result<T, E>;

thread_local! {
    static IN_STATE_UPDATE: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as inside a `set_state` cycle for as long as it lives.
struct StateUpdateScope;

impl StateUpdateScope {
    fn enter() -> Result<Self> {
        if IN_STATE_UPDATE.with(|flag| flag.replace(true)) {
            return Err(OrchestratorError::ReentrantStateUpdate);
        }
        Ok(Self)
    }
}

impl Drop for StateUpdateScope {
    fn drop(&mut self) {
        IN_STATE_UPDATE.with(|flag| flag.set(false));
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Mediates between application state, the push channel, the request client, and
/// file imports/exports.
///
/// Constructed once by the owning shell and shared as `Arc<Orchestrator>`. All state
/// mutation goes through [`Orchestrator::set_state`], whose
/// `beforeStateUpdate -> mutation -> afterStateUpdate -> publish` cycle is serialized.
/// Hook and middleware failures propagate to the caller of the triggering operation.
pub struct Orchestrator {
    config: OrchestratorConfig,
    http: Client,
    push_connector: Arc<dyn PushChannelConnector>,
    push_supported: bool,
    store: StateStore,
    update_gate: Mutex<()>,
    hooks: Mutex<HookRegistry>,
    middleware: Mutex<MiddlewareChain>,
    push_channel: tokio::sync::Mutex<Option<ActivePushChannel>>,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig) -> Arc<Self> {
        Self::new_with_push_connector(config, Arc::new(TungsteniteConnector))
    }

    pub fn new_with_push_connector(
        config: OrchestratorConfig,
        push_connector: Arc<dyn PushChannelConnector>,
    ) -> Arc<Self> {
        let push_supported = push_connector.is_supported();
        if !push_supported {
            info!("orchestrator: push channel unsupported in this environment");
        }
        let hooks = HookRegistry::seeded(config.hooks());
        Arc::new(Self {
            config,
            http: Client::new(),
            push_connector,
            push_supported,
            store: StateStore::new(),
            update_gate: Mutex::new(()),
            hooks: Mutex::new(hooks),
            middleware: Mutex::new(MiddlewareChain::default()),
            push_channel: tokio::sync::Mutex::new(None),
        })
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn push_channel_supported(&self) -> bool {
        self.push_supported
    }

    // ---- state store ----

    /// Writes one key and returns the resulting snapshot. Nothing is published if a
    /// hook fails.
    pub fn set_state(&self, key: impl Into<String>, value: Value) -> Result<StateSnapshot> {
        let key = key.into();
        let _scope = StateUpdateScope::enter()?;
        let _gate = lock(&self.update_gate);

        self.run_hooks(&HookEvent::BeforeStateUpdate {
            key: &key,
            value: &value,
        })?;
        let snapshot = self.store.snapshot().with(&key, value.clone());
        self.run_hooks(&HookEvent::AfterStateUpdate {
            key: &key,
            value: &value,
            snapshot: &snapshot,
        })?;
        self.store.publish(snapshot.clone());
        Ok(snapshot)
    }

    pub async fn get_state(&self) -> StateSnapshot {
        let mut subscription = self.store.subscribe();
        subscription
            .next()
            .await
            .unwrap_or_else(|| self.store.snapshot())
    }

    pub async fn get_state_value(&self, key: &str) -> Option<Value> {
        self.get_state().await.get(key).cloned()
    }

    pub fn subscribe(&self) -> StateSubscription {
        self.store.subscribe()
    }

    // ---- hooks ----

    pub fn add_hook<F>(&self, name: impl Into<HookName>, callback: F)
    where
        F: Fn(&HookEvent<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register_hook(name, hook_fn(callback));
    }

    /// Appends an already shared callback. Registering the same hook twice makes it
    /// fire twice.
    pub fn register_hook(&self, name: impl Into<HookName>, hook: Hook) {
        lock(&self.hooks).register(name.into(), hook);
    }

    /// Fires the hooks registered under a custom event name.
    pub fn emit(&self, name: &str, payload: &Value) -> Result<()> {
        self.run_hooks(&HookEvent::Custom { name, payload })
    }

    pub fn hook_count(&self, name: impl Into<HookName>) -> usize {
        lock(&self.hooks).count(&name.into())
    }

    pub fn hook_names(&self) -> Vec<HookName> {
        lock(&self.hooks).names()
    }

    fn run_hooks(&self, event: &HookEvent<'_>) -> Result<()> {
        // Cloned out so hooks can register more hooks without deadlocking.
        let callbacks = lock(&self.hooks).callbacks(&event.name());
        run_hooks(&callbacks, event)
    }

    // ---- middleware ----

    pub fn add_middleware<F>(&self, stage: F)
    where
        F: Fn(Value) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        lock(&self.middleware).push(Arc::new(stage));
    }

    pub fn apply_middleware(&self, data: Value) -> Result<Value> {
        let chain = lock(&self.middleware).clone();
        chain.apply(data)
    }

    pub fn middleware_len(&self) -> usize {
        lock(&self.middleware).len()
    }

    // ---- push channel ----

    /// Opens the push channel at `url`, or the configured default when `url` is `None`
    /// or empty.
    ///
    /// A connection that is still open is closed first (its `websocketDisconnect`
    /// hooks run) so at most one connection is ever live. `websocketConnect` hooks run
    /// once the new connection is open; if one fails, the connection is closed again
    /// and the hook error is returned.
    pub async fn connect_websocket(self: &Arc<Self>, url: Option<&str>) -> Result<()> {
        let url = url
            .filter(|url| !url.trim().is_empty())
            .map(str::to_owned)
            .or_else(|| self.config.websocket_url.clone())
            .ok_or(OrchestratorError::MissingWebsocketUrl)?;

        if !self.push_supported {
            return Err(OrchestratorError::PushChannelUnsupported);
        }

        Url::parse(&url).map_err(|source| OrchestratorError::InvalidWebsocketUrl {
            url: url.clone(),
            source,
        })?;

        let mut active = self.push_channel.lock().await;
        if let Some(previous) = active.take() {
            info!(
                url = %previous.url,
                connection_id = %previous.connection_id,
                "push channel: closing previous connection before reconnect"
            );
            previous.close().await;
        }

        let mut session = self.push_connector.open(&url).await.map_err(|source| {
            error!(%url, "push channel: connect failed: {source:#}");
            OrchestratorError::PushChannelConnect {
                url: url.clone(),
                source,
            }
        })?;

        let connection_id = Uuid::new_v4();
        info!(%url, %connection_id, "push channel: connected");

        if let Err(err) = self.run_hooks(&HookEvent::WebsocketConnect { url: &url }) {
            warn!(%url, %connection_id, "push channel: connect hook failed, closing: {err}");
            if let Err(close_err) = session.close().await {
                warn!(%url, %connection_id, "push channel: close failed: {close_err:#}");
            }
            return Err(err);
        }

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let reader = tokio::spawn(Arc::clone(self).run_push_channel(
            url.clone(),
            connection_id,
            session,
            shutdown_rx,
        ));
        *active = Some(ActivePushChannel::new(url, connection_id, shutdown_tx, reader));
        Ok(())
    }

    /// Closes the live connection, if any. Returns once its disconnect hooks have run.
    pub async fn disconnect_websocket(&self) {
        let previous = self.push_channel.lock().await.take();
        if let Some(previous) = previous {
            info!(
                url = %previous.url,
                connection_id = %previous.connection_id,
                "push channel: disconnecting"
            );
            previous.close().await;
        }
    }

    pub async fn is_websocket_connected(&self) -> bool {
        self.push_channel
            .lock()
            .await
            .as_ref()
            .is_some_and(ActivePushChannel::is_live)
    }

    pub async fn websocket_url(&self) -> Option<String> {
        self.push_channel
            .lock()
            .await
            .as_ref()
            .map(|active| active.url.clone())
    }

    async fn run_push_channel(
        self: Arc<Self>,
        url: String,
        connection_id: Uuid,
        mut session: Box<dyn PushChannelSession>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        loop {
            let frame = tokio::select! {
                biased;
                _ = &mut shutdown => None,
                frame = session.next_frame() => Some(frame),
            };
            let Some(frame) = frame else {
                if let Err(err) = session.close().await {
                    warn!(%url, %connection_id, "push channel: close failed: {err:#}");
                }
                break;
            };

            match frame {
                Some(Ok(text)) => {
                    if let Err(err) = self.ingest_push_frame(&text) {
                        error!(
                            %url,
                            %connection_id,
                            category = ?err.category(),
                            "push channel: dropped inbound message: {err}"
                        );
                    }
                }
                Some(Err(err)) => {
                    error!(%url, %connection_id, "push channel: {err:#}");
                    break;
                }
                None => {
                    info!(%url, %connection_id, "push channel: closed by peer");
                    break;
                }
            }
        }

        if let Err(err) = self.run_hooks(&HookEvent::WebsocketDisconnect { url: &url }) {
            error!(%url, %connection_id, "push channel: disconnect hook failed: {err}");
        }
        info!(%url, %connection_id, "push channel: disconnected");
    }

    fn ingest_push_frame(&self, text: &str) -> Result<()> {
        let payload: Value = serde_json::from_str(text).map_err(CodecError::Json)?;
        let data = self.apply_middleware(payload)?;
        self.set_state(WEBSOCKET_DATA_KEY, data)?;
        Ok(())
    }

    // ---- request client ----

    /// Issues a request against `api_base_url + endpoint` and returns the JSON body
    /// after middleware. Non-success statuses are errors; failures are logged and
    /// returned, never retried.
    pub async fn api_request(&self, endpoint: &str, options: RequestOptions) -> Result<Value> {
        let url = request::build_url(self.config.api_base_url.as_deref(), endpoint);
        self.run_hooks(&HookEvent::ApiRequest {
            url: &url,
            options: &options,
        })?;

        let result = self.send_api_request(&url, &options).await;
        if let Err(err) = &result {
            error!(%url, category = ?err.category(), "api request failed: {err}");
        }
        result
    }

    async fn send_api_request(&self, url: &str, options: &RequestOptions) -> Result<Value> {
        let headers = request::build_headers(options)?;
        let mut builder = self
            .http
            .request(request::method(options.method), url)
            .headers(headers);
        if let Some(body) = &options.body {
            builder = builder.body(body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|source| OrchestratorError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(OrchestratorError::RequestStatus {
                url: url.to_string(),
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or_default().to_string(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|source| OrchestratorError::Request {
                url: url.to_string(),
                source,
            })?;
        let data: Value = serde_json::from_str(&body).map_err(CodecError::Json)?;
        debug!(%url, "api request succeeded");
        self.apply_middleware(data)
    }

    // ---- file codec ----

    pub fn parse_file(&self, content: &str, format: FileFormat) -> Result<Value> {
        codec::parse_file(content, format).map_err(|err| {
            error!(%format, "file parsing error: {err}");
            err.into()
        })
    }

    /// Reads `path` as text and runs it through [`Orchestrator::ingest_file`].
    pub async fn handle_file_upload(&self, path: impl AsRef<Path>) -> Result<FileUpload> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| OrchestratorError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        self.ingest_file(name, content)
    }

    /// Parses already-read file content, fires `fileUpload` hooks, and stores the
    /// record under `uploadedFile`. The format comes from the file name's extension and
    /// is checked before any parsing.
    pub fn ingest_file(
        &self,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<FileUpload> {
        let name = name.into();
        let content = content.into();
        let format = FileFormat::from_file_name(&name)?;
        let data = self.parse_file(&content, format)?;
        let upload = FileUpload {
            name,
            content,
            format,
            data,
        };

        self.run_hooks(&HookEvent::FileUpload(&upload))?;
        let record = serde_json::to_value(&upload).map_err(|err| CodecError::Serialize {
            format: FileFormat::Json.as_str(),
            reason: err.to_string(),
        })?;
        self.set_state(UPLOADED_FILE_KEY, record)?;
        info!(name = %upload.name, format = %upload.format, "file imported");
        Ok(upload)
    }

    pub async fn export_state(&self, format: ExportFormat) -> Result<String> {
        let snapshot = self.get_state().await;
        Ok(codec::serialize_state(&snapshot, format)?)
    }

    // ---- lifecycle ----

    /// Closes the push channel, empties state, drops middleware, and re-seeds hooks
    /// with the default names plus the hooks from [`OrchestratorConfig`].
    ///
    /// The reader task has fully stopped before the empty snapshot is published, so
    /// no in-flight frame can land after the reset.
    pub async fn reset(&self) {
        self.disconnect_websocket().await;
        {
            let _gate = lock(&self.update_gate);
            self.store.publish(StateSnapshot::default());
        }
        *lock(&self.hooks) = HookRegistry::seeded(self.config.hooks());
        lock(&self.middleware).clear();
        info!("orchestrator: reset");
    }

    pub async fn dispose(&self) {
        self.disconnect_websocket().await;
        info!("orchestrator: disposed");
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
