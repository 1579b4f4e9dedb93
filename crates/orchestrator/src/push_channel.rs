//! Persistent duplex transport behind a capability-gated interface.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use tokio::{net::TcpStream, sync::oneshot, task::JoinHandle};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{self, Message},
    MaybeTlsStream, WebSocketStream,
};
use tracing::warn;
use uuid::Uuid;

#[async_trait]
pub trait PushChannelSession: Send {
    /// Next inbound text frame. `None` once the peer has closed the channel.
    async fn next_frame(&mut self) -> Option<Result<String>>;
    async fn close(&mut self) -> Result<()>;
}

#[async_trait]
pub trait PushChannelConnector: Send + Sync {
    fn is_supported(&self) -> bool;
    async fn open(&self, url: &str) -> Result<Box<dyn PushChannelSession>>;
}

pub struct TungsteniteConnector;

#[async_trait]
impl PushChannelConnector for TungsteniteConnector {
    fn is_supported(&self) -> bool {
        true
    }

    async fn open(&self, url: &str) -> Result<Box<dyn PushChannelSession>> {
        let (stream, _) = connect_async(url)
            .await
            .with_context(|| format!("failed to connect websocket: {url}"))?;
        Ok(Box::new(TungsteniteSession { stream }))
    }
}

struct TungsteniteSession {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl PushChannelSession for TungsteniteSession {
    async fn next_frame(&mut self) -> Option<Result<String>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Close(_)) => return None,
                Ok(_) => {}
                Err(err) => return Some(Err(anyhow!("websocket receive failed: {err}"))),
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        match self.stream.close(None).await {
            Ok(())
            | Err(tungstenite::Error::ConnectionClosed)
            | Err(tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(err) => Err(anyhow!("websocket close failed: {err}")),
        }
    }
}

/// Stands in when the environment has no push-channel support.
pub struct UnsupportedPushChannel;

#[async_trait]
impl PushChannelConnector for UnsupportedPushChannel {
    fn is_supported(&self) -> bool {
        false
    }

    async fn open(&self, _url: &str) -> Result<Box<dyn PushChannelSession>> {
        Err(anyhow!("push channel is unavailable in this environment"))
    }
}

pub(crate) struct ActivePushChannel {
    pub(crate) url: String,
    pub(crate) connection_id: Uuid,
    shutdown: oneshot::Sender<()>,
    reader: JoinHandle<()>,
}

impl ActivePushChannel {
    pub(crate) fn new(
        url: String,
        connection_id: Uuid,
        shutdown: oneshot::Sender<()>,
        reader: JoinHandle<()>,
    ) -> Self {
        Self {
            url,
            connection_id,
            shutdown,
            reader,
        }
    }

    pub(crate) fn is_live(&self) -> bool {
        !self.reader.is_finished()
    }

    /// Signals the reader task and waits until it has run its disconnect hooks.
    pub(crate) async fn close(self) {
        let _ = self.shutdown.send(());
        if let Err(err) = self.reader.await {
            warn!(
                url = %self.url,
                connection_id = %self.connection_id,
                "push channel: reader task ended abnormally: {err}"
            );
        }
    }
}
