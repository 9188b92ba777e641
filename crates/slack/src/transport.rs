use std::sync::Arc;

use {async_trait::async_trait, tokio::sync::mpsc};

use crate::config::TeamConfig;

/// A failure surfaced by the transport or directory layer, normalized to the
/// three facts classification needs: the human message, the platform result
/// code (if any) and the HTTP status (if any).
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
    pub code: Option<String>,
    pub status: Option<u16>,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            status: None,
        }
    }

    /// An API-level failure carrying a platform result code.
    pub fn api(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: Some(code.into()),
            status: None,
        }
    }

    /// An HTTP-level failure carrying a status code.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            status: Some(status),
        }
    }
}

/// One raw chat event, before demultiplexing.
#[derive(Debug, Clone, Default)]
pub struct InboundEvent {
    pub channel_id: String,
    pub user_id: Option<String>,
    /// Set when the platform attributes the event to a bot.
    pub bot_id: Option<String>,
    /// Set for edits, joins and other non-plain-message events.
    pub subtype: Option<String>,
    pub text: String,
    pub ts: String,
}

/// Events delivered on the receiver returned by [`SocketTransport::open`].
#[derive(Debug)]
pub enum TransportEvent {
    /// The streaming session is (re)established.
    Connected,
    /// The streaming session ended.
    Disconnected { reason: Option<String> },
    /// The streaming session failed.
    Failed(TransportError),
    /// A chat event arrived.
    Message(InboundEvent),
}

/// The long-lived bidirectional event stream to one workspace.
#[async_trait]
pub trait SocketTransport: Send + Sync {
    /// Open the session. Events arrive on the returned receiver until the
    /// session ends or [`close`](SocketTransport::close) is called; a closed
    /// receiver means the session is gone.
    async fn open(&self) -> Result<mpsc::Receiver<TransportEvent>, TransportError>;

    /// Best-effort teardown. Implementations log and swallow their own
    /// failures.
    async fn close(&self);
}

#[derive(Debug, Clone)]
pub struct ChannelInfo {
    pub id: String,
    pub name: String,
    pub is_member: bool,
}

#[derive(Debug, Clone, Default)]
pub struct UserInfo {
    pub display_name: Option<String>,
    pub real_name: Option<String>,
    pub login: Option<String>,
}

/// Channel and user lookups against the workspace directory.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn channel_info(&self, channel_id: &str) -> Result<ChannelInfo, TransportError>;
    async fn user_info(&self, user_id: &str) -> Result<UserInfo, TransportError>;
}

/// Builds the transport pair for one team. The supervisor uses the live
/// socket-mode implementation; tests substitute scripted fakes.
pub trait TransportFactory: Send + Sync {
    fn make(
        &self,
        team: &str,
        config: &TeamConfig,
    ) -> anyhow::Result<(Arc<dyn SocketTransport>, Arc<dyn Directory>)>;
}
