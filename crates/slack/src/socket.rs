//! Socket Mode transport for one workspace.
//!
//! Uses slack-morphism's socket mode listener to receive events via WebSocket
//! without requiring a public HTTP endpoint, and the Web API for directory
//! lookups. This is the production [`SocketTransport`]/[`Directory`] pair;
//! the client itself never sees slack-morphism types.

use std::sync::{Arc, Mutex};

use {
    async_trait::async_trait,
    secrecy::ExposeSecret,
    slack_morphism::errors::SlackClientError,
    slack_morphism::prelude::*,
    tokio::sync::mpsc,
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info},
};

use crate::{
    config::TeamConfig,
    transport::{
        ChannelInfo, Directory, InboundEvent, SocketTransport, TransportError, TransportEvent,
        TransportFactory, UserInfo,
    },
};

const EVENT_BUFFER: usize = 256;

/// Shared state for socket mode callbacks.
#[derive(Clone)]
struct ListenerState {
    team: String,
    tx: mpsc::Sender<TransportEvent>,
}

/// One workspace's Slack session: socket-mode stream plus Web API directory.
pub struct SlackSession {
    team: String,
    app_token: SlackApiToken,
    bot_token: SlackApiToken,
    client: Arc<SlackHyperClient>,
    cancel: Mutex<Option<CancellationToken>>,
}

impl SlackSession {
    pub fn new(team: impl Into<String>, config: &TeamConfig) -> anyhow::Result<Self> {
        let client = Arc::new(SlackClient::new(SlackClientHyperConnector::new()?));
        Ok(Self {
            team: team.into(),
            app_token: SlackApiToken::new(config.app_token.expose_secret().into()),
            bot_token: SlackApiToken::new(config.bot_token.expose_secret().into()),
            client,
            cancel: Mutex::new(None),
        })
    }
}

#[async_trait]
impl SocketTransport for SlackSession {
    async fn open(&self) -> Result<mpsc::Receiver<TransportEvent>, TransportError> {
        // Verify the bot credential up front; a revoked token surfaces here
        // as a classifiable API error instead of deep inside the listener.
        let session = self.client.open_session(&self.bot_token);
        let auth = session.auth_test().await.map_err(map_client_error)?;
        info!(team = %self.team, bot_user = ?auth.user, "slack bot authenticated");

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let state = ListenerState {
            team: self.team.clone(),
            tx: tx.clone(),
        };

        let callbacks = SlackSocketModeListenerCallbacks::new().with_push_events(on_push_event);
        let listener_env = Arc::new(
            SlackClientEventsListenerEnvironment::new(Arc::clone(&self.client))
                .with_user_state(state),
        );
        let listener = SlackClientSocketModeListener::new(
            &SlackClientSocketModeConfig::new(),
            listener_env,
            callbacks,
        );

        let cancel = CancellationToken::new();
        if let Some(previous) = self
            .cancel
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(cancel.clone())
        {
            previous.cancel();
        }

        let app_token = self.app_token.clone();
        let team = self.team.clone();
        tokio::spawn(async move {
            let _ = tx.send(TransportEvent::Connected).await;
            tokio::select! {
                result = listener.listen_for(&app_token) => {
                    match result {
                        Ok(()) => {
                            let _ = tx.send(TransportEvent::Disconnected { reason: None }).await;
                        },
                        Err(e) => {
                            error!(team = %team, error = %e, "socket mode error");
                            let _ = tx.send(TransportEvent::Failed(map_client_error(e))).await;
                        },
                    }
                }
                _ = cancel.cancelled() => {
                    info!(team = %team, "socket mode listener cancelled");
                    let _ = tx
                        .send(TransportEvent::Disconnected {
                            reason: Some("cancelled".into()),
                        })
                        .await;
                }
            }
        });

        Ok(rx)
    }

    async fn close(&self) {
        let cancel = self.cancel.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(cancel) = cancel {
            cancel.cancel();
        }
    }
}

/// Forward push events into the transport event stream. Filtering (bots,
/// subtypes, non-kept channels) is the client's job, not the transport's.
async fn on_push_event(
    event: SlackPushEventCallback,
    _client: Arc<SlackHyperClient>,
    states: SlackClientEventsUserState,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let guard = states.read().await;
    let state = guard
        .get_user_state::<ListenerState>()
        .ok_or("missing listener state")?;

    match &event.event {
        SlackEventCallbackBody::Message(message) => {
            let inbound = InboundEvent {
                channel_id: message
                    .origin
                    .channel
                    .as_ref()
                    .map(|c| c.to_string())
                    .unwrap_or_default(),
                user_id: message.sender.user.as_ref().map(|u| u.to_string()),
                bot_id: message.sender.bot_id.as_ref().map(|b| b.to_string()),
                subtype: message.subtype.as_ref().map(|s| format!("{s:?}")),
                text: message
                    .content
                    .as_ref()
                    .and_then(|c| c.text.clone())
                    .unwrap_or_default(),
                ts: message.origin.ts.to_string(),
            };
            if state.tx.send(TransportEvent::Message(inbound)).await.is_err() {
                debug!(team = %state.team, "event receiver gone; dropping push event");
            }
        },
        _ => {
            debug!(team = %state.team, "ignoring event callback type");
        },
    }

    Ok(())
}

#[async_trait]
impl Directory for SlackSession {
    async fn channel_info(&self, channel_id: &str) -> Result<ChannelInfo, TransportError> {
        let session = self.client.open_session(&self.bot_token);
        let request = SlackApiConversationsInfoRequest::new(channel_id.to_string().into());
        let response = session
            .conversations_info(&request)
            .await
            .map_err(map_client_error)?;
        Ok(ChannelInfo {
            id: channel_id.to_string(),
            name: response
                .channel
                .name
                .clone()
                .unwrap_or_else(|| channel_id.to_string()),
            is_member: response.channel.flags.is_member.unwrap_or(false),
        })
    }

    async fn user_info(&self, user_id: &str) -> Result<UserInfo, TransportError> {
        let session = self.client.open_session(&self.bot_token);
        let request = SlackApiUsersInfoRequest::new(user_id.to_string().into());
        let response = session.users_info(&request).await.map_err(map_client_error)?;
        let profile = response.user.profile;
        Ok(UserInfo {
            display_name: profile.as_ref().and_then(|p| p.display_name.clone()),
            real_name: response
                .user
                .real_name
                .clone()
                .or_else(|| profile.as_ref().and_then(|p| p.real_name.clone())),
            login: response.user.name.clone(),
        })
    }
}

/// Normalize a slack-morphism error to the three facts classification needs.
fn map_client_error(error: SlackClientError) -> TransportError {
    let message = error.to_string();
    match error {
        SlackClientError::ApiError(api) => TransportError {
            message,
            code: Some(api.code),
            status: None,
        },
        SlackClientError::HttpError(http) => TransportError {
            message,
            code: None,
            status: Some(http.status_code.as_u16()),
        },
        SlackClientError::RateLimitError(_) => TransportError {
            message,
            code: Some("ratelimited".into()),
            status: Some(429),
        },
        _ => TransportError::new(message),
    }
}

/// Builds the live socket-mode transport pair for one team.
#[derive(Default)]
pub struct SlackTransportFactory;

impl SlackTransportFactory {
    pub fn new() -> Self {
        Self
    }
}

impl TransportFactory for SlackTransportFactory {
    fn make(
        &self,
        team: &str,
        config: &TeamConfig,
    ) -> anyhow::Result<(Arc<dyn SocketTransport>, Arc<dyn Directory>)> {
        let session = Arc::new(SlackSession::new(team, config)?);
        Ok((
            Arc::clone(&session) as Arc<dyn SocketTransport>,
            session as Arc<dyn Directory>,
        ))
    }
}
