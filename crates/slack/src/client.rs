use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use {
    tokio::sync::mpsc::{self, UnboundedSender},
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
};

use crosstalk_common::{Message, MessageSink};

use crate::{
    classify::{SkipReason, SkippedChannel, is_auth_error, skip_reason},
    config,
    error::{Error, Result},
    transport::{Directory, SocketTransport, TransportError, TransportEvent},
};

const RECONNECT_BASE: Duration = Duration::from_secs(1);
const RECONNECT_CAP: Duration = Duration::from_secs(30);
const MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Delay before reconnect attempt `attempt` (zero-based): 1s doubling per
/// attempt, capped at 30s.
pub fn backoff_delay(attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.min(16));
    RECONNECT_BASE.saturating_mul(factor).min(RECONNECT_CAP)
}

/// Connection lifecycle of one team client. `Invalidated` and `Closed` are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientStatus {
    Idle,
    Connecting,
    Connected,
    Disconnected,
    Invalidated,
    Closed,
}

/// Out-of-band notifications from a client to its supervisor, for conditions
/// the supervisor cannot observe from a `connect()` return value.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// The team hit a permanent authentication failure.
    Invalidated { team: String },
    /// The reconnect attempt budget is exhausted; the team is abandoned.
    RetriesExhausted { team: String },
}

struct ClientState {
    status: ClientStatus,
    attempts: u32,
    reconnect_pending: bool,
    torn_down: bool,
    /// Channel id → display name, populated at subscription time.
    channel_names: HashMap<String, String>,
    /// Channel ids that survived subscription, in configured order.
    kept: Vec<String>,
    skipped: Vec<SkippedChannel>,
}

impl ClientState {
    fn new() -> Self {
        Self {
            status: ClientStatus::Idle,
            attempts: 0,
            reconnect_pending: false,
            torn_down: false,
            channel_names: HashMap::new(),
            kept: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

/// Streaming client for a single workspace.
///
/// Owns the transport session, the channel directory cache and the reconnect
/// policy. All state transitions happen under one short-lived lock; nothing
/// is held across an await.
pub struct TeamClient {
    team: String,
    channels: Vec<String>,
    transport: Arc<dyn SocketTransport>,
    directory: Arc<dyn Directory>,
    sink: Arc<dyn MessageSink>,
    events: Option<UnboundedSender<ClientEvent>>,
    state: Mutex<ClientState>,
    cancel: CancellationToken,
}

impl TeamClient {
    pub fn new(
        team: impl Into<String>,
        channels: Vec<String>,
        transport: Arc<dyn SocketTransport>,
        directory: Arc<dyn Directory>,
        sink: Arc<dyn MessageSink>,
    ) -> Self {
        Self {
            team: team.into(),
            channels,
            transport,
            directory,
            sink,
            events: None,
            state: Mutex::new(ClientState::new()),
            cancel: CancellationToken::new(),
        }
    }

    /// Attach the supervisor-facing event channel.
    pub fn with_events(mut self, events: UnboundedSender<ClientEvent>) -> Self {
        self.events = Some(events);
        self
    }

    // ── Accessors ───────────────────────────────────────────────────────────

    pub fn team_name(&self) -> &str {
        &self.team
    }

    pub fn status(&self) -> ClientStatus {
        self.lock().status
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ClientStatus::Connected
    }

    pub fn is_invalidated(&self) -> bool {
        self.status() == ClientStatus::Invalidated
    }

    /// Channel ids that survived subscription, as a defensive copy.
    pub fn channel_ids(&self) -> Vec<String> {
        self.lock().kept.clone()
    }

    pub fn skipped_channels(&self) -> Vec<SkippedChannel> {
        self.lock().skipped.clone()
    }

    /// Reconnect attempts consumed so far (resets on a successful session).
    pub fn reconnect_attempts(&self) -> u32 {
        self.lock().attempts
    }

    // ── Lifecycle ───────────────────────────────────────────────────────────

    /// Open the session and subscribe. Idempotent: a client that is already
    /// connecting, connected, or in a terminal state returns unchanged.
    pub async fn connect(self: &Arc<Self>) -> Result<()> {
        {
            let mut state = self.lock();
            match state.status {
                ClientStatus::Connecting
                | ClientStatus::Connected
                | ClientStatus::Invalidated
                | ClientStatus::Closed => return Ok(()),
                ClientStatus::Idle | ClientStatus::Disconnected => {
                    state.status = ClientStatus::Connecting;
                },
            }
        }
        info!(team = %self.team, "connecting");

        let events = match self.transport.open().await {
            Ok(rx) => rx,
            Err(err) => return Err(self.fail_connect(err)),
        };

        self.subscribe_channels().await?;

        let pump = Arc::clone(self);
        tokio::spawn(async move { pump.pump_events(events).await });

        let kept_count = {
            let mut state = self.lock();
            if matches!(state.status, ClientStatus::Invalidated | ClientStatus::Closed) {
                // Lost a race with shutdown or invalidation mid-connect.
                return Ok(());
            }
            state.status = ClientStatus::Connected;
            state.attempts = 0;
            state.kept.len()
        };
        info!(team = %self.team, channels = kept_count, "team client connected");
        Ok(())
    }

    /// Move to `Closed` and tear the transport down, at most once per client.
    /// Never errors; teardown failures are the transport's to log.
    pub async fn disconnect(&self) {
        let teardown = {
            let mut state = self.lock();
            if state.status == ClientStatus::Closed {
                return;
            }
            state.status = ClientStatus::Closed;
            state.channel_names.clear();
            let teardown = !state.torn_down;
            state.torn_down = true;
            teardown
        };
        self.cancel.cancel();
        if teardown {
            self.transport.close().await;
        }
        info!(team = %self.team, "team client closed");
    }

    // ── Subscription ────────────────────────────────────────────────────────

    /// Resolve every configured channel through the directory, keeping the
    /// survivors and recording a classified reason for each skip.
    async fn subscribe_channels(self: &Arc<Self>) -> Result<()> {
        let mut kept = Vec::new();
        let mut names = HashMap::new();
        let mut skipped = Vec::new();

        for id in &self.channels {
            if !config::is_channel_id(id) {
                warn!(team = %self.team, channel = %id, "skipping channel: invalid id format");
                skipped.push(SkippedChannel {
                    channel_id: id.clone(),
                    reason: SkipReason::InvalidFormat,
                    detail: None,
                });
                continue;
            }

            match self.directory.channel_info(id).await {
                Ok(info) if info.is_member => {
                    names.insert(id.clone(), info.name);
                    kept.push(id.clone());
                },
                Ok(_) => {
                    warn!(team = %self.team, channel = %id, "skipping channel: not a member");
                    skipped.push(SkippedChannel {
                        channel_id: id.clone(),
                        reason: SkipReason::NotAMember,
                        detail: None,
                    });
                },
                Err(err) if is_auth_error(&err) => {
                    self.invalidate();
                    return Err(Error::AuthRejected {
                        team: self.team.clone(),
                        source: err,
                    });
                },
                Err(err) => {
                    let reason = skip_reason(&err);
                    warn!(
                        team = %self.team,
                        channel = %id,
                        reason = %reason,
                        error = %err,
                        "skipping channel"
                    );
                    skipped.push(SkippedChannel {
                        channel_id: id.clone(),
                        reason,
                        detail: Some(err.message.clone()),
                    });
                },
            }
        }

        let no_survivors = kept.is_empty();
        let skipped_count = skipped.len();
        {
            let mut state = self.lock();
            state.kept = kept;
            state.channel_names = names;
            state.skipped = skipped;
        }

        if no_survivors {
            // Nothing to stream from; treat like a transient session failure
            // so the operator gets the retry budget before the team is
            // abandoned.
            {
                let mut state = self.lock();
                if !matches!(state.status, ClientStatus::Invalidated | ClientStatus::Closed) {
                    state.status = ClientStatus::Disconnected;
                }
            }
            self.schedule_reconnect();
            return Err(Error::NoValidChannels {
                team: self.team.clone(),
                skipped: skipped_count,
            });
        }
        Ok(())
    }

    // ── Event demultiplexing ────────────────────────────────────────────────

    async fn pump_events(self: Arc<Self>, mut events: mpsc::Receiver<TransportEvent>) {
        loop {
            let event = tokio::select! {
                _ = self.cancel.cancelled() => break,
                event = events.recv() => event,
            };
            match event {
                None => {
                    self.session_lost(None);
                    break;
                },
                Some(TransportEvent::Connected) => {
                    debug!(team = %self.team, "transport session established");
                    let mut state = self.lock();
                    if !matches!(state.status, ClientStatus::Invalidated | ClientStatus::Closed) {
                        state.status = ClientStatus::Connected;
                        state.attempts = 0;
                    }
                },
                Some(TransportEvent::Disconnected { reason }) => {
                    self.session_lost(reason);
                    break;
                },
                Some(TransportEvent::Failed(err)) => {
                    error!(team = %self.team, error = %err, "transport error");
                    if is_auth_error(&err) {
                        self.invalidate();
                    } else {
                        self.session_lost(Some(err.message));
                    }
                    break;
                },
                Some(TransportEvent::Message(inbound)) => {
                    self.dispatch_event(inbound).await;
                },
            }
        }
    }

    /// Turn one raw chat event into a `Message` for the sink, or drop it.
    /// Filter order: non-kept channel, bot author, subtyped event.
    async fn dispatch_event(&self, event: crate::transport::InboundEvent) {
        let channel_name = {
            let state = self.lock();
            if !state.kept.iter().any(|id| id == &event.channel_id) {
                return;
            }
            state.channel_names.get(&event.channel_id).cloned()
        };
        if event.bot_id.is_some() {
            return;
        }
        if event.subtype.is_some() {
            return;
        }

        let user = match event.user_id.as_deref() {
            Some(uid) => self.resolve_user(uid).await,
            None => "unknown".to_string(),
        };
        let channel_name = channel_name.unwrap_or_else(|| event.channel_id.clone());

        let message = Message::new(
            self.team.clone(),
            channel_name,
            event.channel_id,
            user,
            event.text,
            event.ts,
        );
        self.sink.accept(message).await;
    }

    /// Author resolution: display name, then real name, then login, then the
    /// raw id when the lookup fails or yields nothing usable.
    async fn resolve_user(&self, user_id: &str) -> String {
        match self.directory.user_info(user_id).await {
            Ok(info) => [info.display_name, info.real_name, info.login]
                .into_iter()
                .flatten()
                .find(|name| !name.trim().is_empty())
                .unwrap_or_else(|| user_id.to_string()),
            Err(err) => {
                debug!(team = %self.team, user = %user_id, error = %err, "user lookup failed; using raw id");
                user_id.to_string()
            },
        }
    }

    // ── Failure handling ────────────────────────────────────────────────────

    /// Classify a connect-time transport failure: permanent auth failures
    /// invalidate, everything else goes through the reconnect budget.
    fn fail_connect(self: &Arc<Self>, err: TransportError) -> Error {
        if is_auth_error(&err) {
            self.invalidate();
            return Error::AuthRejected {
                team: self.team.clone(),
                source: err,
            };
        }
        warn!(team = %self.team, error = %err, "connect failed");
        {
            let mut state = self.lock();
            if !matches!(state.status, ClientStatus::Invalidated | ClientStatus::Closed) {
                state.status = ClientStatus::Disconnected;
            }
        }
        self.schedule_reconnect();
        Error::Transport(err)
    }

    /// The streaming session ended underneath us.
    fn session_lost(self: &Arc<Self>, reason: Option<String>) {
        {
            let mut state = self.lock();
            if matches!(state.status, ClientStatus::Invalidated | ClientStatus::Closed) {
                return;
            }
            state.status = ClientStatus::Disconnected;
        }
        warn!(
            team = %self.team,
            reason = reason.as_deref().unwrap_or("stream ended"),
            "disconnected from team"
        );
        self.schedule_reconnect();
    }

    /// Arm the backoff timer for the next reconnect, unless one is already
    /// pending, the client is in a terminal state, or the budget is spent.
    /// The timer re-checks terminal states when it fires, so shutdown does
    /// not depend on timer cancellation for correctness.
    fn schedule_reconnect(self: &Arc<Self>) {
        let scheduled = {
            let mut state = self.lock();
            if state.reconnect_pending
                || matches!(state.status, ClientStatus::Invalidated | ClientStatus::Closed)
            {
                None
            } else if state.attempts >= MAX_RECONNECT_ATTEMPTS {
                Some(None)
            } else {
                let attempt = state.attempts;
                state.attempts += 1;
                state.reconnect_pending = true;
                Some(Some((attempt, backoff_delay(attempt))))
            }
        };

        match scheduled {
            None => {},
            Some(None) => {
                warn!(
                    team = %self.team,
                    attempts = MAX_RECONNECT_ATTEMPTS,
                    "reconnect attempts exhausted; abandoning team"
                );
                self.emit(ClientEvent::RetriesExhausted {
                    team: self.team.clone(),
                });
            },
            Some(Some((attempt, delay))) => {
                info!(
                    team = %self.team,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "scheduling reconnect"
                );
                let client = Arc::clone(self);
                tokio::spawn(async move {
                    tokio::select! {
                        _ = client.cancel.cancelled() => return,
                        _ = tokio::time::sleep(delay) => {},
                    }
                    {
                        let mut state = client.lock();
                        state.reconnect_pending = false;
                        if matches!(
                            state.status,
                            ClientStatus::Invalidated | ClientStatus::Closed
                        ) {
                            return;
                        }
                    }
                    if let Err(e) = client.connect().await {
                        warn!(team = %client.team, error = %e, "reconnect attempt failed");
                    }
                });
            },
        }
    }

    /// Permanent authentication failure: terminal state, no further
    /// reconnects, fire-and-forget teardown, cache cleared.
    fn invalidate(self: &Arc<Self>) {
        let teardown = {
            let mut state = self.lock();
            if matches!(state.status, ClientStatus::Invalidated | ClientStatus::Closed) {
                return;
            }
            state.status = ClientStatus::Invalidated;
            state.channel_names.clear();
            let teardown = !state.torn_down;
            state.torn_down = true;
            teardown
        };
        error!(team = %self.team, "authentication rejected; team invalidated for this process");
        self.cancel.cancel();
        if teardown {
            let transport = Arc::clone(&self.transport);
            tokio::spawn(async move { transport.close().await });
        }
        self.emit(ClientEvent::Invalidated {
            team: self.team.clone(),
        });
    }

    fn emit(&self, event: ClientEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ClientState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
