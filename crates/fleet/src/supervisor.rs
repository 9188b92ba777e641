use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use {
    secrecy::ExposeSecret,
    tokio::sync::mpsc::{self, UnboundedReceiver},
    tracing::{error, info, warn},
};

use {
    crosstalk_common::MessageSink,
    crosstalk_slack::{ClientEvent, TeamClient, TeamConfig, TransportFactory},
};

use crate::error::{Error, Result};

/// Outcome of a `connect_all` sweep.
#[derive(Debug, Clone, Copy)]
pub struct ConnectSummary {
    pub connected: usize,
    pub failed: usize,
}

struct Fleet {
    teams: HashMap<String, TeamConfig>,
    clients: HashMap<String, Arc<TeamClient>>,
}

/// Fleet-level lifecycle of team clients with fault containment.
///
/// The pipeline sink and the transport factory are injected at construction;
/// tests substitute an in-memory sink and scripted transports.
pub struct TeamSupervisor {
    sink: Arc<dyn MessageSink>,
    factory: Arc<dyn TransportFactory>,
    fleet: Mutex<Fleet>,
    initialized: AtomicBool,
    shutting_down: AtomicBool,
}

impl TeamSupervisor {
    pub fn new(sink: Arc<dyn MessageSink>, factory: Arc<dyn TransportFactory>) -> Self {
        Self {
            sink,
            factory,
            fleet: Mutex::new(Fleet {
                teams: HashMap::new(),
                clients: HashMap::new(),
            }),
            initialized: AtomicBool::new(false),
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Store the team set. Single-shot: a second call is an error. Creates
    /// no clients yet; that happens in [`connect_all`](Self::connect_all).
    pub fn initialize(&self, teams: HashMap<String, TeamConfig>) -> Result<()> {
        if self.initialized.load(Ordering::SeqCst) {
            return Err(Error::AlreadyInitialized);
        }
        if teams.is_empty() {
            return Err(Error::EmptyFleet);
        }
        for (team, config) in &teams {
            let credentials_present = !config.app_token.expose_secret().is_empty()
                && !config.bot_token.expose_secret().is_empty();
            if !credentials_present {
                return Err(Error::InvalidTeam {
                    team: team.clone(),
                    reason: "missing app or bot credential".into(),
                });
            }
            if config.channels.is_empty() {
                return Err(Error::InvalidTeam {
                    team: team.clone(),
                    reason: "empty channel list".into(),
                });
            }
        }

        let count = teams.len();
        self.lock().teams = teams;
        self.initialized.store(true, Ordering::SeqCst);
        info!(teams = count, "supervisor initialized");
        Ok(())
    }

    /// Build one client per team and connect them all in parallel, waiting
    /// for every attempt to settle. Individual failures are contained and
    /// logged; only a fleet-wide zero is an error.
    pub async fn connect_all(self: &Arc<Self>) -> Result<ConnectSummary> {
        if !self.initialized.load(Ordering::SeqCst) {
            return Err(Error::NotInitialized);
        }
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let mut attempted = 0usize;
        let mut failed = 0usize;

        let clients: Vec<(String, Arc<TeamClient>)> = {
            let mut fleet = self.lock();
            let teams: Vec<(String, TeamConfig)> =
                fleet.teams.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            for (team, config) in teams {
                attempted += 1;
                match self.factory.make(&team, &config) {
                    Ok((transport, directory)) => {
                        let client = Arc::new(
                            TeamClient::new(
                                team.clone(),
                                config.channels.clone(),
                                transport,
                                directory,
                                Arc::clone(&self.sink),
                            )
                            .with_events(events_tx.clone()),
                        );
                        fleet.clients.insert(team, client);
                    },
                    Err(e) => {
                        error!(team = %team, error = %e, "failed to build team transport");
                        failed += 1;
                    },
                }
            }
            fleet.clients.iter().map(|(k, v)| (k.clone(), Arc::clone(v))).collect()
        };
        drop(events_tx);

        let monitor = Arc::clone(self);
        tokio::spawn(async move { monitor.drain_client_events(events_rx).await });

        let results = futures::future::join_all(clients.into_iter().map(|(team, client)| {
            async move {
                let result = client.connect().await;
                (team, result)
            }
        }))
        .await;

        let mut connected = 0usize;
        for (team, result) in results {
            match result {
                Ok(()) => connected += 1,
                Err(e) => {
                    error!(team = %team, error = %e, "team failed to connect");
                    failed += 1;
                },
            }
        }

        if connected == 0 {
            return Err(Error::NoTeamsConnected { attempted });
        }
        info!(connected, failed, "fleet connected");
        Ok(ConnectSummary { connected, failed })
    }

    /// Log a team-level error and evict the team if its client is no longer
    /// connected. Evicted teams are not reconstructed; restart the process
    /// to restore them.
    pub async fn handle_team_error(&self, team: &str, reason: &str) {
        error!(team = %team, reason = %reason, "team error");
        let client = self.lock().clients.get(team).cloned();
        if let Some(client) = client
            && !client.is_connected()
        {
            self.remove_team(team);
        }
    }

    /// Disconnect every client concurrently, swallowing failures, then clear
    /// the fleet. Idempotent: the shutting-down flag is checked-and-set
    /// atomically so a second (possibly signal-driven) entry returns
    /// immediately.
    pub async fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("shutting down team connections");

        let clients: Vec<Arc<TeamClient>> =
            self.lock().clients.drain().map(|(_, client)| client).collect();
        futures::future::join_all(clients.iter().map(|client| client.disconnect())).await;

        self.lock().teams.clear();
        info!("all team connections closed");
    }

    // ── Observability ───────────────────────────────────────────────────────

    pub fn connected_count(&self) -> usize {
        self.lock().clients.values().filter(|c| c.is_connected()).count()
    }

    pub fn total_count(&self) -> usize {
        self.lock().clients.len()
    }

    pub fn connected_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .lock()
            .clients
            .iter()
            .filter(|(_, client)| client.is_connected())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn all_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().teams.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    // ── Internals ───────────────────────────────────────────────────────────

    async fn drain_client_events(self: Arc<Self>, mut events: UnboundedReceiver<ClientEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                ClientEvent::Invalidated { team } => {
                    self.handle_team_error(&team, "authentication rejected").await;
                },
                ClientEvent::RetriesExhausted { team } => {
                    self.handle_team_error(&team, "reconnect attempts exhausted").await;
                },
            }
        }
    }

    fn remove_team(&self, team: &str) {
        let client = self.lock().clients.remove(team);
        if let Some(client) = client {
            warn!(team = %team, "evicting team from fleet");
            tokio::spawn(async move { client.disconnect().await });
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Fleet> {
        self.fleet.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use {
        async_trait::async_trait,
        secrecy::Secret,
        tokio::sync::mpsc::Receiver,
    };

    use {
        crosstalk_common::Message,
        crosstalk_slack::{
            ChannelInfo, Directory, SocketTransport, TransportError, TransportEvent, UserInfo,
        },
    };

    use super::*;

    #[derive(Clone)]
    enum Plan {
        Healthy,
        OpenFails(TransportError),
    }

    struct FakeTransport {
        plan: Plan,
        close_count: AtomicUsize,
        /// Held so healthy sessions stay open for the duration of the test.
        sessions: Mutex<Vec<mpsc::Sender<TransportEvent>>>,
    }

    #[async_trait]
    impl SocketTransport for FakeTransport {
        async fn open(&self) -> std::result::Result<Receiver<TransportEvent>, TransportError> {
            match &self.plan {
                Plan::Healthy => {
                    let (tx, rx) = mpsc::channel(8);
                    self.sessions.lock().unwrap().push(tx);
                    Ok(rx)
                },
                Plan::OpenFails(err) => Err(err.clone()),
            }
        }

        async fn close(&self) {
            self.close_count.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct FakeDirectory;

    #[async_trait]
    impl Directory for FakeDirectory {
        async fn channel_info(
            &self,
            channel_id: &str,
        ) -> std::result::Result<ChannelInfo, TransportError> {
            Ok(ChannelInfo {
                id: channel_id.to_string(),
                name: "general".into(),
                is_member: true,
            })
        }

        async fn user_info(&self, _user_id: &str) -> std::result::Result<UserInfo, TransportError> {
            Ok(UserInfo::default())
        }
    }

    /// Hands each team its scripted transport and remembers it for later
    /// inspection.
    struct FakeFactory {
        plans: HashMap<String, Plan>,
        made: Mutex<HashMap<String, Arc<FakeTransport>>>,
    }

    impl FakeFactory {
        fn new(plans: &[(&str, Plan)]) -> Arc<Self> {
            Arc::new(Self {
                plans: plans.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
                made: Mutex::new(HashMap::new()),
            })
        }

        fn transport(&self, team: &str) -> Arc<FakeTransport> {
            Arc::clone(self.made.lock().unwrap().get(team).expect("transport not built"))
        }
    }

    impl TransportFactory for FakeFactory {
        fn make(
            &self,
            team: &str,
            _config: &TeamConfig,
        ) -> anyhow::Result<(Arc<dyn SocketTransport>, Arc<dyn Directory>)> {
            let plan = self.plans.get(team).cloned().unwrap_or(Plan::Healthy);
            let transport = Arc::new(FakeTransport {
                plan,
                close_count: AtomicUsize::new(0),
                sessions: Mutex::new(Vec::new()),
            });
            self.made.lock().unwrap().insert(team.to_string(), Arc::clone(&transport));
            Ok((transport as Arc<dyn SocketTransport>, Arc::new(FakeDirectory)))
        }
    }

    struct NullSink;

    #[async_trait]
    impl MessageSink for NullSink {
        async fn accept(&self, _message: Message) {}
    }

    fn team_config() -> TeamConfig {
        TeamConfig {
            app_token: Secret::new("xapp-1-A111-abc".into()),
            bot_token: Secret::new("xoxb-111-abc".into()),
            channels: vec!["C1234567890".into()],
        }
    }

    fn teams(names: &[&str]) -> HashMap<String, TeamConfig> {
        names.iter().map(|n| (n.to_string(), team_config())).collect()
    }

    fn supervisor(plans: &[(&str, Plan)]) -> (Arc<TeamSupervisor>, Arc<FakeFactory>) {
        let factory = FakeFactory::new(plans);
        let supervisor = Arc::new(TeamSupervisor::new(
            Arc::new(NullSink),
            Arc::clone(&factory) as Arc<dyn TransportFactory>,
        ));
        (supervisor, factory)
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn initialize_is_single_shot() {
        let (supervisor, _) = supervisor(&[]);
        supervisor.initialize(teams(&["a"])).unwrap();
        assert!(matches!(
            supervisor.initialize(teams(&["a"])),
            Err(Error::AlreadyInitialized)
        ));
        assert!(supervisor.is_initialized());
    }

    #[test]
    fn initialize_rejects_empty_fleet() {
        let (supervisor, _) = supervisor(&[]);
        assert!(matches!(supervisor.initialize(HashMap::new()), Err(Error::EmptyFleet)));
        assert!(!supervisor.is_initialized());
    }

    #[test]
    fn initialize_rejects_missing_credentials() {
        let (supervisor, _) = supervisor(&[]);
        let mut config = team_config();
        config.bot_token = Secret::new(String::new());
        let bad: HashMap<String, TeamConfig> = [("a".to_string(), config)].into();
        assert!(matches!(
            supervisor.initialize(bad),
            Err(Error::InvalidTeam { .. })
        ));
    }

    #[test]
    fn initialize_rejects_empty_channel_list() {
        let (supervisor, _) = supervisor(&[]);
        let mut config = team_config();
        config.channels.clear();
        let bad: HashMap<String, TeamConfig> = [("a".to_string(), config)].into();
        assert!(matches!(
            supervisor.initialize(bad),
            Err(Error::InvalidTeam { .. })
        ));
    }

    #[tokio::test]
    async fn connect_all_requires_initialize() {
        let (supervisor, _) = supervisor(&[]);
        assert!(matches!(
            supervisor.connect_all().await,
            Err(Error::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn connect_all_contains_per_team_failures() {
        let (supervisor, _) = supervisor(&[
            ("good", Plan::Healthy),
            ("flaky", Plan::OpenFails(TransportError::new("connection refused"))),
        ]);
        supervisor.initialize(teams(&["good", "flaky"])).unwrap();

        let summary = supervisor.connect_all().await.unwrap();
        assert_eq!(summary.connected, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(supervisor.connected_names(), vec!["good"]);
        // The flaky team stays in the fleet while its retry budget runs.
        assert_eq!(supervisor.total_count(), 2);
    }

    #[tokio::test]
    async fn connect_all_with_zero_successes_is_fatal() {
        let (supervisor, _) = supervisor(&[(
            "only",
            Plan::OpenFails(TransportError::new("connection refused")),
        )]);
        supervisor.initialize(teams(&["only"])).unwrap();

        assert!(matches!(
            supervisor.connect_all().await,
            Err(Error::NoTeamsConnected { attempted: 1 })
        ));
    }

    #[tokio::test]
    async fn auth_failure_invalidates_and_evicts_one_team() {
        let (supervisor, _) = supervisor(&[
            ("revoked", Plan::OpenFails(TransportError::api("invalid_auth", "invalid_auth"))),
            ("healthy", Plan::Healthy),
        ]);
        supervisor.initialize(teams(&["revoked", "healthy"])).unwrap();

        let summary = supervisor.connect_all().await.unwrap();
        assert_eq!(summary.connected, 1);
        settle().await;

        assert_eq!(supervisor.connected_names(), vec!["healthy"]);
        assert_eq!(supervisor.total_count(), 1, "invalidated team is evicted");
        assert_eq!(supervisor.all_names(), vec!["healthy", "revoked"]);
    }

    #[tokio::test]
    async fn handle_team_error_keeps_connected_teams() {
        let (supervisor, _) = supervisor(&[("steady", Plan::Healthy)]);
        supervisor.initialize(teams(&["steady"])).unwrap();
        supervisor.connect_all().await.unwrap();

        supervisor.handle_team_error("steady", "spurious").await;
        assert_eq!(supervisor.total_count(), 1);
    }

    #[tokio::test]
    async fn shutdown_is_idempotent_and_tears_down_each_client_once() {
        let (supervisor, factory) = supervisor(&[("a", Plan::Healthy), ("b", Plan::Healthy)]);
        supervisor.initialize(teams(&["a", "b"])).unwrap();
        supervisor.connect_all().await.unwrap();

        tokio::join!(supervisor.shutdown(), supervisor.shutdown());
        settle().await;

        assert!(supervisor.is_shutting_down());
        assert_eq!(supervisor.total_count(), 0);
        assert_eq!(factory.transport("a").close_count.load(Ordering::SeqCst), 1);
        assert_eq!(factory.transport("b").close_count.load(Ordering::SeqCst), 1);

        assert!(matches!(
            supervisor.connect_all().await,
            Err(Error::ShuttingDown)
        ));
    }
}
