//! UDP transport driving the sans-I/O protocol.
//!
//! The connector owns the socket exclusively. A background receive task
//! feeds datagrams to the protocol engine and drains its events and
//! outgoing packets; the run task handles (re)connecting, keep-alive
//! traffic, and the protocol-mandated 45 second server timeout.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use bercon_core::packet::{ClientPacket, MAX_PACKET_SIZE};
use bercon_core::{ClientEvent, ClientProtocol, RconError, Result, parse_players};
use tokio::net::UdpSocket;
use tokio::sync::{Mutex, Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use crate::cache::PlayerCache;
use crate::commander::Commander;
use crate::dispatch::{EventDispatcher, EventKind, RconEvent};

/// How long after login to wait for the server to announce our admin ID
/// before giving up on warming the player cache.
const ADMIN_LOGIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Timing and retry configuration for the connector
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    /// Granularity of the run loop's housekeeping tick
    pub run_interval: Duration,
    /// Inactivity threshold before a keep-alive command is sent;
    /// must stay below the server's 45 second timeout
    pub keep_alive_interval: Duration,
    /// Period at which a keep-alive is upgraded to a `players` command
    /// that refreshes the cache
    pub players_interval: Duration,
    /// Login attempts made on the very first connection; reconnects
    /// retry indefinitely
    pub initial_connect_attempts: usize,
    /// Timeout for a single login attempt
    pub connection_timeout: Duration,
    /// How long the server may stay silent before it is considered dead
    /// and the session is re-authenticated. The wire protocol fixes this
    /// at 45 seconds; overriding it is only useful in tests.
    pub last_received_timeout: Duration,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        ConnectorConfig {
            run_interval: Duration::from_secs(1),
            keep_alive_interval: Duration::from_secs(30),
            players_interval: Duration::from_secs(60),
            initial_connect_attempts: 3,
            connection_timeout: Duration::from_secs(3),
            last_received_timeout: Duration::from_secs(45),
        }
    }
}

/// Progress of the current login exchange
#[derive(Debug, Clone, PartialEq, Eq)]
enum LoginState {
    /// No response from the server yet
    Pending,
    LoggedIn,
    /// The server rejected the password; fatal for the session
    Denied,
    /// The connector shut down before (or after) completing login
    Closed,
}

struct Timers {
    last_received: Instant,
    last_command: Instant,
    last_players: Instant,
}

impl Timers {
    fn now() -> Self {
        let now = Instant::now();
        Timers {
            last_received: now,
            last_command: now,
            last_players: now,
        }
    }
}

/// Maintains a connection to one RCON server
pub struct Connector {
    shared: Arc<Shared>,
}

struct Shared {
    config: ConnectorConfig,
    protocol: Mutex<ClientProtocol>,
    commander: Commander,
    cache: PlayerCache,
    dispatcher: Arc<EventDispatcher>,
    remote: Mutex<Option<(String, u16)>>,
    socket: Mutex<Option<Arc<UdpSocket>>>,
    recv_task: Mutex<Option<JoinHandle<()>>>,
    login: watch::Sender<LoginState>,
    close: Notify,
    closed: AtomicBool,
    running: AtomicBool,
    timers: Mutex<Timers>,
}

impl Connector {
    pub fn new(
        config: ConnectorConfig,
        commander: Commander,
        cache: PlayerCache,
        dispatcher: Arc<EventDispatcher>,
    ) -> Self {
        let (login, _) = watch::channel(LoginState::Pending);
        Connector {
            shared: Arc::new(Shared {
                config,
                protocol: Mutex::new(ClientProtocol::new()),
                commander,
                cache,
                dispatcher,
                remote: Mutex::new(None),
                socket: Mutex::new(None),
                recv_task: Mutex::new(None),
                login,
                close: Notify::new(),
                closed: AtomicBool::new(false),
                running: AtomicBool::new(false),
                timers: Mutex::new(Timers::now()),
            }),
        }
    }

    /// Starts maintaining a connection to the given server.
    ///
    /// Single-shot: fails when the connector is already running. The
    /// returned task completes when the connector is closed, or with an
    /// error when login is denied or the transport fails for good.
    pub async fn run(
        &self,
        host: &str,
        port: u16,
        password: &str,
    ) -> Result<JoinHandle<Result<()>>> {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return Err(RconError::InvalidState {
                current: "running",
                expected: "idle",
            });
        }

        self.shared.closed.store(false, Ordering::SeqCst);
        self.shared.login.send_replace(LoginState::Pending);
        *self.shared.remote.lock().await = Some((host.to_string(), port));
        *self.shared.timers.lock().await = Timers::now();

        let shared = self.shared.clone();
        let password = password.to_string();
        Ok(tokio::spawn(async move {
            let result = shared.run_loop(&password).await;
            if let Err(e) = &result {
                error!("connection task failed: {e}");
            }
            shared.disconnect().await;
            shared.login.send_replace(LoginState::Closed);
            shared.commander.reset().await;
            shared.protocol.lock().await.reset();
            shared.running.store(false, Ordering::SeqCst);
            result
        }))
    }

    /// Signals the run task to exit after its current tick. Idempotent.
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        self.shared.close.notify_one();
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub async fn is_connected(&self) -> bool {
        self.shared.socket.lock().await.is_some()
    }

    pub fn is_logged_in(&self) -> bool {
        *self.shared.login.borrow() == LoginState::LoggedIn
    }

    /// Waits until login completes or the connector shuts down.
    ///
    /// Returns false when the connector closed before a login response
    /// arrived; fails with [`RconError::Login`] on a denied password.
    pub async fn wait_for_login(&self) -> Result<bool> {
        self.shared.wait_for_login().await
    }

    /// Sends a command, retrying per the commander's policy.
    pub async fn send_command(&self, command: &str) -> Result<String> {
        self.shared.send_command(command).await
    }

    /// Issues a `players` command and reconciles the cache with it.
    pub async fn refresh_players(&self) -> Result<()> {
        self.shared.refresh_players().await
    }
}

impl Shared {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn is_logged_in(&self) -> bool {
        *self.login.borrow() == LoginState::LoggedIn
    }

    async fn run_loop(self: &Arc<Self>, password: &str) -> Result<()> {
        let mut first_iteration = true;

        while !self.is_closed() {
            if !self.is_logged_in() {
                let logged_in = self.try_connect(password, first_iteration).await?;
                if !logged_in {
                    if self.is_closed() {
                        break;
                    }
                    error!("failed to connect to the server");
                    return Err(RconError::Login("could not connect to the server".into()));
                }
                info!("successfully connected to the server");
            }

            let since_received = self.timers.lock().await.last_received.elapsed();
            if since_received > self.config.last_received_timeout {
                info!(
                    seconds = since_received.as_secs(),
                    "server has timed out, re-authenticating"
                );
                self.reset_session().await;
                continue;
            }

            if self.timers.lock().await.last_command.elapsed() > self.config.keep_alive_interval {
                debug!("sending keep alive packet");
                let shared = self.clone();
                tokio::spawn(async move { shared.send_keep_alive().await });
            }

            let _ = timeout(self.config.run_interval, self.close.notified()).await;
            first_iteration = false;
        }

        Ok(())
    }

    /// Attempts to log in, spacing failures with exponential backoff.
    ///
    /// Attempts are bounded only on the first connection; afterwards the
    /// connector retries until closed. A denied password propagates.
    async fn try_connect(self: &Arc<Self>, password: &str, first_iteration: bool) -> Result<bool> {
        info!(
            "attempting to {}connect to server",
            if first_iteration { "" } else { "re" }
        );
        self.login.send_replace(LoginState::Pending);

        let mut attempt = 0usize;
        loop {
            if self.is_closed() {
                return Ok(false);
            }
            if self.is_logged_in() {
                // A slow login response may have landed after the
                // previous attempt timed out
                return Ok(true);
            }

            match timeout(self.config.connection_timeout, self.connect_once(password)).await {
                Ok(Ok(outcome)) => return Ok(outcome),
                Ok(Err(e @ RconError::Login(_))) => return Err(e),
                Ok(Err(e)) => debug!("login attempt failed: {e}"),
                Err(_) => debug!("login attempt timed out"),
            }

            if attempt % 10 == 0 {
                warn!("failed {} login attempt(s)", attempt + 1);
            }
            self.disconnect().await;

            let backoff = Duration::from_secs(1u64 << (attempt % 11));
            let _ = timeout(backoff, self.close.notified()).await;

            attempt += 1;
            if first_iteration && attempt >= self.config.initial_connect_attempts {
                return Ok(false);
            }
        }
    }

    /// Binds a fresh socket, sends the login packet, and waits for the
    /// outcome. The caller bounds this with the connection timeout.
    async fn connect_once(self: &Arc<Self>, password: &str) -> Result<bool> {
        debug!("attempting a new connection");
        self.disconnect().await;

        let remote = self
            .remote
            .lock()
            .await
            .clone()
            .ok_or_else(|| RconError::Transport("no remote address configured".into()))?;
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        // Connecting filters out datagrams from any other source address
        socket.connect((remote.0.as_str(), remote.1)).await?;
        let socket = Arc::new(socket);
        *self.socket.lock().await = Some(socket.clone());

        let shared = self.clone();
        let task = tokio::spawn(async move { shared.recv_loop(socket).await });
        *self.recv_task.lock().await = Some(task);

        let packet = self.protocol.lock().await.authenticate(password)?;
        self.send_packet(&packet).await?;
        self.wait_for_login().await
    }

    async fn wait_for_login(&self) -> Result<bool> {
        let mut rx = self.login.subscribe();
        loop {
            let state = rx.borrow_and_update().clone();
            match state {
                LoginState::LoggedIn => return Ok(true),
                LoginState::Denied => {
                    return Err(RconError::Login("invalid password provided".into()));
                }
                LoginState::Closed => return Ok(false),
                LoginState::Pending => {}
            }
            if rx.changed().await.is_err() {
                return Ok(false);
            }
        }
    }

    async fn disconnect(&self) {
        if let Some(task) = self.recv_task.lock().await.take() {
            task.abort();
        }
        *self.socket.lock().await = None;
    }

    /// Tears down protocol state after a server timeout so the run loop
    /// authenticates from scratch.
    async fn reset_session(&self) {
        self.protocol.lock().await.reset();
        self.commander.reset().await;
        self.login.send_replace(LoginState::Pending);
    }

    async fn send_packet(&self, packet: &ClientPacket) -> Result<()> {
        let socket = self
            .socket
            .lock()
            .await
            .clone()
            .ok_or_else(|| RconError::Transport("not connected".into()))?;
        let data = packet.to_bytes()?;
        socket.send(&data).await?;
        debug!(kind = ?packet.kind(), "sent packet");

        if matches!(packet, ClientPacket::Command { .. }) {
            self.timers.lock().await.last_command = Instant::now();
        }
        Ok(())
    }

    async fn send_command(self: &Arc<Self>, command: &str) -> Result<String> {
        let packet = self.protocol.lock().await.send_command(command)?;
        let sequence = packet
            .sequence()
            .ok_or_else(|| RconError::Command("command packet without a sequence".into()))?;

        for attempt in 1..=self.commander.attempts() {
            // Install the signal before transmitting so a fast response
            // cannot slip through unobserved
            let rx = self.commander.register(sequence).await;
            if let Err(e) = self.send_packet(&packet).await {
                self.abandon_command(sequence).await;
                return Err(e);
            }
            if let Some(response) = self.commander.wait(rx).await {
                return Ok(response);
            }
            debug!(sequence, attempt, "command attempt timed out");
        }

        self.abandon_command(sequence).await;
        warn!(
            "could not send command after {} attempts",
            self.commander.attempts()
        );
        Err(RconError::Command(format!(
            "server did not respond to {command:?}"
        )))
    }

    async fn abandon_command(&self, sequence: u8) {
        self.commander.forget(sequence).await;
        self.protocol.lock().await.invalidate_command(sequence);
    }

    async fn refresh_players(self: &Arc<Self>) -> Result<()> {
        self.timers.lock().await.last_players = Instant::now();
        let response = self.send_command("players").await?;
        if response == "Disallowed command" {
            return Err(RconError::Command("server has disabled this command".into()));
        }
        self.cache.update_from_players(&parse_players(&response)).await;
        Ok(())
    }

    async fn send_keep_alive(self: Arc<Self>) {
        let refresh = self.timers.lock().await.last_players.elapsed() > self.config.players_interval;
        let result = if refresh {
            self.refresh_players().await
        } else {
            self.send_command("").await.map(|_| ())
        };
        if let Err(e) = result {
            debug!("keep alive failed: {e}");
        }
    }

    async fn recv_loop(self: Arc<Self>, socket: Arc<UdpSocket>) {
        let mut buf = vec![0u8; MAX_PACKET_SIZE];
        loop {
            match socket.recv(&mut buf).await {
                Ok(n) => self.handle_datagram(&buf[..n]).await,
                Err(e) => {
                    // Usually an ICMP unreachable bounced off a connected
                    // socket; the run loop reconnects if the server stays
                    // silent past the receive timeout
                    debug!("error receiving datagram: {e}");
                    sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    async fn handle_datagram(self: &Arc<Self>, data: &[u8]) {
        let (packet, events, to_send) = {
            let mut protocol = self.protocol.lock().await;
            let packet = match protocol.receive_datagram(data) {
                Ok(packet) => packet,
                Err(e) => {
                    debug!("ignoring malformed datagram: {e}");
                    return;
                }
            };
            (packet, protocol.events_received(), protocol.packets_to_send())
        };

        debug!(kind = ?packet.kind(), "received packet");
        self.timers.lock().await.last_received = Instant::now();
        self.dispatcher.dispatch(RconEvent::Raw(packet)).await;

        for event in events {
            self.handle_event(event).await;
        }
        for packet in to_send {
            if let Err(e) = self.send_packet(&packet).await {
                warn!("failed to send packet: {e}");
            }
        }
    }

    async fn handle_event(self: &Arc<Self>, event: ClientEvent) {
        match event {
            ClientEvent::Auth { success } => {
                if *self.login.borrow() != LoginState::Pending {
                    return;
                }
                if success {
                    self.login.send_replace(LoginState::LoggedIn);
                    self.dispatcher.dispatch(RconEvent::Login).await;
                    let shared = self.clone();
                    tokio::spawn(async move { shared.warm_cache().await });
                } else {
                    error!("password authentication was denied");
                    self.login.send_replace(LoginState::Denied);
                }
            }
            ClientEvent::Command { sequence, response } => {
                self.commander.complete(sequence, response.clone()).await;
                self.dispatcher.dispatch(RconEvent::Command(response)).await;
            }
            ClientEvent::Message { message } => {
                self.dispatcher
                    .dispatch(RconEvent::Message(message.clone()))
                    .await;
                self.dispatch_parsed(&message).await;
            }
        }
    }

    /// Waits for the server to announce this client's admin ID, then
    /// primes the player cache with a `players` fetch.
    async fn warm_cache(self: Arc<Self>) {
        self.cache.reset().await;

        let admin = self
            .dispatcher
            .wait_for(EventKind::AdminLogin, ADMIN_LOGIN_TIMEOUT, |_| true)
            .await;
        let id = match admin {
            Ok(RconEvent::AdminLogin { id, .. }) => id,
            _ => {
                warn!(
                    "did not receive admin login within {} seconds; \
                     client id will not be available",
                    ADMIN_LOGIN_TIMEOUT.as_secs()
                );
                return;
            }
        };

        self.cache.set_admin_id(id).await;
        if let Err(e) = self.refresh_players().await {
            warn!("failed to receive players from server; player cache will not be available: {e}");
        }
    }

    /// Interprets a server message, updating the cache and emitting the
    /// corresponding high-level events.
    async fn dispatch_parsed(&self, message: &str) {
        use bercon_core::ParsedMessage::*;

        let Some(parsed) = bercon_core::ParsedMessage::try_parse(message) else {
            if !bercon_core::is_expected_message(message) {
                warn!("unexpected server message: {message}");
            }
            return;
        };

        match parsed {
            AdminLogin { id, addr } => {
                self.dispatcher
                    .dispatch(RconEvent::AdminLogin { id, addr })
                    .await;
            }
            PlayerConnect { id, name, addr } => {
                let player = self.cache.add_connected(id, &name, &addr).await;
                self.dispatcher
                    .dispatch(RconEvent::PlayerConnect(player))
                    .await;
            }
            PlayerGuid { id, guid, .. } => {
                // A GUID can arrive before the connect message; without a
                // cache entry it is dropped
                match self.cache.set_guid(id, &guid).await {
                    Some(player) => {
                        self.dispatcher.dispatch(RconEvent::PlayerGuid(player)).await;
                    }
                    None => debug!(id, "GUID for a player that is not cached"),
                }
            }
            PlayerVerifyGuid { id, .. } => {
                if let Some(player) = self.cache.verify_guid(id).await {
                    self.dispatcher
                        .dispatch(RconEvent::PlayerVerifyGuid(player))
                        .await;
                }
            }
            PlayerDisconnect { id, .. } => {
                if let Some(player) = self.cache.remove(id).await {
                    self.dispatcher
                        .dispatch(RconEvent::PlayerDisconnect(player))
                        .await;
                }
            }
            PlayerKick { id, reason, .. } => {
                if let Some(player) = self.cache.remove(id).await {
                    self.dispatcher
                        .dispatch(RconEvent::PlayerKick { player, reason })
                        .await;
                }
            }
            AdminMessage {
                id,
                channel,
                message,
            } => {
                self.dispatcher
                    .dispatch(RconEvent::AdminMessage {
                        id,
                        channel: channel.clone(),
                        message: message.clone(),
                    })
                    .await;

                if channel == "Global" {
                    self.dispatcher
                        .dispatch(RconEvent::AdminAnnouncement { id, message })
                        .await;
                } else if let Some(name) = channel.strip_prefix("To ") {
                    if let Some(player) = self.cache.find_by_name(name).await {
                        self.dispatcher
                            .dispatch(RconEvent::AdminWhisper {
                                player,
                                admin_id: id,
                                message,
                            })
                            .await;
                    }
                }
            }
            PlayerMessage {
                channel,
                name,
                message,
            } => {
                // Only dispatched when the speaker resolves in the cache;
                // the raw text remains observable via the message event
                match self.cache.find_by_name(&name).await {
                    Some(player) => {
                        self.dispatcher
                            .dispatch(RconEvent::PlayerMessage {
                                player,
                                channel,
                                message,
                            })
                            .await;
                    }
                    None => debug!(%name, "chat from a player that is not cached"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commander::CommanderConfig;
    use crate::testutil::{MockServerOptions, PASSWORD, spawn_server};
    use std::sync::atomic::Ordering as AtomicOrdering;

    fn connector(config: ConnectorConfig, commander: CommanderConfig) -> Connector {
        Connector::new(
            config,
            Commander::new(commander),
            PlayerCache::new(),
            Arc::new(EventDispatcher::new()),
        )
    }

    fn quiet_config() -> ConnectorConfig {
        // Long enough intervals that no keep-alive or timeout machinery
        // interferes with the scenario under test
        ConnectorConfig {
            run_interval: Duration::from_millis(25),
            keep_alive_interval: Duration::from_secs(30),
            players_interval: Duration::from_secs(60),
            initial_connect_attempts: 2,
            connection_timeout: Duration::from_secs(1),
            last_received_timeout: Duration::from_secs(45),
        }
    }

    #[tokio::test]
    async fn test_login_and_command() {
        let server = spawn_server(
            PASSWORD,
            MockServerOptions {
                respond_to_commands: true,
                announce_admin: false,
            },
        )
        .await;
        let connector = connector(quiet_config(), CommanderConfig::default());

        let task = connector
            .run("127.0.0.1", server.addr.port(), PASSWORD)
            .await
            .unwrap();
        assert!(connector.wait_for_login().await.unwrap());
        assert!(connector.is_logged_in());

        let response = connector.send_command("version").await.unwrap();
        assert_eq!(response, "echo:version");

        connector.close();
        task.await.unwrap().unwrap();
        assert!(!connector.is_running());
    }

    #[tokio::test]
    async fn test_run_is_single_shot() {
        let server = spawn_server(PASSWORD, MockServerOptions::default()).await;
        let connector = connector(quiet_config(), CommanderConfig::default());

        let task = connector
            .run("127.0.0.1", server.addr.port(), PASSWORD)
            .await
            .unwrap();
        assert!(matches!(
            connector.run("127.0.0.1", server.addr.port(), PASSWORD).await,
            Err(RconError::InvalidState { .. })
        ));

        connector.close();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_denied_login_is_fatal() {
        let server = spawn_server("hunter2", MockServerOptions::default()).await;
        let connector = connector(quiet_config(), CommanderConfig::default());

        let task = connector
            .run("127.0.0.1", server.addr.port(), PASSWORD)
            .await
            .unwrap();
        assert!(matches!(
            connector.wait_for_login().await,
            Err(RconError::Login(_))
        ));
        assert!(matches!(task.await.unwrap(), Err(RconError::Login(_))));
    }

    #[tokio::test]
    async fn test_command_retries_then_fails() {
        let server = spawn_server(
            PASSWORD,
            MockServerOptions {
                respond_to_commands: false,
                announce_admin: false,
            },
        )
        .await;
        let connector = connector(
            quiet_config(),
            CommanderConfig {
                attempts: 2,
                command_timeout: Duration::from_millis(100),
            },
        );

        let task = connector
            .run("127.0.0.1", server.addr.port(), PASSWORD)
            .await
            .unwrap();
        assert!(connector.wait_for_login().await.unwrap());

        let result = connector.send_command("version").await;
        assert!(matches!(result, Err(RconError::Command(_))));

        // The same packet went out exactly once per attempt
        tokio::time::sleep(Duration::from_millis(100)).await;
        let commands = server.commands.lock().await;
        let copies = commands.iter().filter(|c| c.as_str() == "version").count();
        assert_eq!(copies, 2);
        drop(commands);

        connector.close();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_silent_server_forces_reauthentication() {
        let server = spawn_server(
            PASSWORD,
            MockServerOptions {
                respond_to_commands: true,
                announce_admin: false,
            },
        )
        .await;
        let config = ConnectorConfig {
            run_interval: Duration::from_millis(25),
            // No keep-alives; after the login reply the server stays
            // silent until the receive timeout forces a fresh login
            keep_alive_interval: Duration::from_secs(30),
            players_interval: Duration::from_secs(60),
            initial_connect_attempts: 3,
            connection_timeout: Duration::from_millis(500),
            last_received_timeout: Duration::from_millis(300),
        };
        let connector = connector(config, CommanderConfig::default());

        let task = connector
            .run("127.0.0.1", server.addr.port(), PASSWORD)
            .await
            .unwrap();
        assert!(connector.wait_for_login().await.unwrap());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(server.logins.load(AtomicOrdering::SeqCst) >= 2);
        assert!(connector.is_logged_in());

        connector.close();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_idle_keep_alive_upgrades_to_players() {
        let server = spawn_server(
            PASSWORD,
            MockServerOptions {
                respond_to_commands: true,
                announce_admin: false,
            },
        )
        .await;
        let config = ConnectorConfig {
            run_interval: Duration::from_millis(25),
            keep_alive_interval: Duration::from_millis(100),
            players_interval: Duration::from_millis(150),
            initial_connect_attempts: 3,
            connection_timeout: Duration::from_secs(1),
            last_received_timeout: Duration::from_secs(45),
        };
        let cache = PlayerCache::new();
        let connector = Connector::new(
            config,
            Commander::new(CommanderConfig::default()),
            cache.clone(),
            Arc::new(EventDispatcher::new()),
        );

        let task = connector
            .run("127.0.0.1", server.addr.port(), PASSWORD)
            .await
            .unwrap();
        assert!(connector.wait_for_login().await.unwrap());

        tokio::time::sleep(Duration::from_millis(700)).await;

        let commands = server.commands.lock().await.clone();
        assert!(commands.iter().any(|c| c.is_empty()), "plain keep-alive");
        assert!(
            commands.iter().any(|c| c == "players"),
            "keep-alive upgraded to players"
        );
        assert_eq!(cache.players().await.len(), 2);

        connector.close();
        task.await.unwrap().unwrap();
    }
}
