//! High-level client for a BattlEye RCON server

use std::sync::Arc;
use std::time::Duration;

use bercon_core::{Ban, ParsedAdmin, RconError, Result, parse_admins, parse_bans};
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;

use crate::cache::PlayerCache;
use crate::commander::{Commander, CommanderConfig};
use crate::connector::{Connector, ConnectorConfig};
use crate::dispatch::{EventDispatcher, EventKind, RconEvent};
use crate::player::Player;

/// Who or what a ban applies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BanTarget {
    /// A player currently in the server, by session ID
    Id(u16),
    /// A BattlEye GUID or IP address; also works for absent players
    Addr(String),
}

impl From<u16> for BanTarget {
    fn from(id: u16) -> Self {
        BanTarget::Id(id)
    }
}

impl From<&str> for BanTarget {
    fn from(addr: &str) -> Self {
        BanTarget::Addr(addr.to_string())
    }
}

impl From<String> for BanTarget {
    fn from(addr: String) -> Self {
        BanTarget::Addr(addr)
    }
}

/// An asynchronous interface for administrating a BattlEye server.
///
/// The client owns the connection lifecycle: [`connect`](Self::connect)
/// authenticates and keeps the session alive in a background task until
/// [`close`](Self::close) is called. Commands may fail with
/// [`RconError::Command`] when the server does not respond in time, which
/// is recoverable; a denied password is not.
pub struct RconClient {
    connector: Connector,
    cache: PlayerCache,
    dispatcher: Arc<EventDispatcher>,
    task: Mutex<Option<JoinHandle<Result<()>>>>,
}

impl RconClient {
    pub fn new() -> Self {
        Self::with_config(ConnectorConfig::default(), CommanderConfig::default())
    }

    pub fn with_config(connector: ConnectorConfig, commander: CommanderConfig) -> Self {
        let dispatcher = Arc::new(EventDispatcher::new());
        let cache = PlayerCache::new();
        let connector = Connector::new(
            connector,
            Commander::new(commander),
            cache.clone(),
            dispatcher.clone(),
        );
        RconClient {
            connector,
            cache,
            dispatcher,
            task: Mutex::new(None),
        }
    }

    /// Connects and authenticates with the server.
    ///
    /// On success the session is maintained in the background; call
    /// [`close`](Self::close) (and optionally
    /// [`wait_until_closed`](Self::wait_until_closed)) to end it.
    ///
    /// Fails with [`RconError::Login`] when the server denies the
    /// password or the connection closes before login completes.
    pub async fn connect(&self, host: &str, port: u16, password: &str) -> Result<()> {
        let task = self.connector.run(host, port, password).await?;
        *self.task.lock().await = Some(task);

        match self.connector.wait_for_login().await {
            Ok(true) => Ok(()),
            Ok(false) => {
                self.wait_until_closed().await?;
                Err(RconError::Login(
                    "connection closed before login completed".into(),
                ))
            }
            Err(e) => {
                self.close();
                let _ = self.wait_until_closed().await;
                Err(e)
            }
        }
    }

    /// Signals the session to end. Idempotent.
    pub fn close(&self) {
        self.connector.close();
    }

    /// Waits for the background task to finish, propagating the error
    /// that ended the session, if any.
    pub async fn wait_until_closed(&self) -> Result<()> {
        let task = self.task.lock().await.take();
        match task {
            Some(task) => match task.await {
                Ok(result) => result,
                Err(e) => Err(RconError::Transport(format!(
                    "connection task panicked: {e}"
                ))),
            },
            None => Ok(()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.connector.is_running()
    }

    pub fn is_logged_in(&self) -> bool {
        self.connector.is_logged_in()
    }

    // Commands
    // (documentation: https://www.battleye.com/support/documentation/)

    /// Sends a raw command and returns the server's response.
    pub async fn send_command(&self, command: &str) -> Result<String> {
        if !self.connector.is_running() {
            return Err(RconError::Transport(
                "cannot send command when not connected".into(),
            ));
        }

        let response = self.connector.send_command(command).await?;
        if response == "Disallowed command" {
            return Err(RconError::Command("server has disabled this command".into()));
        }
        Ok(response)
    }

    /// Requests the RCON admins connected to the server.
    pub async fn fetch_admins(&self) -> Result<Vec<ParsedAdmin>> {
        let response = self.send_command("admins").await?;
        Ok(parse_admins(&response))
    }

    /// Requests the server's ban list.
    pub async fn fetch_bans(&self) -> Result<Vec<Ban>> {
        let response = self.send_command("bans").await?;
        Ok(parse_bans(&response))
    }

    /// Requests the mission files available on the server.
    pub async fn fetch_missions(&self) -> Result<Vec<String>> {
        let response = self.send_command("missions").await?;
        // First line is the "Missions on server:" header
        Ok(response.lines().skip(1).map(String::from).collect())
    }

    /// Requests the player list, reconciling the cache with it.
    pub async fn fetch_players(&self) -> Result<Vec<Player>> {
        self.connector.refresh_players().await?;
        Ok(self.cache.players().await)
    }

    /// Bans a player ID, GUID, or IP address.
    ///
    /// A `None` duration makes the ban permanent. Banning by ID only
    /// works while the player is in the server.
    pub async fn ban(
        &self,
        target: impl Into<BanTarget>,
        duration: Option<u32>,
        reason: &str,
    ) -> Result<String> {
        self.send_command(&ban_command(&target.into(), duration, reason))
            .await
    }

    /// Kicks a player from the server with an optional reason.
    pub async fn kick(&self, player_id: u16, reason: &str) -> Result<String> {
        self.send_command(format!("kick {player_id} {reason}").trim_end())
            .await
    }

    /// Sends a message to every player in the server.
    pub async fn say(&self, message: &str) -> Result<String> {
        self.send_command(&format!("say -1 {message}")).await
    }

    /// Sends a message to a single player.
    pub async fn whisper(&self, player_id: u16, message: &str) -> Result<String> {
        self.send_command(&format!("say {player_id} {message}")).await
    }

    /// Removes the ban at the given index of the ban list.
    pub async fn unban(&self, ban_index: u32) -> Result<String> {
        self.send_command(&format!("removeBan {ban_index}")).await
    }

    // Cache access

    /// Snapshot of the currently known players.
    pub async fn players(&self) -> Vec<Player> {
        self.cache.players().await
    }

    pub async fn get_player(&self, player_id: u16) -> Option<Player> {
        self.cache.get(player_id).await
    }

    /// The admin ID the server assigned to this client, once known.
    pub async fn admin_id(&self) -> Option<u16> {
        self.cache.admin_id().await
    }

    // Events

    /// Registers a callback for one kind of event.
    pub async fn add_listener<F>(&self, kind: EventKind, listener: F)
    where
        F: Fn(&RconEvent) + Send + Sync + 'static,
    {
        self.dispatcher.add_listener(kind, listener).await;
    }

    /// Returns a receiver of every event the client dispatches.
    pub fn subscribe(&self) -> broadcast::Receiver<RconEvent> {
        self.dispatcher.subscribe()
    }

    /// Waits for an event matching the predicate, up to `timeout`.
    pub async fn wait_for<F>(
        &self,
        kind: EventKind,
        timeout: Duration,
        predicate: F,
    ) -> Result<RconEvent>
    where
        F: FnMut(&RconEvent) -> bool + Send,
    {
        self.dispatcher.wait_for(kind, timeout, predicate).await
    }
}

impl Default for RconClient {
    fn default() -> Self {
        Self::new()
    }
}

fn ban_command(target: &BanTarget, duration: Option<u32>, reason: &str) -> String {
    // 0 minutes means permanent on the wire
    let minutes = duration.unwrap_or(0);
    let command = match target {
        BanTarget::Id(id) => format!("ban {id} {minutes} {reason}"),
        BanTarget::Addr(addr) => format!("addBan {addr} {minutes} {reason}"),
    };
    command.trim_end().to_string()
}
