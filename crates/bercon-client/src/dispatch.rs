//! Fan-out of client events to listeners and subscribers

use std::time::Duration;

use bercon_core::packet::ServerPacket;
use bercon_core::{RconError, Result};
use tokio::sync::{Mutex, broadcast};
use tracing::debug;

use crate::player::Player;

/// Capacity of the broadcast channel backing subscriptions; slow
/// subscribers miss events rather than stalling the client.
const EVENT_BUFFER: usize = 64;

/// A high-level event emitted by the client
#[derive(Debug, Clone)]
pub enum RconEvent {
    /// Authentication with the server completed
    Login,
    /// Any packet received from the server, before interpretation
    Raw(ServerPacket),
    /// Text of a server message, before parsing
    Message(String),
    /// Text of a command response
    Command(String),
    /// An RCON admin (possibly this client) logged in
    AdminLogin { id: u16, addr: String },
    AdminMessage {
        id: u16,
        channel: String,
        message: String,
    },
    /// An admin message on the `Global` channel
    AdminAnnouncement { id: u16, message: String },
    /// An admin whispered to a cached player
    AdminWhisper {
        player: Player,
        admin_id: u16,
        message: String,
    },
    PlayerConnect(Player),
    PlayerGuid(Player),
    PlayerVerifyGuid(Player),
    PlayerDisconnect(Player),
    PlayerKick { player: Player, reason: String },
    PlayerMessage {
        player: Player,
        channel: String,
        message: String,
    },
}

/// Discriminant of [`RconEvent`], used to register listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Login,
    Raw,
    Message,
    Command,
    AdminLogin,
    AdminMessage,
    AdminAnnouncement,
    AdminWhisper,
    PlayerConnect,
    PlayerGuid,
    PlayerVerifyGuid,
    PlayerDisconnect,
    PlayerKick,
    PlayerMessage,
}

impl RconEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            RconEvent::Login => EventKind::Login,
            RconEvent::Raw(_) => EventKind::Raw,
            RconEvent::Message(_) => EventKind::Message,
            RconEvent::Command(_) => EventKind::Command,
            RconEvent::AdminLogin { .. } => EventKind::AdminLogin,
            RconEvent::AdminMessage { .. } => EventKind::AdminMessage,
            RconEvent::AdminAnnouncement { .. } => EventKind::AdminAnnouncement,
            RconEvent::AdminWhisper { .. } => EventKind::AdminWhisper,
            RconEvent::PlayerConnect(_) => EventKind::PlayerConnect,
            RconEvent::PlayerGuid(_) => EventKind::PlayerGuid,
            RconEvent::PlayerVerifyGuid(_) => EventKind::PlayerVerifyGuid,
            RconEvent::PlayerDisconnect(_) => EventKind::PlayerDisconnect,
            RconEvent::PlayerKick { .. } => EventKind::PlayerKick,
            RconEvent::PlayerMessage { .. } => EventKind::PlayerMessage,
        }
    }
}

type Listener = Box<dyn Fn(&RconEvent) + Send + Sync>;

/// Routes events to registered listeners and broadcast subscribers.
///
/// Listeners are synchronous callbacks invoked in dispatch order; work
/// that needs to await should be spawned from the callback or driven
/// through [`subscribe`](Self::subscribe) instead.
pub struct EventDispatcher {
    listeners: Mutex<Vec<(EventKind, Listener)>>,
    tx: broadcast::Sender<RconEvent>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUFFER);
        EventDispatcher {
            listeners: Mutex::new(Vec::new()),
            tx,
        }
    }

    /// Registers a callback for one kind of event.
    pub async fn add_listener<F>(&self, kind: EventKind, listener: F)
    where
        F: Fn(&RconEvent) + Send + Sync + 'static,
    {
        self.listeners.lock().await.push((kind, Box::new(listener)));
    }

    /// Returns a receiver of every dispatched event.
    pub fn subscribe(&self) -> broadcast::Receiver<RconEvent> {
        self.tx.subscribe()
    }

    /// Delivers an event to matching listeners and all subscribers.
    pub async fn dispatch(&self, event: RconEvent) {
        debug!(kind = ?event.kind(), "dispatching event");

        let listeners = self.listeners.lock().await;
        for (kind, listener) in listeners.iter() {
            if *kind == event.kind() {
                listener(&event);
            }
        }
        drop(listeners);

        // No subscribers is fine
        let _ = self.tx.send(event);
    }

    /// Waits until an event of `kind` satisfying `predicate` is
    /// dispatched, up to `timeout`.
    ///
    /// Only events dispatched after the call starts are considered.
    pub async fn wait_for<F>(
        &self,
        kind: EventKind,
        timeout: Duration,
        mut predicate: F,
    ) -> Result<RconEvent>
    where
        F: FnMut(&RconEvent) -> bool + Send,
    {
        let mut rx = self.subscribe();
        let wait = async {
            loop {
                match rx.recv().await {
                    Ok(event) if event.kind() == kind && predicate(&event) => return Some(event),
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "event subscriber lagged while waiting");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(Some(event)) => Ok(event),
            Ok(None) => Err(RconError::Timeout(format!(
                "dispatcher closed while waiting for {kind:?}"
            ))),
            Err(_) => Err(RconError::Timeout(format!(
                "no {kind:?} event within {timeout:?}"
            ))),
        }
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_listeners_filter_by_kind() {
        let dispatcher = EventDispatcher::new();
        let seen = Arc::new(AtomicUsize::new(0));

        let counter = seen.clone();
        dispatcher
            .add_listener(EventKind::Message, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .await;

        dispatcher.dispatch(RconEvent::Message("hi".into())).await;
        dispatcher.dispatch(RconEvent::Login).await;
        dispatcher.dispatch(RconEvent::Message("again".into())).await;

        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_wait_for_applies_predicate() {
        let dispatcher = Arc::new(EventDispatcher::new());

        let background = dispatcher.clone();
        let task = tokio::spawn(async move {
            background.dispatch(RconEvent::Command("first".into())).await;
            background.dispatch(RconEvent::Command("second".into())).await;
        });

        let event = dispatcher
            .wait_for(EventKind::Command, Duration::from_secs(1), |event| {
                matches!(event, RconEvent::Command(text) if text == "second")
            })
            .await
            .unwrap();
        assert!(matches!(event, RconEvent::Command(text) if text == "second"));
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_wait_for_times_out() {
        let dispatcher = EventDispatcher::new();
        let result = dispatcher
            .wait_for(EventKind::Login, Duration::from_millis(10), |_| true)
            .await;
        assert!(matches!(result, Err(RconError::Timeout(_))));
    }
}
