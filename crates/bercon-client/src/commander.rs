//! Completion signalling and retry policy for in-flight commands.
//!
//! Every command is keyed by its one-byte sequence number. The transport
//! registers a signal *before* transmitting, so a response racing the
//! registration cannot be lost, then waits out one attempt interval. The
//! receive path settles the signal when the matching response event
//! arrives; settled or cancelled sequences drop late responses silently.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::{Mutex, oneshot};
use tracing::debug;

/// Attempts made per command before giving up.
pub const DEFAULT_COMMAND_ATTEMPTS: usize = 3;

/// How long each attempt waits for a response.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(1);

/// Retry policy for commands
#[derive(Debug, Clone)]
pub struct CommanderConfig {
    /// Times the same packet is transmitted before the command fails
    pub attempts: usize,
    /// Wait per attempt before retransmitting
    pub command_timeout: Duration,
}

impl Default for CommanderConfig {
    fn default() -> Self {
        CommanderConfig {
            attempts: DEFAULT_COMMAND_ATTEMPTS,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }
}

/// Tracks the single pending completion signal per sequence number
pub struct Commander {
    config: CommanderConfig,
    pending: Mutex<HashMap<u8, oneshot::Sender<String>>>,
}

impl Commander {
    pub fn new(config: CommanderConfig) -> Self {
        Commander {
            config,
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn attempts(&self) -> usize {
        self.config.attempts
    }

    /// Installs the completion signal for a sequence, replacing (and
    /// thereby cancelling) any earlier attempt's signal.
    ///
    /// Must be called before the packet is handed to the transport.
    pub async fn register(&self, sequence: u8) -> oneshot::Receiver<String> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(sequence, tx);
        rx
    }

    /// Waits out one attempt interval on a registered signal.
    ///
    /// Returns `None` on timeout or when the signal was cancelled by a
    /// [`reset`](Self::reset).
    pub async fn wait(&self, rx: oneshot::Receiver<String>) -> Option<String> {
        match tokio::time::timeout(self.config.command_timeout, rx).await {
            Ok(Ok(response)) => Some(response),
            Ok(Err(_)) | Err(_) => None,
        }
    }

    /// Settles the signal for a completed command.
    ///
    /// A response for a sequence nobody is waiting on (late arrival after
    /// exhaustion, or a duplicate completion) is dropped without error.
    pub async fn complete(&self, sequence: u8, response: String) {
        match self.pending.lock().await.remove(&sequence) {
            Some(tx) => {
                // The waiter may have timed out at this very moment
                let _ = tx.send(response);
            }
            None => debug!(sequence, "dropping response with no pending command"),
        }
    }

    /// Forgets the signal for an exhausted or cancelled command.
    pub async fn forget(&self, sequence: u8) {
        self.pending.lock().await.remove(&sequence);
    }

    /// Cancels every pending signal; waiting callers see their command
    /// fail instead of hanging across a reconnect.
    pub async fn reset(&self) {
        self.pending.lock().await.clear();
    }
}
