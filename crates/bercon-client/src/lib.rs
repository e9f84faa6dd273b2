//! # bercon-client
//!
//! Asynchronous BattlEye RCON client built on tokio.
//!
//! The crate wraps the sans-I/O state machines of `bercon-core` with
//! everything a live connection needs:
//! - A UDP connector with reconnection, keep-alive traffic, and
//!   server-timeout detection
//! - Bounded command retries with per-attempt timeouts
//! - A player cache kept current from server messages and `players`
//!   responses
//! - Typed events with listeners, subscriptions, and one-shot waits
//!
//! ```no_run
//! use bercon_client::{EventKind, RconClient};
//!
//! # async fn example() -> bercon_core::Result<()> {
//! let client = RconClient::new();
//! client.connect("127.0.0.1", 2302, "password").await?;
//!
//! let response = client.send_command("players").await?;
//! println!("{response}");
//!
//! client.close();
//! client.wait_until_closed().await
//! # }
//! ```

pub mod cache;
pub mod client;
pub mod commander;
pub mod connector;
pub mod dispatch;
pub mod player;

#[cfg(test)]
mod testutil;

pub use cache::{ADMISSION_GRACE, PlayerCache};
pub use client::{BanTarget, RconClient};
pub use commander::{Commander, CommanderConfig};
pub use connector::{Connector, ConnectorConfig};
pub use dispatch::{EventDispatcher, EventKind, RconEvent};
pub use player::Player;
