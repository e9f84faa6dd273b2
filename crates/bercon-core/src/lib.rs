//! # bercon-core
//!
//! Sans-I/O implementation of the BattlEye RCON protocol.
//!
//! This crate provides the protocol layer shared by clients and servers:
//! - Wire packet encoding and decoding with CRC32 headers
//! - Client and server state machines (`bytes in -> events + bytes out`)
//! - Duplicate suppression for sequenced packets
//! - Parsing of server text messages and tabular command responses
//!
//! Nothing here touches sockets or clocks; see `bercon-client` for the
//! tokio transport that drives these types.

pub mod ban;
pub mod check;
pub mod client;
pub mod error;
pub mod events;
pub mod packet;
pub mod parser;
pub mod server;

pub use ban::{Ban, BanDuration};
pub use check::{DEFAULT_NONCE_WINDOW, NonceCheck};
pub use client::{ClientProtocol, ClientState};
pub use error::{RconError, Result};
pub use events::{ClientEvent, ServerEvent};
pub use packet::{ClientPacket, MAX_PACKET_SIZE, PacketKind, ServerPacket};
pub use parser::{
    ParsedAdmin, ParsedMessage, ParsedPlayer, is_expected_message, parse_admins, parse_bans,
    parse_players,
};
pub use server::{DEFAULT_RESPONSE_CHUNK_SIZE, ServerProtocol, ServerState};
