//! Client side of the RCON protocol, without I/O.
//!
//! [`ClientProtocol`] consumes raw datagrams and produces typed events plus
//! packets that must be written back to the socket. It owns no socket or
//! timer itself; an adapter (such as `bercon-client`) is responsible for
//! transport, retries, and keep-alive traffic.

use std::collections::{HashMap, VecDeque};

use crate::check::NonceCheck;
use crate::error::{RconError, Result};
use crate::events::ClientEvent;
use crate::packet::{ClientPacket, ServerPacket};

/// Authentication state of the client protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// The client still needs to be authenticated by the server
    Authenticating,
    /// The client is logged in and able to exchange messages
    LoggedIn,
}

impl ClientState {
    fn name(self) -> &'static str {
        match self {
            ClientState::Authenticating => "authenticating",
            ClientState::LoggedIn => "logged in",
        }
    }
}

/// Chunks collected so far for one command response
#[derive(Debug, Default)]
struct PendingCommand {
    total: Option<u8>,
    chunks: HashMap<u8, Vec<u8>>,
}

/// Sans-I/O state machine for the client role
#[derive(Debug)]
pub struct ClientProtocol {
    state: ClientState,
    next_sequence: u8,
    pending_commands: HashMap<u8, PendingCommand>,
    message_check: NonceCheck,
    events: VecDeque<ClientEvent>,
    to_send: VecDeque<ClientPacket>,
}

impl ClientProtocol {
    pub fn new() -> Self {
        Self::with_message_check(NonceCheck::default())
    }

    /// Creates a protocol with a custom duplicate-message window.
    pub fn with_message_check(message_check: NonceCheck) -> Self {
        ClientProtocol {
            state: ClientState::Authenticating,
            next_sequence: 0,
            pending_commands: HashMap::new(),
            message_check,
            events: VecDeque::new(),
            to_send: VecDeque::new(),
        }
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    /// Returns the login packet for the given password.
    ///
    /// Only valid while authenticating.
    pub fn authenticate(&self, password: &str) -> Result<ClientPacket> {
        self.expect_state(ClientState::Authenticating)?;
        ClientPacket::login(password)
    }

    /// Allocates the next sequence number and returns the command packet.
    ///
    /// The returned packet should be reused verbatim when retrying, so the
    /// server sees a retransmit rather than a new command.
    pub fn send_command(&mut self, command: &str) -> Result<ClientPacket> {
        self.expect_state(ClientState::LoggedIn)?;
        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);
        self.pending_commands
            .insert(sequence, PendingCommand::default());
        Ok(ClientPacket::Command {
            sequence,
            command: command.as_bytes().to_vec(),
        })
    }

    /// Drops any partial response for a timed-out or cancelled command.
    ///
    /// A no-op when the sequence was never registered, which lets callers
    /// invalidate unconditionally even after a [`reset`](Self::reset).
    pub fn invalidate_command(&mut self, sequence: u8) {
        self.pending_commands.remove(&sequence);
    }

    /// Parses a datagram from the server and drives the state machine.
    ///
    /// Produced events are collected via [`events_received`](Self::events_received)
    /// and reply packets via [`packets_to_send`](Self::packets_to_send).
    /// The decoded packet is returned for the caller's own bookkeeping.
    pub fn receive_datagram(&mut self, data: &[u8]) -> Result<ServerPacket> {
        let packet = ServerPacket::from_bytes(data)?;
        self.handle_packet(&packet)?;
        Ok(packet)
    }

    /// Drains all events parsed since the last call.
    pub fn events_received(&mut self) -> Vec<ClientEvent> {
        self.events.drain(..).collect()
    }

    /// Drains all packets waiting to be written to the transport.
    pub fn packets_to_send(&mut self) -> Vec<ClientPacket> {
        self.to_send.drain(..).collect()
    }

    /// Returns the protocol to its initial state.
    ///
    /// Invoked when the server has timed out (no datagram within 45 s);
    /// all queues, partial responses, and the duplicate window are cleared
    /// and the client must authenticate again.
    pub fn reset(&mut self) {
        self.state = ClientState::Authenticating;
        self.next_sequence = 0;
        self.pending_commands.clear();
        self.message_check.reset();
        self.events.clear();
        self.to_send.clear();
    }

    fn expect_state(&self, expected: ClientState) -> Result<()> {
        if self.state != expected {
            return Err(RconError::InvalidState {
                current: self.state.name(),
                expected: expected.name(),
            });
        }
        Ok(())
    }

    fn handle_packet(&mut self, packet: &ServerPacket) -> Result<()> {
        match packet {
            ServerPacket::Login { success } => {
                self.expect_state(ClientState::Authenticating)?;
                if *success {
                    self.state = ClientState::LoggedIn;
                }
                self.events.push_back(ClientEvent::Auth { success: *success });
                Ok(())
            }
            ServerPacket::Command {
                sequence,
                total,
                index,
                payload,
            } => self.handle_command_packet(*sequence, *total, *index, payload),
            ServerPacket::Message { sequence, message } => {
                self.expect_state(ClientState::LoggedIn)?;
                if self.message_check.check(*sequence) {
                    let message = String::from_utf8(message.clone()).map_err(|_| {
                        RconError::Malformed("server message is not valid UTF-8".into())
                    })?;
                    self.events.push_back(ClientEvent::Message { message });
                }
                // Acknowledged in all cases, including duplicates, or the
                // server keeps retransmitting and eventually drops us
                self.to_send.push_back(ClientPacket::Message {
                    sequence: *sequence,
                });
                Ok(())
            }
        }
    }

    fn handle_command_packet(
        &mut self,
        sequence: u8,
        total: u8,
        index: u8,
        payload: &[u8],
    ) -> Result<()> {
        self.expect_state(ClientState::LoggedIn)?;

        let pending = self.pending_commands.get_mut(&sequence).ok_or_else(|| {
            RconError::Malformed(format!("unexpected command response (sequence {sequence})"))
        })?;
        if pending.chunks.contains_key(&index) {
            return Err(RconError::Malformed(format!(
                "command response index {index} already received (sequence {sequence})"
            )));
        }
        if let Some(expected) = pending.total {
            if expected != total {
                return Err(RconError::Malformed(format!(
                    "command response total {total} does not match the previously \
                     defined total of {expected} (sequence {sequence})"
                )));
            }
        } else {
            pending.total = Some(total);
        }

        // No ordering is assumed; chunks may arrive in any permutation
        pending.chunks.insert(index, payload.to_vec());
        if pending.chunks.len() < usize::from(total) {
            return Ok(());
        }

        let Some(pending) = self.pending_commands.remove(&sequence) else {
            return Ok(());
        };
        let mut joined = Vec::new();
        for i in 0..total {
            joined.extend_from_slice(&pending.chunks[&i]);
        }
        let response = String::from_utf8(joined)
            .map_err(|_| RconError::Malformed("command response is not valid UTF-8".into()))?;

        self.events.push_back(ClientEvent::Command { sequence, response });
        Ok(())
    }
}

impl Default for ClientProtocol {
    fn default() -> Self {
        Self::new()
    }
}
