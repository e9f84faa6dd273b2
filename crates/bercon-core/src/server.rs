//! Server side of the RCON protocol, without I/O.
//!
//! One [`ServerProtocol`] instance models the conversation with a single
//! client. It is primarily used to stand up in-process servers for testing
//! clients against, but implements the full wire contract.

use std::collections::{HashSet, VecDeque};

use subtle::ConstantTimeEq;

use crate::check::NonceCheck;
use crate::error::{RconError, Result};
use crate::events::ServerEvent;
use crate::packet::{ClientPacket, ServerPacket};

/// Chunk size used when splitting command responses, unless overridden.
pub const DEFAULT_RESPONSE_CHUNK_SIZE: usize = 512;

/// Authentication state of the server protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Waiting for the client to present a password
    Authenticating,
    /// The client has been authenticated
    LoggedIn,
}

impl ServerState {
    fn name(self) -> &'static str {
        match self {
            ServerState::Authenticating => "authenticating",
            ServerState::LoggedIn => "logged in",
        }
    }
}

/// Sans-I/O state machine for the server role
#[derive(Debug)]
pub struct ServerProtocol {
    state: ServerState,
    password: String,
    response_chunk_size: usize,
    next_sequence: u8,
    awaiting_ack: HashSet<u8>,
    command_check: NonceCheck,
    events: VecDeque<ServerEvent>,
    to_send: VecDeque<ServerPacket>,
}

impl ServerProtocol {
    pub fn new(password: &str) -> Self {
        ServerProtocol {
            state: ServerState::Authenticating,
            password: password.to_string(),
            response_chunk_size: DEFAULT_RESPONSE_CHUNK_SIZE,
            next_sequence: 0,
            awaiting_ack: HashSet::new(),
            command_check: NonceCheck::default(),
            events: VecDeque::new(),
            to_send: VecDeque::new(),
        }
    }

    /// Sets the chunk size used to split command responses.
    ///
    /// The wire protocol does not prescribe one; any size of at least
    /// one byte is valid.
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        assert!(size >= 1, "response chunk size must be at least 1");
        self.response_chunk_size = size;
        self
    }

    /// Sets a custom duplicate-command window.
    pub fn with_command_check(mut self, command_check: NonceCheck) -> Self {
        self.command_check = command_check;
        self
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    /// Compares the presented password and queues the login reply.
    ///
    /// The comparison runs in constant time. A client is allowed to try
    /// again after a failure, and a logged-in client that authenticates
    /// anew is demoted until the attempt succeeds.
    pub fn try_authenticate(&mut self, password: &[u8]) -> bool {
        let success = password.ct_eq(self.password.as_bytes()).into();
        self.state = if success {
            ServerState::LoggedIn
        } else {
            ServerState::Authenticating
        };
        self.to_send.push_back(ServerPacket::Login { success });
        success
    }

    /// Queues the response to a client command, split into chunks.
    ///
    /// An empty response still produces a single empty packet so the
    /// client's retry loop has something to complete on.
    pub fn respond_to_command(&mut self, sequence: u8, response: &str) -> Result<()> {
        let bytes = response.as_bytes();
        let chunks: Vec<&[u8]> = if bytes.is_empty() {
            vec![&[]]
        } else {
            bytes.chunks(self.response_chunk_size).collect()
        };

        let total = u8::try_from(chunks.len()).map_err(|_| {
            RconError::Malformed(format!(
                "response would span {} packets, limit is 255",
                chunks.len()
            ))
        })?;
        for (index, part) in chunks.into_iter().enumerate() {
            self.to_send
                .push_back(ServerPacket::command(sequence, total, index as u8, part.to_vec())?);
        }
        Ok(())
    }

    /// Allocates a sequence number and queues a message for the client.
    ///
    /// The sequence is tracked until the client acknowledges it.
    pub fn send_message(&mut self, message: &str) -> Result<u8> {
        self.expect_state(ServerState::LoggedIn)?;
        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);
        self.awaiting_ack.insert(sequence);
        self.to_send.push_back(ServerPacket::Message {
            sequence,
            message: message.as_bytes().to_vec(),
        });
        Ok(sequence)
    }

    /// Parses a datagram from the client and drives the state machine.
    pub fn receive_datagram(&mut self, data: &[u8]) -> Result<ClientPacket> {
        let packet = ClientPacket::from_bytes(data)?;
        self.handle_packet(&packet)?;
        Ok(packet)
    }

    /// Drains all events parsed since the last call.
    pub fn events_received(&mut self) -> Vec<ServerEvent> {
        self.events.drain(..).collect()
    }

    /// Drains all packets waiting to be written to the transport.
    pub fn packets_to_send(&mut self) -> Vec<ServerPacket> {
        self.to_send.drain(..).collect()
    }

    /// Returns the protocol to its initial state.
    pub fn reset(&mut self) {
        self.state = ServerState::Authenticating;
        self.next_sequence = 0;
        self.awaiting_ack.clear();
        self.command_check.reset();
        self.events.clear();
        self.to_send.clear();
    }

    fn expect_state(&self, expected: ServerState) -> Result<()> {
        if self.state != expected {
            return Err(RconError::InvalidState {
                current: self.state.name(),
                expected: expected.name(),
            });
        }
        Ok(())
    }

    fn handle_packet(&mut self, packet: &ClientPacket) -> Result<()> {
        match packet {
            ClientPacket::Login { password } => {
                let success = self.try_authenticate(password);
                self.events.push_back(ServerEvent::Auth { success });
                Ok(())
            }
            ClientPacket::Command { sequence, command } => {
                self.expect_state(ServerState::LoggedIn)?;
                if self.command_check.check(*sequence) {
                    let command = String::from_utf8(command.clone()).map_err(|_| {
                        RconError::Malformed("client command is not valid UTF-8".into())
                    })?;
                    self.events.push_back(ServerEvent::Command {
                        sequence: *sequence,
                        command,
                    });
                }
                Ok(())
            }
            ClientPacket::Message { sequence } => {
                self.expect_state(ServerState::LoggedIn)?;
                if !self.awaiting_ack.remove(sequence) {
                    return Err(RconError::Malformed(format!(
                        "unexpected message acknowledgement (sequence {sequence})"
                    )));
                }
                self.events
                    .push_back(ServerEvent::MessageAck { sequence: *sequence });
                Ok(())
            }
        }
    }
}
