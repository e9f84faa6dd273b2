//! Wire packets exchanged between a BattlEye RCON client and server.
//!
//! Every datagram shares the same layout:
//! `"BE"` (2) | CRC32 of the remainder, little-endian (4) | `0xFF` (1) |
//! type byte (1) | payload.
//!
//! The login and message types have overlapping byte shapes between the two
//! roles, so decoding is split by direction: [`ClientPacket::from_bytes`]
//! parses datagrams sent by a client, [`ServerPacket::from_bytes`] datagrams
//! sent by a server.

use crc::{CRC_32_ISO_HDLC, Crc};

use crate::error::{RconError, Result};

/// Largest datagram either side may emit, fixed by the protocol.
pub const MAX_PACKET_SIZE: usize = 65_507;

/// CRC32 (IEEE 802.3) over everything from the 0xFF header byte onward.
const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// The packet type byte defined by the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketKind {
    /// Login exchange initiated by the client
    Login = 0x00,
    /// Command/response exchanges between the client and server
    Command = 0x01,
    /// Server activity messages and client acknowledgements
    Message = 0x02,
}

impl PacketKind {
    fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0x00 => Ok(PacketKind::Login),
            0x01 => Ok(PacketKind::Command),
            0x02 => Ok(PacketKind::Message),
            other => Err(RconError::Malformed(format!(
                "unknown packet type: {other}"
            ))),
        }
    }
}

/// A packet sent by the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientPacket {
    /// Requests authentication with the given password
    Login { password: Vec<u8> },
    /// Issues a command to the server
    Command { sequence: u8, command: Vec<u8> },
    /// Acknowledges a server message
    Message { sequence: u8 },
}

impl ClientPacket {
    /// Builds a login packet. The password must not contain a NUL byte.
    pub fn login(password: &str) -> Result<Self> {
        if password.bytes().any(|b| b == 0) {
            return Err(RconError::Malformed(
                "login password cannot have a null byte".into(),
            ));
        }
        Ok(ClientPacket::Login {
            password: password.as_bytes().to_vec(),
        })
    }

    pub fn kind(&self) -> PacketKind {
        match self {
            ClientPacket::Login { .. } => PacketKind::Login,
            ClientPacket::Command { .. } => PacketKind::Command,
            ClientPacket::Message { .. } => PacketKind::Message,
        }
    }

    /// The sequence number, if this packet type carries one.
    pub fn sequence(&self) -> Option<u8> {
        match self {
            ClientPacket::Login { .. } => None,
            ClientPacket::Command { sequence, .. } => Some(*sequence),
            ClientPacket::Message { sequence } => Some(*sequence),
        }
    }

    /// Serializes the packet, including the checksummed header.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        match self {
            ClientPacket::Login { password } => encode(PacketKind::Login, &[password]),
            ClientPacket::Command { sequence, command } => {
                encode(PacketKind::Command, &[&[*sequence], command])
            }
            ClientPacket::Message { sequence } => encode(PacketKind::Message, &[&[*sequence]]),
        }
    }

    /// Parses a datagram sent by a client.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let (kind, payload) = split_header(data)?;
        match kind {
            PacketKind::Login => {
                if payload.contains(&0) {
                    return Err(RconError::Malformed(
                        "login password cannot have a null byte".into(),
                    ));
                }
                Ok(ClientPacket::Login {
                    password: payload.to_vec(),
                })
            }
            PacketKind::Command => {
                let (&sequence, command) = payload
                    .split_first()
                    .ok_or_else(|| RconError::Malformed("insufficient data provided".into()))?;
                Ok(ClientPacket::Command {
                    sequence,
                    command: command.to_vec(),
                })
            }
            PacketKind::Message => match payload {
                [sequence] => Ok(ClientPacket::Message {
                    sequence: *sequence,
                }),
                [] => Err(RconError::Malformed("insufficient data provided".into())),
                _ => Err(RconError::Malformed(
                    "unexpected excess data after acknowledged sequence".into(),
                )),
            },
        }
    }
}

/// A packet sent by the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerPacket {
    /// Reports whether the client's password was accepted
    Login { success: bool },
    /// One part of a command response; `total`/`index` default to 1/0 when
    /// the response fits in a single packet and no sub-header is present
    Command {
        sequence: u8,
        total: u8,
        index: u8,
        payload: Vec<u8>,
    },
    /// A server activity message awaiting acknowledgement
    Message { sequence: u8, message: Vec<u8> },
}

impl ServerPacket {
    /// Builds one part of a command response.
    ///
    /// Fails when `total` is zero or `index` is out of bounds.
    pub fn command(sequence: u8, total: u8, index: u8, payload: Vec<u8>) -> Result<Self> {
        if total == 0 {
            return Err(RconError::Malformed("total must be 1 or higher".into()));
        }
        if index >= total {
            return Err(RconError::Malformed(format!(
                "index ({index}) cannot equal or exceed total ({total})"
            )));
        }
        Ok(ServerPacket::Command {
            sequence,
            total,
            index,
            payload,
        })
    }

    pub fn kind(&self) -> PacketKind {
        match self {
            ServerPacket::Login { .. } => PacketKind::Login,
            ServerPacket::Command { .. } => PacketKind::Command,
            ServerPacket::Message { .. } => PacketKind::Message,
        }
    }

    /// The sequence number, if this packet type carries one.
    pub fn sequence(&self) -> Option<u8> {
        match self {
            ServerPacket::Login { .. } => None,
            ServerPacket::Command { sequence, .. } => Some(*sequence),
            ServerPacket::Message { sequence, .. } => Some(*sequence),
        }
    }

    /// Serializes the packet, including the checksummed header.
    ///
    /// A multipart sub-header (`0x00 | total | index`) is only emitted when
    /// the response spans more than one packet, matching what game servers
    /// send on the wire.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        match self {
            ServerPacket::Login { success } => {
                encode(PacketKind::Login, &[&[u8::from(*success)]])
            }
            ServerPacket::Command {
                sequence,
                total,
                index,
                payload,
            } => {
                if *total == 1 {
                    encode(PacketKind::Command, &[&[*sequence], payload])
                } else {
                    encode(
                        PacketKind::Command,
                        &[&[*sequence, 0x00, *total, *index], payload],
                    )
                }
            }
            ServerPacket::Message { sequence, message } => {
                encode(PacketKind::Message, &[&[*sequence], message])
            }
        }
    }

    /// Parses a datagram sent by a server.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let (kind, payload) = split_header(data)?;
        match kind {
            PacketKind::Login => match payload {
                [success @ (0 | 1)] => Ok(ServerPacket::Login {
                    success: *success == 1,
                }),
                [] => Err(RconError::Malformed("insufficient data provided".into())),
                [_] => Err(RconError::Malformed(
                    "authentication byte must be 0 or 1".into(),
                )),
                _ => Err(RconError::Malformed(
                    "unexpected excess data after authentication byte".into(),
                )),
            },
            PacketKind::Command => {
                let (&sequence, rest) = payload
                    .split_first()
                    .ok_or_else(|| RconError::Malformed("insufficient data provided".into()))?;
                let (total, index, response) = match rest {
                    [0x00, total, index, response @ ..] => (*total, *index, response),
                    [0x00, ..] => {
                        return Err(RconError::Malformed("insufficient data provided".into()));
                    }
                    _ => (1, 0, rest),
                };
                Self::command(sequence, total, index, response.to_vec())
            }
            PacketKind::Message => {
                let (&sequence, message) = payload
                    .split_first()
                    .ok_or_else(|| RconError::Malformed("insufficient data provided".into()))?;
                Ok(ServerPacket::Message {
                    sequence,
                    message: message.to_vec(),
                })
            }
        }
    }
}

/// Prepends the checksummed header to the payload parts.
fn encode(kind: PacketKind, parts: &[&[u8]]) -> Result<Vec<u8>> {
    let body_len: usize = parts.iter().map(|p| p.len()).sum();
    let mut payload = Vec::with_capacity(2 + body_len);
    payload.push(0xFF);
    payload.push(kind as u8);
    for part in parts {
        payload.extend_from_slice(part);
    }

    if 6 + payload.len() > MAX_PACKET_SIZE {
        return Err(RconError::Malformed(format!(
            "max packet size exceeded by {} bytes",
            6 + payload.len() - MAX_PACKET_SIZE
        )));
    }

    let mut data = Vec::with_capacity(6 + payload.len());
    data.extend_from_slice(b"BE");
    data.extend_from_slice(&CRC32.checksum(&payload).to_le_bytes());
    data.extend_from_slice(&payload);
    Ok(data)
}

/// Validates the header and returns the packet kind and payload.
fn split_header(data: &[u8]) -> Result<(PacketKind, &[u8])> {
    if data.len() > MAX_PACKET_SIZE {
        return Err(RconError::Malformed(format!(
            "max packet size exceeded by {} bytes",
            data.len() - MAX_PACKET_SIZE
        )));
    }
    if data.len() < 8 {
        return Err(RconError::Malformed("insufficient data provided".into()));
    }
    if &data[..2] != b"BE" {
        return Err(RconError::Malformed("expected BE as start of header".into()));
    }
    if data[6] != 0xFF {
        return Err(RconError::Malformed("expected 0xFF at end of header".into()));
    }

    let checksum = u32::from_le_bytes([data[2], data[3], data[4], data[5]]);
    if CRC32.checksum(&data[6..]) != checksum {
        return Err(RconError::Malformed(
            "CRC32 checksum does not match the given data".into(),
        ));
    }

    let kind = PacketKind::from_byte(data[7])?;
    Ok((kind, &data[8..]))
}
