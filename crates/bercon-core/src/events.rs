//! Events produced by the protocol state machines

/// An event produced by [`ClientProtocol`](crate::ClientProtocol)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Outcome of an authentication request
    Auth { success: bool },
    /// The fully reassembled response to a command
    Command { sequence: u8, response: String },
    /// A first-time message from the server; the engine queues the
    /// acknowledgement itself, duplicates never reach this event
    Message { message: String },
}

/// An event produced by [`ServerProtocol`](crate::ServerProtocol)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// Outcome of a client's authentication attempt; the reply packet is
    /// queued by the engine
    Auth { success: bool },
    /// A first-time command from the client, to be answered with
    /// [`respond_to_command`](crate::ServerProtocol::respond_to_command)
    Command { sequence: u8, command: String },
    /// The client acknowledged a message previously sent with
    /// [`send_message`](crate::ServerProtocol::send_message)
    MessageAck { sequence: u8 },
}
