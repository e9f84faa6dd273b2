//! In-process UDP server for exercising the client end to end.
//!
//! Runs a real socket on localhost driven by the sans-I/O
//! [`ServerProtocol`], so tests cover the same code paths as a live
//! game server: login, command responses, server messages, and acks.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;

use bercon_core::packet::MAX_PACKET_SIZE;
use bercon_core::{ClientPacket, ServerEvent, ServerProtocol};
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

pub const PASSWORD: &str = "foobar2000";

pub const PLAYERS_RESPONSE: &str = "Players on server:\n\
    [#] [IP Address]:[Port] [Ping] [GUID] [Name]\n\
    --------------------------------------------------\n\
    0 1.2.3.4:2304 47 394e2c09af98b00fd4094f86c7921622(OK) Spam\n\
    1 2.3.4.5:2304 125 d93ed2257011b47e67fa53e824b60ca5(OK) H8m\n\
    (2 players in total)";

#[derive(Debug, Clone, Copy, Default)]
pub struct MockServerOptions {
    /// Answer commands (`players` with a canned list, anything else with
    /// an `echo:` of the command); when false, commands are ignored so
    /// clients run into their retry limit
    pub respond_to_commands: bool,
    /// Send the `RCon admin #4 ... logged in` message after each
    /// successful login, like a real server does
    pub announce_admin: bool,
}

pub struct MockServer {
    pub addr: SocketAddr,
    /// Every command datagram received, including retransmits
    pub commands: Arc<Mutex<Vec<String>>>,
    /// Number of login packets received
    pub logins: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub async fn spawn_server(password: &str, options: MockServerOptions) -> MockServer {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    let commands: Arc<Mutex<Vec<String>>> = Arc::default();
    let logins: Arc<AtomicUsize> = Arc::default();

    let password = password.to_string();
    let command_log = commands.clone();
    let login_count = logins.clone();
    let handle = tokio::spawn(async move {
        let mut protocol = ServerProtocol::new(&password);
        let mut buf = vec![0u8; MAX_PACKET_SIZE];

        loop {
            let (n, peer) = match socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(_) => continue,
            };

            match protocol.receive_datagram(&buf[..n]) {
                Ok(ClientPacket::Login { .. }) => {
                    login_count.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                }
                Ok(ClientPacket::Command { command, .. }) => {
                    let command = String::from_utf8_lossy(&command).into_owned();
                    command_log.lock().await.push(command);
                }
                Ok(ClientPacket::Message { .. }) => {}
                Err(_) => continue,
            }

            for event in protocol.events_received() {
                match event {
                    ServerEvent::Auth { success: true } if options.announce_admin => {
                        let _ = protocol.send_message("RCon admin #4 (1.2.3.4:1234) logged in");
                    }
                    ServerEvent::Command { sequence, command } if options.respond_to_commands => {
                        let response = match command.as_str() {
                            "players" => PLAYERS_RESPONSE.to_string(),
                            "" => String::new(),
                            other => format!("echo:{other}"),
                        };
                        protocol.respond_to_command(sequence, &response).unwrap();
                    }
                    _ => {}
                }
            }

            for packet in protocol.packets_to_send() {
                let data = packet.to_bytes().unwrap();
                let _ = socket.send_to(&data, peer).await;
            }
        }
    });

    MockServer {
        addr,
        commands,
        logins,
        handle,
    }
}
