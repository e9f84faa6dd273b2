//! Interactive RCON console
//!
//! Connects to a BattlEye server, prints everything the server reports,
//! and sends each line typed on stdin as a command:
//!
//! ```text
//! bercon <host> <port> <password>
//! ```

use anyhow::{Context, Result, bail};
use bercon_client::{RconClient, RconEvent};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let [host, port, password] = args.as_slice() else {
        bail!("usage: bercon <host> <port> <password>");
    };
    let port: u16 = port.parse().context("port must be a number")?;

    let client = RconClient::new();
    client.connect(host, port, password).await?;
    info!("connected to {host}:{port}");

    // Print server activity as it happens
    let mut events = client.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                RconEvent::Message(text) => println!("| {text}"),
                RconEvent::PlayerConnect(player) => {
                    println!("* {} connected from {}", player.name, player.addr);
                }
                RconEvent::PlayerDisconnect(player) => {
                    println!("* {} disconnected", player.name);
                }
                RconEvent::PlayerKick { player, reason } => {
                    println!("* {} was kicked: {reason}", player.name);
                }
                _ => {}
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = line.trim();
        if command.is_empty() {
            continue;
        }
        if command == "quit" || command == "exit" {
            break;
        }

        match client.send_command(command).await {
            Ok(response) if response.is_empty() => println!("(no output)"),
            Ok(response) => println!("{response}"),
            Err(e) => warn!("command failed: {e}"),
        }
    }

    printer.abort();
    client.close();
    client.wait_until_closed().await?;
    Ok(())
}
