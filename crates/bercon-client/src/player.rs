//! Player snapshots published by the cache

/// A player currently (or recently) connected to the server.
///
/// Snapshots are plain data; identity is the server-assigned `id`. Verbs
/// such as kicking or whispering live on
/// [`RconClient`](crate::RconClient) and take the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    /// ID assigned by the server for this session
    pub id: u16,
    pub name: String,
    /// BattlEye GUID; empty until the server has reported it
    pub guid: String,
    /// IP address and port the player connected from
    pub addr: String,
    /// Last ping reported by a `players` response
    pub ping: Option<u16>,
    /// Whether the server confirmed the GUID is genuine
    pub is_guid_valid: bool,
    /// Whether the player sits in the lobby; only accurate after a
    /// `players` refresh
    pub in_lobby: bool,
}

impl Player {
    /// The IP address without the port.
    pub fn ip(&self) -> &str {
        self.addr.split(':').next().unwrap_or(&self.addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ip_strips_port() {
        let player = Player {
            id: 3,
            name: "Spam".into(),
            guid: String::new(),
            addr: "1.2.3.4:2304".into(),
            ping: None,
            is_guid_valid: false,
            in_lobby: false,
        };
        assert_eq!(player.ip(), "1.2.3.4");
    }
}
